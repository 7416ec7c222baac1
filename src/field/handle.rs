use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use super::engine::{FieldValue, Node, NodeKind};
use super::errors::{ErrorKey, Errors};
use super::snapshot::Snapshot;
use super::validation::Validator;
use crate::cancel::CancellationToken;
use crate::dispatch::Disposer;
use crate::error::FormResult;

/// Handle to a field. Clones share the same field.
///
/// `K` selects how the field manages children: see
/// [`FieldNode`](crate::FieldNode) and [`FieldArray`](crate::FieldArray).
pub struct Field<T, K> {
    pub(crate) node: Rc<Node<T, K>>,
}

impl<T, K> Clone for Field<T, K> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T, K> Field<T, K>
where
    T: FieldValue,
    K: NodeKind<T>,
{
    pub(crate) fn from_node(node: Rc<Node<T, K>>) -> Self {
        Self { node }
    }

    /// `"FieldNode/<n>"` or `"FieldArray/<n>"`.
    pub fn id(&self) -> &str {
        self.node.id()
    }

    pub fn path(&self) -> &str {
        self.node.path()
    }

    /// The latest published state. Consecutive reads without an intervening
    /// change return the same allocation.
    pub fn snapshot(&self) -> Rc<Snapshot<T>> {
        self.node.snapshot()
    }

    pub fn value(&self) -> T {
        self.node.value()
    }

    pub fn default_value(&self) -> T {
        self.node.default_value()
    }

    /// Registers `listener` for snapshot changes. Changes made in one
    /// synchronous run are coalesced into a single call on the field's
    /// scheduler.
    pub fn subscribe(&self, listener: impl Fn(&Snapshot<T>) + 'static) -> Disposer {
        self.node.subscribe(listener)
    }

    /// Delivers any pending notification now.
    pub fn flush(&self) {
        self.node.flush();
    }

    pub fn set_default_value(&self, value: T) {
        self.node.set_default_value(value);
    }

    /// Replaces the value. This does not mark the field dirty.
    ///
    /// Values are compared with `PartialEq`, so an equal value is a no-op.
    /// On a [`FieldArray`](super::FieldArray) an unequal value rebuilds every
    /// child with a fresh slot, while an element-wise equal `Vec` keeps the
    /// current children even if it is a distinct allocation.
    pub fn set_value(&self, value: T) {
        self.node.set_value(value);
    }

    pub fn set_touched(&self) {
        self.node.set_touched();
    }

    pub fn set_dirty(&self) {
        self.node.set_dirty();
    }

    /// Replaces the custom error layer and always notifies.
    pub fn set_custom_errors(&self, errors: Errors) {
        self.node.set_custom_errors(errors);
    }

    /// Registers `validator` under `key` and runs it against the current
    /// value. The returned disposer removes the validator and its error.
    pub fn add_validator(
        &self,
        key: impl Into<ErrorKey>,
        validator: impl Validator<T>,
    ) -> FormResult<Disposer> {
        self.node.add_validator(key.into(), Rc::new(validator))
    }

    pub fn validator_keys(&self) -> Vec<ErrorKey> {
        self.node.validator_keys()
    }

    /// Reruns every validator of this field and its connected descendants.
    pub fn validate(&self) {
        self.node.validate();
    }

    /// Computes the errors `value` would produce without touching any
    /// field state.
    pub fn validate_once(&self, value: T) -> LocalBoxFuture<'static, FormResult<Errors>> {
        self.node.validate_once(value, CancellationToken::new())
    }

    /// Like [`validate_once`](Self::validate_once), failing with
    /// [`FormError::Aborted`](crate::FormError::Aborted) once `signal` is
    /// cancelled.
    pub fn validate_once_with_signal(
        &self,
        value: T,
        signal: &CancellationToken,
    ) -> LocalBoxFuture<'static, FormResult<Errors>> {
        self.node.validate_once(value, signal.clone())
    }

    /// Restores the default value, clears the flags and custom errors, and
    /// resets every connected descendant.
    pub fn reset(&self) {
        self.node.reset();
    }

    /// Attaches this field to the slot its parent reserved for it.
    pub fn connect(&self) -> FormResult<Disposer> {
        self.node.connect()?;
        let node = Rc::downgrade(&self.node);
        Ok(Disposer::new(move || {
            if let Some(node) = node.upgrade() {
                let _ = node.disconnect();
            }
        }))
    }

    pub fn disconnect(&self) -> FormResult<()> {
        self.node.disconnect()
    }

    pub fn has_parent(&self) -> bool {
        self.node.has_parent()
    }

    pub fn is_connected(&self) -> bool {
        self.node.is_connected()
    }

    /// True when both handles refer to the same field.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl<T, K> Debug for Field<T, K>
where
    T: FieldValue + Debug,
    K: NodeKind<T>,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("id", &self.id())
            .field("path", &self.path())
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
