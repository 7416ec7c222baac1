use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use super::array::{FieldArray, ListChildren};
use super::channel::{ChildChannel, ParentChannel};
use super::engine::{ChildState, ChildValidation, FieldOptions, FieldValue, Node, NodeKind, Slot};
use super::errors::{ErrorKey, Errors};
use super::handle::Field;
use super::lens::{FieldKey, FieldLens};
use crate::cancel::CancellationToken;
use crate::error::{FormError, FormResult};

/// A field whose children address named properties of its value.
pub type FieldNode<T> = Field<T, KeyedChildren<T>>;

/// Children of a [`FieldNode`], keyed by property name.
pub struct KeyedChildren<T> {
    links: RefCell<BTreeMap<FieldKey, Rc<dyn PropertyLink<T>>>>,
}

impl<T> Default for KeyedChildren<T> {
    fn default() -> Self {
        Self {
            links: RefCell::new(BTreeMap::new()),
        }
    }
}

impl<T: FieldValue> KeyedChildren<T> {
    fn links(&self) -> Vec<(FieldKey, Rc<dyn PropertyLink<T>>)> {
        self.links
            .borrow()
            .iter()
            .map(|(key, link)| (*key, link.clone()))
            .collect()
    }
}

impl<T: FieldValue> NodeKind<T> for KeyedChildren<T> {
    fn push_default_value(&self, value: &T) {
        for (_, link) in self.links() {
            link.push_default_value(value);
        }
    }

    fn push_value(&self, value: &T) {
        for (_, link) in self.links() {
            link.push_value(value);
        }
    }

    fn reset_children(&self) {
        for (_, link) in self.links() {
            link.reset();
        }
    }

    fn validate_children(&self) {
        for (_, link) in self.links() {
            link.validate();
        }
    }

    fn validate_children_once(
        &self,
        value: &T,
        signal: &CancellationToken,
    ) -> Vec<ChildValidation> {
        self.links()
            .into_iter()
            .map(|(key, link)| {
                let pending = link.validate_once(value, signal.clone());
                async move { Ok((ErrorKey::from(key), pending.await?)) }.boxed_local()
            })
            .collect()
    }

    fn error_key(&self, slot: &Slot) -> Option<ErrorKey> {
        match slot {
            Slot::Named(key) => Some(ErrorKey::from(*key)),
            Slot::Item(_) => None,
        }
    }
}

/// An attached child seen from its parent, with the property type erased.
trait PropertyLink<T> {
    fn push_default_value(&self, parent: &T);
    fn push_value(&self, parent: &T);
    fn reset(&self);
    fn validate(&self);
    fn validate_once(
        &self,
        parent: &T,
        signal: CancellationToken,
    ) -> LocalBoxFuture<'static, FormResult<Errors>>;
}

struct LensLink<T, L: FieldLens<T>> {
    lens: L,
    child: Rc<dyn ChildChannel<L::Value>>,
    _parent: PhantomData<fn(&T)>,
}

impl<T, L> PropertyLink<T> for LensLink<T, L>
where
    T: 'static,
    L: FieldLens<T>,
{
    fn push_default_value(&self, parent: &T) {
        self.child
            .push_default_value(self.lens.get(parent).clone());
    }

    fn push_value(&self, parent: &T) {
        self.child.push_value(self.lens.get(parent).clone());
    }

    fn reset(&self) {
        self.child.reset();
    }

    fn validate(&self) {
        self.child.validate();
    }

    fn validate_once(
        &self,
        parent: &T,
        signal: CancellationToken,
    ) -> LocalBoxFuture<'static, FormResult<Errors>> {
        self.child
            .validate_once(self.lens.get(parent).clone(), signal)
    }
}

/// The slot a [`FieldNode`] reserves for one property.
struct KeyedSlot<T, L> {
    parent: Weak<Node<T, KeyedChildren<T>>>,
    lens: L,
}

impl<T, L> KeyedSlot<T, L>
where
    T: FieldValue,
    L: FieldLens<T>,
{
    fn slot(&self) -> Slot {
        Slot::Named(self.lens.key())
    }

    fn update(&self, update: impl FnOnce(&mut ChildState)) {
        if let Some(parent) = self.parent.upgrade() {
            parent.update_child(&self.slot(), update);
        }
    }
}

impl<T, L> ParentChannel<L::Value> for KeyedSlot<T, L>
where
    T: FieldValue,
    L: FieldLens<T>,
{
    fn attach(&self, child: Rc<dyn ChildChannel<L::Value>>) -> FormResult<()> {
        let parent = self.parent.upgrade().ok_or(FormError::ParentDropped)?;
        let key = self.lens.key();
        {
            let mut links = parent.kind.links.borrow_mut();
            if links.contains_key(&key) {
                return Err(FormError::DuplicateChild {
                    key: key.to_string(),
                });
            }
            links.insert(
                key,
                Rc::new(LensLink {
                    lens: self.lens,
                    child,
                    _parent: PhantomData,
                }),
            );
        }
        parent.attach_child(self.slot());
        Ok(())
    }

    fn detach(&self) {
        let Some(parent) = self.parent.upgrade() else {
            return;
        };
        parent.kind.links.borrow_mut().remove(&self.lens.key());
        parent.detach_child(&self.slot());
    }

    fn set_default_value(&self, value: L::Value) {
        let Some(parent) = self.parent.upgrade() else {
            return;
        };
        let mut next = parent.default_value();
        self.lens.set(&mut next, value);
        parent.set_default_value(next);
    }

    fn set_value(&self, value: L::Value) {
        let Some(parent) = self.parent.upgrade() else {
            return;
        };
        let mut next = parent.value();
        self.lens.set(&mut next, value);
        parent.commit_value(next);
    }

    fn set_touched(&self, touched: bool) {
        self.update(|child| child.touched = touched);
    }

    fn set_dirty(&self, dirty: bool) {
        self.update(|child| child.dirty = dirty);
    }

    fn set_errors(&self, errors: Errors) {
        self.update(|child| child.errors = errors);
    }

    fn set_pending(&self, pending: bool) {
        self.update(|child| child.pending = pending);
    }
}

pub(crate) fn child_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_owned()
    } else {
        format!("{parent}.{segment}")
    }
}

impl<T: FieldValue> Field<T, KeyedChildren<T>> {
    /// A root field whose value starts at its default.
    pub fn new(default_value: T) -> Self {
        Self::with_value(default_value.clone(), default_value)
    }

    pub fn with_value(default_value: T, value: T) -> Self {
        Self::with_options(default_value, value, FieldOptions::default())
    }

    pub fn with_options(default_value: T, value: T, options: FieldOptions) -> Self {
        Self::build(default_value, value, None, options)
    }

    /// A field that reports into `parent` once connected.
    pub fn with_parent(
        default_value: T,
        value: T,
        parent: Rc<dyn ParentChannel<T>>,
        options: FieldOptions,
    ) -> Self {
        Self::build(default_value, value, Some(parent), options)
    }

    fn build(
        default_value: T,
        value: T,
        parent: Option<Rc<dyn ParentChannel<T>>>,
        options: FieldOptions,
    ) -> Self {
        Field::from_node(Node::new(
            "FieldNode",
            default_value,
            value,
            parent,
            options,
            |_, _| KeyedChildren::default(),
        ))
    }

    /// Creates an unconnected child for the property `lens` addresses,
    /// seeded from this field's current default and value.
    pub fn create_child<L>(&self, lens: L) -> FieldNode<L::Value>
    where
        L: FieldLens<T>,
    {
        let (default_value, value, options) = self.child_seed(lens);
        let slot = Rc::new(KeyedSlot {
            parent: Rc::downgrade(&self.node),
            lens,
        });
        FieldNode::with_parent(default_value, value, slot, options)
    }

    /// Creates an unconnected list child for a `Vec` property.
    pub fn create_list_child<E, L>(&self, lens: L) -> FieldArray<E>
    where
        E: FieldValue,
        L: FieldLens<T, Value = Vec<E>>,
    {
        let (default_value, value, options) = self.child_seed(lens);
        let slot = Rc::new(KeyedSlot {
            parent: Rc::downgrade(&self.node),
            lens,
        });
        Field::<Vec<E>, ListChildren<E>>::with_parent(default_value, value, slot, options)
    }

    /// Keys of the currently attached children.
    pub fn child_keys(&self) -> Vec<FieldKey> {
        self.node.kind.links.borrow().keys().copied().collect()
    }

    fn child_seed<L>(&self, lens: L) -> (L::Value, L::Value, FieldOptions)
    where
        L: FieldLens<T>,
    {
        let snapshot = self.snapshot();
        let options = FieldOptions {
            path: child_path(self.path(), lens.key().as_str()),
            scheduler: self.node.scheduler(),
        };
        (
            lens.get(&snapshot.default_value).clone(),
            lens.get(&snapshot.value).clone(),
            options,
        )
    }
}
