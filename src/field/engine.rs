use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{self, Either, LocalBoxFuture};

use super::channel::{ChildChannel, ParentChannel};
use super::errors::{ErrorKey, ErrorValue, Errors};
use super::snapshot::Snapshot;
use super::validation::{Resolver, Settlement, ValidationRequest, Validator};
use crate::cancel::CancellationToken;
use crate::dispatch::{Dispatcher, Disposer};
use crate::error::{FormError, FormResult};
use crate::field::lens::FieldKey;
use crate::id::next_id;
use crate::scheduler::{Scheduler, local_queue};

/// Bound shared by every value a field can hold.
pub trait FieldValue: Clone + PartialEq + 'static {}

impl<T> FieldValue for T where T: Clone + PartialEq + 'static {}

#[derive(Clone)]
pub struct FieldOptions {
    /// Dotted location of the field, used in diagnostics and inherited by
    /// children.
    pub path: String,
    pub scheduler: Rc<dyn Scheduler>,
}

impl FieldOptions {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            path: String::new(),
            scheduler: local_queue(),
        }
    }
}

/// Where a child's contributions are filed on its parent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Slot {
    Named(FieldKey),
    Item(u64),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ChildState {
    pub(crate) touched: bool,
    pub(crate) dirty: bool,
    pub(crate) errors: Errors,
    pub(crate) pending: bool,
}

struct LiveRequest {
    id: String,
    signal: CancellationToken,
}

struct FieldState<T> {
    default_value: T,
    value: T,
    dirty: bool,
    touched: bool,
    custom_errors: Errors,
    validation_errors: Errors,
    requests: BTreeMap<ErrorKey, LiveRequest>,
    children: BTreeMap<Slot, ChildState>,
}

pub type ChildValidation = LocalBoxFuture<'static, FormResult<(ErrorKey, Errors)>>;

/// Shape-specific behaviour plugged into the shared engine.
pub trait NodeKind<T>: Sized + 'static {
    /// Runs before a replacing value is committed.
    fn before_replace(&self, _value: &T, _default_value: &T) {}

    /// Runs after a replacing value has been committed.
    fn after_replace(&self) {}

    fn push_default_value(&self, value: &T);
    fn push_value(&self, value: &T);
    fn reset_children(&self);
    fn validate_children(&self);
    fn validate_children_once(&self, value: &T, signal: &CancellationToken)
    -> Vec<ChildValidation>;

    /// Key under which the child filed at `slot` reports its errors.
    fn error_key(&self, slot: &Slot) -> Option<ErrorKey>;

    fn flush(&self) {}
}

pub(crate) struct FieldCore<T> {
    id: String,
    path: String,
    state: RefCell<FieldState<T>>,
    validators: RefCell<BTreeMap<ErrorKey, Rc<dyn Validator<T>>>>,
    dispatcher: Rc<Dispatcher<Snapshot<T>>>,
    parent: Option<Rc<dyn ParentChannel<T>>>,
    connected: Cell<bool>,
}

/// A field: the shared engine plus the children handling of its shape.
pub struct Node<T, K> {
    this: Weak<Node<T, K>>,
    core: FieldCore<T>,
    pub(crate) kind: K,
}

impl<T, K> Node<T, K>
where
    T: FieldValue,
    K: NodeKind<T>,
{
    pub(crate) fn new(
        kind_name: &str,
        default_value: T,
        value: T,
        parent: Option<Rc<dyn ParentChannel<T>>>,
        options: FieldOptions,
        make_kind: impl FnOnce(&Weak<Self>, &FieldOptions) -> K,
    ) -> Rc<Self> {
        let id = next_id(kind_name);
        let initial = Snapshot {
            default_value: default_value.clone(),
            value: value.clone(),
            is_dirty: false,
            is_touched: false,
            errors: Errors::new(),
            is_pending: false,
        };
        let dispatcher = Dispatcher::new(id.clone(), options.scheduler.clone(), initial);
        Rc::new_cyclic(|this| Node {
            this: this.clone(),
            kind: make_kind(this, &options),
            core: FieldCore {
                id,
                path: options.path,
                state: RefCell::new(FieldState {
                    default_value,
                    value,
                    dirty: false,
                    touched: false,
                    custom_errors: Errors::new(),
                    validation_errors: Errors::new(),
                    requests: BTreeMap::new(),
                    children: BTreeMap::new(),
                }),
                validators: RefCell::new(BTreeMap::new()),
                dispatcher,
                parent,
                connected: Cell::new(false),
            },
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.core.id
    }

    pub(crate) fn path(&self) -> &str {
        &self.core.path
    }

    pub(crate) fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.core.dispatcher.scheduler()
    }

    pub(crate) fn snapshot(&self) -> Rc<Snapshot<T>> {
        self.core.dispatcher.latest()
    }

    pub(crate) fn value(&self) -> T {
        self.core.state.borrow().value.clone()
    }

    pub(crate) fn default_value(&self) -> T {
        self.core.state.borrow().default_value.clone()
    }

    pub(crate) fn subscribe(&self, listener: impl Fn(&Snapshot<T>) + 'static) -> Disposer {
        self.core.dispatcher.subscribe(listener)
    }

    pub(crate) fn flush(&self) {
        self.core.dispatcher.flush();
        self.kind.flush();
    }

    pub(crate) fn has_parent(&self) -> bool {
        self.core.parent.is_some()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.core.connected.get()
    }

    fn connected_parent(&self) -> Option<Rc<dyn ParentChannel<T>>> {
        if self.core.connected.get() {
            self.core.parent.clone()
        } else {
            None
        }
    }

    fn build_snapshot(&self) -> Snapshot<T> {
        let state = self.core.state.borrow();
        let mut children_errors = Errors::new();
        let mut child_touched = false;
        let mut child_dirty = false;
        let mut child_pending = false;
        for (slot, child) in &state.children {
            child_touched |= child.touched;
            child_dirty |= child.dirty;
            child_pending |= child.pending;
            if child.errors.has_errors()
                && let Some(key) = self.kind.error_key(slot)
            {
                children_errors.insert(key, child.errors.clone());
            }
        }
        Snapshot {
            default_value: state.default_value.clone(),
            value: state.value.clone(),
            is_dirty: state.dirty || child_dirty,
            is_touched: state.touched || child_touched,
            errors: Errors::layered(
                &children_errors,
                &state.validation_errors,
                &state.custom_errors,
            ),
            is_pending: !state.requests.is_empty() || child_pending,
        }
    }

    /// Rebuilds the snapshot and, if it differs from the last one, publishes
    /// it and forwards the derived flags to a connected parent.
    pub(crate) fn refresh(&self) {
        self.refresh_with(false);
    }

    fn refresh_with(&self, force: bool) {
        let next = self.build_snapshot();
        if !force && *self.core.dispatcher.latest() == next {
            return;
        }
        let published = self.core.dispatcher.publish(next);
        if let Some(parent) = self.connected_parent() {
            parent.set_touched(published.is_touched);
            parent.set_dirty(published.is_dirty);
            parent.set_errors(published.errors.clone());
            parent.set_pending(published.is_pending);
        }
    }

    pub(crate) fn set_default_value(&self, value: T) {
        {
            let mut state = self.core.state.borrow_mut();
            if state.default_value == value {
                return;
            }
            state.default_value = value.clone();
        }
        self.refresh();
        self.kind.push_default_value(&value);
        if let Some(parent) = self.connected_parent() {
            parent.set_default_value(value);
        }
    }

    /// Replaces the value, letting the shape rebuild its children.
    pub(crate) fn set_value(&self, value: T) {
        let default_value = {
            let state = self.core.state.borrow();
            if state.value == value {
                return;
            }
            state.default_value.clone()
        };
        self.kind.before_replace(&value, &default_value);
        self.commit_value(value);
        self.kind.after_replace();
    }

    /// Stores a new value without rebuilding children. Used for writes that
    /// originate from a child or from a structural edit.
    pub(crate) fn commit_value(&self, value: T) -> bool {
        {
            let mut state = self.core.state.borrow_mut();
            if state.value == value {
                return false;
            }
            state.value = value.clone();
        }
        self.refresh();
        self.kind.push_value(&value);
        if let Some(parent) = self.connected_parent() {
            parent.set_value(value);
        }
        self.run_validators();
        true
    }

    pub(crate) fn set_touched(&self) {
        {
            let mut state = self.core.state.borrow_mut();
            if state.touched {
                return;
            }
            state.touched = true;
        }
        self.refresh();
    }

    pub(crate) fn set_dirty(&self) {
        {
            let mut state = self.core.state.borrow_mut();
            if state.dirty {
                return;
            }
            state.dirty = true;
        }
        self.refresh();
    }

    pub(crate) fn set_custom_errors(&self, errors: Errors) {
        self.core.state.borrow_mut().custom_errors = errors;
        self.refresh_with(true);
    }

    pub(crate) fn reset(&self) {
        let (default_value, replaced) = {
            let state = self.core.state.borrow();
            (
                state.default_value.clone(),
                state.value != state.default_value,
            )
        };
        if replaced {
            self.kind.before_replace(&default_value, &default_value);
        }
        {
            let mut state = self.core.state.borrow_mut();
            state.value = default_value.clone();
            state.dirty = false;
            state.touched = false;
            state.custom_errors = Errors::new();
        }
        self.refresh();
        if replaced {
            if let Some(parent) = self.connected_parent() {
                parent.set_value(default_value);
            }
            self.kind.after_replace();
        }
        self.kind.reset_children();
        self.run_validators();
    }

    pub(crate) fn attach_child(&self, slot: Slot) {
        self.core
            .state
            .borrow_mut()
            .children
            .insert(slot, ChildState::default());
        self.refresh();
    }

    pub(crate) fn detach_child(&self, slot: &Slot) {
        let removed = self.core.state.borrow_mut().children.remove(slot);
        if removed.is_some() {
            self.refresh();
        }
    }

    pub(crate) fn update_child(&self, slot: &Slot, update: impl FnOnce(&mut ChildState)) {
        let changed = {
            let mut state = self.core.state.borrow_mut();
            let Some(child) = state.children.get_mut(slot) else {
                return;
            };
            let before = child.clone();
            update(child);
            *child != before
        };
        if changed {
            self.refresh();
        }
    }

    pub(crate) fn add_validator(
        &self,
        key: ErrorKey,
        validator: Rc<dyn Validator<T>>,
    ) -> FormResult<Disposer> {
        {
            let mut validators = self.core.validators.borrow_mut();
            if validators.contains_key(&key) {
                return Err(FormError::DuplicateValidator {
                    field: self.core.id.clone(),
                    key,
                });
            }
            validators.insert(key.clone(), validator);
        }
        self.run_validator(&key);
        let this = self.this.clone();
        Ok(Disposer::new(move || {
            if let Some(node) = this.upgrade() {
                node.remove_validator(&key);
            }
        }))
    }

    fn remove_validator(&self, key: &ErrorKey) {
        self.core.validators.borrow_mut().remove(key);
        let outstanding = self.core.state.borrow_mut().requests.remove(key);
        if let Some(request) = outstanding {
            request.signal.cancel();
        }
        self.core
            .state
            .borrow_mut()
            .validation_errors
            .remove(key);
        self.refresh();
    }

    pub(crate) fn validator_keys(&self) -> Vec<ErrorKey> {
        self.core.validators.borrow().keys().cloned().collect()
    }

    pub(crate) fn run_validators(&self) {
        for key in self.validator_keys() {
            self.run_validator(&key);
        }
    }

    /// Issues a fresh live request for `key`, aborting the outstanding one.
    fn run_validator(&self, key: &ErrorKey) {
        let validator = self
            .core
            .validators
            .borrow()
            .get(key)
            .cloned();
        let Some(validator) = validator else {
            return;
        };

        let previous = self.core.state.borrow_mut().requests.remove(key);
        if let Some(previous) = previous {
            previous.signal.cancel();
        }

        let request_id = next_id("ValidationRequest");
        let signal = CancellationToken::new();
        let value = {
            let mut state = self.core.state.borrow_mut();
            state.requests.insert(
                key.clone(),
                LiveRequest {
                    id: request_id.clone(),
                    signal: signal.clone(),
                },
            );
            state.value.clone()
        };
        self.refresh();

        let this = self.this.clone();
        let settle_key = key.clone();
        let settle_id = request_id.clone();
        let resolver = Resolver::new(move |outcome| {
            if let Some(node) = this.upgrade() {
                node.settle(&settle_key, &settle_id, outcome);
            }
        });
        let request = ValidationRequest::new(request_id, false, value, signal, resolver.clone());
        if let Err(error) = validator.validate(request) {
            resolver.settle(Err(error));
        }
    }

    fn settle(&self, key: &ErrorKey, request_id: &str, outcome: Settlement) {
        let failure = {
            let mut state = self.core.state.borrow_mut();
            let live = state
                .requests
                .get(key)
                .is_some_and(|request| request.id == request_id && !request.signal.is_cancelled());
            if !live {
                return;
            }
            state.requests.remove(key);
            match outcome {
                Ok(Some(error)) if error.is_present() => {
                    state.validation_errors.insert(key.clone(), error);
                    None
                }
                Ok(_) => {
                    state.validation_errors.remove(key);
                    None
                }
                Err(error) => Some(error),
            }
        };
        if let Some(error) = failure {
            tracing::error!(
                field = %self.core.id,
                path = %self.core.path,
                validator = %key,
                %error,
                "validator failed"
            );
        }
        self.refresh();
    }

    pub(crate) fn validate(&self) {
        self.run_validators();
        self.kind.validate_children();
    }

    pub(crate) fn validate_once(
        &self,
        value: T,
        signal: CancellationToken,
    ) -> LocalBoxFuture<'static, FormResult<Errors>> {
        if signal.is_cancelled() {
            return future::ready(Err(FormError::Aborted)).boxed_local();
        }
        let custom = self.core.state.borrow().custom_errors.clone();
        let validators = self
            .core
            .validators
            .borrow()
            .iter()
            .map(|(key, validator)| (key.clone(), validator.clone()))
            .collect::<Vec<_>>();
        let checks = validators
            .into_iter()
            .map(|(key, validator)| run_once(key, validator, value.clone(), signal.clone()))
            .collect::<Vec<_>>();
        let children = self.kind.validate_children_once(&value, &signal);

        async move {
            let work = async move {
                let child_results = future::try_join_all(children).await?;
                let outcomes = future::try_join_all(checks).await?;

                let mut children_errors = Errors::new();
                for (key, errors) in child_results {
                    if errors.has_errors() {
                        children_errors.insert(key, errors);
                    }
                }
                let mut validation = Errors::new();
                for (key, error) in outcomes {
                    if let Some(error) = error.filter(ErrorValue::is_present) {
                        validation.insert(key, error);
                    }
                }
                Ok(Errors::layered(&children_errors, &validation, &custom))
            };
            match future::select(signal.cancelled().boxed_local(), work.boxed_local()).await {
                Either::Left(_) => Err(FormError::Aborted),
                Either::Right(_) if signal.is_cancelled() => Err(FormError::Aborted),
                Either::Right((result, _)) => result,
            }
        }
        .boxed_local()
    }

    pub(crate) fn connect(self: &Rc<Self>) -> FormResult<()> {
        let Some(parent) = self.core.parent.clone() else {
            return Err(FormError::NoParent {
                field: self.core.id.clone(),
            });
        };
        if self.core.connected.get() {
            return Err(FormError::AlreadyConnected {
                field: self.core.id.clone(),
            });
        }
        let channel: Rc<dyn ChildChannel<T>> = self.clone();
        parent.attach(channel)?;
        self.core.connected.set(true);
        tracing::debug!(field = %self.core.id, path = %self.core.path, "connected to parent");

        let snapshot = self.snapshot();
        parent.set_default_value(snapshot.default_value.clone());
        parent.set_value(snapshot.value.clone());
        parent.set_touched(snapshot.is_touched);
        parent.set_dirty(snapshot.is_dirty);
        parent.set_errors(snapshot.errors.clone());
        parent.set_pending(snapshot.is_pending);
        Ok(())
    }

    pub(crate) fn disconnect(&self) -> FormResult<()> {
        let Some(parent) = self.core.parent.clone() else {
            return Err(FormError::NoParent {
                field: self.core.id.clone(),
            });
        };
        if self.core.connected.replace(false) {
            parent.detach();
            tracing::debug!(field = %self.core.id, path = %self.core.path, "disconnected from parent");
        }
        Ok(())
    }
}

impl<T, K> ChildChannel<T> for Node<T, K>
where
    T: FieldValue,
    K: NodeKind<T>,
{
    fn push_default_value(&self, value: T) {
        Node::set_default_value(self, value);
    }

    fn push_value(&self, value: T) {
        Node::set_value(self, value);
    }

    fn reset(&self) {
        Node::reset(self);
    }

    fn validate(&self) {
        Node::validate(self);
    }

    fn validate_once(
        &self,
        value: T,
        signal: CancellationToken,
    ) -> LocalBoxFuture<'static, FormResult<Errors>> {
        Node::validate_once(self, value, signal)
    }
}

fn run_once<T: 'static>(
    key: ErrorKey,
    validator: Rc<dyn Validator<T>>,
    value: T,
    signal: CancellationToken,
) -> LocalBoxFuture<'static, FormResult<(ErrorKey, Option<ErrorValue>)>> {
    let (sender, receiver) = oneshot::channel::<Settlement>();
    let sender = RefCell::new(Some(sender));
    let resolver = Resolver::new(move |outcome| {
        if let Some(sender) = sender.borrow_mut().take() {
            let _ = sender.send(outcome);
        }
    });
    let request = ValidationRequest::new(
        next_id("ValidationRequest"),
        true,
        value,
        signal,
        resolver.clone(),
    );
    if let Err(error) = validator.validate(request) {
        resolver.settle(Err(error));
    }
    async move {
        match receiver.await {
            Ok(Ok(error)) => Ok((key, error)),
            Ok(Err(error)) => Err(FormError::Validator {
                key,
                message: error.to_string(),
            }),
            Err(_) => Err(FormError::Unresolved { key }),
        }
    }
    .boxed_local()
}
