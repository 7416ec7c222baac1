//! Fields holding a `Vec`, with one child per item.
//!
//! Every item child gets a durable slot number when it is created. The
//! parent files the child's flags and errors under that slot and resolves
//! the slot to the child's current index whenever it needs one, so a child
//! keeps its identity (and its state) while structural edits move it around.
//! Replacing the whole value discards every child and builds fresh ones.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use futures::FutureExt;

use super::channel::{ChildChannel, ParentChannel};
use super::engine::{ChildState, ChildValidation, FieldOptions, FieldValue, Node, NodeKind, Slot};
use super::errors::{ErrorKey, Errors};
use super::handle::Field;
use super::node::FieldNode;
use crate::cancel::CancellationToken;
use crate::dispatch::{Dispatcher, Disposer};
use crate::error::{FormError, FormResult};
use crate::id::next_sequence;
use crate::scheduler::Scheduler;

pub type FieldArray<E> = Field<Vec<E>, ListChildren<E>>;

type ListNode<E> = Node<Vec<E>, ListChildren<E>>;

#[derive(Clone)]
struct ListEntry<E> {
    slot: u64,
    field: FieldNode<E>,
}

/// Item children of a [`FieldArray`].
pub struct ListChildren<E> {
    owner: Weak<ListNode<E>>,
    path: String,
    scheduler: Rc<dyn Scheduler>,
    entries: RefCell<Vec<ListEntry<E>>>,
    positions: RefCell<HashMap<u64, usize>>,
    attached: RefCell<HashMap<u64, Rc<dyn ChildChannel<E>>>>,
    fields: Rc<Dispatcher<Vec<FieldNode<E>>>>,
}

impl<E: FieldValue> ListChildren<E> {
    fn new(owner: &Weak<ListNode<E>>, options: &FieldOptions) -> Self {
        let label = format!("{}[fields]", options.path);
        Self {
            owner: owner.clone(),
            path: options.path.clone(),
            scheduler: options.scheduler.clone(),
            entries: RefCell::new(Vec::new()),
            positions: RefCell::new(HashMap::new()),
            attached: RefCell::new(HashMap::new()),
            fields: Dispatcher::new(label, options.scheduler.clone(), Vec::new()),
        }
    }

    /// Builds an unconnected child for an item at `index`. Its default is
    /// the list default at that index, or the item itself past the end.
    fn spawn_entry(&self, index: usize, value: E, defaults: &[E]) -> ListEntry<E> {
        let slot = next_sequence();
        let default_value = defaults.get(index).cloned().unwrap_or_else(|| value.clone());
        let channel = Rc::new(ListSlot {
            list: self.owner.clone(),
            slot,
        });
        let options = FieldOptions {
            path: format!("{}[{slot}]", self.path),
            scheduler: self.scheduler.clone(),
        };
        ListEntry {
            slot,
            field: FieldNode::with_parent(default_value, value, channel, options),
        }
    }

    fn reindex(&self) {
        let entries = self.entries.borrow();
        let mut positions = self.positions.borrow_mut();
        positions.clear();
        for (index, entry) in entries.iter().enumerate() {
            positions.insert(entry.slot, index);
        }
    }

    fn index_of(&self, slot: u64) -> Option<usize> {
        self.positions.borrow().get(&slot).copied()
    }

    fn attached_children(&self) -> Vec<(usize, Rc<dyn ChildChannel<E>>)> {
        let attached = self.attached.borrow();
        self.entries
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                attached
                    .get(&entry.slot)
                    .map(|child| (index, child.clone()))
            })
            .collect()
    }

    fn current_fields(&self) -> Vec<FieldNode<E>> {
        self.entries
            .borrow()
            .iter()
            .map(|entry| entry.field.clone())
            .collect()
    }

    fn connect_pending(&self) {
        let pending = self
            .current_fields()
            .into_iter()
            .filter(|field| !field.is_connected())
            .collect::<Vec<_>>();
        for field in pending {
            if let Err(error) = field.node.connect() {
                tracing::warn!(list = %self.path, field = %field.id(), %error, "failed to connect list item");
            }
        }
    }

    fn release(&self, entry: &ListEntry<E>) {
        if let Err(error) = entry.field.disconnect() {
            tracing::warn!(list = %self.path, field = %entry.field.id(), %error, "failed to disconnect list item");
        }
    }

    fn publish_fields(&self) {
        self.fields.publish(self.current_fields());
    }
}

impl<E: FieldValue> NodeKind<Vec<E>> for ListChildren<E> {
    fn before_replace(&self, value: &Vec<E>, default_value: &Vec<E>) {
        let previous = std::mem::take(&mut *self.entries.borrow_mut());
        for entry in &previous {
            self.release(entry);
        }
        let next = value
            .iter()
            .enumerate()
            .map(|(index, item)| self.spawn_entry(index, item.clone(), default_value))
            .collect::<Vec<_>>();
        *self.entries.borrow_mut() = next;
        self.reindex();
        tracing::debug!(
            list = %self.path,
            discarded = previous.len(),
            created = value.len(),
            "rebuilt list children"
        );
    }

    fn after_replace(&self) {
        self.connect_pending();
        self.publish_fields();
    }

    fn push_default_value(&self, value: &Vec<E>) {
        for (index, child) in self.attached_children() {
            if let Some(item) = value.get(index) {
                child.push_default_value(item.clone());
            }
        }
    }

    fn push_value(&self, value: &Vec<E>) {
        for (index, child) in self.attached_children() {
            if let Some(item) = value.get(index) {
                child.push_value(item.clone());
            }
        }
    }

    fn reset_children(&self) {
        for (_, child) in self.attached_children() {
            child.reset();
        }
    }

    fn validate_children(&self) {
        for (_, child) in self.attached_children() {
            child.validate();
        }
    }

    fn validate_children_once(
        &self,
        value: &Vec<E>,
        signal: &CancellationToken,
    ) -> Vec<ChildValidation> {
        self.attached_children()
            .into_iter()
            .filter_map(|(index, child)| {
                let item = value.get(index)?.clone();
                let pending = child.validate_once(item, signal.clone());
                Some(async move { Ok((ErrorKey::Index(index), pending.await?)) }.boxed_local())
            })
            .collect()
    }

    fn error_key(&self, slot: &Slot) -> Option<ErrorKey> {
        match slot {
            Slot::Item(slot) => self.index_of(*slot).map(ErrorKey::Index),
            Slot::Named(_) => None,
        }
    }

    fn flush(&self) {
        self.fields.flush();
    }
}

/// The slot a list reserves for one item child. The index is looked up on
/// every call since edits move the child.
struct ListSlot<E> {
    list: Weak<ListNode<E>>,
    slot: u64,
}

impl<E: FieldValue> ListSlot<E> {
    fn update(&self, update: impl FnOnce(&mut ChildState)) {
        if let Some(list) = self.list.upgrade() {
            list.update_child(&Slot::Item(self.slot), update);
        }
    }
}

impl<E: FieldValue> ParentChannel<E> for ListSlot<E> {
    fn attach(&self, child: Rc<dyn ChildChannel<E>>) -> FormResult<()> {
        let list = self.list.upgrade().ok_or(FormError::ParentDropped)?;
        {
            let mut attached = list.kind.attached.borrow_mut();
            if attached.contains_key(&self.slot) {
                return Err(FormError::DuplicateChild {
                    key: format!("#{}", self.slot),
                });
            }
            attached.insert(self.slot, child);
        }
        list.attach_child(Slot::Item(self.slot));
        Ok(())
    }

    fn detach(&self) {
        let Some(list) = self.list.upgrade() else {
            return;
        };
        list.kind.attached.borrow_mut().remove(&self.slot);
        list.detach_child(&Slot::Item(self.slot));
    }

    fn set_default_value(&self, value: E) {
        let Some(list) = self.list.upgrade() else {
            return;
        };
        let Some(index) = list.kind.index_of(self.slot) else {
            return;
        };
        let mut next = list.default_value();
        match next.get_mut(index) {
            Some(item) if *item != value => *item = value,
            _ => return,
        }
        list.set_default_value(next);
    }

    fn set_value(&self, value: E) {
        let Some(list) = self.list.upgrade() else {
            return;
        };
        let Some(index) = list.kind.index_of(self.slot) else {
            return;
        };
        let mut next = list.value();
        match next.get_mut(index) {
            Some(item) if *item != value => *item = value,
            _ => return,
        }
        list.commit_value(next);
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

fn out_of_range(operation: &'static str, argument: &'static str, index: usize, len: usize) -> FormError {
    FormError::IndexOutOfRange {
        operation,
        argument,
        index,
        len,
    }
}

impl<E: FieldValue> Field<Vec<E>, ListChildren<E>> {
    pub fn new(default_value: Vec<E>) -> Self {
        Self::with_value(default_value.clone(), default_value)
    }

    pub fn with_value(default_value: Vec<E>, value: Vec<E>) -> Self {
        Self::with_options(default_value, value, FieldOptions::default())
    }

    pub fn with_options(default_value: Vec<E>, value: Vec<E>, options: FieldOptions) -> Self {
        Self::build(default_value, value, None, options)
    }

    pub fn with_parent(
        default_value: Vec<E>,
        value: Vec<E>,
        parent: Rc<dyn ParentChannel<Vec<E>>>,
        options: FieldOptions,
    ) -> Self {
        Self::build(default_value, value, Some(parent), options)
    }

    fn build(
        default_value: Vec<E>,
        value: Vec<E>,
        parent: Option<Rc<dyn ParentChannel<Vec<E>>>>,
        options: FieldOptions,
    ) -> Self {
        let node = Node::new(
            "FieldArray",
            default_value.clone(),
            value.clone(),
            parent,
            options,
            ListChildren::new,
        );
        node.kind.before_replace(&value, &default_value);
        node.kind.connect_pending();
        node.kind.fields.seed(node.kind.current_fields());
        Field::from_node(node)
    }

    pub fn len(&self) -> usize {
        self.node.kind.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current item children, in order.
    pub fn fields(&self) -> Vec<FieldNode<E>> {
        self.node.kind.current_fields()
    }

    pub fn field_at(&self, index: usize) -> Option<FieldNode<E>> {
        self.node
            .kind
            .entries
            .borrow()
            .get(index)
            .map(|entry| entry.field.clone())
    }

    /// Durable slot number of the child currently at `index`.
    pub fn slot_at(&self, index: usize) -> Option<u64> {
        self.node
            .kind
            .entries
            .borrow()
            .get(index)
            .map(|entry| entry.slot)
    }

    pub fn index_of_slot(&self, slot: u64) -> Option<usize> {
        self.node.kind.index_of(slot)
    }

    /// Registers `listener` for changes to the list of item children.
    pub fn subscribe_fields(&self, listener: impl Fn(&[FieldNode<E>]) + 'static) -> Disposer {
        self.node
            .kind
            .fields
            .subscribe(move |fields: &Vec<FieldNode<E>>| listener(fields))
    }

    pub fn append(&self, item: E) {
        self.insert_at(self.len(), item);
    }

    pub fn prepend(&self, item: E) {
        self.insert_at(0, item);
    }

    pub fn insert(&self, index: usize, item: E) -> FormResult<()> {
        let len = self.len();
        if index > len {
            return Err(out_of_range("insert", "index", index, len));
        }
        self.insert_at(index, item);
        Ok(())
    }

    pub fn remove(&self, index: usize) -> FormResult<E> {
        let mut next = self.value();
        let len = next.len();
        if index >= len {
            return Err(out_of_range("remove", "index", index, len));
        }
        let removed = next.remove(index);
        let entry = self.node.kind.entries.borrow_mut().remove(index);
        self.node.kind.reindex();
        self.node.kind.release(&entry);
        self.apply_edit(next);
        Ok(removed)
    }

    /// Moves the item at `from` so that it ends up at `to`.
    pub fn move_item(&self, from: usize, to: usize) -> FormResult<()> {
        let mut next = self.value();
        let len = next.len();
        if from >= len {
            return Err(out_of_range("move", "from", from, len));
        }
        if to >= len {
            return Err(out_of_range("move", "to", to, len));
        }
        if from == to {
            return Ok(());
        }
        let item = next.remove(from);
        next.insert(to, item);
        {
            let mut entries = self.node.kind.entries.borrow_mut();
            let entry = entries.remove(from);
            entries.insert(to, entry);
        }
        self.node.kind.reindex();
        self.apply_edit(next);
        Ok(())
    }

    pub fn swap(&self, a: usize, b: usize) -> FormResult<()> {
        let mut next = self.value();
        let len = next.len();
        if a >= len {
            return Err(out_of_range("swap", "a", a, len));
        }
        if b >= len {
            return Err(out_of_range("swap", "b", b, len));
        }
        if a == b {
            return Ok(());
        }
        next.swap(a, b);
        self.node.kind.entries.borrow_mut().swap(a, b);
        self.node.kind.reindex();
        self.apply_edit(next);
        Ok(())
    }

    fn insert_at(&self, index: usize, item: E) {
        let mut next = self.value();
        next.insert(index, item.clone());
        let entry = self
            .node
            .kind
            .spawn_entry(index, item, &self.default_value());
        self.node.kind.entries.borrow_mut().insert(index, entry);
        self.node.kind.reindex();
        self.apply_edit(next);
    }

    fn apply_edit(&self, next: Vec<E>) {
        // Reordering equal items leaves the value unchanged, but validators
        // still see every structural edit.
        if !self.node.commit_value(next) {
            self.node.run_validators();
        }
        self.node.kind.connect_pending();
        self.node.set_dirty();
        // Error keys are indices, so a pure reorder still needs a rebuild.
        self.node.refresh();
        self.node.kind.publish_fields();
    }
}
