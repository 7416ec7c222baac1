use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use crate::scheduler::Scheduler;

type DisposeFn = Box<dyn FnOnce()>;

/// Releases a subscription, a validator registration or a connection.
///
/// Disposing twice is a no-op. Dropping a `Disposer` without calling
/// [`dispose`](Disposer::dispose) keeps the resource alive.
#[must_use = "dropping a disposer leaks the registration it guards"]
pub struct Disposer {
    dispose: RefCell<Option<DisposeFn>>,
}

impl Disposer {
    pub(crate) fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: RefCell::new(Some(Box::new(dispose))),
        }
    }

    pub fn dispose(&self) {
        let dispose = self.dispose.borrow_mut().take();
        if let Some(dispose) = dispose {
            dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.dispose.borrow().is_none()
    }
}

impl Debug for Disposer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

type Listener<S> = Rc<dyn Fn(&S)>;

/// Latest-value holder whose observers are notified at most once per
/// scheduler turn, always with the most recent value.
pub(crate) struct Dispatcher<S> {
    label: String,
    scheduler: Rc<dyn Scheduler>,
    latest: RefCell<Rc<S>>,
    listeners: RefCell<Vec<(u64, Listener<S>)>>,
    next_listener: Cell<u64>,
    scheduled: Cell<bool>,
}

impl<S: 'static> Dispatcher<S> {
    pub(crate) fn new(label: String, scheduler: Rc<dyn Scheduler>, initial: S) -> Rc<Self> {
        Rc::new(Self {
            label,
            scheduler,
            latest: RefCell::new(Rc::new(initial)),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            scheduled: Cell::new(false),
        })
    }

    pub(crate) fn latest(&self) -> Rc<S> {
        self.latest.borrow().clone()
    }

    pub(crate) fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.scheduler.clone()
    }

    pub(crate) fn publish(self: &Rc<Self>, next: S) -> Rc<S> {
        let next = Rc::new(next);
        *self.latest.borrow_mut() = next.clone();
        if !self.scheduled.replace(true) {
            let weak = Rc::downgrade(self);
            self.scheduler.schedule(Box::new(move || {
                if let Some(dispatcher) = weak.upgrade() {
                    dispatcher.deliver();
                }
            }));
        }
        next
    }

    /// Replaces the latest value without notifying anyone.
    pub(crate) fn seed(&self, value: S) {
        *self.latest.borrow_mut() = Rc::new(value);
    }

    /// Delivers a pending notification now instead of waiting for the
    /// scheduler. Does nothing when no notification is pending.
    pub(crate) fn flush(&self) {
        self.deliver();
    }

    fn deliver(&self) {
        if !self.scheduled.replace(false) {
            return;
        }
        let latest = self.latest();
        let listeners = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect::<Vec<_>>();
        tracing::trace!(source = %self.label, listeners = listeners.len(), "dispatching change");
        for listener in listeners {
            listener(&latest);
        }
    }

    pub(crate) fn subscribe(self: &Rc<Self>, listener: impl Fn(&S) + 'static) -> Disposer {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        let weak = Rc::downgrade(self);
        Disposer::new(move || {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher
                    .listeners
                    .borrow_mut()
                    .retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskQueue;

    fn dispatcher(queue: &Rc<TaskQueue>) -> Rc<Dispatcher<u32>> {
        Dispatcher::new("test".into(), queue.clone(), 0)
    }

    #[test]
    fn publishes_are_coalesced_into_one_delivery() {
        let queue = Rc::new(TaskQueue::new());
        let dispatcher = dispatcher(&queue);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = dispatcher.subscribe(move |value| sink.borrow_mut().push(*value));

        dispatcher.publish(1);
        dispatcher.publish(2);
        dispatcher.publish(3);
        assert!(seen.borrow().is_empty());
        assert_eq!(queue.len(), 1);

        queue.run_until_idle();
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn flush_delivers_synchronously_once() {
        let queue = Rc::new(TaskQueue::new());
        let dispatcher = dispatcher(&queue);
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let _subscription = dispatcher.subscribe(move |_| counter.set(counter.get() + 1));

        dispatcher.publish(7);
        dispatcher.flush();
        assert_eq!(seen.get(), 1);
        queue.run_until_idle();
        assert_eq!(seen.get(), 1);
        dispatcher.flush();
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn disposed_listener_is_not_called() {
        let queue = Rc::new(TaskQueue::new());
        let dispatcher = dispatcher(&queue);
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let subscription = dispatcher.subscribe(move |_| counter.set(counter.get() + 1));
        subscription.dispose();
        subscription.dispose();
        assert!(subscription.is_disposed());
        assert_eq!(dispatcher.listener_count(), 0);

        dispatcher.publish(1);
        queue.run_until_idle();
        assert_eq!(seen.get(), 0);
    }
}
