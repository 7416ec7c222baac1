//! Cancellation signal shared by validation and submit requests.
//!
//! Wraps `tokio_util`'s token, whose `cancelled()` future only relies on
//! `tokio::sync` primitives and can be awaited on any executor, and adds
//! synchronous `on_cancel` callbacks on top.

use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

use tokio_util::sync::WaitForCancellationFuture;

type CancelCallback = Box<dyn FnOnce()>;

#[derive(Default)]
struct Hooks {
    callbacks: RefCell<Vec<CancelCallback>>,
    children: RefCell<Vec<Weak<Hooks>>>,
}

impl Hooks {
    fn fire(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for callback in callbacks {
            callback();
        }
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire();
        }
    }
}

/// Cancellation signal. Clones share state; cancelling is one-way.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
    hooks: Rc<Hooks>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Cancels the token and every child, then runs the registered callbacks
    /// in registration order, parents before children.
    pub fn cancel(&self) {
        self.inner.cancel();
        self.hooks.fire();
    }

    /// Runs `callback` once the token is cancelled, or right away if it
    /// already is.
    pub fn on_cancel(&self, callback: impl FnOnce() + 'static) {
        if self.is_cancelled() {
            callback();
            return;
        }
        self.hooks.callbacks.borrow_mut().push(Box::new(callback));
    }

    /// Creates a token that is cancelled whenever `self` is, but can also be
    /// cancelled on its own without affecting `self`.
    pub fn child_token(&self) -> CancellationToken {
        let child = CancellationToken {
            inner: self.inner.child_token(),
            hooks: Rc::default(),
        };
        let mut children = self.hooks.children.borrow_mut();
        children.retain(|hooks| hooks.strong_count() > 0);
        children.push(Rc::downgrade(&child.hooks));
        child
    }

    /// Future that completes once the token is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancelled()
    }
}

impl Debug for CancellationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use futures::executor::block_on;
    use std::cell::Cell;

    #[test]
    fn callbacks_run_once_in_order() {
        let token = CancellationToken::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for label in ["first", "second"] {
            let log = log.clone();
            token.on_cancel(move || log.borrow_mut().push(label));
        }
        token.cancel();
        token.cancel();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn registering_on_cancelled_token_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        token.on_cancel(move || flag.set(true));
        assert!(hit.get());
    }

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let sibling = parent.child_token();
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        sibling.on_cancel(move || flag.set(true));

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(!sibling.is_cancelled());

        parent.cancel();
        assert!(sibling.is_cancelled());
        assert!(fired.get());
    }

    #[test]
    fn child_of_cancelled_token_starts_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel();
        assert!(parent.child_token().is_cancelled());
    }

    #[test]
    fn dropped_children_are_pruned() {
        let parent = CancellationToken::new();
        drop(parent.child_token());
        let _kept = parent.child_token();
        assert_eq!(parent.hooks.children.borrow().len(), 1);
    }

    #[test]
    fn cancelled_future_completes_without_a_runtime() {
        let token = CancellationToken::new();
        let mut waiting = token.cancelled().boxed();
        assert!((&mut waiting).now_or_never().is_none());
        token.cancel();
        block_on(waiting);
    }
}
