use std::cell::RefCell;
use std::collections::BTreeSet;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::{self, Either, LocalBoxFuture};

use super::submit::{SubmitHandler, SubmitRequest};
use crate::cancel::CancellationToken;
use crate::dispatch::{Dispatcher, Disposer};
use crate::error::{BoxError, FormError, FormResult};
use crate::field::{FieldNode, FieldOptions, FieldValue};
use crate::id::next_id;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FormSnapshot {
    /// True while at least one submission is in flight.
    pub is_submitting: bool,
    /// Submission attempts since construction or the last reset.
    pub submit_count: u32,
}

#[derive(Default)]
struct SubmitState {
    in_flight: BTreeSet<String>,
    submit_count: u32,
}

impl SubmitState {
    fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            is_submitting: !self.in_flight.is_empty(),
            submit_count: self.submit_count,
        }
    }
}

struct SubmitTracker {
    form_id: String,
    state: RefCell<SubmitState>,
    dispatcher: Rc<Dispatcher<FormSnapshot>>,
}

impl SubmitTracker {
    fn begin(self: &Rc<Self>) -> InFlight {
        let id = next_id("SubmitRequest");
        {
            let mut state = self.state.borrow_mut();
            state.in_flight.insert(id.clone());
            state.submit_count = state.submit_count.saturating_add(1);
        }
        self.refresh();
        InFlight {
            tracker: Rc::downgrade(self),
            id,
        }
    }

    fn finish(&self, id: &str) {
        let removed = self.state.borrow_mut().in_flight.remove(id);
        if removed {
            self.refresh();
        }
    }

    fn reset_count(&self) {
        self.state.borrow_mut().submit_count = 0;
        self.refresh();
    }

    fn in_flight(&self) -> Vec<String> {
        self.state.borrow().in_flight.iter().cloned().collect()
    }

    fn refresh(&self) {
        let next = self.state.borrow().snapshot();
        if *self.dispatcher.latest() != next {
            self.dispatcher.publish(next);
        }
    }
}

/// Keeps a submission id registered until the submission settles or its
/// future is dropped.
struct InFlight {
    tracker: Weak<SubmitTracker>,
    id: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.upgrade() {
            tracing::debug!(form = %tracker.form_id, request = %self.id, "submission settled");
            tracker.finish(&self.id);
        }
    }
}

struct FormInner<T> {
    id: String,
    root: FieldNode<T>,
    handler: Rc<dyn SubmitHandler<T>>,
    tracker: Rc<SubmitTracker>,
}

/// Owns a root field and tracks its submissions.
pub struct Form<T> {
    inner: Rc<FormInner<T>>,
}

impl<T> Clone for Form<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: FieldValue> Form<T> {
    pub fn new(default_value: T, handler: impl SubmitHandler<T>) -> Self {
        Self::with_value(default_value.clone(), default_value, handler)
    }

    pub fn with_value(default_value: T, value: T, handler: impl SubmitHandler<T>) -> Self {
        Self::with_options(default_value, value, handler, FieldOptions::default())
    }

    pub fn with_options(
        default_value: T,
        value: T,
        handler: impl SubmitHandler<T>,
        options: FieldOptions,
    ) -> Self {
        let id = next_id("Form");
        let dispatcher = Dispatcher::new(
            id.clone(),
            options.scheduler.clone(),
            FormSnapshot::default(),
        );
        let tracker = Rc::new(SubmitTracker {
            form_id: id.clone(),
            state: RefCell::new(SubmitState::default()),
            dispatcher,
        });
        Self {
            inner: Rc::new(FormInner {
                id,
                root: FieldNode::with_options(default_value, value, options),
                handler: Rc::new(handler),
                tracker,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn root(&self) -> &FieldNode<T> {
        &self.inner.root
    }

    pub fn snapshot(&self) -> Rc<FormSnapshot> {
        self.inner.tracker.dispatcher.latest()
    }

    pub fn subscribe(&self, listener: impl Fn(&FormSnapshot) + 'static) -> Disposer {
        self.inner.tracker.dispatcher.subscribe(listener)
    }

    pub fn flush(&self) {
        self.inner.tracker.dispatcher.flush();
    }

    /// Ids of the submissions currently in flight.
    pub fn in_flight(&self) -> Vec<String> {
        self.inner.tracker.in_flight()
    }

    /// Submits the root value to the form's handler.
    pub fn submit(&self, signal: Option<&CancellationToken>) -> LocalBoxFuture<'static, FormResult<()>> {
        let handler = self.inner.handler.clone();
        self.submit_with(move |request| handler.submit(request), signal)
    }

    /// Submits the root value to `action` instead of the form's handler.
    ///
    /// The submission is registered before this returns, and the action is
    /// started right away unless `signal` is already cancelled. The returned
    /// future fails with [`FormError::Aborted`] once `signal` fires.
    pub fn submit_with<R, F, Fut>(
        &self,
        action: F,
        signal: Option<&CancellationToken>,
    ) -> LocalBoxFuture<'static, FormResult<R>>
    where
        R: 'static,
        F: FnOnce(SubmitRequest<T>) -> Fut,
        Fut: Future<Output = Result<R, BoxError>> + 'static,
    {
        let guard = self.inner.tracker.begin();
        let signal = signal.map_or_else(CancellationToken::new, CancellationToken::child_token);
        if signal.is_cancelled() {
            drop(guard);
            return future::ready(Err(FormError::Aborted)).boxed_local();
        }

        let request = SubmitRequest {
            id: guard.id.clone(),
            value: self.inner.root.value(),
            signal: signal.clone(),
        };
        let work = action(request).boxed_local();
        async move {
            let _guard = guard;
            match future::select(signal.cancelled().boxed_local(), work).await {
                Either::Left(_) => Err(FormError::Aborted),
                Either::Right((result, _)) => result.map_err(|error| FormError::Submit {
                    message: error.to_string(),
                }),
            }
        }
        .boxed_local()
    }

    /// Optionally installs a new default, resets the root field and zeroes
    /// the submit count.
    pub fn reset(&self, default_value: Option<T>) {
        if let Some(default_value) = default_value {
            self.inner.root.set_default_value(default_value);
        }
        self.inner.root.reset();
        self.inner.tracker.reset_count();
    }
}
