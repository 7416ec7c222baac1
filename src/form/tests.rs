use super::*;
use crate::cancel::CancellationToken;
use crate::error::{BoxError, FormError};
use crate::field::{Errors, FieldOptions};
use crate::scheduler::TaskQueue;
use futures::channel::oneshot;
use futures::executor::block_on;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn options(queue: &Rc<TaskQueue>) -> FieldOptions {
    FieldOptions::default().with_scheduler(queue.clone())
}

fn recording_form(queue: &Rc<TaskQueue>) -> (Form<i32>, Rc<RefCell<Vec<i32>>>) {
    let submitted = Rc::new(RefCell::new(Vec::new()));
    let sink = submitted.clone();
    let form = Form::with_options(
        0,
        7,
        move |request: SubmitRequest<i32>| {
            sink.borrow_mut().push(request.value);
            async { Ok::<(), BoxError>(()) }
        },
        options(queue),
    );
    (form, submitted)
}

#[test]
fn successful_submit_hands_over_the_root_value() {
    let queue = Rc::new(TaskQueue::new());
    let (form, submitted) = recording_form(&queue);
    assert!(form.id().starts_with("Form/"));

    assert_eq!(block_on(form.submit(None)), Ok(()));
    assert_eq!(*submitted.borrow(), vec![7]);
    assert_eq!(
        *form.snapshot(),
        FormSnapshot {
            is_submitting: false,
            submit_count: 1,
        }
    );
    assert!(form.in_flight().is_empty());
}

#[test]
fn pending_submissions_are_tracked_until_they_settle() {
    let queue = Rc::new(TaskQueue::new());
    let (form, _) = recording_form(&queue);
    let (first_tx, first_rx) = oneshot::channel::<&'static str>();
    let (second_tx, second_rx) = oneshot::channel::<&'static str>();

    let first = form.submit_with(
        |request| async move {
            assert!(request.id.starts_with("SubmitRequest/"));
            first_rx.await.map_err(BoxError::from)
        },
        None,
    );
    let second = form.submit_with(|_| async move { second_rx.await.map_err(BoxError::from) }, None);
    assert!(form.snapshot().is_submitting);
    assert_eq!(form.snapshot().submit_count, 2);
    assert_eq!(form.in_flight().len(), 2);

    first_tx.send("saved").unwrap();
    assert_eq!(block_on(first), Ok("saved"));
    assert!(form.snapshot().is_submitting);
    assert_eq!(form.in_flight().len(), 1);

    second_tx.send("saved again").unwrap();
    assert_eq!(block_on(second), Ok("saved again"));
    assert!(!form.snapshot().is_submitting);
}

#[test]
fn failed_action_surfaces_as_submit_error() {
    let queue = Rc::new(TaskQueue::new());
    let form = Form::with_options(
        0,
        0,
        |_: SubmitRequest<i32>| async { Err::<(), BoxError>("server unavailable".into()) },
        options(&queue),
    );

    assert_eq!(
        block_on(form.submit(None)),
        Err(FormError::Submit {
            message: "server unavailable".into()
        })
    );
    assert_eq!(form.snapshot().submit_count, 1);
    assert!(!form.snapshot().is_submitting);
}

#[test]
fn cancelling_the_caller_signal_aborts_the_submission() {
    let queue = Rc::new(TaskQueue::new());
    let (form, _) = recording_form(&queue);
    let (_keep_open, never) = oneshot::channel::<()>();
    let seen_signal = Rc::new(RefCell::new(None));
    let capture = seen_signal.clone();

    let controller = CancellationToken::new();
    let pending = form.submit_with(
        move |request: SubmitRequest<i32>| {
            *capture.borrow_mut() = Some(request.signal.clone());
            async move { never.await.map_err(BoxError::from) }
        },
        Some(&controller),
    );
    assert!(form.snapshot().is_submitting);

    controller.cancel();
    assert_eq!(block_on(pending), Err(FormError::Aborted));
    assert!(seen_signal.borrow().as_ref().unwrap().is_cancelled());
    assert!(!form.snapshot().is_submitting);
    assert_eq!(form.snapshot().submit_count, 1);
}

#[test]
fn pre_cancelled_submission_skips_the_action() {
    let queue = Rc::new(TaskQueue::new());
    let (form, submitted) = recording_form(&queue);
    let controller = CancellationToken::new();
    controller.cancel();

    let result = block_on(form.submit(Some(&controller)));
    assert!(result.unwrap_err().is_aborted());
    assert!(submitted.borrow().is_empty());
    assert_eq!(form.snapshot().submit_count, 1);
    assert!(!form.snapshot().is_submitting);
}

#[test]
fn dropping_the_future_releases_the_submission() {
    let queue = Rc::new(TaskQueue::new());
    let (form, _) = recording_form(&queue);
    let (_keep_open, never) = oneshot::channel::<()>();

    let pending = form.submit_with(|_| async move { never.await.map_err(BoxError::from) }, None);
    assert!(form.snapshot().is_submitting);
    drop(pending);
    assert!(!form.snapshot().is_submitting);
    assert!(form.in_flight().is_empty());
}

#[test]
fn reset_restores_root_and_zeroes_submit_count() {
    let queue = Rc::new(TaskQueue::new());
    let (form, _) = recording_form(&queue);
    block_on(form.submit(None)).unwrap();
    form.root().set_touched();
    form.root().set_custom_errors(Errors::from_iter([("server", "rejected")]));

    form.reset(Some(3));
    let root = form.root().snapshot();
    assert_eq!(root.default_value, 3);
    assert_eq!(root.value, 3);
    assert!(!root.is_touched);
    assert!(root.errors.is_empty());
    assert_eq!(form.snapshot().submit_count, 0);

    form.root().set_value(5);
    form.reset(None);
    assert_eq!(form.root().value(), 3);
}

#[test]
fn form_notifications_are_coalesced() {
    let queue = Rc::new(TaskQueue::new());
    let (form, _) = recording_form(&queue);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = form.subscribe(move |snapshot| sink.borrow_mut().push(*snapshot));
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let _root_subscription = form.root().subscribe(move |_| counter.set(counter.get() + 1));

    block_on(form.submit(None)).unwrap();
    block_on(form.submit(None)).unwrap();
    queue.run_until_idle();
    assert_eq!(
        *seen.borrow(),
        vec![FormSnapshot {
            is_submitting: false,
            submit_count: 2,
        }]
    );
    assert_eq!(calls.get(), 0);
}
