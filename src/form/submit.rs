use std::future::Future;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::cancel::CancellationToken;
use crate::error::BoxError;

/// What a submit action receives.
#[derive(Clone, Debug)]
pub struct SubmitRequest<T> {
    /// `"SubmitRequest/<n>"`.
    pub id: String,
    /// The root value at the time of submission.
    pub value: T,
    /// Cancelled when the caller's signal is.
    pub signal: CancellationToken,
}

impl<T> SubmitRequest<T> {
    pub fn is_aborted(&self) -> bool {
        self.signal.is_cancelled()
    }
}

pub type BoxedSubmitFuture = LocalBoxFuture<'static, Result<(), BoxError>>;

/// The action a [`Form`](super::Form) runs on [`submit`](super::Form::submit).
pub trait SubmitHandler<T>: 'static {
    fn submit(&self, request: SubmitRequest<T>) -> BoxedSubmitFuture;
}

impl<T, F, Fut> SubmitHandler<T> for F
where
    F: Fn(SubmitRequest<T>) -> Fut + 'static,
    Fut: Future<Output = Result<(), BoxError>> + 'static,
{
    fn submit(&self, request: SubmitRequest<T>) -> BoxedSubmitFuture {
        (self)(request).boxed_local()
    }
}
