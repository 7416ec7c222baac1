use std::cell::Cell;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::rc::Rc;

use futures::task::{LocalSpawn, LocalSpawnExt};

use super::errors::ErrorValue;
use crate::cancel::CancellationToken;
use crate::error::BoxError;

/// Computes the error for a field value.
///
/// A validator settles its request through [`ValidationRequest::resolve`],
/// [`ValidationRequest::resolve_valid`] or [`ValidationRequest::reject`],
/// either before returning or later. Returning `Err` is equivalent to
/// rejecting the request.
pub trait Validator<T>: 'static {
    fn validate(&self, request: ValidationRequest<T>) -> Result<(), BoxError>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(ValidationRequest<T>) -> Result<(), BoxError> + 'static,
{
    fn validate(&self, request: ValidationRequest<T>) -> Result<(), BoxError> {
        (self)(request)
    }
}

pub(crate) type Settlement = Result<Option<ErrorValue>, BoxError>;

/// Single-use completion slot shared by every clone of a request.
pub(crate) struct Resolver {
    settled: Cell<bool>,
    sink: Box<dyn Fn(Settlement)>,
}

impl Resolver {
    pub(crate) fn new(sink: impl Fn(Settlement) + 'static) -> Rc<Self> {
        Rc::new(Self {
            settled: Cell::new(false),
            sink: Box::new(sink),
        })
    }

    pub(crate) fn settle(&self, outcome: Settlement) {
        if self.settled.replace(true) {
            return;
        }
        (self.sink)(outcome);
    }
}

pub struct ValidationRequest<T> {
    id: Rc<str>,
    onetime: bool,
    value: T,
    signal: CancellationToken,
    resolver: Rc<Resolver>,
}

impl<T> ValidationRequest<T> {
    pub(crate) fn new(
        id: String,
        onetime: bool,
        value: T,
        signal: CancellationToken,
        resolver: Rc<Resolver>,
    ) -> Self {
        Self {
            id: id.into(),
            onetime,
            value,
            signal,
            resolver,
        }
    }

    /// `"ValidationRequest/<n>"`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// True for requests issued by `validate_once` rather than by a
    /// registered validator run.
    pub fn is_onetime(&self) -> bool {
        self.onetime
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn signal(&self) -> &CancellationToken {
        &self.signal
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub fn is_settled(&self) -> bool {
        self.resolver.settled.get()
    }

    pub fn resolve(&self, error: impl Into<ErrorValue>) {
        self.resolver.settle(Ok(Some(error.into())));
    }

    pub fn resolve_valid(&self) {
        self.resolver.settle(Ok(None));
    }

    pub fn reject(&self, error: impl Into<BoxError>) {
        self.resolver.settle(Err(error.into()));
    }
}

impl<T: Clone> Clone for ValidationRequest<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            onetime: self.onetime,
            value: self.value.clone(),
            signal: self.signal.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<T: Debug> Debug for ValidationRequest<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationRequest")
            .field("id", &self.id)
            .field("onetime", &self.onetime)
            .field("value", &self.value)
            .field("aborted", &self.is_aborted())
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Wraps a synchronous check. `None` means the value is valid.
pub fn from_fn<T, E, F>(check: F) -> impl Validator<T>
where
    T: 'static,
    E: Into<ErrorValue>,
    F: Fn(&T) -> Option<E> + 'static,
{
    move |request: ValidationRequest<T>| -> Result<(), BoxError> {
        match check(request.value()) {
            Some(error) => request.resolve(error),
            None => request.resolve_valid(),
        }
        Ok(())
    }
}

/// Wraps an asynchronous check that runs on `spawner`. The future receives
/// the value and the request's signal; its output settles the request.
pub fn from_future<T, S, F, Fut>(spawner: S, check: F) -> impl Validator<T>
where
    T: Clone + 'static,
    S: LocalSpawn + 'static,
    F: Fn(T, CancellationToken) -> Fut + 'static,
    Fut: Future<Output = Result<Option<ErrorValue>, BoxError>> + 'static,
{
    move |request: ValidationRequest<T>| -> Result<(), BoxError> {
        let work = check(request.value().clone(), request.signal().clone());
        spawner.spawn_local(async move {
            match work.await {
                Ok(Some(error)) => request.resolve(error),
                Ok(None) => request.resolve_valid(),
                Err(error) => request.reject(error),
            }
        })?;
        Ok(())
    }
}
