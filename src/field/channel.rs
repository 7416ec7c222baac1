//! Contracts between a child field and the slot its parent reserved for it.
//!
//! A child only ever talks to its parent through a [`ParentChannel`], and a
//! parent only ever talks to an attached child through the [`ChildChannel`]
//! the child handed over when connecting. Either side can be replaced by a
//! test double.

use std::rc::Rc;

use futures::future::LocalBoxFuture;

use super::errors::Errors;
use crate::cancel::CancellationToken;
use crate::error::FormResult;

/// Calls a child makes outward, into its parent.
pub trait ParentChannel<C> {
    /// Registers `child` in this slot. Fails with
    /// [`FormError::DuplicateChild`](crate::FormError::DuplicateChild) if the
    /// slot already holds a live child.
    fn attach(&self, child: Rc<dyn ChildChannel<C>>) -> FormResult<()>;

    /// Removes the attached child and every contribution it made to the
    /// parent's derived state.
    fn detach(&self);

    fn set_default_value(&self, value: C);
    fn set_value(&self, value: C);
    fn set_touched(&self, touched: bool);
    fn set_dirty(&self, dirty: bool);
    fn set_errors(&self, errors: Errors);
    fn set_pending(&self, pending: bool);
}

/// Calls a parent makes inward, into an attached child.
pub trait ChildChannel<C> {
    fn push_default_value(&self, value: C);
    fn push_value(&self, value: C);
    fn reset(&self);
    fn validate(&self);
    fn validate_once(
        &self,
        value: C,
        signal: CancellationToken,
    ) -> LocalBoxFuture<'static, FormResult<Errors>>;
}
