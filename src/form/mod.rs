mod controller;
mod submit;

#[cfg(test)]
mod tests;

pub use controller::{Form, FormSnapshot};
pub use submit::{BoxedSubmitFuture, SubmitHandler, SubmitRequest};
