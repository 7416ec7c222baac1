use super::errors::Errors;

/// Immutable view of a field's state. A new snapshot is built for every
/// observable change, so `Rc::ptr_eq` on two snapshots tells whether anything
/// changed in between.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<T> {
    pub default_value: T,
    pub value: T,
    pub is_dirty: bool,
    pub is_touched: bool,
    pub errors: Errors,
    pub is_pending: bool,
}

impl<T> Snapshot<T> {
    pub fn is_valid(&self) -> bool {
        !self.errors.has_errors()
    }
}
