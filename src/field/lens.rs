use std::fmt::{Display, Formatter};

/// Name of a property of a keyed field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Addresses one property of a parent value: the key the child is stored and
/// reported under, plus a getter and a setter.
pub trait FieldLens<T>: Copy + 'static {
    type Value: Clone + PartialEq + 'static;

    fn key(self) -> FieldKey;
    fn get<'a>(self, model: &'a T) -> &'a Self::Value;
    fn set(self, model: &mut T, value: Self::Value);
}

/// Implemented by `#[derive(FormModel)]`; `fields()` hands out the generated
/// lenses.
pub trait FormModel: Clone + PartialEq + 'static {
    type Fields;

    fn fields() -> Self::Fields;
}
