use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt::{Display, Formatter};

use super::lens::FieldKey;

/// Key of an error entry: a validator key, a custom key, a property name or
/// the current index of a list child.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorKey {
    Name(String),
    Index(usize),
}

impl Display for ErrorKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKey::Name(name) => f.write_str(name),
            ErrorKey::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for ErrorKey {
    fn from(value: &str) -> Self {
        ErrorKey::Name(value.to_owned())
    }
}

impl From<String> for ErrorKey {
    fn from(value: String) -> Self {
        ErrorKey::Name(value)
    }
}

impl From<usize> for ErrorKey {
    fn from(value: usize) -> Self {
        ErrorKey::Index(value)
    }
}

impl From<FieldKey> for ErrorKey {
    fn from(value: FieldKey) -> Self {
        ErrorKey::Name(value.as_str().to_owned())
    }
}

/// Opaque error payload. The engine only distinguishes present from absent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorValue {
    Flag(bool),
    Message(String),
    Nested(Errors),
}

impl ErrorValue {
    /// `false`, an empty message and a nested map without present entries
    /// all mean "no error".
    pub fn is_present(&self) -> bool {
        match self {
            ErrorValue::Flag(flag) => *flag,
            ErrorValue::Message(message) => !message.is_empty(),
            ErrorValue::Nested(errors) => errors.has_errors(),
        }
    }
}

impl From<bool> for ErrorValue {
    fn from(value: bool) -> Self {
        ErrorValue::Flag(value)
    }
}

impl From<&str> for ErrorValue {
    fn from(value: &str) -> Self {
        ErrorValue::Message(value.to_owned())
    }
}

impl From<String> for ErrorValue {
    fn from(value: String) -> Self {
        ErrorValue::Message(value)
    }
}

impl From<Errors> for ErrorValue {
    fn from(value: Errors) -> Self {
        ErrorValue::Nested(value)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Errors(BTreeMap<ErrorKey, ErrorValue>);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the three error layers of a field. Later layers override
    /// earlier ones key by key.
    pub fn layered(children: &Errors, validation: &Errors, custom: &Errors) -> Errors {
        let mut merged = children.clone();
        merged.extend_from(validation);
        merged.extend_from(custom);
        merged
    }

    pub fn insert(
        &mut self,
        key: impl Into<ErrorKey>,
        value: impl Into<ErrorValue>,
    ) -> Option<ErrorValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &ErrorKey) -> Option<ErrorValue> {
        self.0.remove(key)
    }

    pub fn get(&self, key: impl Into<ErrorKey>) -> Option<&ErrorValue> {
        self.0.get(&key.into())
    }

    pub fn contains_key(&self, key: impl Into<ErrorKey>) -> bool {
        self.0.contains_key(&key.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when at least one entry carries a present value.
    pub fn has_errors(&self) -> bool {
        self.0.values().any(ErrorValue::is_present)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ErrorKey, ErrorValue> {
        self.0.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, ErrorKey, ErrorValue> {
        self.0.keys()
    }

    pub fn extend_from(&mut self, other: &Errors) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Errors
where
    K: Into<ErrorKey>,
    V: Into<ErrorValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Errors(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = (&'a ErrorKey, &'a ErrorValue);
    type IntoIter = btree_map::Iter<'a, ErrorKey, ErrorValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_win_on_collision() {
        let children = Errors::from_iter([("name", true), ("shared", true)]);
        let validation = Errors::from_iter([("shared", "from validator"), ("rule", "bad")]);
        let custom = Errors::from_iter([("rule", "server says no")]);

        let merged = Errors::layered(&children, &validation, &custom);
        assert_eq!(merged.get("name"), Some(&ErrorValue::Flag(true)));
        assert_eq!(
            merged.get("shared"),
            Some(&ErrorValue::Message("from validator".into()))
        );
        assert_eq!(
            merged.get("rule"),
            Some(&ErrorValue::Message("server says no".into()))
        );
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn falsy_values_are_not_errors() {
        let errors = Errors::from_iter([
            (ErrorKey::from("flag"), ErrorValue::Flag(false)),
            (ErrorKey::from("message"), ErrorValue::Message(String::new())),
            (ErrorKey::from(0), ErrorValue::Nested(Errors::new())),
        ]);
        assert_eq!(errors.len(), 3);
        assert!(!errors.has_errors());

        let nested = Errors::from_iter([(1usize, Errors::from_iter([("inner", true)]))]);
        assert!(nested.has_errors());
    }
}
