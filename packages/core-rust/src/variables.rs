//! Case-insensitive variable naming.
//!
//! Operation names, binding names and context variable names all compare
//! without regard to case. [`fold_name`] is the single normalisation used for
//! that, and [`VariableMap`] is the name-to-value map built on top of it.

use std::collections::HashMap;

use crate::types::Value;

/// Normalised lookup key for a case-insensitive name.
#[must_use]
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Case-insensitive name equality.
#[must_use]
pub fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || fold_name(a) == fold_name(b)
}

/// Insertion-ordered map from case-insensitive variable names to values.
///
/// The spelling used when a name is first inserted is kept for iteration;
/// later inserts under a differently-cased spelling replace the value only.
#[derive(Debug, Clone, Default)]
pub struct VariableMap {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl VariableMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a variable, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        let key = fold_name(&name);
        if let Some(&idx) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[idx].1, value));
        }
        self.index.insert(key, self.entries.len());
        self.entries.push((name, value));
        None
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index
            .get(&fold_name(name))
            .map(|&idx| &self.entries[idx].1)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&fold_name(name))
    }

    /// Removes a variable and returns its value. Later entries keep their order.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.index.remove(&fold_name(name))?;
        let (_, value) = self.entries.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

/// Two maps are equal when they hold the same names (case-insensitively) with
/// equal values, regardless of insertion order or spelling.
impl PartialEq for VariableMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl IntoIterator for VariableMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for VariableMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: Into<String>> Extend<(K, Value)> for VariableMap {
    fn extend<I: IntoIterator<Item = (K, Value)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut vars = VariableMap::new();
        vars.insert("taskName", Value::from("nightly"));
        assert_eq!(vars.get("TASKNAME"), Some(&Value::from("nightly")));
        assert!(vars.contains("taskname"));
        assert!(!vars.contains("task"));
    }

    #[test]
    fn reinsert_keeps_first_spelling() {
        let mut vars = VariableMap::new();
        assert!(vars.insert("Out", Value::Int(1)).is_none());
        assert_eq!(vars.insert("OUT", Value::Int(2)), Some(Value::Int(1)));
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.names().collect::<Vec<_>>(), vec!["Out"]);
        assert_eq!(vars.get("out"), Some(&Value::Int(2)));
    }

    #[test]
    fn remove_preserves_order_of_rest() {
        let mut vars: VariableMap = [("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))]
            .into_iter()
            .collect();
        assert_eq!(vars.remove("B"), Some(Value::Int(2)));
        assert_eq!(vars.names().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(vars.get("c"), Some(&Value::Int(3)));
        assert!(vars.remove("b").is_none());
    }

    #[test]
    fn equality_ignores_order_and_case() {
        let a: VariableMap = [("x", Value::Int(1)), ("Y", Value::Int(2))].into_iter().collect();
        let b: VariableMap = [("y", Value::Int(2)), ("X", Value::Int(1))].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn names_match_handles_non_ascii() {
        assert!(names_match("Ärger", "ärger"));
        assert!(names_match("run", "RUN"));
        assert!(!names_match("run", "runs"));
    }

    proptest! {
        #[test]
        fn any_casing_finds_the_same_entry(name in "[a-zA-Z][a-zA-Z0-9_]{0,15}", value in any::<i64>()) {
            let mut vars = VariableMap::new();
            vars.insert(name.clone(), Value::Int(value));
            prop_assert_eq!(vars.get(&name.to_uppercase()), Some(&Value::Int(value)));
            prop_assert_eq!(vars.get(&name.to_lowercase()), Some(&Value::Int(value)));
            prop_assert_eq!(vars.len(), 1);
        }
    }
}
