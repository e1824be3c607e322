//! User record model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known record field names.
pub mod fields {
    pub const NAME: &str = "name";
    pub const FACULTY: &str = "faculty";
    pub const GROUP: &str = "group";
    pub const LAB1_OBJECT: &str = "lab1_object";
    pub const LAB1_BENEFIT1: &str = "lab1_benefit1";
    pub const LAB1_BENEFIT2: &str = "lab1_benefit2";
    pub const LAB1_BENEFIT3: &str = "lab1_benefit3";
}

/// Identity fields whose presence marks onboarding as done.
const IDENTITY_FIELDS: &[&str] = &[fields::NAME, fields::FACULTY, fields::GROUP];

/// Accumulated answers of one user. Fields are untyped strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRecord(BTreeMap<String, String>);

impl UserRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether name, faculty and group are all present.
    pub fn is_onboarded(&self) -> bool {
        IDENTITY_FIELDS.iter().all(|f| self.0.contains_key(*f))
    }

    /// Write every field of `patch` into the record.
    pub fn apply(&mut self, patch: &RecordPatch) {
        for (field, value) in &patch.fields {
            self.0.insert(field.clone(), value.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for UserRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Field updates produced by one transition.
///
/// An empty patch still creates the record when applied through the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub fields: Vec<(String, String)>,
}

impl RecordPatch {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Patch setting a single field.
    pub fn set(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            fields: vec![(field.into(), value.into())],
        }
    }
}
