//! Polymorphic variant selection for identity-keyed object families.
//!
//! A step-like mapping is classified by which marker key it carries:
//! `call: ...` makes it a call step, `task: ...` a task step, and so on.
//! Candidate order is the declaration order of the family and is the
//! deterministic tie-break everywhere.

use std::collections::BTreeSet;

use crate::meta::{MetaType, MetaTypeRef, ObjectSchema};

/// One member of an identity family: its marker key and its object schema.
#[derive(Debug, Clone)]
pub struct IdentityEntry {
    identity: String,
    schema: MetaTypeRef,
}

impl IdentityEntry {
    pub fn new(identity: impl Into<String>, schema: ObjectSchema) -> Self {
        IdentityEntry {
            identity: identity.into(),
            schema: MetaTypeRef::new(MetaType::Object(schema)),
        }
    }

    /// The marker key, e.g. `call`.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The member's object type. Always `MetaType::Object`.
    pub fn schema(&self) -> &MetaTypeRef {
        &self.schema
    }

    pub fn object(&self) -> &ObjectSchema {
        match self.schema.as_ref() {
            MetaType::Object(schema) => schema,
            _ => unreachable!("identity entry schema is always an object"),
        }
    }

    fn overlap(&self, keys: &BTreeSet<String>) -> usize {
        keys.iter()
            .filter(|k| self.object().features().contains_key(k.as_str()))
            .count()
    }
}

/// An ordered set of mutually exclusive object shapes distinguished by a
/// marker key.
#[derive(Debug, Clone)]
pub struct IdentityFamily {
    type_name: String,
    candidates: Vec<IdentityEntry>,
}

impl IdentityFamily {
    pub fn new(type_name: impl Into<String>, candidates: Vec<IdentityEntry>) -> Self {
        debug_assert!(!candidates.is_empty(), "identity family with no candidates");
        IdentityFamily {
            type_name: type_name.into(),
            candidates,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn candidates(&self) -> &[IdentityEntry] {
        &self.candidates
    }

    /// First candidate, in declaration order, whose identity key is
    /// present. `None` when no identity key is present at all.
    pub fn identify_entry(&self, existing_keys: &BTreeSet<String>) -> Option<&IdentityEntry> {
        self.candidates
            .iter()
            .find(|c| existing_keys.contains(c.identity()))
    }

    /// Fallback when no identity key is present (e.g. completion on a
    /// still-empty mapping): the candidate with the strictly largest
    /// overlap between its feature names and the existing keys. Ties go to
    /// the first declared; zero overlap everywhere yields `None`.
    pub fn guess_entry(&self, existing_keys: &BTreeSet<String>) -> Option<&IdentityEntry> {
        let mut best: Option<&IdentityEntry> = None;
        let mut max_matches = 0;
        for candidate in &self.candidates {
            let matches = candidate.overlap(existing_keys);
            if matches > max_matches {
                max_matches = matches;
                best = Some(candidate);
            }
        }
        best
    }

    /// Identify, then guess.
    pub fn find_entry(&self, existing_keys: &BTreeSet<String>) -> Option<&IdentityEntry> {
        self.identify_entry(existing_keys)
            .or_else(|| self.guess_entry(existing_keys))
    }

    /// Whether any candidate in the family has the named feature. Unknown
    /// keys are reported against the whole family when the mapping cannot
    /// be pinned to a single member.
    pub fn has_feature(&self, name: &str) -> bool {
        self.candidates
            .iter()
            .any(|c| c.object().features().contains_key(name))
    }
}
