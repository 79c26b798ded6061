//! Anonymization of schema and relationship identifiers.
//!
//! [`Redactor`] is a [`Rewriter`] that swaps definition names, caveat
//! names, relation names, and object ids for generated placeholders. The
//! four injective mappings are collected in a [`RedactionMap`] persisted
//! next to the redacted container so an operator can de-anonymize results
//! later.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use zed_core::{ZedError, ZedResult};
use zed_proto::v1::Relationship;

use crate::rewrite::{schema_blocks, BlockKind, RewriteOutcome, Rewriter};

/// The four original → anonymized mappings produced by a redaction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionMap {
    /// Definition (object type) names.
    pub definitions: BTreeMap<String, String>,
    /// Caveat names.
    pub caveats: BTreeMap<String, String>,
    /// Relation and permission names.
    pub relations: BTreeMap<String, String>,
    /// Object ids.
    pub object_ids: BTreeMap<String, String>,
}

impl RedactionMap {
    /// Swaps every mapping, for de-anonymizing redacted output.
    #[must_use]
    pub fn invert(&self) -> Self {
        fn flip(map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
            map.iter().map(|(k, v)| (v.clone(), k.clone())).collect()
        }
        Self {
            definitions: flip(&self.definitions),
            caveats: flip(&self.caveats),
            relations: flip(&self.relations),
            object_ids: flip(&self.object_ids),
        }
    }

    /// Writes the map as pretty JSON.
    pub fn save(&self, path: &Path) -> ZedResult<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|err| ZedError::Internal(err.to_string()))?;
        std::fs::write(path, json).map_err(|err| ZedError::Internal(err.to_string()))
    }

    /// Reads a map written by [`Self::save`].
    pub fn load(path: &Path) -> ZedResult<Self> {
        let bytes =
            std::fs::read(path).map_err(|err| ZedError::Internal(err.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ZedError::Validation(format!("invalid redaction map: {err}")))
    }
}

fn anonymize(map: &mut BTreeMap<String, String>, prefix: &str, original: &str) -> String {
    if let Some(existing) = map.get(original) {
        return existing.clone();
    }
    let generated = format!("{prefix}{}", map.len());
    map.insert(original.to_owned(), generated.clone());
    generated
}

/// The anonymizing rewriter.
#[derive(Default)]
pub struct Redactor {
    state: Mutex<RedactionMap>,
}

impl Redactor {
    /// A redactor with empty mappings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The mappings accumulated so far.
    pub fn map(&self) -> RedactionMap {
        self.state.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn redact_definition(&self, state: &mut RedactionMap, name: &str) -> String {
        anonymize(&mut state.definitions, "def", name)
    }
}

impl Rewriter for Redactor {
    fn rewrite_schema(&self, schema: &str) -> ZedResult<String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ZedError::Internal("redaction state poisoned".to_owned()))?;

        // First pass: harvest every name declared by the schema.
        let mut replacements: Vec<(String, String)> = Vec::new();
        for block in schema_blocks(schema)? {
            let anon = match block.kind {
                BlockKind::Definition => self.redact_definition(&mut state, &block.name),
                BlockKind::Caveat => anonymize(&mut state.caveats, "cav", &block.name),
            };
            replacements.push((block.name.clone(), anon));
            for line in block.text.lines() {
                let trimmed = line.trim_start();
                let declared = trimmed
                    .strip_prefix("relation ")
                    .and_then(|rest| rest.split_once(':'))
                    .map(|(name, _)| name.trim())
                    .or_else(|| {
                        trimmed
                            .strip_prefix("permission ")
                            .and_then(|rest| rest.split_once('='))
                            .map(|(name, _)| name.trim())
                    });
                if let Some(name) = declared {
                    if !name.is_empty() {
                        let anon = anonymize(&mut state.relations, "rel", name);
                        replacements.push((name.to_owned(), anon));
                    }
                }
            }
        }

        // Second pass: rewrite, longest originals first so namespaced names
        // never get clobbered by a shorter identifier they contain.
        replacements.sort_by_key(|(original, _)| std::cmp::Reverse(original.len()));
        Ok(replace_identifiers(schema, &replacements))
    }

    fn rewrite_relationship(&self, mut rel: Relationship) -> ZedResult<RewriteOutcome> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ZedError::Internal("redaction state poisoned".to_owned()))?;

        if let Some(resource) = rel.resource.as_mut() {
            resource.object_type = self.redact_definition(&mut state, &resource.object_type);
            resource.object_id = anonymize(&mut state.object_ids, "obj", &resource.object_id);
        }
        if !rel.relation.is_empty() {
            rel.relation = anonymize(&mut state.relations, "rel", &rel.relation);
        }
        if let Some(subject) = rel.subject.as_mut() {
            if let Some(object) = subject.object.as_mut() {
                object.object_type = self.redact_definition(&mut state, &object.object_type);
                if object.object_id != "*" {
                    object.object_id =
                        anonymize(&mut state.object_ids, "obj", &object.object_id);
                }
            }
            if !subject.optional_relation.is_empty() {
                subject.optional_relation =
                    anonymize(&mut state.relations, "rel", &subject.optional_relation);
            }
        }
        if let Some(caveat) = rel.optional_caveat.as_mut() {
            caveat.caveat_name = anonymize(&mut state.caveats, "cav", &caveat.caveat_name);
        }
        Ok(RewriteOutcome::Kept(rel))
    }
}

/// Replaces identifier-boundary occurrences of each `(original, anon)` pair.
fn replace_identifiers(text: &str, replacements: &[(String, String)]) -> String {
    fn is_ident(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '/'
    }

    let mut out = String::with_capacity(text.len());
    let bytes = text.char_indices().collect::<Vec<_>>();
    let mut i = 0;
    'outer: while i < bytes.len() {
        let (byte_idx, _) = bytes[i];
        for (original, anon) in replacements {
            if text[byte_idx..].starts_with(original.as_str()) {
                let before_ok = i == 0 || !is_ident(bytes[i - 1].1);
                let end = byte_idx + original.len();
                let after_ok = text[end..].chars().next().is_none_or(|c| !is_ident(c));
                if before_ok && after_ok {
                    out.push_str(anon);
                    while i < bytes.len() && bytes[i].0 < end {
                        i += 1;
                    }
                    continue 'outer;
                }
            }
        }
        out.push(bytes[i].1);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use zed_core::tuple;

    use super::*;

    fn rel(s: &str) -> Relationship {
        tuple::parse(s).unwrap()
    }

    const SCHEMA: &str = "\
definition user {}

definition document {
\trelation viewer: user
\tpermission view = viewer
}";

    #[test]
    fn schema_names_are_anonymized_consistently() {
        let redactor = Redactor::new();
        let redacted = redactor.rewrite_schema(SCHEMA).unwrap();
        assert!(!redacted.contains("user"));
        assert!(!redacted.contains("document"));
        assert!(!redacted.contains("viewer"));
        assert!(redacted.contains("definition def0 {}"));
        assert!(redacted.contains("definition def1 {"));
        // The relation reference and its declaration agree.
        assert!(redacted.contains("relation rel0: def0"));
        assert!(redacted.contains("permission rel1 = rel0"));
    }

    #[test]
    fn relationships_share_the_schema_mappings() {
        let redactor = Redactor::new();
        let _ = redactor.rewrite_schema(SCHEMA).unwrap();
        let out = match redactor
            .rewrite_relationship(rel("document:doc1#viewer@user:alice"))
            .unwrap()
        {
            RewriteOutcome::Kept(r) => r,
            RewriteOutcome::Dropped => panic!("redaction never drops"),
        };
        assert_eq!(tuple::format(&out), "def1:obj0#rel0@def0:obj1");
    }

    #[test]
    fn wildcard_subjects_stay_wildcards() {
        let redactor = Redactor::new();
        let out = match redactor
            .rewrite_relationship(rel("document:doc1#viewer@user:*"))
            .unwrap()
        {
            RewriteOutcome::Kept(r) => r,
            RewriteOutcome::Dropped => unreachable!(),
        };
        assert_eq!(out.subject.unwrap().object.unwrap().object_id, "*");
    }

    #[test]
    fn the_map_round_trips_and_inverts() {
        let tmp = tempfile::tempdir().unwrap();
        let redactor = Redactor::new();
        let _ = redactor.rewrite_schema(SCHEMA).unwrap();
        let map = redactor.map();

        let path = tmp.path().join("redaction.json");
        map.save(&path).unwrap();
        assert_eq!(RedactionMap::load(&path).unwrap(), map);

        let inverted = map.invert();
        assert_eq!(inverted.definitions.get("def0"), Some(&"user".to_owned()));
        // Injectivity: inversion preserves entry counts.
        assert_eq!(inverted.definitions.len(), map.definitions.len());
        assert_eq!(inverted.relations.len(), map.relations.len());
    }
}
