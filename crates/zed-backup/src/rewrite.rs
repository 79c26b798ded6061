//! Pure transforms over schema text and relationships.
//!
//! A [`Rewriter`] maps the schema once and every relationship record as it
//! streams by; returning [`RewriteOutcome::Dropped`] removes the record.
//! Rewriters compose as an ordered [`ChainRewriter`] which short-circuits
//! at the first drop and surfaces kept/dropped counters.
//!
//! Schema transforms operate on `definition` / `caveat` block granularity
//! of the schema text; kept blocks are emitted verbatim. The schema
//! language compiler itself lives server-side.

use std::sync::atomic::{AtomicU64, Ordering};

use zed_core::{ZedError, ZedResult};
use zed_proto::v1::Relationship;

/// What became of one relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    /// The (possibly modified) record stays in the stream.
    Kept(Relationship),
    /// The record is removed from the stream.
    Dropped,
}

/// A pure transform over schema text and relationship records.
pub trait Rewriter: Send + Sync {
    /// Rewrites the schema text.
    fn rewrite_schema(&self, schema: &str) -> ZedResult<String>;

    /// Rewrites or drops one relationship.
    fn rewrite_relationship(&self, rel: Relationship) -> ZedResult<RewriteOutcome>;
}

// ---------------------------------------------------------------------------
// Schema block scanning
// ---------------------------------------------------------------------------

/// Kind of a top-level schema block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    Definition,
    Caveat,
}

/// One top-level block of schema text, leading comments attached.
#[derive(Debug, Clone)]
pub(crate) struct SchemaBlock {
    pub(crate) kind: BlockKind,
    pub(crate) name: String,
    pub(crate) text: String,
}

/// Splits schema text into its `definition` and `caveat` blocks.
pub(crate) fn schema_blocks(schema: &str) -> ZedResult<Vec<SchemaBlock>> {
    let mut blocks = Vec::new();
    let mut pending_comments: Vec<&str> = Vec::new();
    let mut current: Option<(BlockKind, String, Vec<String>)> = None;
    let mut depth: i64 = 0;

    for line in schema.lines() {
        if let Some((_, _, lines)) = current.as_mut() {
            lines.push(line.to_owned());
            depth += brace_delta(line);
            if depth <= 0 {
                let (kind, name, lines) = current.take().unwrap_or_else(|| unreachable!());
                blocks.push(SchemaBlock {
                    kind,
                    name,
                    text: lines.join("\n"),
                });
                depth = 0;
            }
            continue;
        }

        let trimmed = line.trim_start();
        let header = if let Some(rest) = trimmed.strip_prefix("definition ") {
            Some((BlockKind::Definition, rest))
        } else if let Some(rest) = trimmed.strip_prefix("caveat ") {
            Some((BlockKind::Caveat, rest))
        } else {
            None
        };

        match header {
            Some((kind, rest)) => {
                let name: String = rest
                    .chars()
                    .take_while(|c| !c.is_whitespace() && *c != '{' && *c != '(')
                    .collect();
                if name.is_empty() {
                    return Err(ZedError::MalformedContainer(
                        "schema block without a name".to_owned(),
                    ));
                }
                let mut lines: Vec<String> =
                    pending_comments.drain(..).map(str::to_owned).collect();
                lines.push(line.to_owned());
                depth = brace_delta(line);
                if depth <= 0 && line.contains('{') {
                    // Single-line block such as `definition user {}`.
                    blocks.push(SchemaBlock {
                        kind,
                        name,
                        text: lines.join("\n"),
                    });
                    depth = 0;
                } else {
                    current = Some((kind, name, lines));
                }
            }
            None => {
                if trimmed.starts_with("//") {
                    pending_comments.push(line);
                } else if trimmed.is_empty() {
                    pending_comments.clear();
                } else {
                    pending_comments.clear();
                }
            }
        }
    }

    if current.is_some() {
        return Err(ZedError::MalformedContainer(
            "unterminated schema block".to_owned(),
        ));
    }
    Ok(blocks)
}

fn brace_delta(line: &str) -> i64 {
    let mut delta = 0;
    for ch in line.chars() {
        match ch {
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// True when `type_name` falls under `prefix`.
///
/// A prefix carrying a slash matches literally from the start; a bare
/// prefix matches the namespace itself or anything under `prefix/`.
fn type_matches_prefix(type_name: &str, prefix: &str) -> bool {
    if prefix.contains('/') {
        type_name.starts_with(prefix)
    } else {
        type_name == prefix
            || type_name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// The identity rewriter; the default when no transform flags are given.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRewriter;

impl Rewriter for NoopRewriter {
    fn rewrite_schema(&self, schema: &str) -> ZedResult<String> {
        Ok(schema.to_owned())
    }

    fn rewrite_relationship(&self, rel: Relationship) -> ZedResult<RewriteOutcome> {
        Ok(RewriteOutcome::Kept(rel))
    }
}

/// Keeps only relationships and schema blocks under one namespace prefix.
#[derive(Debug, Clone)]
pub struct PrefixFilter {
    prefix: String,
}

impl PrefixFilter {
    /// Filter to `prefix` (with or without a trailing slash).
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Rewriter for PrefixFilter {
    fn rewrite_schema(&self, schema: &str) -> ZedResult<String> {
        let blocks = schema_blocks(schema)?;
        let kept: Vec<String> = blocks
            .into_iter()
            .filter(|b| type_matches_prefix(&b.name, &self.prefix))
            .map(|b| b.text)
            .collect();
        Ok(kept.join("\n\n"))
    }

    fn rewrite_relationship(&self, rel: Relationship) -> ZedResult<RewriteOutcome> {
        let resource_ok = rel
            .resource
            .as_ref()
            .is_some_and(|r| type_matches_prefix(&r.object_type, &self.prefix));
        let subject_ok = rel
            .subject
            .as_ref()
            .and_then(|s| s.object.as_ref())
            .is_some_and(|o| type_matches_prefix(&o.object_type, &self.prefix));
        if resource_ok && subject_ok {
            Ok(RewriteOutcome::Kept(rel))
        } else {
            Ok(RewriteOutcome::Dropped)
        }
    }
}

/// Rewrites leading namespace prefixes on object types.
///
/// An empty replacement strips the prefix. Observed replacements are
/// counted for the progress report.
#[derive(Debug)]
pub struct PrefixReplacer {
    replacements: Vec<(String, String)>,
    count: AtomicU64,
}

impl PrefixReplacer {
    /// Builds from `(old, new)` pairs; `old` is given without the slash.
    #[must_use]
    pub fn new(replacements: Vec<(String, String)>) -> Self {
        Self {
            replacements,
            count: AtomicU64::new(0),
        }
    }

    /// How many prefix rewrites were performed.
    #[must_use]
    pub fn replacement_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn replace_type(&self, type_name: &str) -> String {
        for (old, new) in &self.replacements {
            if let Some(rest) = type_name.strip_prefix(old) {
                if let Some(rest) = rest.strip_prefix('/') {
                    self.count.fetch_add(1, Ordering::Relaxed);
                    return if new.is_empty() {
                        rest.to_owned()
                    } else {
                        format!("{new}/{rest}")
                    };
                }
            }
        }
        type_name.to_owned()
    }
}

impl Rewriter for PrefixReplacer {
    fn rewrite_schema(&self, schema: &str) -> ZedResult<String> {
        let mut text = schema.to_owned();
        for (old, new) in &self.replacements {
            let (replaced, n) = replace_prefix_tokens(&text, old, new);
            text = replaced;
            self.count.fetch_add(n, Ordering::Relaxed);
        }
        Ok(text)
    }

    fn rewrite_relationship(&self, mut rel: Relationship) -> ZedResult<RewriteOutcome> {
        if let Some(resource) = rel.resource.as_mut() {
            resource.object_type = self.replace_type(&resource.object_type);
        }
        if let Some(object) = rel.subject.as_mut().and_then(|s| s.object.as_mut()) {
            object.object_type = self.replace_type(&object.object_type);
        }
        Ok(RewriteOutcome::Kept(rel))
    }
}

/// Replaces identifier-boundary occurrences of `old/` with `new/` (or
/// strips them when `new` is empty). Returns the text and the count.
fn replace_prefix_tokens(text: &str, old: &str, new: &str) -> (String, u64) {
    let needle = format!("{old}/");
    let mut out = String::with_capacity(text.len());
    let mut count = 0u64;
    let mut rest = text;
    while let Some(idx) = rest.find(&needle) {
        let boundary_ok = idx == 0
            || rest[..idx]
                .chars()
                .next_back()
                .is_some_and(|c| !c.is_alphanumeric() && c != '_' && c != '/');
        out.push_str(&rest[..idx]);
        if boundary_ok {
            if !new.is_empty() {
                out.push_str(new);
                out.push('/');
            }
            count += 1;
        } else {
            out.push_str(&needle);
        }
        rest = &rest[idx + needle.len()..];
    }
    out.push_str(rest);
    (out, count)
}

/// Scrubs schema productions written by long-gone service versions.
///
/// Two scrubs: relation declarations still carrying the
/// `/* missing allowed types */` marker are removed outright, and relation
/// names shorter than three characters are padded with underscores (the
/// matching relationship records are renamed the same way).
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyRewriter;

const MISSING_ALLOWED_TYPES: &str = "/* missing allowed types */";
const MIN_RELATION_LEN: usize = 3;

fn pad_relation(name: &str) -> String {
    let mut padded = name.to_owned();
    while padded.len() < MIN_RELATION_LEN {
        padded.push('_');
    }
    padded
}

impl Rewriter for LegacyRewriter {
    fn rewrite_schema(&self, schema: &str) -> ZedResult<String> {
        let mut out = Vec::new();
        for line in schema.lines() {
            if line.contains(MISSING_ALLOWED_TYPES) {
                continue;
            }
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("relation ") {
                if let Some((name, tail)) = rest.split_once(':') {
                    let name = name.trim();
                    if !name.is_empty() && name.len() < MIN_RELATION_LEN {
                        let indent = &line[..line.len() - trimmed.len()];
                        out.push(format!("{indent}relation {}:{tail}", pad_relation(name)));
                        continue;
                    }
                }
            }
            out.push(line.to_owned());
        }
        Ok(out.join("\n"))
    }

    fn rewrite_relationship(&self, mut rel: Relationship) -> ZedResult<RewriteOutcome> {
        if !rel.relation.is_empty() && rel.relation.len() < MIN_RELATION_LEN {
            rel.relation = pad_relation(&rel.relation);
        }
        if let Some(subject) = rel.subject.as_mut() {
            if !subject.optional_relation.is_empty()
                && subject.optional_relation.len() < MIN_RELATION_LEN
            {
                subject.optional_relation = pad_relation(&subject.optional_relation);
            }
        }
        Ok(RewriteOutcome::Kept(rel))
    }
}

/// Applies rewriters in declaration order, stopping at the first drop.
#[derive(Default)]
pub struct ChainRewriter {
    rewriters: Vec<Box<dyn Rewriter>>,
    kept: AtomicU64,
    dropped: AtomicU64,
}

impl ChainRewriter {
    /// An empty chain; behaves like [`NoopRewriter`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rewriter to the chain.
    #[must_use]
    pub fn with(mut self, rewriter: Box<dyn Rewriter>) -> Self {
        self.rewriters.push(rewriter);
        self
    }

    /// Records kept by the whole chain so far.
    #[must_use]
    pub fn kept(&self) -> u64 {
        self.kept.load(Ordering::Relaxed)
    }

    /// Records dropped by the whole chain so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Rewriter for ChainRewriter {
    fn rewrite_schema(&self, schema: &str) -> ZedResult<String> {
        let mut text = schema.to_owned();
        for rewriter in &self.rewriters {
            text = rewriter.rewrite_schema(&text)?;
        }
        Ok(text)
    }

    fn rewrite_relationship(&self, rel: Relationship) -> ZedResult<RewriteOutcome> {
        let mut current = rel;
        for rewriter in &self.rewriters {
            match rewriter.rewrite_relationship(current)? {
                RewriteOutcome::Kept(next) => current = next,
                RewriteOutcome::Dropped => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return Ok(RewriteOutcome::Dropped);
                }
            }
        }
        self.kept.fetch_add(1, Ordering::Relaxed);
        Ok(RewriteOutcome::Kept(current))
    }
}

#[cfg(test)]
mod tests {
    use zed_core::tuple;

    use super::*;

    fn rel(s: &str) -> Relationship {
        tuple::parse(s).unwrap()
    }

    fn kept(outcome: RewriteOutcome) -> Relationship {
        match outcome {
            RewriteOutcome::Kept(rel) => rel,
            RewriteOutcome::Dropped => panic!("unexpectedly dropped"),
        }
    }

    const SCHEMA: &str = "\
definition test/user {}

// Documents owned by the test tenant.
definition test/resource {
\trelation reader: test/user
}

definition other/user {}

caveat test/only_on_tuesday(day string) {
\tday == \"tuesday\"
}";

    #[test]
    fn noop_is_identity() {
        let noop = NoopRewriter;
        assert_eq!(noop.rewrite_schema(SCHEMA).unwrap(), SCHEMA);
        let r = rel("document:doc1#viewer@user:alice");
        assert_eq!(
            noop.rewrite_relationship(r.clone()).unwrap(),
            RewriteOutcome::Kept(r)
        );
    }

    #[test]
    fn blocks_are_scanned_with_names_and_comments() {
        let blocks = schema_blocks(SCHEMA).unwrap();
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            ["test/user", "test/resource", "other/user", "test/only_on_tuesday"]
        );
        assert_eq!(blocks[3].kind, BlockKind::Caveat);
        assert!(blocks[1].text.starts_with("// Documents"));
    }

    #[test]
    fn filter_keeps_only_the_prefixed_namespace() {
        let filter = PrefixFilter::new("test");
        let schema = filter.rewrite_schema(SCHEMA).unwrap();
        assert!(schema.contains("definition test/user"));
        assert!(schema.contains("caveat test/only_on_tuesday"));
        assert!(!schema.contains("other/user"));

        assert!(matches!(
            filter
                .rewrite_relationship(rel("test/resource:1#reader@test/user:1"))
                .unwrap(),
            RewriteOutcome::Kept(_)
        ));
        assert_eq!(
            filter
                .rewrite_relationship(rel("other/resource:1#reader@other/user:1"))
                .unwrap(),
            RewriteOutcome::Dropped
        );
        // A matching resource with a foreign subject still drops.
        assert_eq!(
            filter
                .rewrite_relationship(rel("test/resource:1#reader@other/user:1"))
                .unwrap(),
            RewriteOutcome::Dropped
        );
    }

    #[test]
    fn filter_is_idempotent() {
        let filter = PrefixFilter::new("test");
        let once = filter.rewrite_schema(SCHEMA).unwrap();
        let twice = filter.rewrite_schema(&once).unwrap();
        assert_eq!(once, twice);

        let r = rel("test/resource:1#reader@test/user:1");
        let after_once = kept(filter.rewrite_relationship(r).unwrap());
        let after_twice = kept(filter.rewrite_relationship(after_once.clone()).unwrap());
        assert_eq!(after_once, after_twice);
    }

    #[test]
    fn a_bare_prefix_does_not_match_sibling_namespaces() {
        let filter = PrefixFilter::new("test");
        assert_eq!(
            filter
                .rewrite_relationship(rel("testing/resource:1#reader@testing/user:1"))
                .unwrap(),
            RewriteOutcome::Dropped
        );
    }

    #[test]
    fn replacer_moves_namespaces() {
        let replacer = PrefixReplacer::new(vec![("test".to_owned(), "prod".to_owned())]);
        let r = kept(
            replacer
                .rewrite_relationship(rel("test/resource:1#reader@test/user:1"))
                .unwrap(),
        );
        assert_eq!(tuple::format(&r), "prod/resource:1#reader@prod/user:1");
        assert_eq!(replacer.replacement_count(), 2);

        let schema = replacer.rewrite_schema("definition test/user {}").unwrap();
        assert_eq!(schema, "definition prod/user {}");
    }

    #[test]
    fn empty_replacement_strips_the_prefix() {
        let replacer = PrefixReplacer::new(vec![("test".to_owned(), String::new())]);
        let r = kept(
            replacer
                .rewrite_relationship(rel("test/resource:1#reader@test/user:1"))
                .unwrap(),
        );
        assert_eq!(tuple::format(&r), "resource:1#reader@user:1");
    }

    #[test]
    fn disjoint_replacers_compose_into_the_union() {
        let a = PrefixReplacer::new(vec![("aa".to_owned(), "xx".to_owned())]);
        let b = PrefixReplacer::new(vec![("bb".to_owned(), "yy".to_owned())]);
        let union = PrefixReplacer::new(vec![
            ("aa".to_owned(), "xx".to_owned()),
            ("bb".to_owned(), "yy".to_owned()),
        ]);

        let input = rel("aa/doc:1#reader@bb/user:1");
        let sequential = kept(
            b.rewrite_relationship(kept(a.rewrite_relationship(input.clone()).unwrap()))
                .unwrap(),
        );
        let at_once = kept(union.rewrite_relationship(input).unwrap());
        assert_eq!(sequential, at_once);

        let schema = "definition aa/doc {}\ndefinition bb/user {}";
        let sequential = b
            .rewrite_schema(&a.rewrite_schema(schema).unwrap())
            .unwrap();
        assert_eq!(sequential, union.rewrite_schema(schema).unwrap());
    }

    #[test]
    fn replacement_respects_identifier_boundaries() {
        let (out, n) = replace_prefix_tokens("definition attest/doc {}", "test", "prod");
        assert_eq!(out, "definition attest/doc {}");
        assert_eq!(n, 0);
    }

    #[test]
    fn legacy_scrubbing_fixes_known_productions() {
        let schema = "\
definition doc {
\trelation reader: user /* missing allowed types */
\trelation to: user
\tpermission view = to
}";
        let scrubbed = LegacyRewriter.rewrite_schema(schema).unwrap();
        assert!(!scrubbed.contains("missing allowed types"));
        assert!(scrubbed.contains("relation to_: user"));

        let r = kept(
            LegacyRewriter
                .rewrite_relationship(rel("doc:1#to@user:1"))
                .unwrap(),
        );
        assert_eq!(r.relation, "to_");
    }

    #[test]
    fn the_chain_short_circuits_and_counts() {
        let chain = ChainRewriter::new()
            .with(Box::new(PrefixFilter::new("test")))
            .with(Box::new(PrefixReplacer::new(vec![(
                "test".to_owned(),
                "prod".to_owned(),
            )])));

        let r = kept(
            chain
                .rewrite_relationship(rel("test/doc:1#reader@test/user:1"))
                .unwrap(),
        );
        assert_eq!(tuple::format(&r), "prod/doc:1#reader@prod/user:1");
        assert_eq!(
            chain
                .rewrite_relationship(rel("other/doc:1#reader@other/user:1"))
                .unwrap(),
            RewriteOutcome::Dropped
        );
        assert_eq!(chain.kept(), 1);
        assert_eq!(chain.dropped(), 1);
    }
}
