//! Parsing and canonical formatting of relationship tuples.
//!
//! The canonical string form is
//! `type:id#relation@subjectType:subjectId`, optionally followed by
//! `#subjectRelation`, a `[caveat:{json}]` qualifier, and an
//! `[expiration:rfc3339]` qualifier. Parsers are strict about separator
//! positions; anything the parser cannot place is a validation error that
//! names the offending input. Exact identifier charsets are enforced
//! server-side; locally only the delimiters are policed.

use chrono::{DateTime, SecondsFormat, Utc};
use zed_proto::v1::{ContextualizedCaveat, ObjectReference, Relationship, SubjectReference};

use crate::context::{json_to_struct, struct_to_json};
use crate::error::{ZedError, ZedResult};

/// Characters that may never appear inside an identifier segment.
const RESERVED: [char; 5] = [':', '#', '@', '[', ']'];

fn validate_segment(what: &str, value: &str, input: &str) -> ZedResult<()> {
    if value.is_empty() {
        return Err(ZedError::Validation(format!(
            "empty {what} in \"{input}\""
        )));
    }
    if value.contains(RESERVED) || value.contains(char::is_whitespace) {
        return Err(ZedError::Validation(format!(
            "invalid {what} \"{value}\" in \"{input}\""
        )));
    }
    Ok(())
}

/// Parses `type:id` into an [`ObjectReference`].
pub fn parse_object(input: &str) -> ZedResult<ObjectReference> {
    let (object_type, object_id) = input.split_once(':').ok_or_else(|| {
        ZedError::Validation(format!("expected \"type:id\", got \"{input}\""))
    })?;
    if object_id.contains(':') {
        return Err(ZedError::Validation(format!(
            "duplicated ':' separator in \"{input}\""
        )));
    }
    validate_segment("object type", object_type, input)?;
    // "*" is the wildcard object id, valid only in subject position; the
    // server rejects it elsewhere.
    if object_id != "*" {
        validate_segment("object id", object_id, input)?;
    }
    Ok(ObjectReference {
        object_type: object_type.to_owned(),
        object_id: object_id.to_owned(),
    })
}

/// Parses `type:id#relation` into an object and its relation.
pub fn parse_object_and_relation(input: &str) -> ZedResult<(ObjectReference, String)> {
    let (object_part, relation) = input.split_once('#').ok_or_else(|| {
        ZedError::Validation(format!("expected \"type:id#relation\", got \"{input}\""))
    })?;
    if relation.contains('#') {
        return Err(ZedError::Validation(format!(
            "duplicated '#' separator in \"{input}\""
        )));
    }
    validate_segment("relation", relation, input)?;
    Ok((parse_object(object_part)?, relation.to_owned()))
}

/// Parses `type:id` with an optional `#relation` into a [`SubjectReference`].
pub fn parse_subject(input: &str) -> ZedResult<SubjectReference> {
    let (object_part, optional_relation) = match input.split_once('#') {
        Some((object_part, relation)) => {
            if relation.contains('#') {
                return Err(ZedError::Validation(format!(
                    "duplicated '#' separator in \"{input}\""
                )));
            }
            validate_segment("subject relation", relation, input)?;
            (object_part, relation.to_owned())
        }
        None => (input, String::new()),
    };
    Ok(SubjectReference {
        object: Some(parse_object(object_part)?),
        optional_relation,
    })
}

/// Parses a full relationship in canonical form.
pub fn parse(input: &str) -> ZedResult<Relationship> {
    let (base, qualifiers) = match input.find('[') {
        Some(idx) => (&input[..idx], &input[idx..]),
        None => (input, ""),
    };

    let (resource_part, subject_part) = base.split_once('@').ok_or_else(|| {
        ZedError::Validation(format!(
            "missing '@' between resource and subject in \"{input}\""
        ))
    })?;
    if subject_part.contains('@') {
        return Err(ZedError::Validation(format!(
            "duplicated '@' separator in \"{input}\""
        )));
    }

    let (resource, relation) = parse_object_and_relation(resource_part)?;
    let subject = parse_subject(subject_part)?;
    let (optional_caveat, optional_expires_at) = parse_qualifiers(qualifiers, input)?;

    Ok(Relationship {
        resource: Some(resource),
        relation,
        subject: Some(subject),
        optional_caveat,
        optional_expires_at,
    })
}

/// Formats a relationship in canonical form; the exact inverse of [`parse`].
pub fn format(rel: &Relationship) -> String {
    let mut out = String::new();
    if let Some(resource) = &rel.resource {
        out.push_str(&resource.object_type);
        out.push(':');
        out.push_str(&resource.object_id);
    }
    out.push('#');
    out.push_str(&rel.relation);
    out.push('@');
    if let Some(subject) = &rel.subject {
        if let Some(object) = &subject.object {
            out.push_str(&object.object_type);
            out.push(':');
            out.push_str(&object.object_id);
        }
        if !subject.optional_relation.is_empty() {
            out.push('#');
            out.push_str(&subject.optional_relation);
        }
    }
    if let Some(caveat) = &rel.optional_caveat {
        out.push('[');
        out.push_str(&caveat.caveat_name);
        if let Some(context) = &caveat.context {
            if !context.fields.is_empty() {
                out.push(':');
                out.push_str(&struct_to_json(context).to_string());
            }
        }
        out.push(']');
    }
    if let Some(ts) = &rel.optional_expires_at {
        out.push_str("[expiration:");
        out.push_str(&format_timestamp(ts));
        out.push(']');
    }
    out
}

/// Parses `name` or `name:{json}` into a [`ContextualizedCaveat`].
pub fn parse_caveat(input: &str) -> ZedResult<ContextualizedCaveat> {
    match input.split_once(':') {
        None => {
            validate_segment("caveat name", input, input)?;
            Ok(ContextualizedCaveat {
                caveat_name: input.to_owned(),
                context: None,
            })
        }
        Some((name, json)) => {
            validate_segment("caveat name", name, input)?;
            let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
                ZedError::Validation(format!("invalid caveat context in \"{input}\": {e}"))
            })?;
            let serde_json::Value::Object(map) = value else {
                return Err(ZedError::Validation(format!(
                    "caveat context must be a JSON object in \"{input}\""
                )));
            };
            Ok(ContextualizedCaveat {
                caveat_name: name.to_owned(),
                context: Some(json_to_struct(map)),
            })
        }
    }
}

/// Parses an RFC 3339 timestamp into a wire timestamp.
pub fn parse_timestamp(input: &str) -> ZedResult<prost_types::Timestamp> {
    let parsed = DateTime::parse_from_rfc3339(input).map_err(|e| {
        ZedError::Validation(format!("invalid expiration \"{input}\": {e}"))
    })?;
    Ok(prost_types::Timestamp {
        seconds: parsed.timestamp(),
        nanos: parsed.timestamp_subsec_nanos().try_into().unwrap_or(0),
    })
}

/// Formats a wire timestamp as RFC 3339 UTC.
#[must_use]
pub fn format_timestamp(ts: &prost_types::Timestamp) -> String {
    DateTime::<Utc>::from_timestamp(ts.seconds, ts.nanos.try_into().unwrap_or(0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn parse_qualifiers(
    mut rest: &str,
    input: &str,
) -> ZedResult<(Option<ContextualizedCaveat>, Option<prost_types::Timestamp>)> {
    let mut caveat = None;
    let mut expires_at = None;

    while !rest.is_empty() {
        let Some(body) = rest.strip_prefix('[') else {
            return Err(ZedError::Validation(format!(
                "unexpected trailing input after ']' in \"{input}\""
            )));
        };
        let (group, remainder) = split_group(body, input)?;
        if let Some(ts) = group.strip_prefix("expiration:") {
            if expires_at.is_some() {
                return Err(ZedError::Validation(format!(
                    "duplicated expiration qualifier in \"{input}\""
                )));
            }
            expires_at = Some(parse_timestamp(ts)?);
        } else {
            if caveat.is_some() {
                return Err(ZedError::Validation(format!(
                    "duplicated caveat qualifier in \"{input}\""
                )));
            }
            caveat = Some(parse_caveat(group)?);
        }
        rest = remainder;
    }

    Ok((caveat, expires_at))
}

/// Splits one `[...]` group body from `rest`, honouring braces and string
/// escapes inside an embedded JSON context.
fn split_group<'a>(body: &'a str, input: &str) -> ZedResult<(&'a str, &'a str)> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth = depth.saturating_sub(1),
            ']' if !in_string && depth == 0 => {
                return Ok((&body[..idx], &body[idx + 1..]));
            }
            _ => {}
        }
    }
    Err(ZedError::Validation(format!(
        "unterminated '[' qualifier in \"{input}\""
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bare_relationship() {
        let rel = parse("document:doc1#viewer@user:alice").unwrap();
        let resource = rel.resource.as_ref().unwrap();
        assert_eq!(resource.object_type, "document");
        assert_eq!(resource.object_id, "doc1");
        assert_eq!(rel.relation, "viewer");
        let subject = rel.subject.as_ref().unwrap();
        assert_eq!(subject.object.as_ref().unwrap().object_type, "user");
        assert_eq!(subject.object.as_ref().unwrap().object_id, "alice");
        assert!(subject.optional_relation.is_empty());
    }

    #[test]
    fn parses_a_subject_relation() {
        let rel = parse("document:doc1#viewer@group:eng#member").unwrap();
        assert_eq!(rel.subject.unwrap().optional_relation, "member");
    }

    #[test]
    fn parses_a_namespaced_type() {
        let rel = parse("test/resource:1#reader@test/user:1").unwrap();
        assert_eq!(rel.resource.unwrap().object_type, "test/resource");
    }

    #[test]
    fn parses_a_wildcard_subject() {
        let rel = parse("document:doc1#viewer@user:*").unwrap();
        assert_eq!(rel.subject.unwrap().object.unwrap().object_id, "*");
    }

    #[test]
    fn parses_a_caveated_relationship() {
        let rel = parse("document:doc1#viewer@user:alice[ip_allowlist:{\"cidr\":\"10.0.0.0/8\"}]")
            .unwrap();
        let caveat = rel.optional_caveat.unwrap();
        assert_eq!(caveat.caveat_name, "ip_allowlist");
        assert!(caveat.context.unwrap().fields.contains_key("cidr"));
    }

    #[test]
    fn parses_a_context_free_caveat() {
        let rel = parse("document:doc1#viewer@user:alice[tuesday_only]").unwrap();
        let caveat = rel.optional_caveat.unwrap();
        assert_eq!(caveat.caveat_name, "tuesday_only");
        assert!(caveat.context.is_none());
    }

    #[test]
    fn parses_an_expiration() {
        let rel =
            parse("document:doc1#viewer@user:alice[expiration:2026-01-01T00:00:00Z]").unwrap();
        assert!(rel.optional_expires_at.is_some());
    }

    #[test]
    fn rejects_missing_at_separator() {
        let err = parse("document:doc1#viewer").unwrap_err();
        assert!(matches!(err, ZedError::Validation(_)));
    }

    #[test]
    fn rejects_duplicated_separators() {
        assert!(parse("document:doc1#viewer@user:alice@user:bob").is_err());
        assert!(parse("document:doc:1#viewer@user:alice").is_err());
        assert!(parse("document:doc1#viewer#editor@user:alice").is_err());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(parse(":doc1#viewer@user:alice").is_err());
        assert!(parse("document:#viewer@user:alice").is_err());
        assert!(parse("document:doc1#@user:alice").is_err());
        assert!(parse("document:doc1#viewer@user:").is_err());
    }

    #[test]
    fn round_trips_the_canonical_form() {
        let cases = [
            "document:doc1#viewer@user:alice",
            "document:doc1#viewer@group:eng#member",
            "test/resource:1#reader@test/user:1",
            "document:doc1#viewer@user:*",
            "document:doc1#viewer@user:alice[tuesday_only]",
            "document:doc1#viewer@user:alice[expiration:2026-01-01T00:00:00Z]",
        ];
        for case in cases {
            assert_eq!(format(&parse(case).unwrap()), case, "case {case}");
        }
    }

    #[test]
    fn caveat_context_round_trips_semantically() {
        let input = "document:doc1#viewer@user:alice[cav:{\"limit\":3}]";
        let rel = parse(input).unwrap();
        let rel2 = parse(&format(&rel)).unwrap();
        assert_eq!(rel, rel2);
    }
}
