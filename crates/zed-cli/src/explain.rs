//! Indented rendering of check debug traces.

use colored::Colorize;
use zed_proto::v1::{CheckDebugTrace, DebugInformation, Permissionship};

/// Renders a debug trace as an indented tree, one line per sub-check.
pub(crate) fn render(debug: &DebugInformation) -> String {
    let mut out = String::new();
    if let Some(check) = &debug.check {
        render_trace(check, 0, &mut out);
    }
    out
}

fn render_trace(trace: &CheckDebugTrace, depth: usize, out: &mut String) {
    let resource = trace
        .resource
        .as_ref()
        .map(|r| format!("{}:{}", r.object_type, r.object_id))
        .unwrap_or_default();
    let subject = trace
        .subject
        .as_ref()
        .and_then(|s| s.object.as_ref())
        .map(|o| format!("{}:{}", o.object_type, o.object_id))
        .unwrap_or_default();

    let verdict = match Permissionship::try_from(trace.result) {
        Ok(Permissionship::HasPermission) => "✓".green().to_string(),
        Ok(Permissionship::ConditionalPermission) => "?".yellow().to_string(),
        _ => "✗".red().to_string(),
    };
    let cached = if trace.was_cached_result {
        " (cached)".dimmed().to_string()
    } else {
        String::new()
    };

    out.push_str(&"  ".repeat(depth));
    out.push_str(&format!(
        "{verdict} {resource} {} {subject}{cached}\n",
        trace.permission.bold()
    ));

    if let Some(sub) = &trace.sub_problems {
        for child in &sub.traces {
            render_trace(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use zed_proto::v1::check_debug_trace::SubProblems;
    use zed_proto::v1::{ObjectReference, SubjectReference};

    use super::*;

    fn leaf(permission: &str, result: Permissionship) -> CheckDebugTrace {
        CheckDebugTrace {
            resource: Some(ObjectReference {
                object_type: "document".to_owned(),
                object_id: "doc1".to_owned(),
            }),
            permission: permission.to_owned(),
            subject: Some(SubjectReference {
                object: Some(ObjectReference {
                    object_type: "user".to_owned(),
                    object_id: "alice".to_owned(),
                }),
                optional_relation: String::new(),
            }),
            result: result as i32,
            was_cached_result: false,
            sub_problems: None,
        }
    }

    #[test]
    fn nested_traces_indent_by_depth() {
        colored::control::set_override(false);
        let mut root = leaf("view", Permissionship::HasPermission);
        root.sub_problems = Some(SubProblems {
            traces: vec![leaf("viewer", Permissionship::HasPermission)],
        });
        let rendered = render(&DebugInformation {
            check: Some(root),
            schema_used: String::new(),
        });
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("✓ document:doc1 view"));
        assert!(lines[1].starts_with("  ✓ document:doc1 viewer"));
    }
}
