//! Line diff between two snapshots

use similar::{ChangeTag, TextDiff};

use crate::constants::{DIFF_IDENTICAL, DIFF_UNAVAILABLE};
use crate::render::snapshot::ResponseSnapshot;

/// Render a line diff of `left` against `right`, or a placeholder when
/// nothing differs
pub fn diff_text(left_label: &str, left: &str, right_label: &str, right: &str) -> String {
    if left == right {
        return DIFF_IDENTICAL.to_string();
    }
    let diff = TextDiff::from_lines(left, right);

    let mut out = format!("--- {}\n+++ {}\n", left_label, right_label);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push(' ');
        out.push_str(change.value().trim_end_matches('\n'));
        out.push('\n');
    }
    out
}

fn label(snapshot: &ResponseSnapshot) -> String {
    match &snapshot.environment {
        Some(env) => format!("{} [{}]", snapshot.title, env),
        None => snapshot.title.clone(),
    }
}

/// Diff projection for a pair of snapshots. Needs two distinct, ready
/// snapshots; anything else yields the unavailable placeholder.
pub fn diff_snapshots(left: Option<&ResponseSnapshot>, right: Option<&ResponseSnapshot>) -> String {
    match (left, right) {
        (Some(a), Some(b)) if diffable(a, b) => {
            diff_text(&label(a), &a.diff_text(), &label(b), &b.diff_text())
        }
        _ => DIFF_UNAVAILABLE.to_string(),
    }
}

pub fn diffable(a: &ResponseSnapshot, b: &ResponseSnapshot) -> bool {
    a.ready && b.ready && a.id != b.id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::snapshot::Tab;

    fn snap(body: &str) -> ResponseSnapshot {
        ResponseSnapshot::summary_view("req", "").with_projection(Tab::Pretty, body)
    }

    #[test]
    fn test_identical_bodies() {
        let a = snap("{\"a\": 1}");
        let b = snap("{\"a\": 1}");
        assert_eq!(diff_snapshots(Some(&a), Some(&b)), DIFF_IDENTICAL);
    }

    #[test]
    fn test_changed_line_marked() {
        let a = snap("one\ntwo\n");
        let b = snap("one\nthree\n");
        let text = diff_snapshots(Some(&a), Some(&b));
        assert!(text.contains("- two"));
        assert!(text.contains("+ three"));
        assert!(text.contains("  one"));
    }

    #[test]
    fn test_unavailable_cases() {
        let a = snap("x");
        assert_eq!(diff_snapshots(Some(&a), None), DIFF_UNAVAILABLE);
        assert_eq!(diff_snapshots(Some(&a), Some(&a)), DIFF_UNAVAILABLE);
        let pending = ResponseSnapshot::pending("req", None);
        assert_eq!(diff_snapshots(Some(&a), Some(&pending)), DIFF_UNAVAILABLE);
    }
}
