//! Diffs two snapshots and formats the result for human consumption.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::equality::{equal, EqualityMode};
use crate::types::AtomId;
use crate::value::Value;

use super::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub atom_id: AtomId,
    pub name: Option<String>,
    pub kind: DiffKind,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub entries: Vec<DiffEntry>,
}

impl Diff {
    pub fn changes(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.kind != DiffKind::Unchanged)
    }

    pub fn has_changes(&self) -> bool {
        self.changes().next().is_some()
    }
}

pub fn diff(before: &Snapshot, after: &Snapshot, mode: EqualityMode) -> Diff {
    let ids: BTreeSet<AtomId> = before.state.keys().chain(after.state.keys()).copied().collect();
    let mut entries = Vec::with_capacity(ids.len());

    for id in ids {
        let name = after
            .names
            .get(&id)
            .or_else(|| before.names.get(&id))
            .cloned();
        let entry = match (before.state.get(&id), after.state.get(&id)) {
            (None, Some(v)) => DiffEntry {
                atom_id: id,
                name,
                kind: DiffKind::Added,
                before: None,
                after: Some(v.clone()),
            },
            (Some(v), None) => DiffEntry {
                atom_id: id,
                name,
                kind: DiffKind::Removed,
                before: Some(v.clone()),
                after: None,
            },
            (Some(a), Some(b)) => DiffEntry {
                atom_id: id,
                name,
                kind: if equal(mode, a, b) {
                    DiffKind::Unchanged
                } else {
                    DiffKind::Modified
                },
                before: Some(a.clone()),
                after: Some(b.clone()),
            },
            (None, None) => unreachable!("id came from the union of both key sets"),
        };
        entries.push(entry);
    }

    Diff { entries }
}

#[derive(Debug, Clone, Copy)]
pub enum DiffFormat {
    Tree,
    List,
    Json,
    Html,
    Markdown,
}

pub fn format_diff(diff: &Diff, format: DiffFormat) -> String {
    match format {
        DiffFormat::Tree => format_tree(diff),
        DiffFormat::List => format_list(diff),
        DiffFormat::Json => format_json(diff),
        DiffFormat::Html => format_html(diff),
        DiffFormat::Markdown => format_markdown(diff),
    }
}

fn label(entry: &DiffEntry) -> String {
    entry.name.clone().unwrap_or_else(|| entry.atom_id.to_string())
}

fn symbol(kind: DiffKind) -> &'static str {
    match kind {
        DiffKind::Added => "+",
        DiffKind::Removed => "-",
        DiffKind::Modified => "~",
        DiffKind::Unchanged => "=",
    }
}

fn format_tree(diff: &Diff) -> String {
    let mut out = String::new();
    for entry in diff.changes() {
        let _ = writeln!(out, "{} {}", symbol(entry.kind), label(entry));
        match entry.kind {
            DiffKind::Modified => {
                let _ = writeln!(out, "  before: {:?}", entry.before);
                let _ = writeln!(out, "  after:  {:?}", entry.after);
            }
            DiffKind::Added => {
                let _ = writeln!(out, "  value: {:?}", entry.after);
            }
            DiffKind::Removed => {
                let _ = writeln!(out, "  value: {:?}", entry.before);
            }
            DiffKind::Unchanged => {}
        }
    }
    out
}

fn format_list(diff: &Diff) -> String {
    diff.changes()
        .map(|e| format!("{} {}", symbol(e.kind), label(e)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_json(diff: &Diff) -> String {
    let entries: Vec<serde_json::Value> = diff
        .changes()
        .map(|e| {
            serde_json::json!({
                "atomId": e.atom_id,
                "name": e.name,
                "kind": format!("{:?}", e.kind).to_lowercase(),
                "before": e.before.as_ref().map(Value::to_json),
                "after": e.after.as_ref().map(Value::to_json),
            })
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_default()
}

fn format_html(diff: &Diff) -> String {
    let mut out = String::from("<ul class=\"nexus-diff\">\n");
    for entry in diff.changes() {
        let _ = writeln!(
            out,
            "  <li class=\"{:?}\">{}</li>",
            entry.kind,
            html_escape(&label(entry))
        );
    }
    out.push_str("</ul>\n");
    out
}

fn format_markdown(diff: &Diff) -> String {
    let mut out = String::from("| Atom | Change |\n|---|---|\n");
    for entry in diff.changes() {
        let _ = writeln!(out, "| {} | {:?} |", label(entry), entry.kind);
    }
    out
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn diff_detects_added_removed_and_modified() {
        let before = Snapshot::new(
            HashMap::from([(1, Value::Int(1)), (2, Value::Int(2))]),
            HashMap::new(),
        );
        let after = Snapshot::new(
            HashMap::from([(1, Value::Int(1)), (3, Value::Int(3))]),
            HashMap::new(),
        );
        let d = diff(&before, &after, EqualityMode::Deep);

        let kind_of = |id: AtomId| d.entries.iter().find(|e| e.atom_id == id).unwrap().kind;
        assert_eq!(kind_of(1), DiffKind::Unchanged);
        assert_eq!(kind_of(2), DiffKind::Removed);
        assert_eq!(kind_of(3), DiffKind::Added);
    }

    #[test]
    fn modified_entry_detected_on_value_change() {
        let before = Snapshot::new(HashMap::from([(1, Value::Int(1))]), HashMap::new());
        let after = Snapshot::new(HashMap::from([(1, Value::Int(2))]), HashMap::new());
        let d = diff(&before, &after, EqualityMode::Deep);
        assert_eq!(d.entries[0].kind, DiffKind::Modified);
    }

    #[test]
    fn has_changes_is_false_for_identical_snapshots() {
        let before = Snapshot::new(HashMap::from([(1, Value::Int(1))]), HashMap::new());
        let after = Snapshot::new(HashMap::from([(1, Value::Int(1))]), HashMap::new());
        let d = diff(&before, &after, EqualityMode::Deep);
        assert!(!d.has_changes());
    }

    #[test]
    fn all_formats_render_without_panicking() {
        let before = Snapshot::new(HashMap::from([(1, Value::Int(1))]), HashMap::new());
        let after = Snapshot::new(HashMap::from([(1, Value::Int(2))]), HashMap::new());
        let d = diff(&before, &after, EqualityMode::Deep);
        for format in [
            DiffFormat::Tree,
            DiffFormat::List,
            DiffFormat::Json,
            DiffFormat::Html,
            DiffFormat::Markdown,
        ] {
            assert!(!format_diff(&d, format).is_empty());
        }
    }
}
