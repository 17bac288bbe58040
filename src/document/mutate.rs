use super::{Document, DocumentIssue, DocumentIssueKind, EntryNode, Node};
use crate::model::{ResourceEntry, OCI_ARTIFACT_ACCESS};
use serde_yaml::Value;
use std::collections::BTreeSet;

/// Entries to place directly after one helmChart entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub anchor: String,
    pub entries: Vec<ResourceEntry>,
}

/// Everything one run wants to change in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationPlan {
    pub insertions: Vec<Insertion>,
    /// When set, ociImage entries with this name prefix that the run does not
    /// produce again are dropped.
    pub prune_prefix: Option<String>,
}

impl MutationPlan {
    pub fn is_empty(&self) -> bool {
        self.insertions.iter().all(|insertion| insertion.entries.is_empty())
            && self.prune_prefix.is_none()
    }

    fn produced_names(&self) -> BTreeSet<&str> {
        self.insertions
            .iter()
            .flat_map(|insertion| insertion.entries.iter())
            .map(|entry| entry.name.as_str())
            .collect()
    }
}

/// Apply `plan` to `document`, returning the validated result.
///
/// Nothing is applied unless every anchor exists. ociImage entries carrying a
/// produced name are replaced rather than duplicated, so a second run with
/// unchanged inputs renders the same text.
pub fn mutate(document: &Document, plan: &MutationPlan) -> Result<Document, DocumentIssue> {
    if plan.is_empty() {
        return Ok(document.clone());
    }
    let missing: Vec<&str> = plan
        .insertions
        .iter()
        .filter(|insertion| !insertion.entries.is_empty())
        .map(|insertion| insertion.anchor.as_str())
        .filter(|anchor| {
            !document.nodes().iter().any(|node| {
                matches!(node, Node::Entry(node) if node.entry.is_helm_chart() && node.entry.name == *anchor)
            })
        })
        .collect();
    if !missing.is_empty() {
        return Err(DocumentIssue {
            kind: DocumentIssueKind::NoAnchorFound,
            message: format!("no helmChart entry named {}", missing.join(", ")),
        });
    }

    let produced = plan.produced_names();
    let removed = |entry: &ResourceEntry| {
        entry.is_oci_image()
            && (produced.contains(entry.name.as_str())
                || plan
                    .prune_prefix
                    .as_deref()
                    .is_some_and(|prefix| entry.name.starts_with(prefix)))
    };

    let indent = document.item_indent();
    let mut anchored: BTreeSet<&str> = BTreeSet::new();
    let mut nodes = Vec::with_capacity(document.nodes().len());
    let mut expected = Vec::new();
    for node in document.nodes() {
        let Node::Entry(entry_node) = node else {
            nodes.push(node.clone());
            continue;
        };
        let entry = &entry_node.entry;
        if removed(entry) {
            tracing::debug!(name = %entry.name, "dropping superseded image entry");
            continue;
        }
        expected.push(entry.clone());
        let insertions: Vec<&Insertion> = if entry.is_helm_chart() && anchored.insert(&entry.name) {
            plan.insertions
                .iter()
                .filter(|insertion| insertion.anchor == entry.name)
                .collect()
        } else {
            Vec::new()
        };
        let mut anchor = entry_node.clone();
        if !insertions.is_empty() && !anchor.text.ends_with('\n') {
            anchor.text.push('\n');
        }
        nodes.push(Node::Entry(anchor));
        for new_entry in insertions.into_iter().flat_map(|insertion| &insertion.entries) {
            expected.push(new_entry.clone());
            nodes.push(Node::Entry(EntryNode {
                entry: new_entry.clone(),
                text: render_entry(new_entry, indent),
            }));
        }
    }

    let rendered = Document::from_parts(nodes, indent).render();
    let reparsed = Document::parse(&rendered).map_err(|issue| {
        DocumentIssue::parse_failure(format!("updated document does not parse: {}", issue.message))
    })?;
    if reparsed.entries() != expected {
        return Err(DocumentIssue::parse_failure(
            "updated document does not hold the expected resources",
        ));
    }
    Ok(reparsed)
}

/// Render one entry as a block sequence item whose dash sits at `indent`.
pub fn render_entry(entry: &ResourceEntry, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let mut out = format!("{pad}- name: {}\n", yaml_scalar(&entry.name));
    out.push_str(&format!("{pad}  type: {}\n", yaml_scalar(&entry.kind)));
    if let Some(version) = &entry.version {
        out.push_str(&format!("{pad}  version: {}\n", quoted(version)));
    }
    if let Some(reference) = &entry.access_reference {
        out.push_str(&format!("{pad}  access:\n"));
        out.push_str(&format!("{pad}    type: {OCI_ARTIFACT_ACCESS}\n"));
        out.push_str(&format!("{pad}    imageReference: {}\n", yaml_scalar(reference)));
    }
    out
}

/// Plain when YAML would read the text back as the same string, else quoted.
fn yaml_scalar(text: &str) -> String {
    let plain = !text.is_empty()
        && text.starts_with(|c: char| c.is_ascii_alphanumeric())
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._/:@+-".contains(c))
        && matches!(serde_yaml::from_str::<Value>(text), Ok(Value::String(parsed)) if parsed == text);
    if plain {
        text.to_string()
    } else {
        quoted(text)
    }
}

fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
#[path = "mutate_tests.rs"]
mod tests;
