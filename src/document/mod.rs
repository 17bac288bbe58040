//! Component constructor documents as ordered text nodes.
//!
//! The resource list is split into one node per entry, each carrying its exact
//! original text, with everything else kept as passthrough spans. Rendering
//! concatenates the spans, so untouched entries and comments survive byte for
//! byte. serde_yaml provides the semantic view that the spans are checked
//! against.
mod commit;
mod mutate;

pub use commit::write_atomic;
pub use mutate::{mutate, Insertion, MutationPlan};

use crate::inputs::scalar;
use crate::model::ResourceEntry;
use serde::de::{IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::marker::PhantomData;

/// Terminal state of one document after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Unchanged,
    Updated,
    Failed,
}

impl DocumentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentState::Unchanged => "unchanged",
            DocumentState::Updated => "updated",
            DocumentState::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentIssueKind {
    NoAnchorFound,
    DocumentParseFailure,
    WriteFailure,
}

/// Why a document was left alone or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentIssue {
    pub kind: DocumentIssueKind,
    pub message: String,
}

impl DocumentIssue {
    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self {
            kind: DocumentIssueKind::DocumentParseFailure,
            message: message.into(),
        }
    }
}

impl fmt::Display for DocumentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// One resource entry and the text it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryNode {
    pub entry: ResourceEntry,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Entry(EntryNode),
}

impl Node {
    pub fn text(&self) -> &str {
        match self {
            Node::Text(text) => text,
            Node::Entry(entry) => &entry.text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    nodes: Vec<Node>,
    /// Column of the `-` that starts each resource entry.
    item_indent: usize,
}

impl Document {
    /// Parse `text`, failing when the YAML is invalid, lacks
    /// `components[0].resources`, or lays the list out in a way the span
    /// scanner cannot follow (for example flow style).
    pub fn parse(text: &str) -> Result<Self, DocumentIssue> {
        let semantic = semantic_entries(text)?;
        let (nodes, item_indent) = scan_nodes(text);
        let found = nodes
            .iter()
            .filter(|node| matches!(node, Node::Entry(_)))
            .count();
        if found != semantic.len() {
            return Err(DocumentIssue::parse_failure(format!(
                "resource list layout not supported: found {found} block entries, YAML has {}",
                semantic.len()
            )));
        }
        let mut semantic = semantic.into_iter();
        let nodes = nodes
            .into_iter()
            .map(|node| match node {
                Node::Entry(mut entry) => {
                    if let Some(parsed) = semantic.next() {
                        entry.entry = parsed;
                    }
                    Node::Entry(entry)
                }
                other => other,
            })
            .collect();
        Ok(Self {
            nodes,
            item_indent: item_indent.unwrap_or(4),
        })
    }

    pub(crate) fn from_parts(nodes: Vec<Node>, item_indent: usize) -> Self {
        Self { nodes, item_indent }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn item_indent(&self) -> usize {
        self.item_indent
    }

    pub fn entries(&self) -> Vec<ResourceEntry> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Entry(entry) => Some(entry.entry.clone()),
                Node::Text(_) => None,
            })
            .collect()
    }

    pub fn render(&self) -> String {
        self.nodes.iter().map(Node::text).collect()
    }
}

/// Typed view of a constructor, read straight from the text so scalars keep
/// their exact spelling (`version: 1.10` stays `1.10`).
#[derive(Deserialize)]
struct ConstructorText {
    components: First<ComponentText>,
}

#[derive(Deserialize)]
struct ComponentText {
    #[serde(default)]
    resources: Option<Vec<ResourceText>>,
}

#[derive(Deserialize)]
struct ResourceText {
    #[serde(default, deserialize_with = "scalar")]
    name: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "scalar")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    version: Option<String>,
    #[serde(default)]
    access: Option<AccessText>,
}

#[derive(Deserialize)]
struct AccessText {
    #[serde(rename = "imageReference", default, deserialize_with = "scalar")]
    image_reference: Option<String>,
}

/// The first element of a list; the rest are skipped unread.
struct First<T>(Option<T>);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for First<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FirstVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for FirstVisitor<T> {
            type Value = First<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let first = seq.next_element()?;
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(First(first))
            }
        }

        deserializer.deserialize_seq(FirstVisitor(PhantomData))
    }
}

/// The layout is checked on a `Value` first, for clear errors; the entries
/// are then read from the typed view.
fn semantic_entries(text: &str) -> Result<Vec<ResourceEntry>, DocumentIssue> {
    let root: Value = serde_yaml::from_str(text)
        .map_err(|err| DocumentIssue::parse_failure(format!("invalid YAML: {err}")))?;
    let resources = root
        .get("components")
        .and_then(Value::as_sequence)
        .and_then(|components| components.first())
        .and_then(|component| component.get("resources"))
        .ok_or_else(|| DocumentIssue::parse_failure("missing components[0].resources"))?;
    let resources = match resources {
        Value::Sequence(items) => items.as_slice(),
        Value::Null => &[],
        _ => return Err(DocumentIssue::parse_failure("resources must be a list")),
    };
    if resources.is_empty() {
        return Ok(Vec::new());
    }
    for (position, item) in resources.iter().enumerate() {
        check_resource(position, item)?;
    }

    let typed: ConstructorText = serde_yaml::from_str(text).map_err(|err| {
        DocumentIssue::parse_failure(format!("unreadable resource entry: {err}"))
    })?;
    typed
        .components
        .0
        .and_then(|component| component.resources)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, resource)| {
            let name = resource.name.ok_or_else(|| {
                DocumentIssue::parse_failure(format!("resource #{position} has no name"))
            })?;
            Ok(ResourceEntry {
                name,
                kind: resource.kind.unwrap_or_default(),
                version: resource.version,
                access_reference: resource.access.and_then(|access| access.image_reference),
            })
        })
        .collect()
}

/// Fields read as text must hold scalars.
fn check_resource(position: usize, item: &Value) -> Result<(), DocumentIssue> {
    let nested = |value: Option<&Value>| {
        value.is_some_and(|value| matches!(value, Value::Sequence(_) | Value::Mapping(_)))
    };
    if !item.is_mapping() || nested(item.get("name")) {
        return Err(DocumentIssue::parse_failure(format!(
            "resource #{position} has no name"
        )));
    }
    for key in ["type", "version"] {
        if nested(item.get(key)) {
            return Err(DocumentIssue::parse_failure(format!(
                "resource #{position} {key} is not a scalar"
            )));
        }
    }
    match item.get("access") {
        None | Some(Value::Null) => Ok(()),
        Some(access) if access.is_mapping() && !nested(access.get("imageReference")) => Ok(()),
        Some(_) => Err(DocumentIssue::parse_failure(format!(
            "resource #{position} access has no scalar imageReference"
        ))),
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn is_item_start(line: &str, indent: usize) -> bool {
    if indent_of(line) != indent {
        return false;
    }
    let rest = line[indent..].trim_end();
    rest == "-" || rest.starts_with("- ")
}

/// Column of the `resources:` key when `line` opens the resource list.
fn resources_key_column(line: &str) -> Option<usize> {
    let indent = indent_of(line);
    let mut rest = &line[indent..];
    let mut column = indent;
    while let Some(stripped) = rest.strip_prefix("- ") {
        let skipped = stripped.len() - stripped.trim_start_matches(' ').len();
        column += 2 + skipped;
        rest = &stripped[skipped..];
    }
    let after = rest.strip_prefix("resources:")?;
    let after = after.trim();
    (after.is_empty() || after.starts_with('#')).then_some(column)
}

/// Split `text` into passthrough and entry nodes. Returns the item indent when
/// the resource list has block entries.
fn scan_nodes(text: &str) -> (Vec<Node>, Option<usize>) {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut nodes = Vec::new();
    let mut passthrough = String::new();

    let Some((resources_line, key_column)) = lines
        .iter()
        .enumerate()
        .find_map(|(idx, line)| resources_key_column(line).map(|column| (idx, column)))
    else {
        nodes.push(Node::Text(text.to_string()));
        return (nodes, None);
    };
    for line in &lines[..=resources_line] {
        passthrough.push_str(line);
    }

    let mut idx = resources_line + 1;
    let item_indent = lines[idx..]
        .iter()
        .find(|line| !is_blank_or_comment(line))
        .map(|line| (indent_of(line), *line))
        .filter(|(indent, line)| *indent >= key_column && is_item_start(line, *indent))
        .map(|(indent, _)| indent);
    let Some(item_indent) = item_indent else {
        for line in &lines[idx..] {
            passthrough.push_str(line);
        }
        nodes.push(Node::Text(passthrough));
        return (nodes, None);
    };

    while idx < lines.len() {
        let line = lines[idx];
        if is_item_start(line, item_indent) {
            if !passthrough.is_empty() {
                nodes.push(Node::Text(std::mem::take(&mut passthrough)));
            }
            let start = idx;
            idx += 1;
            while idx < lines.len() {
                let next = lines[idx];
                if is_blank_or_comment(next) || indent_of(next) > item_indent {
                    idx += 1;
                } else {
                    break;
                }
            }
            // Trailing blanks and comments separate entries; leave them outside.
            let mut end = idx;
            while end > start + 1 && is_blank_or_comment(lines[end - 1]) {
                end -= 1;
            }
            let text: String = lines[start..end].concat();
            nodes.push(Node::Entry(EntryNode {
                entry: ResourceEntry::default(),
                text,
            }));
            idx = end;
            continue;
        }
        if is_blank_or_comment(line) {
            passthrough.push_str(line);
            idx += 1;
            continue;
        }
        break;
    }
    for line in &lines[idx..] {
        passthrough.push_str(line);
    }
    if !passthrough.is_empty() {
        nodes.push(Node::Text(passthrough));
    }
    (nodes, Some(item_indent))
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
