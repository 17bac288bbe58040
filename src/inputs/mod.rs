//! Loaders for the collectors' snapshots.
//!
//! A bad record never aborts a load: it is skipped and surfaced as an
//! `InputIssue` so the run can report it alongside everything else.
mod chains;
mod scan;

#[cfg(test)]
pub use chains::parse_chain_links;
pub use chains::{chain_links_csv, load_chain_links, ChainLoad};
pub use scan::{load_scan, ScanLoad};

use anyhow::{anyhow, Context, Result};
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

/// Kind of problem found in an input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputIssueKind {
    /// A required field is missing or unusable; the record is skipped.
    InputMalformed,
    /// A chain link without OCI repository or resource; kept out of the index.
    IncompleteChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputIssue {
    pub kind: InputIssueKind,
    pub source: &'static str,
    /// Zero-based position of the record in its input.
    pub position: usize,
    pub reason: String,
}

impl InputIssue {
    pub fn malformed(source: &'static str, position: usize, reason: impl Into<String>) -> Self {
        Self {
            kind: InputIssueKind::InputMalformed,
            source,
            position,
            reason: reason.into(),
        }
    }
}

/// True for paths with a `.csv` extension, in any case.
pub fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// A scalar field exactly as written.
///
/// Plain scalars such as `ociVersion: 1.10` are read as text, never through a
/// float, so `1.10` stays `1.10`. Null and blank values are `None`.
pub(crate) fn scalar<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_option(ScalarText)
}

struct ScalarText;

impl<'de> Visitor<'de> for ScalarText {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar")
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(self)
    }

    fn visit_str<E: de::Error>(self, text: &str) -> std::result::Result<Self::Value, E> {
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

/// A record read as typed fields from its own YAML text.
pub(crate) trait Record: DeserializeOwned {
    /// Keys read through [`scalar`], aliases included.
    const KEYS: &'static [&'static str];
}

/// One list item: a usable record, or the reason it was skipped.
#[derive(Debug)]
pub(crate) enum Row<T> {
    Record(T),
    Skipped(String),
}

/// Why a row cannot be read as a record, if it cannot.
fn row_verdict(row: &Value, keys: &[&str]) -> Option<String> {
    let Value::Mapping(map) = row else {
        return Some("record is not a mapping".to_string());
    };
    for (key, value) in map {
        if !is_scalar(key) {
            return Some("record has a non-scalar key".to_string());
        }
        if let Some(key) = key.as_str().filter(|key| keys.contains(key)) {
            if !is_scalar(value) {
                return Some(format!("{key} is not a scalar"));
            }
        }
    }
    None
}

fn is_scalar(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => true,
        Value::Tagged(tagged) => is_scalar(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => false,
    }
}

/// Reads one row, or steps over it when it was already judged unusable.
struct RowSeed<T> {
    skip: Option<String>,
    record: PhantomData<T>,
}

impl<'de, T: Record> DeserializeSeed<'de> for RowSeed<T> {
    type Value = Row<T>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        match self.skip {
            Some(reason) => {
                IgnoredAny::deserialize(deserializer)?;
                Ok(Row::Skipped(reason))
            }
            None => T::deserialize(deserializer).map(Row::Record),
        }
    }
}

struct RowsSeed<T> {
    verdicts: Vec<Option<String>>,
    records: PhantomData<T>,
}

impl<'de, T: Record> DeserializeSeed<'de> for RowsSeed<T> {
    type Value = Vec<Row<T>>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, T: Record> Visitor<'de> for RowsSeed<T> {
    type Value = Vec<Row<T>>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of records")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut verdicts = self.verdicts.into_iter();
        let mut rows = Vec::new();
        while let Some(row) = seq.next_element_seed(RowSeed {
            skip: verdicts.next().flatten(),
            record: PhantomData,
        })? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// The list held under `key` of a mapping.
struct KeyedRows<T> {
    key: &'static str,
    rows: RowsSeed<T>,
}

impl<'de, T: Record> Visitor<'de> for KeyedRows<T> {
    type Value = Vec<Row<T>>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a mapping with `{}`", self.key)
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut seed = Some(self.rows);
        let mut rows = Vec::new();
        while let Some(key) = map.next_key::<String>()? {
            if key == self.key {
                if let Some(rows_seed) = seed.take() {
                    rows = map.next_value_seed(rows_seed)?;
                    continue;
                }
            }
            map.next_value::<IgnoredAny>()?;
        }
        Ok(rows)
    }
}

/// Records of a YAML (or JSON) input: a bare list, or a mapping holding the
/// list under `key`.
///
/// The document is parsed once as a `Value` to check its layout and judge
/// every row, then read again so fields keep their exact text. A row that
/// is not a mapping, or holds a nested value under one of `T::KEYS`, comes
/// back as `Row::Skipped` without touching its neighbours.
pub(crate) fn list_rows<T: Record>(text: &str, key: &'static str) -> Result<Vec<Row<T>>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let shape: Value = serde_yaml::from_str(text).context("parse YAML")?;
    let judge = |rows: &[Value]| RowsSeed::<T> {
        verdicts: rows.iter().map(|row| row_verdict(row, T::KEYS)).collect(),
        records: PhantomData,
    };
    let deserializer = serde_yaml::Deserializer::from_str(text);
    match &shape {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(rows) => judge(rows)
            .deserialize(deserializer)
            .context("read records"),
        Value::Mapping(map) => match map.get(key) {
            Some(Value::Sequence(rows)) => deserializer
                .deserialize_map(KeyedRows {
                    key,
                    rows: judge(rows),
                })
                .context("read records"),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(anyhow!("`{key}` must be a list")),
        },
        _ => Err(anyhow!("expected a list or a mapping with `{key}`")),
    }
}
