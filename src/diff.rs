//! Entry-level differences between a document before and after mutation.
use crate::model::ResourceEntry;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryDiff {
    pub added: Vec<ResourceEntry>,
    pub removed: Vec<ResourceEntry>,
}

impl EntryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Entries present on one side only. Entries are compared whole, so a new
/// tag shows up as one removal plus one addition.
pub fn diff_entries(before: &[ResourceEntry], after: &[ResourceEntry]) -> EntryDiff {
    EntryDiff {
        added: missing_from(after, before),
        removed: missing_from(before, after),
    }
}

/// Entries of `side` not matched one-to-one in `other`.
fn missing_from(side: &[ResourceEntry], other: &[ResourceEntry]) -> Vec<ResourceEntry> {
    let mut unclaimed: Vec<Option<&ResourceEntry>> = other.iter().map(Some).collect();
    side.iter()
        .filter(|entry| {
            match unclaimed
                .iter_mut()
                .find(|slot| slot.is_some_and(|candidate| candidate == *entry))
            {
                Some(slot) => {
                    *slot = None;
                    false
                }
                None => true,
            }
        })
        .cloned()
        .collect()
}
