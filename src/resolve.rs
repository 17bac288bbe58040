//! Turns match results into per-document work.
//!
//! Results are processed in a fixed order (by image sort key) so that name
//! collisions are settled the same way on every run: the last image in that
//! order keeps the name.
use crate::model::{
    Candidate, DeployedImage, MatchOutcome, MatchResult, ResourceEntry, OCI_IMAGE_KIND,
};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One image routed to one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedImage {
    pub image: DeployedImage,
    pub candidate: Candidate,
    pub entry: ResourceEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedImage {
    pub image: DeployedImage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguousImage {
    pub image: DeployedImage,
    pub candidates: Vec<Candidate>,
}

/// Two different workloads that would write the same entry name.
///
/// `merged` is set when both produced the same entry, so nothing was lost
/// beyond the second workload's label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameCollision {
    pub app_id: String,
    pub name: String,
    pub kept: String,
    pub dropped: String,
    pub merged: bool,
}

#[derive(Debug, Default)]
pub struct Resolution {
    /// Planned images per app, ordered by entry name.
    pub by_app: BTreeMap<String, Vec<PlannedImage>>,
    pub unmatched: Vec<UnresolvedImage>,
    pub ambiguous: Vec<AmbiguousImage>,
    pub name_collisions: Vec<NameCollision>,
    pub targets_without_matches: Vec<String>,
}

/// Group `results` by target app and synthesize their entries.
pub fn resolve(results: &[MatchResult], app_ids: &[String], semver_versions: bool) -> Resolution {
    let mut ordered: Vec<&MatchResult> = results.iter().collect();
    ordered.sort_by(|a, b| {
        a.image
            .sort_key()
            .cmp(&b.image.sort_key())
            .then_with(|| a.image.cmp(&b.image))
    });

    let mut resolution = Resolution::default();
    let mut planned: BTreeMap<String, BTreeMap<String, PlannedImage>> = BTreeMap::new();
    for result in ordered {
        let candidate = match &result.outcome {
            MatchOutcome::Matched(candidate) => candidate,
            MatchOutcome::Unmatched { reason } => {
                resolution.unmatched.push(UnresolvedImage {
                    image: result.image.clone(),
                    reason: reason.clone(),
                });
                continue;
            }
            MatchOutcome::Ambiguous { candidates } => {
                resolution.ambiguous.push(AmbiguousImage {
                    image: result.image.clone(),
                    candidates: candidates.clone(),
                });
                continue;
            }
        };
        let entry = synthesize_entry(&candidate.app_id, &result.image, semver_versions);
        let image = PlannedImage {
            image: result.image.clone(),
            candidate: candidate.clone(),
            entry,
        };
        let app = planned.entry(candidate.app_id.clone()).or_default();
        let Some(previous) = app.insert(image.entry.name.clone(), image) else {
            continue;
        };
        let kept = &app[&previous.entry.name];
        if previous.image == kept.image {
            continue;
        }
        let merged = previous.entry == kept.entry;
        if merged {
            tracing::info!(
                app = %candidate.app_id,
                name = %previous.entry.name,
                kept = %kept.image.label(),
                merged = %previous.image.label(),
                "identical entries merged"
            );
        } else {
            tracing::warn!(
                app = %candidate.app_id,
                name = %previous.entry.name,
                kept = %kept.image.label(),
                dropped = %previous.image.label(),
                "entry name collision"
            );
        }
        resolution.name_collisions.push(NameCollision {
            app_id: candidate.app_id.clone(),
            name: previous.entry.name.clone(),
            kept: kept.image.label(),
            dropped: previous.image.label(),
            merged,
        });
    }

    resolution.by_app = planned
        .into_iter()
        .map(|(app_id, images)| (app_id, images.into_values().collect()))
        .collect();
    let known: BTreeSet<&str> = app_ids.iter().map(String::as_str).collect();
    resolution.targets_without_matches = known
        .into_iter()
        .filter(|app_id| !resolution.by_app.contains_key(*app_id))
        .map(str::to_string)
        .collect();
    resolution
}

/// Entry name prefix for images synthesized into `app_id`.
pub fn entry_prefix(app_id: &str) -> String {
    format!("image-{}-", sanitize(app_id))
}

/// `image-{appId}-{containerName}` with version and reference from the image.
pub fn synthesize_entry(app_id: &str, image: &DeployedImage, semver_versions: bool) -> ResourceEntry {
    let version = if semver_versions {
        coerce_semver(&image.image.tag)
    } else {
        image.image.tag.clone()
    };
    ResourceEntry {
        name: format!("{}{}", entry_prefix(app_id), sanitize(&image.container_name)),
        kind: OCI_IMAGE_KIND.to_string(),
        version: Some(version),
        access_reference: Some(image.image.reference()),
    }
}

/// Lowercase, map anything outside `[a-z0-9-]` to `-`, collapse runs.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Replace characters outside `[.0-9a-zA-Z-]` with `-`; anything that is still
/// not a semantic version becomes `0.0.0+{sanitized}`.
pub fn coerce_semver(tag: &str) -> String {
    let invalid = Regex::new(r"[^.0-9a-zA-Z-]").expect("regex for version characters");
    let sanitized = invalid.replace_all(tag, "-").into_owned();
    let semver = Regex::new(concat!(
        r"^v?(0|[1-9]\d*)(?:\.(0|[1-9]\d*))?(?:\.(0|[1-9]\d*))?",
        r"(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?",
        r"(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
    ))
    .expect("regex for semantic versions");
    if semver.is_match(&sanitized) {
        sanitized
    } else {
        format!("0.0.0+{sanitized}")
    }
}
