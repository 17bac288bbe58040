//! Core records shared by every pipeline stage.
//!
//! Inputs are immutable once loaded; match results are produced fresh each run
//! and never persisted.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource kind OCM uses for Helm charts in a component constructor.
pub const HELM_CHART_KIND: &str = "helmChart";
/// Resource kind synthesized for deployed container images.
pub const OCI_IMAGE_KIND: &str = "ociImage";
/// Access type written for synthesized image entries.
pub const OCI_ARTIFACT_ACCESS: &str = "ociArtifact";

/// Workload kinds the cluster scanner reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Deployment,
    StatefulSet,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Deployment" => Some(ResourceKind::Deployment),
            "StatefulSet" => Some(ResourceKind::StatefulSet),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image reference split into its parts.
///
/// `registry` is empty when the scanner reported a bare repository name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ImageRef {
    pub registry: String,
    pub name: String,
    pub tag: String,
    pub digest: Option<String>,
}

impl ImageRef {
    /// Render `{registry}/{name}:{tag}[@{digest}]`.
    pub fn reference(&self) -> String {
        let mut out = String::new();
        if !self.registry.is_empty() {
            out.push_str(&self.registry);
            out.push('/');
        }
        out.push_str(&self.name);
        out.push(':');
        out.push_str(&self.tag);
        if let Some(digest) = &self.digest {
            out.push('@');
            out.push_str(digest);
        }
        out
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference())
    }
}

/// One container of one workload as seen in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedImage {
    pub resource_name: String,
    pub namespace: String,
    pub resource_kind: ResourceKind,
    pub container_name: String,
    pub image: ImageRef,
    pub helm_chart_label: String,
    pub app_instance_label: String,
}

impl DeployedImage {
    /// Stable ordering key used wherever images are sequenced.
    pub fn sort_key(&self) -> (&str, &str, &str, String) {
        (
            self.container_name.as_str(),
            self.resource_name.as_str(),
            self.namespace.as_str(),
            self.image.reference(),
        )
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}",
            self.namespace, self.resource_name, self.container_name
        )
    }
}

/// HelmRelease → OCIRepository → Resource triple from the chain mapper.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLink {
    pub helm_release_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci_repository_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_path_hint: Option<String>,
}

impl ChainLink {
    /// Links missing either end of the chain are kept out of the index.
    pub fn is_complete(&self) -> bool {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .is_some_and(|value| !value.is_empty())
        };
        present(&self.oci_repository_name) && present(&self.resource_name)
    }
}

/// A resource entry as it appears in a component constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub name: String,
    pub kind: String,
    pub version: Option<String>,
    pub access_reference: Option<String>,
}

impl ResourceEntry {
    pub fn is_helm_chart(&self) -> bool {
        self.kind == HELM_CHART_KIND
    }

    pub fn is_oci_image(&self) -> bool {
        self.kind == OCI_IMAGE_KIND
    }
}

/// One logical application and its existing resource list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentTarget {
    pub app_id: String,
    pub entries: Vec<ResourceEntry>,
}

impl ComponentTarget {
    /// Names of the helmChart entries, in document order.
    pub fn chart_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| entry.is_helm_chart())
            .map(|entry| entry.name.as_str())
    }
}

/// Which rule produced a match, in precedence order (earlier wins ties).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MatchSignal {
    ExactChart,
    FuzzyChart,
    PathHint,
    AppInstance,
}

impl MatchSignal {
    pub const ALL: [MatchSignal; 4] = [
        MatchSignal::ExactChart,
        MatchSignal::FuzzyChart,
        MatchSignal::PathHint,
        MatchSignal::AppInstance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSignal::ExactChart => "exact_chart",
            MatchSignal::FuzzyChart => "fuzzy_chart",
            MatchSignal::PathHint => "path_hint",
            MatchSignal::AppInstance => "app_instance",
        }
    }

    /// Lower is preferred.
    pub fn precedence(&self) -> u8 {
        match self {
            MatchSignal::ExactChart => 0,
            MatchSignal::FuzzyChart => 1,
            MatchSignal::PathHint => 2,
            MatchSignal::AppInstance => 3,
        }
    }
}

impl fmt::Display for MatchSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target candidate considered for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub app_id: String,
    /// helmChart entry the image belongs under, when the signal names one.
    pub chart: Option<String>,
    pub signal: MatchSignal,
    pub score: f64,
}

/// Why an image did not receive a target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched(Candidate),
    Unmatched { reason: String },
    Ambiguous { candidates: Vec<Candidate> },
}

/// Matcher output for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub image: DeployedImage,
    pub outcome: MatchOutcome,
}

#[cfg(test)]
impl MatchResult {
    pub fn matched(&self) -> Option<&Candidate> {
        match &self.outcome {
            MatchOutcome::Matched(candidate) => Some(candidate),
            _ => None,
        }
    }
}
