//! Correlation report: what matched, what did not, and what each document got.
//!
//! The same report backs `--json`, `--report` and the prose summary.
use crate::diff::EntryDiff;
use crate::document::{DocumentIssue, DocumentState};
use crate::index::IndexCollision;
use crate::inputs::InputIssue;
use crate::model::{DeployedImage, MatchSignal};
use crate::resolve::{AmbiguousImage, NameCollision, Resolution, UnresolvedImage};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Current schema version for the machine-readable report.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    Apply,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::DryRun => "dry_run",
            RunMode::Apply => "apply",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub images: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
    pub documents: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub input_issues: usize,
}

/// Matches routed to one app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSummary {
    pub app_id: String,
    pub matched: usize,
    pub signals: BTreeMap<MatchSignal, usize>,
    pub entries: Vec<String>,
}

/// Outcome of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub app_id: String,
    pub path: String,
    pub state: DocumentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<DocumentIssue>,
    pub diff: EntryDiff,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    pub schema_version: u32,
    pub mode: RunMode,
    pub inputs_hash: String,
    pub totals: Totals,
    pub apps: Vec<AppSummary>,
    pub unmatched: Vec<UnresolvedImage>,
    pub ambiguous: Vec<AmbiguousImage>,
    pub name_collisions: Vec<NameCollision>,
    pub targets_without_matches: Vec<String>,
    pub index_collisions: Vec<IndexCollision>,
    pub input_issues: Vec<InputIssue>,
    pub documents: Vec<DocumentReport>,
}

/// Everything a run produced, gathered for the report.
pub struct ReportInputs {
    pub mode: RunMode,
    pub inputs_hash: String,
    pub image_count: usize,
    pub resolution: Resolution,
    pub index_collisions: Vec<IndexCollision>,
    pub input_issues: Vec<InputIssue>,
    pub documents: Vec<DocumentReport>,
}

impl CorrelationReport {
    pub fn build(inputs: ReportInputs) -> Self {
        let ReportInputs {
            mode,
            inputs_hash,
            image_count,
            resolution,
            index_collisions,
            input_issues,
            mut documents,
        } = inputs;
        documents.sort_by(|a, b| a.app_id.cmp(&b.app_id));

        let apps: Vec<AppSummary> = resolution
            .by_app
            .iter()
            .map(|(app_id, planned)| {
                let mut signals = BTreeMap::new();
                for image in planned {
                    *signals.entry(image.candidate.signal).or_insert(0) += 1;
                }
                AppSummary {
                    app_id: app_id.clone(),
                    matched: planned.len(),
                    signals,
                    entries: planned.iter().map(|image| image.entry.name.clone()).collect(),
                }
            })
            .collect();

        let count_state = |state: DocumentState| {
            documents
                .iter()
                .filter(|document| document.state == state)
                .count()
        };
        let totals = Totals {
            images: image_count,
            matched: image_count - resolution.unmatched.len() - resolution.ambiguous.len(),
            unmatched: resolution.unmatched.len(),
            ambiguous: resolution.ambiguous.len(),
            documents: documents.len(),
            updated: count_state(DocumentState::Updated),
            unchanged: count_state(DocumentState::Unchanged),
            failed: count_state(DocumentState::Failed),
            input_issues: input_issues.len(),
        };

        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            mode,
            inputs_hash,
            totals,
            apps,
            unmatched: resolution.unmatched,
            ambiguous: resolution.ambiguous,
            name_collisions: resolution.name_collisions,
            targets_without_matches: resolution.targets_without_matches,
            index_collisions,
            input_issues,
            documents,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0
    }
}

/// Hash labelled inputs in order; absent inputs hash as `missing:{label}`.
pub fn inputs_hash(parts: &[(&str, Option<&[u8]>)]) -> String {
    let mut hasher = Sha256::new();
    for (label, bytes) in parts {
        match bytes {
            Some(bytes) => {
                hasher.update(b"file:");
                hasher.update(label.as_bytes());
                hasher.update(bytes);
            }
            None => {
                hasher.update(b"missing:");
                hasher.update(label.as_bytes());
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Header of the correlation export, in column order.
const CORRELATION_COLUMNS: [&str; 13] = [
    "Deployed_Resource_Name",
    "Deployed_Resource_Type",
    "Deployed_Namespace",
    "Deployed_Container_Name",
    "Deployed_Helm_Chart",
    "Deployed_App_Instance",
    "Deployed_OCI_URL",
    "Deployed_OCI_Version",
    "Matched_App",
    "Matched_Chart_Resource",
    "Matched_Entry",
    "Match_Signal",
    "Match_Reason",
];

/// One image's row; fields follow `CORRELATION_COLUMNS`.
#[derive(Serialize)]
struct CorrelationRow<'a> {
    resource_name: &'a str,
    resource_kind: &'a str,
    namespace: &'a str,
    container_name: &'a str,
    helm_chart: &'a str,
    app_instance: &'a str,
    oci_url: String,
    oci_version: &'a str,
    app_id: &'a str,
    chart: &'a str,
    entry: &'a str,
    signal: String,
    reason: String,
}

impl<'a> CorrelationRow<'a> {
    fn deployed(image: &'a DeployedImage, reason: String) -> Self {
        let oci_url = if image.image.registry.is_empty() {
            image.image.name.clone()
        } else {
            format!("{}/{}", image.image.registry, image.image.name)
        };
        Self {
            resource_name: &image.resource_name,
            resource_kind: image.resource_kind.as_str(),
            namespace: &image.namespace,
            container_name: &image.container_name,
            helm_chart: &image.helm_chart_label,
            app_instance: &image.app_instance_label,
            oci_url,
            oci_version: &image.image.tag,
            app_id: "",
            chart: "",
            entry: "",
            signal: String::new(),
            reason,
        }
    }
}

/// Every scanned image with the app it went to, or why it went nowhere.
/// Rows follow the image sort order.
pub fn correlation_csv(resolution: &Resolution) -> Result<String> {
    let mut rows: Vec<(&DeployedImage, CorrelationRow<'_>)> = Vec::new();
    for planned in resolution.by_app.values().flatten() {
        let mut row = CorrelationRow::deployed(&planned.image, "matched".to_string());
        row.app_id = &planned.candidate.app_id;
        row.chart = planned.candidate.chart.as_deref().unwrap_or_default();
        row.entry = &planned.entry.name;
        row.signal = planned.candidate.signal.to_string();
        rows.push((&planned.image, row));
    }
    for item in &resolution.unmatched {
        rows.push((&item.image, CorrelationRow::deployed(&item.image, item.reason.clone())));
    }
    for item in &resolution.ambiguous {
        let apps: Vec<&str> = item
            .candidates
            .iter()
            .map(|candidate| candidate.app_id.as_str())
            .collect();
        let reason = format!("ambiguous between {}", apps.join(", "));
        rows.push((&item.image, CorrelationRow::deployed(&item.image, reason)));
    }
    rows.sort_by(|(a, _), (b, _)| a.sort_key().cmp(&b.sort_key()).then_with(|| a.cmp(b)));

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(CORRELATION_COLUMNS)
        .context("write correlation header")?;
    for (_, row) in &rows {
        writer.serialize(row).context("write correlation row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("flush correlation CSV: {}", err.error()))?;
    String::from_utf8(bytes).context("correlation CSV is not UTF-8")
}

/// Print the report as prose on stdout.
pub fn print_report(report: &CorrelationReport) {
    let totals = &report.totals;
    println!("mode: {}", report.mode.as_str());
    println!(
        "images: {} (matched {}, unmatched {}, ambiguous {})",
        totals.images, totals.matched, totals.unmatched, totals.ambiguous
    );
    println!(
        "documents: {} (updated {}, unchanged {}, failed {})",
        totals.documents, totals.updated, totals.unchanged, totals.failed
    );
    if !report.apps.is_empty() {
        println!("apps:");
        for app in &report.apps {
            let signals: Vec<String> = app
                .signals
                .iter()
                .map(|(signal, count)| format!("{signal} {count}"))
                .collect();
            println!("  - {}: {} image(s) [{}]", app.app_id, app.matched, signals.join(", "));
        }
    }
    let changed: Vec<&DocumentReport> = report
        .documents
        .iter()
        .filter(|document| document.state != DocumentState::Unchanged || document.issue.is_some())
        .collect();
    if !changed.is_empty() {
        println!("documents:");
        for document in changed {
            println!(
                "  - {}: {} (+{} -{})",
                document.app_id,
                document.state,
                document.diff.added.len(),
                document.diff.removed.len()
            );
            if let Some(issue) = &document.issue {
                println!("      {issue}");
            }
            for entry in &document.diff.removed {
                println!(
                    "      - {} {}",
                    entry.name,
                    entry.version.as_deref().unwrap_or("-")
                );
            }
            for entry in &document.diff.added {
                println!(
                    "      + {} {}",
                    entry.name,
                    entry.version.as_deref().unwrap_or("-")
                );
            }
        }
    }
    if !report.unmatched.is_empty() {
        println!("unmatched:");
        for item in &report.unmatched {
            println!("  - {} ({}): {}", item.image.label(), item.image.image, item.reason);
        }
    }
    if !report.ambiguous.is_empty() {
        println!("ambiguous:");
        for item in &report.ambiguous {
            let apps: Vec<&str> = item
                .candidates
                .iter()
                .map(|candidate| candidate.app_id.as_str())
                .collect();
            println!("  - {}: {}", item.image.label(), apps.join(", "));
        }
    }
    if !report.name_collisions.is_empty() {
        println!("name collisions:");
        for collision in &report.name_collisions {
            let outcome = if collision.merged { "merged" } else { "dropped" };
            println!(
                "  - {}/{}: kept {}, {} {}",
                collision.app_id, collision.name, collision.kept, outcome, collision.dropped
            );
        }
    }
    if !report.targets_without_matches.is_empty() {
        println!(
            "targets without matches: {}",
            report.targets_without_matches.join(", ")
        );
    }
    if !report.index_collisions.is_empty() {
        println!("index collisions:");
        for collision in &report.index_collisions {
            println!(
                "  - {} {}: {}",
                collision.vocabulary,
                collision.key,
                collision.app_ids.join(", ")
            );
        }
    }
    if !report.input_issues.is_empty() {
        println!("input issues:");
        for issue in &report.input_issues {
            println!(
                "  - {} #{}: {:?} {}",
                issue.source, issue.position, issue.kind, issue.reason
            );
        }
    }
}
