//! Sync step: scan → index → match → resolve → mutate → report.
use crate::cli::SyncArgs;
use crate::config::load_config;
use crate::diff::{diff_entries, EntryDiff};
use crate::document::{
    mutate, write_atomic, DocumentIssue, DocumentIssueKind, DocumentState, Insertion,
    MutationPlan,
};
use crate::index::CandidateIndex;
use crate::inputs::{load_chain_links, load_scan, ChainLoad};
use crate::matcher::Matcher;
use crate::model::{ComponentTarget, ResourceEntry};
use crate::normalize::Normalizer;
use crate::report::{
    correlation_csv, inputs_hash, print_report, CorrelationReport, DocumentReport, ReportInputs,
    RunMode,
};
use crate::resolve::{entry_prefix, resolve, PlannedImage};
use crate::store::{discover_documents, load_document, LoadedDocument};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::thread;

/// Exit status when at least one document failed.
const EXIT_DOCUMENT_FAILED: u8 = 1;

/// Per-document settings shared by every worker.
#[derive(Debug, Clone, Copy)]
struct DocumentJob {
    mode: RunMode,
    prune: bool,
}

/// Run the sync step and print the report.
pub fn run_sync(args: &SyncArgs) -> Result<ExitCode> {
    let report = sync_report(args)?;

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{text}");
    } else {
        print_report(&report);
    }
    if let Some(path) = &args.report {
        let mut text = serde_json::to_string_pretty(&report).context("serialize report")?;
        text.push('\n');
        write_atomic(path, &text)?;
    }

    if report.has_failures() {
        return Ok(ExitCode::from(EXIT_DOCUMENT_FAILED));
    }
    Ok(ExitCode::SUCCESS)
}

/// Compute the report, writing documents unless this is a dry run.
fn sync_report(args: &SyncArgs) -> Result<CorrelationReport> {
    let config = load_config(args.config.as_deref())?;
    let hash = inputs_hash(&[
        ("scan", read_optional(Some(args.scan.as_path()))?.as_deref()),
        ("chains", read_optional(args.chains.as_deref())?.as_deref()),
        ("config", read_optional(args.config.as_deref())?.as_deref()),
    ]);

    let scan = load_scan(&args.scan)?;
    let chains = match &args.chains {
        Some(path) => load_chain_links(path)?,
        None => ChainLoad::default(),
    };
    let loaded = discover_documents(&args.apps_dir, &config.document_file_name)?
        .into_iter()
        .map(load_document)
        .collect::<Result<Vec<_>>>()?;
    let targets: Vec<ComponentTarget> = loaded.iter().filter_map(LoadedDocument::target).collect();

    let normalizer = Normalizer::from_config(&config);
    let index = CandidateIndex::build(&normalizer, &targets, &chains.links);
    for collision in index.collisions() {
        tracing::warn!(
            vocabulary = collision.vocabulary,
            key = %collision.key,
            apps = %collision.app_ids.join(","),
            "normalized key shared by several apps"
        );
    }
    let results = Matcher::new(&normalizer, &index, &config).match_all(&scan.images);
    let app_ids: Vec<String> = targets.iter().map(|target| target.app_id.clone()).collect();
    let resolution = resolve(&results, &app_ids, config.semver_versions);
    tracing::info!(
        images = results.len(),
        apps = resolution.by_app.len(),
        unmatched = resolution.unmatched.len(),
        ambiguous = resolution.ambiguous.len(),
        "images resolved"
    );
    if let Some(path) = &args.csv {
        write_atomic(path, &correlation_csv(&resolution)?)?;
        tracing::info!(path = %path.display(), "correlations exported");
    }

    let job = DocumentJob {
        mode: if args.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Apply
        },
        prune: args.prune,
    };
    let documents = process_documents(&loaded, &resolution.by_app, job, worker_count(args.jobs));

    let mut input_issues = scan.issues;
    input_issues.extend(chains.issues);
    Ok(CorrelationReport::build(ReportInputs {
        mode: job.mode,
        inputs_hash: hash,
        image_count: scan.images.len(),
        resolution,
        index_collisions: index.collisions().to_vec(),
        input_issues,
        documents,
    }))
}

fn read_optional(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    path.map(|path| fs::read(path).with_context(|| format!("read {}", path.display())))
        .transpose()
}

fn worker_count(requested: Option<usize>) -> usize {
    requested
        .or_else(|| thread::available_parallelism().ok().map(usize::from))
        .unwrap_or(1)
        .max(1)
}

/// Documents are independent; split them across scoped workers.
fn process_documents(
    loaded: &[LoadedDocument],
    planned: &BTreeMap<String, Vec<PlannedImage>>,
    job: DocumentJob,
    workers: usize,
) -> Vec<DocumentReport> {
    if loaded.is_empty() {
        return Vec::new();
    }
    let chunk_size = loaded.len().div_ceil(workers.min(loaded.len()));
    let mut reports: Vec<DocumentReport> = thread::scope(|scope| {
        let handles: Vec<_> = loaded
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|document| {
                            let images = planned
                                .get(&document.stored.app_id)
                                .map(Vec::as_slice)
                                .unwrap_or_default();
                            process_document(document, images, job)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    });
    reports.sort_by(|a, b| a.app_id.cmp(&b.app_id));
    reports
}

fn process_document(
    loaded: &LoadedDocument,
    images: &[PlannedImage],
    job: DocumentJob,
) -> DocumentReport {
    let app_id = &loaded.stored.app_id;
    let (state, issue, diff) = document_outcome(loaded, images, job);
    match (&state, &issue) {
        (DocumentState::Failed, Some(issue)) => {
            tracing::warn!(app = %app_id, %issue, "component constructor failed")
        }
        (_, Some(issue)) => tracing::info!(app = %app_id, %issue, "component constructor skipped"),
        _ => tracing::info!(
            app = %app_id,
            state = %state,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "component constructor processed"
        ),
    }
    DocumentReport {
        app_id: app_id.clone(),
        path: loaded.stored.path.display().to_string(),
        state,
        issue,
        diff,
    }
}

/// Unchanged with an issue means the document was deliberately left alone.
fn document_outcome(
    loaded: &LoadedDocument,
    images: &[PlannedImage],
    job: DocumentJob,
) -> (DocumentState, Option<DocumentIssue>, EntryDiff) {
    let document = match &loaded.parsed {
        Ok(document) => document,
        Err(issue) => return (DocumentState::Failed, Some(issue.clone()), EntryDiff::default()),
    };
    let plan = match mutation_plan(&loaded.stored.app_id, images, job.prune) {
        Ok(plan) => plan,
        Err(issue) => return (DocumentState::Unchanged, Some(issue), EntryDiff::default()),
    };
    let updated = match mutate(document, &plan) {
        Ok(updated) => updated,
        Err(issue) if issue.kind == DocumentIssueKind::NoAnchorFound => {
            return (DocumentState::Unchanged, Some(issue), EntryDiff::default())
        }
        Err(issue) => return (DocumentState::Failed, Some(issue), EntryDiff::default()),
    };
    let rendered = updated.render();
    if rendered == loaded.text {
        return (DocumentState::Unchanged, None, EntryDiff::default());
    }
    let diff = diff_entries(&document.entries(), &updated.entries());
    if job.mode == RunMode::Apply {
        if let Err(err) = write_atomic(&loaded.stored.path, &rendered) {
            let issue = DocumentIssue {
                kind: DocumentIssueKind::WriteFailure,
                message: format!("{err:#}"),
            };
            return (DocumentState::Failed, Some(issue), diff);
        }
    }
    (DocumentState::Updated, None, diff)
}

/// Group planned images under the helmChart entry each belongs to.
fn mutation_plan(
    app_id: &str,
    images: &[PlannedImage],
    prune: bool,
) -> std::result::Result<MutationPlan, DocumentIssue> {
    let mut by_anchor: BTreeMap<&str, Vec<ResourceEntry>> = BTreeMap::new();
    for image in images {
        let Some(anchor) = image.candidate.chart.as_deref() else {
            return Err(DocumentIssue {
                kind: DocumentIssueKind::NoAnchorFound,
                message: format!("{app_id} has no helmChart entry to anchor images"),
            });
        };
        by_anchor.entry(anchor).or_default().push(image.entry.clone());
    }
    Ok(MutationPlan {
        insertions: by_anchor
            .into_iter()
            .map(|(anchor, entries)| Insertion {
                anchor: anchor.to_string(),
                entries,
            })
            .collect(),
        prune_prefix: prune.then(|| entry_prefix(app_id)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, DeployedImage, ImageRef, MatchSignal, ResourceKind};
    use crate::resolve::synthesize_entry;
    use crate::store::StoredDocument;

    const DOC: &str = "components:\n  - name: x\n    resources:\n      - name: helm-chart-opendesk-jitsi\n        type: helmChart\n        version: 2.1.0\n";

    fn planned(chart: Option<&str>) -> PlannedImage {
        let image = DeployedImage {
            resource_name: "jitsi-jibri".to_string(),
            namespace: "opendesk".to_string(),
            resource_kind: ResourceKind::Deployment,
            container_name: "jibri".to_string(),
            image: ImageRef {
                registry: "registry.example.com".to_string(),
                name: "images/jibri".to_string(),
                tag: "stable-9955".to_string(),
                digest: None,
            },
            helm_chart_label: "opendesk-jitsi".to_string(),
            app_instance_label: "jitsi".to_string(),
        };
        PlannedImage {
            entry: synthesize_entry("jitsi", &image, false),
            image,
            candidate: Candidate {
                app_id: "jitsi".to_string(),
                chart: chart.map(str::to_string),
                signal: MatchSignal::ExactChart,
                score: 1.0,
            },
        }
    }

    fn loaded(dir: &Path, text: &str) -> LoadedDocument {
        let path = dir.join("component-constructor.yaml");
        fs::write(&path, text).expect("write");
        load_document(StoredDocument {
            app_id: "jitsi".to_string(),
            path,
        })
        .expect("load")
    }

    #[test]
    fn dry_run_reports_changes_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = loaded(dir.path(), DOC);
        let job = DocumentJob {
            mode: RunMode::DryRun,
            prune: false,
        };
        let (state, issue, diff) =
            document_outcome(&document, &[planned(Some("helm-chart-opendesk-jitsi"))], job);
        assert_eq!(state, DocumentState::Updated);
        assert!(issue.is_none());
        assert_eq!(diff.added.len(), 1);
        assert_eq!(
            fs::read_to_string(&document.stored.path).expect("read"),
            DOC
        );
    }

    #[test]
    fn apply_writes_and_second_pass_is_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job = DocumentJob {
            mode: RunMode::Apply,
            prune: false,
        };
        let images = [planned(Some("helm-chart-opendesk-jitsi"))];
        let first = loaded(dir.path(), DOC);
        let (state, _, _) = document_outcome(&first, &images, job);
        assert_eq!(state, DocumentState::Updated);

        let written = fs::read_to_string(&first.stored.path).expect("read");
        assert!(written.contains("image-jitsi-jibri"));
        let second = loaded(dir.path(), &written);
        let (state, issue, diff) = document_outcome(&second, &images, job);
        assert_eq!(state, DocumentState::Unchanged);
        assert!(issue.is_none());
        assert!(diff.is_empty());
    }

    #[test]
    fn failed_write_is_reported_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = loaded(dir.path(), DOC);
        // Replaced by a directory after it was read, so the rename cannot land.
        fs::remove_file(&document.stored.path).expect("remove document");
        fs::create_dir(&document.stored.path).expect("directory in its place");
        fs::write(document.stored.path.join("keep"), "kept\n").expect("seed directory");
        let job = DocumentJob {
            mode: RunMode::Apply,
            prune: false,
        };

        let (state, issue, diff) =
            document_outcome(&document, &[planned(Some("helm-chart-opendesk-jitsi"))], job);
        assert_eq!(state, DocumentState::Failed);
        let issue = issue.expect("write issue");
        assert_eq!(issue.kind, DocumentIssueKind::WriteFailure);
        assert!(issue.message.contains("component-constructor.yaml"), "{issue:?}");
        assert_eq!(diff.added.len(), 1);

        assert_eq!(
            fs::read_to_string(document.stored.path.join("keep")).expect("read kept"),
            "kept\n"
        );
        let names: Vec<String> = fs::read_dir(dir.path())
            .expect("list dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["component-constructor.yaml"]);
    }

    #[test]
    fn images_without_chart_leave_document_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = loaded(dir.path(), DOC);
        let job = DocumentJob {
            mode: RunMode::Apply,
            prune: false,
        };
        let (state, issue, _) = document_outcome(&document, &[planned(None)], job);
        assert_eq!(state, DocumentState::Unchanged);
        assert_eq!(issue.map(|issue| issue.kind), Some(DocumentIssueKind::NoAnchorFound));
    }

    #[test]
    fn unparseable_document_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let document = loaded(dir.path(), "components: [\n");
        let job = DocumentJob {
            mode: RunMode::DryRun,
            prune: false,
        };
        let (state, issue, _) = document_outcome(&document, &[], job);
        assert_eq!(state, DocumentState::Failed);
        assert_eq!(
            issue.map(|issue| issue.kind),
            Some(DocumentIssueKind::DocumentParseFailure)
        );
    }

    #[test]
    fn worker_count_is_at_least_one() {
        assert_eq!(worker_count(Some(0)), 1);
        assert_eq!(worker_count(Some(3)), 3);
        assert!(worker_count(None) >= 1);
    }
}
