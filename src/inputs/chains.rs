use super::{is_csv, list_rows, scalar, InputIssue, InputIssueKind, Record, Row};
use crate::model::ChainLink;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SOURCE: &str = "chains";

/// Header of the mapper's CSV layout, in column order. Other columns are
/// ignored when reading.
const CSV_COLUMNS: [&str; 4] = [
    "HelmRelease_Name",
    "OCIRepository_Name",
    "Resource_ReferencePath",
    "Resource_ResourceName",
];

/// Parsed chain links. Incomplete links are kept here but flagged in `issues`.
#[derive(Debug, Default)]
pub struct ChainLoad {
    pub links: Vec<ChainLink>,
    pub issues: Vec<InputIssue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChainLink {
    #[serde(default, deserialize_with = "scalar")]
    helm_release_name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    oci_repository_name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    resource_name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    component_path_hint: Option<String>,
}

impl Record for RawChainLink {
    const KEYS: &'static [&'static str] = &[
        "helmReleaseName",
        "ociRepositoryName",
        "resourceName",
        "componentPathHint",
    ];
}

/// A CSV row. `Resource_ReferencePath` is the first referencePath name,
/// which is the component path hint.
#[derive(Debug, Default, Deserialize, Serialize)]
struct CsvChainRow {
    #[serde(rename = "HelmRelease_Name", default)]
    helm_release_name: Option<String>,
    #[serde(rename = "OCIRepository_Name", default)]
    oci_repository_name: Option<String>,
    #[serde(rename = "Resource_ReferencePath", default)]
    reference_path: Option<String>,
    #[serde(rename = "Resource_ResourceName", default)]
    resource_name: Option<String>,
}

impl From<CsvChainRow> for RawChainLink {
    fn from(row: CsvChainRow) -> Self {
        let present = |value: Option<String>| value.filter(|value| !value.is_empty());
        Self {
            helm_release_name: present(row.helm_release_name),
            oci_repository_name: present(row.oci_repository_name),
            resource_name: present(row.resource_name),
            component_path_hint: present(row.reference_path),
        }
    }
}

/// Load chain links; `.csv` files use the mapper's CSV layout, anything
/// else is read as YAML or JSON.
pub fn load_chain_links(path: &Path) -> Result<ChainLoad> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read chain links {}", path.display()))?;
    let load = if is_csv(path) {
        parse_chain_csv(&text)
    } else {
        parse_chain_links(&text)
    };
    load.with_context(|| format!("parse chain links {}", path.display()))
}

/// Accepts a list of links or a mapping with a `links` list (YAML or JSON).
pub fn parse_chain_links(text: &str) -> Result<ChainLoad> {
    let rows = list_rows::<RawChainLink>(text, "links").context("read chain links")?;
    let mut load = ChainLoad::default();
    for (position, row) in rows.into_iter().enumerate() {
        match row {
            Row::Record(raw) => push_link(&mut load, position, raw),
            Row::Skipped(reason) => load
                .issues
                .push(InputIssue::malformed(SOURCE, position, reason)),
        }
    }
    log_load(&load);
    Ok(load)
}

/// Reads the CSV layout with a header row; positions count data rows.
pub fn parse_chain_csv(text: &str) -> Result<ChainLoad> {
    let mut load = ChainLoad::default();
    if text.trim().is_empty() {
        return Ok(load);
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers = reader.headers().context("read chain links CSV header")?;
    if !headers.iter().any(|header| header == CSV_COLUMNS[0]) {
        bail!("chain links CSV has no {} column", CSV_COLUMNS[0]);
    }
    for (position, row) in reader.deserialize::<CsvChainRow>().enumerate() {
        match row {
            Ok(row) => push_link(&mut load, position, row.into()),
            Err(err) => load.issues.push(InputIssue::malformed(
                SOURCE,
                position,
                format!("unreadable row: {err}"),
            )),
        }
    }
    log_load(&load);
    Ok(load)
}

/// Links in the mapper's CSV layout, header first.
pub fn chain_links_csv(links: &[ChainLink]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(CSV_COLUMNS)
        .context("write chain links header")?;
    for link in links {
        writer
            .serialize(CsvChainRow {
                helm_release_name: Some(link.helm_release_name.clone()),
                oci_repository_name: link.oci_repository_name.clone(),
                reference_path: link.component_path_hint.clone(),
                resource_name: link.resource_name.clone(),
            })
            .context("write chain link row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("flush chain links CSV: {}", err.error()))?;
    String::from_utf8(bytes).context("chain links CSV is not UTF-8")
}

fn push_link(load: &mut ChainLoad, position: usize, raw: RawChainLink) {
    let Some(helm_release_name) = raw.helm_release_name else {
        load.issues
            .push(InputIssue::malformed(SOURCE, position, "missing helmReleaseName"));
        return;
    };
    let link = ChainLink {
        helm_release_name,
        oci_repository_name: raw.oci_repository_name,
        resource_name: raw.resource_name,
        component_path_hint: raw.component_path_hint,
    };
    if !link.is_complete() {
        load.issues.push(InputIssue {
            kind: InputIssueKind::IncompleteChain,
            source: SOURCE,
            position,
            reason: format!(
                "release {} lacks an OCI repository or resource",
                link.helm_release_name
            ),
        });
    }
    load.links.push(link);
}

fn log_load(load: &ChainLoad) {
    let malformed = load
        .issues
        .iter()
        .filter(|issue| issue.kind == InputIssueKind::InputMalformed)
        .count();
    tracing::info!(
        links = load.links.len(),
        malformed,
        incomplete = load.issues.len() - malformed,
        "chain links loaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mapping_with_links() {
        let text = r#"
links:
  - helmReleaseName: jitsi
    ociRepositoryName: jitsi-oci
    resourceName: helm-chart-opendesk-jitsi
    componentPathHint: jitsi
  - helmReleaseName: orphan
    componentPathHint: nubus
  - ociRepositoryName: nameless
"#;
        let load = parse_chain_links(text).expect("parse links");
        assert_eq!(load.links.len(), 2);
        assert!(load.links[0].is_complete());
        assert!(!load.links[1].is_complete());
        let kinds: Vec<InputIssueKind> = load.issues.iter().map(|issue| issue.kind).collect();
        assert_eq!(
            kinds,
            vec![InputIssueKind::IncompleteChain, InputIssueKind::InputMalformed]
        );
    }

    #[test]
    fn parses_mapper_csv_and_ignores_extra_columns() {
        let text = "\
HelmRelease_ID,HelmRelease_Name,ChartRef_Name,OCIRepository_ID,OCIRepository_Name,OCIRepository_URL,Resource_ID,Resource_Name,Resource_ReferencePath,Resource_ResourceName
jitsiRelease,jitsi,jitsi-chart,jitsiOCIRepository,jitsi-chart,oci://x,jitsiResource,jitsi-resource,jitsi,helm-chart-opendesk-jitsi
notesRelease,notes,notes-static,,,,,,,
nameless,,,,,,,,,
postgresRelease,postgres,postgres-chart,postgresOCI,postgres-chart,oci://y,postgresResource,pg,services,helm-chart-postgres-16.10
short,row
";
        let load = parse_chain_csv(text).expect("parse csv");
        assert_eq!(load.links.len(), 3);
        let jitsi = &load.links[0];
        assert_eq!(jitsi.helm_release_name, "jitsi");
        assert_eq!(jitsi.oci_repository_name.as_deref(), Some("jitsi-chart"));
        assert_eq!(jitsi.component_path_hint.as_deref(), Some("jitsi"));
        assert_eq!(jitsi.resource_name.as_deref(), Some("helm-chart-opendesk-jitsi"));
        assert!(jitsi.is_complete());
        assert_eq!(load.links[1].oci_repository_name, None);
        assert_eq!(
            load.links[2].resource_name.as_deref(),
            Some("helm-chart-postgres-16.10")
        );

        let issues: Vec<(InputIssueKind, usize)> = load
            .issues
            .iter()
            .map(|issue| (issue.kind, issue.position))
            .collect();
        assert_eq!(
            issues,
            vec![
                (InputIssueKind::IncompleteChain, 1),
                (InputIssueKind::InputMalformed, 2),
                (InputIssueKind::InputMalformed, 4),
            ]
        );
    }

    #[test]
    fn csv_without_release_column_is_an_error() {
        assert!(parse_chain_csv("Resource_ResourceName\nhelm-chart-x\n").is_err());
        assert!(parse_chain_csv("").expect("empty").links.is_empty());
    }

    #[test]
    fn written_csv_loads_back() {
        let load = parse_chain_links(
            "links:\n  - {helmReleaseName: jitsi, ociRepositoryName: jitsi-chart, resourceName: helm-chart-opendesk-jitsi, componentPathHint: jitsi}\n  - {helmReleaseName: orphan}\n",
        )
        .expect("parse links");
        let text = chain_links_csv(&load.links).expect("csv");
        assert_eq!(
            text.lines().next(),
            Some("HelmRelease_Name,OCIRepository_Name,Resource_ReferencePath,Resource_ResourceName")
        );
        let again = parse_chain_csv(&text).expect("parse csv");
        assert_eq!(again.links, load.links);
        assert_eq!(again.issues, load.issues);
    }

    #[test]
    fn chain_files_are_read_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("mappings.csv");
        fs::write(
            &csv_path,
            "HelmRelease_Name,OCIRepository_Name,Resource_ReferencePath,Resource_ResourceName\nxwiki,xwiki-chart,xwiki,helm-chart-xwiki\n",
        )
        .expect("write csv");
        let load = load_chain_links(&csv_path).expect("load csv");
        assert_eq!(load.links[0].component_path_hint.as_deref(), Some("xwiki"));

        let yaml_path = dir.path().join("links.yaml");
        fs::write(&yaml_path, "links:\n  - helmReleaseName: xwiki\n").expect("write yaml");
        let load = load_chain_links(&yaml_path).expect("load yaml");
        assert_eq!(load.links[0].helm_release_name, "xwiki");
    }

    #[test]
    fn parses_bare_json_list() {
        let text = r#"[{"helmReleaseName": "xwiki", "ociRepositoryName": "xwiki", "resourceName": "helm-chart-xwiki", "componentPathHint": "xwiki"}]"#;
        let load = parse_chain_links(text).expect("parse links");
        assert_eq!(load.links.len(), 1);
        assert!(load.issues.is_empty());
        assert_eq!(load.links[0].component_path_hint.as_deref(), Some("xwiki"));
    }
}
