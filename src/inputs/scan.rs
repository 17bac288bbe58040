use super::{list_rows, scalar, InputIssue, Record, Row};
use crate::model::{DeployedImage, ImageRef, ResourceKind};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const SOURCE: &str = "scan";
const DEFAULT_TAG: &str = "latest";
/// Pins in any other form are not digests and are ignored.
const DIGEST_PREFIX: &str = "sha256:";

/// Images that converted cleanly plus the records that did not.
#[derive(Debug, Default)]
pub struct ScanLoad {
    pub images: Vec<DeployedImage>,
    pub issues: Vec<InputIssue>,
}

/// Row shape written by the cluster scanner.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawImageRecord {
    #[serde(default, deserialize_with = "scalar")]
    resource_name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    namespace: Option<String>,
    #[serde(default, alias = "resourceKind", deserialize_with = "scalar")]
    resource_type: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    container_name: Option<String>,
    #[serde(default, alias = "helmChartLabel", deserialize_with = "scalar")]
    helm_chart: Option<String>,
    #[serde(default, alias = "appInstanceLabel", deserialize_with = "scalar")]
    app_instance: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    oci_url: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    oci_version: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    oci_pin: Option<String>,
    /// Full reference, used when `ociUrl` is absent.
    #[serde(default, deserialize_with = "scalar")]
    image: Option<String>,
}

impl Record for RawImageRecord {
    const KEYS: &'static [&'static str] = &[
        "resourceName",
        "namespace",
        "resourceType",
        "resourceKind",
        "containerName",
        "helmChart",
        "helmChartLabel",
        "appInstance",
        "appInstanceLabel",
        "ociUrl",
        "ociVersion",
        "ociPin",
        "image",
    ];
}

/// Read and convert a scan file.
pub fn load_scan(path: &Path) -> Result<ScanLoad> {
    let text = fs::read_to_string(path).with_context(|| format!("read scan {}", path.display()))?;
    parse_scan(&text).with_context(|| format!("parse scan {}", path.display()))
}

/// Parse scan YAML: a mapping with an `images` list, or a bare list.
pub fn parse_scan(text: &str) -> Result<ScanLoad> {
    let rows = list_rows::<RawImageRecord>(text, "images").context("read scan images")?;
    let mut load = ScanLoad::default();
    for (position, row) in rows.into_iter().enumerate() {
        let converted = match row {
            Row::Record(raw) => image_from_record(raw),
            Row::Skipped(reason) => Err(reason),
        };
        match converted {
            Ok(image) => load.images.push(image),
            Err(reason) => {
                tracing::warn!(position, %reason, "skipping malformed scan record");
                load.issues.push(InputIssue::malformed(SOURCE, position, reason));
            }
        }
    }
    tracing::info!(
        images = load.images.len(),
        malformed = load.issues.len(),
        "scan loaded"
    );
    Ok(load)
}

/// Convert one scan row, or explain why it is unusable.
fn image_from_record(raw: RawImageRecord) -> std::result::Result<DeployedImage, String> {
    let resource_name = raw
        .resource_name
        .ok_or_else(|| "missing resourceName".to_string())?;
    let namespace = raw.namespace.ok_or_else(|| "missing namespace".to_string())?;
    let kind_raw = raw
        .resource_type
        .ok_or_else(|| "missing resourceType".to_string())?;
    let resource_kind = ResourceKind::parse(&kind_raw)
        .ok_or_else(|| format!("unsupported resourceType {kind_raw:?}"))?;
    let container_name = raw
        .container_name
        .ok_or_else(|| "missing containerName".to_string())?;

    let image = match (raw.oci_url, raw.image) {
        (Some(url), _) => {
            let mut image = split_image_reference(&url)
                .ok_or_else(|| format!("unparseable ociUrl {url:?}"))?;
            if let Some(version) = raw.oci_version {
                image.tag = version;
            }
            if let Some(pin) = raw.oci_pin.filter(|pin| pin.starts_with(DIGEST_PREFIX)) {
                image.digest = Some(pin);
            }
            image
        }
        (None, Some(reference)) => split_image_reference(&reference)
            .ok_or_else(|| format!("unparseable image {reference:?}"))?,
        (None, None) => return Err("missing ociUrl".to_string()),
    };

    Ok(DeployedImage {
        resource_name,
        namespace,
        resource_kind,
        container_name,
        image,
        helm_chart_label: raw.helm_chart.unwrap_or_default(),
        app_instance_label: raw.app_instance.unwrap_or_default(),
    })
}

/// Split `[oci://][registry/]name[:tag][@digest]`. Tag defaults to `latest`.
pub fn split_image_reference(raw: &str) -> Option<ImageRef> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("oci://").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    let (rest, digest) = match trimmed.split_once('@') {
        Some((rest, digest)) if !digest.is_empty() => (rest, Some(digest.to_string())),
        Some(_) => return None,
        None => (trimmed, None),
    };
    let last_slash = rest.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    let (path, tag) = match rest[last_slash..].rfind(':') {
        Some(colon) => {
            let split = last_slash + colon;
            (&rest[..split], Some(rest[split + 1..].to_string()))
        }
        None => (rest, None),
    };
    let (registry, name) = match path.split_once('/') {
        Some((first, remainder))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), remainder.to_string())
        }
        _ => (String::new(), path.to_string()),
    };
    if name.is_empty() {
        return None;
    }
    Some(ImageRef {
        registry,
        name,
        tag: tag
            .filter(|tag| !tag.is_empty())
            .unwrap_or_else(|| DEFAULT_TAG.to_string()),
        digest,
    })
}
