//! Chain links from a KRO ResourceGraphDefinition.
//!
//! A HelmRelease names its OCIRepository through `chartRef.name`
//! (`${ <id>.metadata.name }`); the OCIRepository names its OCM Resource
//! through its `url` (`${ <id>.status.additional.?registry }`). The Resource
//! carries the component path hint and the chart resource name.
use crate::model::ChainLink;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const HELM_RELEASE_KIND: &str = "HelmRelease";
const OCI_REPOSITORY_KIND: &str = "OCIRepository";
const RESOURCE_KIND: &str = "Resource";
const OCM_DELIVERY_API: &str = "delivery.ocm.software/v1alpha1";

/// Counts printed after mapping a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    pub helm_releases: usize,
    pub oci_repositories: usize,
    pub resources: usize,
    /// Release, repository and resource all resolved.
    pub complete: usize,
    /// Repository resolved, resource not.
    pub partial: usize,
    pub unmapped_releases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainMapping {
    pub links: Vec<ChainLink>,
    pub summary: ChainSummary,
}

/// Graph resource with its `id` and `template`.
struct GraphNode<'a> {
    id: &'a str,
    template: &'a Value,
}

impl GraphNode<'_> {
    fn name(&self) -> String {
        text_at(self.template, &["metadata", "name"])
            .filter(|name| !name.contains("${"))
            .unwrap_or_else(|| self.id.to_string())
    }
}

pub fn load_rgd(path: &Path) -> Result<ChainMapping> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read resource graph {}", path.display()))?;
    map_chains(&text).with_context(|| format!("map resource graph {}", path.display()))
}

/// Resolve every HelmRelease in the graph to a chain link.
pub fn map_chains(text: &str) -> Result<ChainMapping> {
    let root: Value = serde_yaml::from_str(text).context("parse resource graph YAML")?;
    let resources = root
        .get("spec")
        .and_then(|spec| spec.get("resources"))
        .and_then(Value::as_sequence)
        .ok_or_else(|| anyhow!("resource graph has no spec.resources list"))?;

    let mut releases = Vec::new();
    let mut repositories = BTreeMap::new();
    let mut ocm_resources = BTreeMap::new();
    for item in resources {
        let (Some(id), Some(template)) = (item.get("id").and_then(Value::as_str), item.get("template"))
        else {
            continue;
        };
        let node = GraphNode { id, template };
        match template.get("kind").and_then(Value::as_str) {
            Some(HELM_RELEASE_KIND) => releases.push(node),
            Some(OCI_REPOSITORY_KIND) => {
                repositories.insert(id, node);
            }
            Some(RESOURCE_KIND)
                if template.get("apiVersion").and_then(Value::as_str) == Some(OCM_DELIVERY_API) =>
            {
                ocm_resources.insert(id, node);
            }
            _ => {}
        }
    }

    let chart_ref = Regex::new(r"\$\{\s*([a-zA-Z][a-zA-Z0-9]*)\s*\.metadata\.name\s*\}")
        .expect("regex for chartRef templates");
    let registry_ref =
        Regex::new(r"\$\{\s*([a-zA-Z][a-zA-Z0-9]*)\s*\.status\.additional\.\?registry\s*\}")
            .expect("regex for OCIRepository url templates");
    let referenced_id = |pattern: &Regex, raw: Option<String>| {
        raw.and_then(|raw| pattern.captures(&raw).map(|caps| caps[1].to_string()))
    };

    let mut mapping = ChainMapping {
        summary: ChainSummary {
            helm_releases: releases.len(),
            oci_repositories: repositories.len(),
            resources: ocm_resources.len(),
            ..ChainSummary::default()
        },
        ..ChainMapping::default()
    };
    for release in &releases {
        let mut link = ChainLink {
            helm_release_name: release.name(),
            oci_repository_name: None,
            resource_name: None,
            component_path_hint: None,
        };
        let repository = referenced_id(
            &chart_ref,
            text_at(release.template, &["spec", "chartRef", "name"]),
        )
        .and_then(|id| repositories.get(id.as_str()));
        let Some(repository) = repository else {
            tracing::debug!(release = release.id, "HelmRelease has no OCIRepository");
            mapping.summary.unmapped_releases.push(release.id.to_string());
            mapping.links.push(link);
            continue;
        };
        link.oci_repository_name = Some(repository.name());
        let resource = referenced_id(&registry_ref, text_at(repository.template, &["spec", "url"]))
            .and_then(|id| ocm_resources.get(id.as_str()));
        match resource {
            Some(resource) => {
                let by_reference = resource
                    .template
                    .get("spec")
                    .and_then(|spec| spec.get("resource"))
                    .and_then(|resource| resource.get("byReference"));
                link.resource_name =
                    by_reference.and_then(|reference| text_at(reference, &["resource", "name"]));
                link.component_path_hint = by_reference
                    .and_then(|reference| reference.get("referencePath"))
                    .and_then(Value::as_sequence)
                    .and_then(|path| path.first())
                    .and_then(|first| text_at(first, &["name"]));
                if link.is_complete() {
                    mapping.summary.complete += 1;
                } else {
                    mapping.summary.partial += 1;
                }
            }
            None => {
                tracing::debug!(repository = repository.id, "OCIRepository has no Resource");
                mapping.summary.partial += 1;
            }
        }
        mapping.links.push(link);
    }
    tracing::info!(
        releases = mapping.summary.helm_releases,
        complete = mapping.summary.complete,
        partial = mapping.summary.partial,
        unmapped = mapping.summary.unmapped_releases.len(),
        "resource graph mapped"
    );
    Ok(mapping)
}

/// Links in the shape the `sync --chains` loader reads.
pub fn links_yaml(links: &[ChainLink]) -> Result<String> {
    #[derive(Serialize)]
    struct LinksFile<'a> {
        links: &'a [ChainLink],
    }
    serde_yaml::to_string(&LinksFile { links }).context("serialize chain links")
}

fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::parse_chain_links;

    const RGD: &str = r#"
apiVersion: kro.run/v1alpha1
kind: ResourceGraphDefinition
metadata:
  name: opendesk
spec:
  resources:
    - id: jitsiRelease
      template:
        apiVersion: helm.toolkit.fluxcd.io/v2
        kind: HelmRelease
        metadata:
          name: jitsi
        spec:
          chartRef:
            kind: OCIRepository
            name: ${ jitsiOCIRepository.metadata.name }
    - id: jitsiOCIRepository
      template:
        apiVersion: source.toolkit.fluxcd.io/v1beta2
        kind: OCIRepository
        metadata:
          name: jitsi-chart
        spec:
          url: oci://${ jitsiResourceChart.status.additional.?registry }/${ jitsiResourceChart.status.additional.?repository }
    - id: jitsiResourceChart
      template:
        apiVersion: delivery.ocm.software/v1alpha1
        kind: Resource
        metadata:
          name: jitsi-resource
        spec:
          resource:
            byReference:
              referencePath:
                - name: jitsi
              resource:
                name: helm-chart-opendesk-jitsi
    - id: xwikiRelease
      template:
        kind: HelmRelease
        metadata:
          name: xwiki
        spec:
          chartRef:
            name: ${ xwikiOCIRepository.metadata.name }
    - id: xwikiOCIRepository
      template:
        kind: OCIRepository
        metadata:
          name: xwiki-chart
        spec:
          url: oci://registry.example.com/charts/xwiki
    - id: notesRelease
      template:
        kind: HelmRelease
        metadata:
          name: ${ schema.spec.prefix }-notes
        spec:
          chartRef:
            name: notes-static
"#;

    #[test]
    fn resolves_complete_partial_and_unmapped_chains() {
        let mapping = map_chains(RGD).expect("map");
        assert_eq!(mapping.summary.helm_releases, 3);
        assert_eq!(mapping.summary.oci_repositories, 2);
        assert_eq!(mapping.summary.resources, 1);
        assert_eq!(mapping.summary.complete, 1);
        assert_eq!(mapping.summary.partial, 1);
        assert_eq!(mapping.summary.unmapped_releases, vec!["notesRelease"]);

        let jitsi = &mapping.links[0];
        assert_eq!(jitsi.helm_release_name, "jitsi");
        assert_eq!(jitsi.oci_repository_name.as_deref(), Some("jitsi-chart"));
        assert_eq!(jitsi.resource_name.as_deref(), Some("helm-chart-opendesk-jitsi"));
        assert_eq!(jitsi.component_path_hint.as_deref(), Some("jitsi"));
        assert_eq!(mapping.links[2].helm_release_name, "notesRelease");
    }

    #[test]
    fn exported_links_load_back() {
        let mapping = map_chains(RGD).expect("map");
        let yaml = links_yaml(&mapping.links).expect("yaml");
        let load = parse_chain_links(&yaml).expect("parse");
        assert_eq!(load.links, mapping.links);
        assert_eq!(load.issues.len(), 2);
    }

    #[test]
    fn graph_without_resources_is_an_error() {
        assert!(map_chains("spec: {}\n").is_err());
    }
}
