//! Lookup from normalized identifiers to component targets.
//!
//! Built once per run. Keys that resolve to more than one app are kept with
//! every app attached and recorded as collisions; nothing is overwritten.
use crate::model::{ChainLink, ComponentTarget};
use crate::normalize::{Normalizer, TokenSet};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A helmChart entry of a target, keyed by its normalized name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChartRef {
    pub app_id: String,
    pub chart: String,
    pub tokens: TokenSet,
}

/// A key shared by several apps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexCollision {
    pub vocabulary: &'static str,
    pub key: String,
    pub app_ids: Vec<String>,
}

#[derive(Debug, Default)]
pub struct CandidateIndex {
    charts: HashMap<String, Vec<ChartRef>>,
    apps: HashMap<String, BTreeSet<String>>,
    /// Primary chart per app: the chart named after the app, else the first one.
    primary_chart: BTreeMap<String, String>,
    links: Vec<IndexedLink>,
    collisions: Vec<IndexCollision>,
}

/// A complete chain link with its normalized vocabularies.
#[derive(Debug, Clone)]
pub struct IndexedLink {
    pub link: ChainLink,
    pub release: TokenSet,
    pub resource: TokenSet,
    pub hint: TokenSet,
}

impl CandidateIndex {
    pub fn build(
        normalizer: &Normalizer,
        targets: &[ComponentTarget],
        links: &[ChainLink],
    ) -> Self {
        let mut index = CandidateIndex::default();
        for target in targets {
            let app_tokens = normalizer.normalize(&target.app_id);
            if !app_tokens.is_empty() {
                index
                    .apps
                    .entry(app_tokens.key())
                    .or_default()
                    .insert(target.app_id.clone());
            }
            let mut primary: Option<(String, bool)> = None;
            for chart in target.chart_names() {
                let tokens = normalizer.normalize(chart);
                if tokens.is_empty() {
                    continue;
                }
                let named_after_app = tokens == app_tokens;
                match &primary {
                    None => primary = Some((chart.to_string(), named_after_app)),
                    Some((_, false)) if named_after_app => {
                        primary = Some((chart.to_string(), true));
                    }
                    Some(_) => {}
                }
                let refs = index.charts.entry(tokens.key()).or_default();
                if !refs
                    .iter()
                    .any(|existing| existing.app_id == target.app_id && existing.chart == chart)
                {
                    refs.push(ChartRef {
                        app_id: target.app_id.clone(),
                        chart: chart.to_string(),
                        tokens,
                    });
                }
            }
            if let Some((primary, _)) = primary {
                index.primary_chart.insert(target.app_id.clone(), primary);
            }
        }
        for refs in index.charts.values_mut() {
            refs.sort();
        }
        for link in links.iter().filter(|link| link.is_complete()) {
            index.links.push(IndexedLink {
                link: link.clone(),
                release: normalizer.normalize(&link.helm_release_name),
                resource: normalizer.normalize(link.resource_name.as_deref().unwrap_or_default()),
                hint: normalizer.normalize(link.component_path_hint.as_deref().unwrap_or_default()),
            });
        }
        index.links.sort_by(|a, b| a.link.cmp(&b.link));
        index.collisions = index.compute_collisions();
        index
    }

    fn compute_collisions(&self) -> Vec<IndexCollision> {
        let mut collisions = Vec::new();
        for (key, refs) in &self.charts {
            let apps: BTreeSet<&str> = refs.iter().map(|r| r.app_id.as_str()).collect();
            if apps.len() > 1 {
                collisions.push(IndexCollision {
                    vocabulary: "chart",
                    key: key.clone(),
                    app_ids: apps.into_iter().map(str::to_string).collect(),
                });
            }
        }
        for (key, apps) in &self.apps {
            if apps.len() > 1 {
                collisions.push(IndexCollision {
                    vocabulary: "app",
                    key: key.clone(),
                    app_ids: apps.iter().cloned().collect(),
                });
            }
        }
        collisions.sort_by(|a, b| (a.vocabulary, &a.key).cmp(&(b.vocabulary, &b.key)));
        collisions
    }

    /// Charts whose normalized name equals `tokens`.
    pub fn charts_for(&self, tokens: &TokenSet) -> &[ChartRef] {
        if tokens.is_empty() {
            return &[];
        }
        self.charts
            .get(&tokens.key())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every indexed chart, in key order.
    pub fn all_charts(&self) -> Vec<&ChartRef> {
        let mut keys: Vec<&String> = self.charts.keys().collect();
        keys.sort();
        keys.into_iter()
            .flat_map(|key| self.charts[key].iter())
            .collect()
    }

    /// App ids whose normalized directory name equals `tokens`.
    pub fn apps_for(&self, tokens: &TokenSet) -> Vec<&str> {
        if tokens.is_empty() {
            return Vec::new();
        }
        self.apps
            .get(&tokens.key())
            .map(|apps| apps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn primary_chart(&self, app_id: &str) -> Option<&str> {
        self.primary_chart.get(app_id).map(String::as_str)
    }

    /// The chart of `app_id` whose normalized name equals `tokens`.
    pub fn chart_in_app(&self, app_id: &str, tokens: &TokenSet) -> Option<&str> {
        self.charts_for(tokens)
            .iter()
            .find(|chart| chart.app_id == app_id)
            .map(|chart| chart.chart.as_str())
    }

    pub fn links(&self) -> &[IndexedLink] {
        &self.links
    }

    pub fn collisions(&self) -> &[IndexCollision] {
        &self.collisions
    }
}
