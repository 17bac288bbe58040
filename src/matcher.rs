//! Scores deployed images against component targets.
//!
//! Each image is checked against four independent signals. The best candidate
//! per app survives; across apps the highest score wins, ties break on signal
//! precedence, and anything still tied is reported as ambiguous.
use crate::config::SyncConfig;
use crate::index::CandidateIndex;
use crate::model::{Candidate, DeployedImage, MatchOutcome, MatchResult, MatchSignal};
use crate::normalize::{edit_distance, Normalizer, TokenSet};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub struct Matcher<'a> {
    normalizer: &'a Normalizer,
    index: &'a CandidateIndex,
    config: &'a SyncConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(normalizer: &'a Normalizer, index: &'a CandidateIndex, config: &'a SyncConfig) -> Self {
        Self {
            normalizer,
            index,
            config,
        }
    }

    pub fn match_all(&self, images: &[DeployedImage]) -> Vec<MatchResult> {
        images.iter().map(|image| self.match_image(image)).collect()
    }

    pub fn match_image(&self, image: &DeployedImage) -> MatchResult {
        let candidates = self.candidates(image);
        let outcome = self.select(candidates);
        match &outcome {
            MatchOutcome::Matched(candidate) => tracing::debug!(
                image = %image.label(),
                app = %candidate.app_id,
                signal = %candidate.signal,
                score = candidate.score,
                "image matched"
            ),
            MatchOutcome::Unmatched { reason } => {
                tracing::debug!(image = %image.label(), %reason, "image unmatched")
            }
            MatchOutcome::Ambiguous { candidates } => tracing::debug!(
                image = %image.label(),
                candidates = candidates.len(),
                "image match ambiguous"
            ),
        }
        MatchResult {
            image: image.clone(),
            outcome,
        }
    }

    /// Best candidate per app across all signals, before thresholding.
    pub fn candidates(&self, image: &DeployedImage) -> Vec<Candidate> {
        let chart_tokens = self.normalizer.normalize(&image.helm_chart_label);
        let instance_tokens = self.normalizer.normalize(&image.app_instance_label);
        let mut best: BTreeMap<String, Candidate> = BTreeMap::new();

        for chart in self.index.charts_for(&chart_tokens) {
            self.offer(
                &mut best,
                &chart.app_id,
                Some(chart.chart.clone()),
                MatchSignal::ExactChart,
            );
        }

        if !chart_tokens.is_empty() {
            for chart in self.index.all_charts() {
                if chart.tokens != chart_tokens && self.is_fuzzy(&chart_tokens, &chart.tokens) {
                    self.offer(
                        &mut best,
                        &chart.app_id,
                        Some(chart.chart.clone()),
                        MatchSignal::FuzzyChart,
                    );
                }
            }
        }

        for link in self.index.links() {
            let correlated = (!instance_tokens.is_empty() && link.release == instance_tokens)
                || (!chart_tokens.is_empty()
                    && (link.resource == chart_tokens || link.release == chart_tokens));
            if !correlated {
                continue;
            }
            for app_id in self.index.apps_for(&link.hint) {
                let chart = self
                    .index
                    .chart_in_app(app_id, &link.resource)
                    .or_else(|| self.index.primary_chart(app_id))
                    .map(str::to_string);
                self.offer(&mut best, app_id, chart, MatchSignal::PathHint);
            }
        }

        for app_id in self.index.apps_for(&instance_tokens) {
            let chart = self
                .index
                .chart_in_app(app_id, &instance_tokens)
                .or_else(|| self.index.primary_chart(app_id))
                .map(str::to_string);
            self.offer(&mut best, app_id, chart, MatchSignal::AppInstance);
        }

        best.into_values().collect()
    }

    fn offer(
        &self,
        best: &mut BTreeMap<String, Candidate>,
        app_id: &str,
        chart: Option<String>,
        signal: MatchSignal,
    ) {
        let candidate = Candidate {
            app_id: app_id.to_string(),
            chart,
            signal,
            score: self.config.signal_scores.score(signal),
        };
        match best.get(app_id) {
            Some(existing) if rank(existing, &candidate) != Ordering::Greater => {}
            _ => {
                best.insert(app_id.to_string(), candidate);
            }
        }
    }

    fn select(&self, candidates: Vec<Candidate>) -> MatchOutcome {
        if candidates.is_empty() {
            return MatchOutcome::Unmatched {
                reason: "no signal matched any component".to_string(),
            };
        }
        let top_score = candidates
            .iter()
            .map(|candidate| candidate.score)
            .fold(f64::MIN, f64::max);
        let mut eligible: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| candidate.score >= self.config.min_score)
            .collect();
        if eligible.is_empty() {
            return MatchOutcome::Unmatched {
                reason: format!(
                    "best score {top_score:.2} below threshold {:.2}",
                    self.config.min_score
                ),
            };
        }
        eligible.sort_by(|a, b| rank(a, b).then_with(|| a.app_id.cmp(&b.app_id)));
        let top = eligible[0].clone();
        let tied: Vec<Candidate> = eligible
            .into_iter()
            .take_while(|candidate| rank(candidate, &top) == Ordering::Equal)
            .collect();
        if tied.len() > 1 {
            return MatchOutcome::Ambiguous { candidates: tied };
        }
        MatchOutcome::Matched(top)
    }

    fn is_fuzzy(&self, label: &TokenSet, chart: &TokenSet) -> bool {
        let fuzzy = &self.config.fuzzy;
        let (small, large) = if label.tokens().len() <= chart.tokens().len() {
            (label, chart)
        } else {
            (chart, label)
        };
        if small.is_subset_of(large) {
            let long_enough = small.tokens().len() > 1
                || small
                    .tokens()
                    .first()
                    .is_some_and(|token| token.chars().count() >= fuzzy.min_token_len);
            if long_enough {
                return true;
            }
        }
        let (a, b) = (label.key(), chart.key());
        a.chars().count() >= fuzzy.min_key_len
            && b.chars().count() >= fuzzy.min_key_len
            && edit_distance(&a, &b) <= fuzzy.max_edit_distance
    }
}

/// Orders better candidates first: higher score, then earlier signal.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.signal.precedence().cmp(&b.signal.precedence()))
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
