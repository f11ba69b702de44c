//! Importance scoring from engagement metrics.
//!
//! The score is a weighted sum of three metrics, each scaled into [0, 1]
//! against fixed bounds so that a record's score never depends on which
//! other records were ingested alongside it. Pageviews are scaled in log
//! space. Items with very few sitelinks are halved.

use serde::{Deserialize, Serialize};

use crate::types::EventRecord;

/// Immutable scoring parameters. `Default` is the production configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weight_sitelinks: f64,
    pub weight_pageviews: f64,
    pub weight_backlinks: f64,
    pub sitelinks_min: f64,
    pub sitelinks_max: f64,
    /// Upper bound on raw 30-day pageviews; scaled as `ln(1 + x)`.
    pub pageviews_max: f64,
    pub backlinks_min: f64,
    pub backlinks_max: f64,
    /// Backlink counts above this are clamped before scaling.
    pub backlinks_cap: u32,
    pub low_sitelinks_threshold: u32,
    pub low_sitelinks_multiplier: f64,
    pub decimals: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_sitelinks: 1.0 / 8.0,
            weight_pageviews: 1.0 / 2.0,
            weight_backlinks: 3.0 / 8.0,
            sitelinks_min: 0.0,
            sitelinks_max: 80.0,
            pageviews_max: 60_000.0,
            backlinks_min: 0.0,
            backlinks_max: 500.0,
            backlinks_cap: 500,
            low_sitelinks_threshold: 3,
            low_sitelinks_multiplier: 0.5,
            decimals: 4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    config: ScoringConfig,
}

impl ImportanceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, sitelinks: u32, pageviews_30d: u64, backlinks: u32) -> f64 {
        let c = &self.config;

        let s = scale(
            f64::from(sitelinks),
            c.sitelinks_min,
            c.sitelinks_max - c.sitelinks_min,
        );
        let p = scale(
            (pageviews_30d as f64).ln_1p(),
            0.0,
            c.pageviews_max.ln_1p(),
        );
        let b = scale(
            f64::from(backlinks.min(c.backlinks_cap)),
            c.backlinks_min,
            c.backlinks_max - c.backlinks_min,
        );

        let mut value = c.weight_sitelinks * s + c.weight_pageviews * p + c.weight_backlinks * b;
        if sitelinks < c.low_sitelinks_threshold {
            value *= c.low_sitelinks_multiplier;
        }
        round_to(value, c.decimals)
    }

    pub fn score_event(&self, event: &EventRecord) -> f64 {
        self.score(event.sitelink_count, event.pageviews_30d, event.backlink_count)
    }
}

fn scale(x: f64, lo: f64, range: f64) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }
    ((x - lo) / range).clamp(0.0, 1.0)
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturated_metrics_score_one() {
        let scorer = ImportanceScorer::default();
        assert_eq!(scorer.score(80, 60_000, 500), 1.0);
        assert_eq!(scorer.score(500, 10_000_000, 100_000), 1.0);
    }

    #[test]
    fn zero_metrics_score_zero() {
        assert_eq!(ImportanceScorer::default().score(0, 0, 0), 0.0);
    }

    #[test]
    fn low_sitelinks_are_halved() {
        let scorer = ImportanceScorer::default();
        let unpenalized = ImportanceScorer::new(ScoringConfig {
            low_sitelinks_multiplier: 1.0,
            ..ScoringConfig::default()
        });

        let penalized = scorer.score(1, 60_000, 500);
        let full = unpenalized.score(1, 60_000, 500);
        assert!((penalized - full / 2.0).abs() < 1e-4, "{penalized} vs {full}");

        // The threshold itself is not penalized.
        assert_eq!(scorer.score(3, 60_000, 500), unpenalized.score(3, 60_000, 500));
    }

    #[test]
    fn monotone_in_each_metric() {
        let scorer = ImportanceScorer::default();
        let steps_u32 = [0u32, 1, 2, 3, 10, 40, 80, 200];
        let steps_pv = [0u64, 1, 10, 500, 5_000, 60_000, 1_000_000];

        for &pv in &steps_pv {
            for &bl in &steps_u32 {
                let scores: Vec<f64> = steps_u32.iter().map(|&s| scorer.score(s, pv, bl)).collect();
                assert!(scores.windows(2).all(|w| w[0] <= w[1]), "sitelinks {scores:?}");
            }
        }
        for &s in &steps_u32 {
            let scores: Vec<f64> = steps_pv.iter().map(|&pv| scorer.score(s, pv, 50)).collect();
            assert!(scores.windows(2).all(|w| w[0] <= w[1]), "pageviews {scores:?}");
            let scores: Vec<f64> = [0u32, 10, 250, 500, 900]
                .iter()
                .map(|&bl| scorer.score(s, 1_000, bl))
                .collect();
            assert!(scores.windows(2).all(|w| w[0] <= w[1]), "backlinks {scores:?}");
        }
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let scorer = ImportanceScorer::default();
        for (s, pv, bl) in [(0, 0, 0), (2, 999_999, 9_999), (79, 59_999, 499), (u32::MAX, u64::MAX, u32::MAX)] {
            let score = scorer.score(s, pv, bl);
            assert!((0.0..=1.0).contains(&score), "{score}");
        }
    }

    #[test]
    fn rounded_to_configured_decimals() {
        let scorer = ImportanceScorer::default();
        let score = scorer.score(17, 1234, 77);
        assert_eq!(score, (score * 10_000.0).round() / 10_000.0);

        let coarse = ImportanceScorer::new(ScoringConfig {
            decimals: 1,
            ..ScoringConfig::default()
        });
        let score = coarse.score(17, 1234, 77);
        assert_eq!(score, (score * 10.0).round() / 10.0);
    }

    #[test]
    fn alternate_weights_change_result() {
        let pageviews_only = ImportanceScorer::new(ScoringConfig {
            weight_sitelinks: 0.0,
            weight_pageviews: 1.0,
            weight_backlinks: 0.0,
            ..ScoringConfig::default()
        });
        assert_eq!(pageviews_only.score(80, 60_000, 0), 1.0);
        assert_eq!(pageviews_only.score(80, 0, 500), 0.0);
    }

    #[test]
    fn event_score_uses_record_metrics() {
        let mut event = EventRecord::new("Q1");
        event.sitelink_count = 40;
        event.pageviews_30d = 2_000;
        event.backlink_count = 120;
        let scorer = ImportanceScorer::default();
        assert_eq!(scorer.score_event(&event), scorer.score(40, 2_000, 120));
    }
}
