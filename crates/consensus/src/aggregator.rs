//! Plurality voting over concurrently-queried validators.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, warn};

use verdict_core::{ConsensusConfig, FeatureRecord};

use crate::error::{ConsensusError, ValidatorError};
use crate::validator::{SourceOpinion, Validator};

/// Outcome of one consensus round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Plurality value; ties resolve to the lexicographically smallest.
    pub value: String,
    /// Plurality size over successful validators, in [0, 1].
    pub agreement: f64,
    /// Mean confidence of the validators that voted for `value`.
    pub confidence: f64,
    /// True when agreement fell below the quorum threshold.
    pub requires_review: bool,
    /// Every successful opinion, for audit.
    pub opinions: Vec<SourceOpinion>,
    /// Dissenting opinions as `"{validator}: {value} ({confidence})"`.
    pub disagreements: Vec<String>,
}

/// Aggregate counters across all rounds this aggregator has run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatorStats {
    pub total_validations: usize,
    pub quorum_reached: usize,
    pub mean_agreement: f64,
    pub mean_confidence: f64,
}

#[derive(Default)]
struct RunningStats {
    total: usize,
    quorum_reached: usize,
    agreement_sum: f64,
    confidence_sum: f64,
}

pub struct ConsensusAggregator {
    config: ConsensusConfig,
    stats: Mutex<RunningStats>,
}

impl ConsensusAggregator {
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(RunningStats::default()),
        }
    }

    /// Query every validator concurrently, each under the configured
    /// timeout, and vote on the successful opinions. Individual failures
    /// are logged and excluded; only a round with zero opinions errors.
    pub async fn validate(
        &self,
        record: &FeatureRecord,
        validators: &[Arc<dyn Validator>],
    ) -> Result<ConsensusResult, ConsensusError> {
        let attempted = validators.len();
        let budget = Duration::from_secs(self.config.validator_timeout_secs);

        let calls = validators.iter().map(|validator| {
            let validator = Arc::clone(validator);
            async move {
                let id = validator.id().to_string();
                match timeout(budget, validator.assess(record)).await {
                    Ok(Ok(opinion)) => Ok(SourceOpinion {
                        validator: id,
                        value: opinion.value,
                        confidence: opinion.confidence,
                    }),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ValidatorError::Timeout {
                        validator: id,
                        seconds: budget.as_secs(),
                    }),
                }
            }
        });

        let mut opinions = Vec::with_capacity(attempted);
        for outcome in join_all(calls).await {
            match outcome {
                Ok(opinion) => opinions.push(opinion),
                Err(e) => warn!(error = %e, "validator excluded from consensus round"),
            }
        }

        if opinions.is_empty() {
            return Err(ConsensusError::NoConsensus { attempted });
        }

        // Group by value. BTreeMap iterates keys in ascending order, so a
        // strictly-greater comparison keeps the smallest value on ties.
        let mut tally: BTreeMap<&str, Vec<&SourceOpinion>> = BTreeMap::new();
        for opinion in &opinions {
            tally.entry(opinion.value.as_str()).or_default().push(opinion);
        }
        let mut winner = "";
        let mut plurality: &[&SourceOpinion] = &[];
        for (value, group) in &tally {
            if group.len() > plurality.len() {
                winner = value;
                plurality = group.as_slice();
            }
        }

        let agreement = plurality.len() as f64 / opinions.len() as f64;
        let confidence =
            plurality.iter().map(|o| o.confidence).sum::<f64>() / plurality.len() as f64;
        let requires_review = agreement < self.config.quorum_threshold;

        let disagreements: Vec<String> = opinions
            .iter()
            .filter(|o| o.value != winner)
            .map(|o| format!("{}: {} ({:.2})", o.validator, o.value, o.confidence))
            .collect();

        {
            let mut stats = self.stats.lock().expect("consensus stats lock poisoned");
            stats.total += 1;
            if !requires_review {
                stats.quorum_reached += 1;
            }
            stats.agreement_sum += agreement;
            stats.confidence_sum += confidence;
        }

        info!(
            item_id = %record.item_id,
            value = winner,
            agreement,
            confidence,
            requires_review,
            excluded = attempted - opinions.len(),
            "consensus round complete"
        );

        let value = winner.to_string();
        Ok(ConsensusResult {
            value,
            agreement,
            confidence,
            requires_review,
            opinions,
            disagreements,
        })
    }

    pub fn stats(&self) -> AggregatorStats {
        let stats = self.stats.lock().expect("consensus stats lock poisoned");
        if stats.total == 0 {
            return AggregatorStats::default();
        }
        AggregatorStats {
            total_validations: stats.total,
            quorum_reached: stats.quorum_reached,
            mean_agreement: stats.agreement_sum / stats.total as f64,
            mean_confidence: stats.confidence_sum / stats.total as f64,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::Opinion;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        value: &'static str,
        confidence: f64,
    }

    #[async_trait]
    impl Validator for Fixed {
        fn id(&self) -> &str {
            self.name
        }

        async fn assess(&self, _record: &FeatureRecord) -> Result<Opinion, ValidatorError> {
            Ok(Opinion::new(self.value, self.confidence))
        }
    }

    struct Broken;

    #[async_trait]
    impl Validator for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        async fn assess(&self, _record: &FeatureRecord) -> Result<Opinion, ValidatorError> {
            Err(ValidatorError::failed("broken", "backend unreachable"))
        }
    }

    struct Slow;

    #[async_trait]
    impl Validator for Slow {
        fn id(&self) -> &str {
            "slow"
        }

        async fn assess(&self, _record: &FeatureRecord) -> Result<Opinion, ValidatorError> {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Ok(Opinion::new("9999", 1.0))
        }
    }

    fn fixed(name: &'static str, value: &'static str, confidence: f64) -> Arc<dyn Validator> {
        Arc::new(Fixed {
            name,
            value,
            confidence,
        })
    }

    fn aggregator() -> ConsensusAggregator {
        ConsensusAggregator::new(ConsensusConfig::default())
    }

    fn record() -> FeatureRecord {
        FeatureRecord::new("nfe-001").with("ncm_code", "11112222")
    }

    #[tokio::test]
    async fn two_of_three_agree() {
        let validators = vec![
            fixed("ncm-a", "1111", 0.9),
            fixed("ncm-b", "1111", 0.8),
            fixed("ncm-c", "2222", 0.3),
        ];

        let result = aggregator().validate(&record(), &validators).await.unwrap();

        assert_eq!(result.value, "1111");
        assert!((result.agreement - 2.0 / 3.0).abs() < 1e-9);
        assert!((result.confidence - 0.85).abs() < 1e-9);
        // 0.667 sits below the 0.7 quorum, so this round flags for review.
        assert!(result.requires_review);
        assert_eq!(result.opinions.len(), 3);
        assert_eq!(result.disagreements, vec!["ncm-c: 2222 (0.30)"]);
    }

    #[tokio::test]
    async fn unanimity_reaches_quorum() {
        let validators = vec![
            fixed("a", "1111", 0.9),
            fixed("b", "1111", 0.7),
            fixed("c", "1111", 0.8),
        ];

        let result = aggregator().validate(&record(), &validators).await.unwrap();

        assert_eq!(result.agreement, 1.0);
        assert!(!result.requires_review);
        assert!(result.disagreements.is_empty());
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ties_break_to_the_smallest_value() {
        let validators = vec![fixed("a", "2222", 0.95), fixed("b", "1111", 0.5)];

        let result = aggregator().validate(&record(), &validators).await.unwrap();

        assert_eq!(result.value, "1111");
        assert_eq!(result.agreement, 0.5);
        assert_eq!(result.confidence, 0.5);
    }

    #[tokio::test]
    async fn failures_are_excluded_not_fatal() {
        let validators: Vec<Arc<dyn Validator>> = vec![
            fixed("a", "1111", 0.9),
            Arc::new(Broken),
            fixed("b", "1111", 0.7),
        ];

        let result = aggregator().validate(&record(), &validators).await.unwrap();

        // Agreement is computed over the two successful validators only.
        assert_eq!(result.agreement, 1.0);
        assert_eq!(result.opinions.len(), 2);
        assert!(!result.requires_review);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_validators_are_timed_out() {
        let aggregator = ConsensusAggregator::new(ConsensusConfig {
            quorum_threshold: 0.7,
            validator_timeout_secs: 1,
        });
        let validators: Vec<Arc<dyn Validator>> = vec![
            Arc::new(Slow),
            fixed("a", "1111", 0.9),
            fixed("b", "1111", 0.8),
        ];

        let result = aggregator.validate(&record(), &validators).await.unwrap();

        assert_eq!(result.value, "1111");
        assert_eq!(result.opinions.len(), 2);
        assert_eq!(result.agreement, 1.0);
    }

    #[tokio::test]
    async fn a_round_with_no_opinions_is_an_error() {
        let validators: Vec<Arc<dyn Validator>> = vec![Arc::new(Broken)];
        let err = aggregator().validate(&record(), &validators).await.unwrap_err();
        assert!(matches!(err, ConsensusError::NoConsensus { attempted: 1 }));

        let err = aggregator().validate(&record(), &[]).await.unwrap_err();
        assert!(matches!(err, ConsensusError::NoConsensus { attempted: 0 }));
    }

    #[tokio::test]
    async fn stats_accumulate_across_rounds() {
        let aggregator = aggregator();

        let unanimous = vec![fixed("a", "1111", 0.9), fixed("b", "1111", 0.9)];
        aggregator.validate(&record(), &unanimous).await.unwrap();

        let split = vec![
            fixed("a", "1111", 0.9),
            fixed("b", "1111", 0.8),
            fixed("c", "2222", 0.3),
        ];
        aggregator.validate(&record(), &split).await.unwrap();

        let stats = aggregator.stats();
        assert_eq!(stats.total_validations, 2);
        assert_eq!(stats.quorum_reached, 1);
        assert!((stats.mean_agreement - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fresh_aggregator_reports_zeroed_stats() {
        let stats = aggregator().stats();
        assert_eq!(stats, AggregatorStats::default());
    }
}
