// Trigger policy - decides whether accumulated rows justify a retrain
//
// First training waits for a full initial corpus; later ones only need
// enough *new* rows since the last commit.

use super::state::TrainerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPolicy {
    pub min_total_samples: u64,
    pub min_new_samples: u64,
}

/// Outcome of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// No model yet and the log reached the initial threshold
    Initial { available: u64 },
    /// Enough rows arrived since the last commit
    Incremental { new_samples: u64 },
    /// Not yet; `needed` more rows before the relevant threshold
    Wait { have: u64, target: u64, needed: u64 },
}

impl TriggerDecision {
    pub fn should_train(&self) -> bool {
        !matches!(self, TriggerDecision::Wait { .. })
    }
}

impl TriggerPolicy {
    pub fn new(min_total_samples: u64, min_new_samples: u64) -> Self {
        Self {
            min_total_samples,
            min_new_samples,
        }
    }

    pub fn evaluate(&self, training_count: u64, last_trained_samples: u64, current: u64) -> TriggerDecision {
        if training_count == 0 {
            return if current >= self.min_total_samples {
                TriggerDecision::Initial { available: current }
            } else {
                TriggerDecision::Wait {
                    have: current,
                    target: self.min_total_samples,
                    needed: self.min_total_samples - current,
                }
            };
        }

        // A truncated log reads as zero new rows rather than underflowing.
        let new_samples = current.saturating_sub(last_trained_samples);
        if new_samples >= self.min_new_samples {
            TriggerDecision::Incremental { new_samples }
        } else {
            TriggerDecision::Wait {
                have: new_samples,
                target: self.min_new_samples,
                needed: self.min_new_samples - new_samples,
            }
        }
    }

    pub fn evaluate_state(&self, state: &TrainerState, current: u64) -> TriggerDecision {
        self.evaluate(state.training_count, state.last_trained_samples, current)
    }

    pub fn should_train(&self, state: &TrainerState, current: u64) -> bool {
        self.evaluate_state(state, current).should_train()
    }
}
