use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::engine::types::LearnerSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryConfig {
    /// Used when the learner has no stored settings.
    pub default_mastery_threshold: f64,
    pub default_learning_rate: f64,
    pub review_ceiling: f64,
    pub parent_penalty: f64,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            default_mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
            default_learning_rate: DEFAULT_LEARNING_RATE,
            review_ceiling: REVIEW_SCORE_CEILING,
            parent_penalty: DEFAULT_PARENT_PENALTY,
        }
    }
}

impl MasteryConfig {
    pub fn default_settings(&self) -> LearnerSettings {
        LearnerSettings {
            mastery_threshold: self.default_mastery_threshold,
            learning_rate: self.default_learning_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayConfig {
    pub decay_rate: f64,
    #[serde(default = "default_min_elapsed_days")]
    pub min_elapsed_days: i64,
    /// Score changes smaller than this are not written back.
    #[serde(default = "default_min_score_change")]
    pub min_score_change: f64,
}

fn default_min_elapsed_days() -> i64 {
    1
}
fn default_min_score_change() -> f64 {
    0.01
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            decay_rate: DEFAULT_DECAY_RATE,
            min_elapsed_days: 1,
            min_score_change: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorConfig {
    pub exploration_turns: usize,
    /// Prerequisites below this score are remediation targets.
    pub weak_prerequisite_threshold: f64,
    /// Assumed score of a prerequisite the learner never attempted.
    pub unknown_prerequisite_score: f64,
    pub unmastered_successor_threshold: f64,
    pub drill_streak: u32,
    pub fallback_skill_samples: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            exploration_turns: EXPLORATION_TURNS,
            weak_prerequisite_threshold: 0.8,
            unknown_prerequisite_score: 0.5,
            unmastered_successor_threshold: 0.7,
            drill_streak: 2,
            fallback_skill_samples: MAX_FALLBACK_SKILLS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppingConfig {
    pub stability_min_attempts: usize,
    pub stability_window: usize,
    pub default_min_questions: usize,
    pub default_max_questions: usize,
    pub default_time_limit_secs: u64,
}

impl Default for StoppingConfig {
    fn default() -> Self {
        Self {
            stability_min_attempts: STABILITY_MIN_ATTEMPTS,
            stability_window: STABILITY_WINDOW,
            default_min_questions: 10,
            default_max_questions: 30,
            default_time_limit_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationConfig {
    pub easy_below: f64,
    pub medium_below: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            easy_below: 0.4,
            medium_below: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub review_queue_limit: usize,
    pub frontier_mastered: f64,
    pub frontier_parent_pass: f64,
    pub frontier_weak_score: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            review_queue_limit: DEFAULT_REVIEW_LIMIT,
            frontier_mastered: 0.8,
            frontier_parent_pass: 0.7,
            frontier_weak_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultConfig {
    pub excellent_accuracy: f64,
    pub fair_accuracy: f64,
    pub diagnostic_grant_score: f64,
}

impl Default for ResultConfig {
    fn default() -> Self {
        Self {
            excellent_accuracy: 0.8,
            fair_accuracy: 0.5,
            diagnostic_grant_score: DIAGNOSTIC_GRANT_SCORE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub mastery: MasteryConfig,
    pub decay: DecayConfig,
    pub selector: SelectorConfig,
    pub stopping: StoppingConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub results: ResultConfig,
}

impl EngineConfig {
    pub fn from_env(env_config: &crate::config::EngineEnvConfig) -> Self {
        let mut config = Self::default();
        config.mastery.default_mastery_threshold = env_config.mastery_threshold;
        config.mastery.default_learning_rate = env_config.learning_rate;
        config.mastery.parent_penalty = env_config.parent_penalty;
        config.decay.decay_rate = env_config.decay_rate;
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.mastery.default_mastery_threshold) {
            return Err("mastery.default_mastery_threshold must be in [0,1]".to_string());
        }
        if self.mastery.default_learning_rate <= 0.0 || self.mastery.default_learning_rate > 1.0 {
            return Err("mastery.default_learning_rate must be in (0,1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.mastery.review_ceiling) {
            return Err("mastery.review_ceiling must be in [0,1]".to_string());
        }
        if self.mastery.review_ceiling >= self.mastery.default_mastery_threshold {
            return Err("mastery.review_ceiling must be below the mastery threshold".to_string());
        }
        if !(0.0..=1.0).contains(&self.mastery.parent_penalty) {
            return Err("mastery.parent_penalty must be in [0,1]".to_string());
        }

        if !(0.0..1.0).contains(&self.decay.decay_rate) {
            return Err("decay.decay_rate must be in [0,1)".to_string());
        }
        if self.decay.min_elapsed_days < 1 {
            return Err("decay.min_elapsed_days must be >= 1".to_string());
        }

        if !(0.0..=1.0).contains(&self.selector.weak_prerequisite_threshold)
            || !(0.0..=1.0).contains(&self.selector.unknown_prerequisite_score)
            || !(0.0..=1.0).contains(&self.selector.unmastered_successor_threshold)
        {
            return Err("invalid selector thresholds".to_string());
        }
        if self.selector.drill_streak == 0 {
            return Err("selector.drill_streak must be > 0".to_string());
        }
        if self.selector.fallback_skill_samples == 0 {
            return Err("selector.fallback_skill_samples must be > 0".to_string());
        }

        if self.stopping.stability_window == 0 {
            return Err("stopping.stability_window must be > 0".to_string());
        }
        if self.stopping.stability_window > self.stopping.stability_min_attempts {
            return Err("stopping.stability_window must be <= stability_min_attempts".to_string());
        }
        if self.stopping.default_max_questions == 0
            || self.stopping.default_min_questions > self.stopping.default_max_questions
        {
            return Err("stopping defaults must satisfy 0 <= min <= max, max > 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.calibration.easy_below)
            || !(0.0..=1.0).contains(&self.calibration.medium_below)
            || self.calibration.easy_below > self.calibration.medium_below
        {
            return Err("calibration bands must satisfy 0 <= easy_below <= medium_below <= 1".to_string());
        }

        if self.results.fair_accuracy > self.results.excellent_accuracy {
            return Err("results.fair_accuracy must be <= excellent_accuracy".to_string());
        }
        if !(0.0..=1.0).contains(&self.results.diagnostic_grant_score) {
            return Err("results.diagnostic_grant_score must be in [0,1]".to_string());
        }

        Ok(())
    }
}
