//! Test session state machine: configuration, history, stopping and results.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::calibration::shuffle_options;
use crate::engine::config::{ResultConfig, StoppingConfig};
use crate::engine::error::EngineError;
use crate::engine::graph::{chapter_of, SkillGraph};
use crate::engine::index::QuestionIndex;
use crate::engine::types::{Attempt, Difficulty, Question};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    /// Placement test over every chapter; correct chapters are granted.
    Diagnostic,
    /// Smart test over the learner's frontier and weak skills.
    Overview,
    /// Drill until each skill is answered correctly twice in a row.
    Deep,
    /// Fixed chapter selection picked by the learner.
    Manual,
}

/// Behaviour switches derived once from the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    pub stability_stop: bool,
    pub exploration: bool,
    pub drill: bool,
    pub chapter_grant: bool,
}

impl TestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagnostic => "diagnostic",
            Self::Overview => "overview",
            Self::Deep => "deep",
            Self::Manual => "manual",
        }
    }

    pub fn policy(&self) -> ModePolicy {
        match self {
            Self::Diagnostic => ModePolicy {
                stability_stop: true,
                exploration: true,
                drill: false,
                chapter_grant: true,
            },
            Self::Overview | Self::Manual => ModePolicy {
                stability_stop: true,
                exploration: true,
                drill: false,
                chapter_grant: false,
            },
            Self::Deep => ModePolicy {
                stability_stop: false,
                exploration: false,
                drill: true,
                chapter_grant: false,
            },
        }
    }
}

impl FromStr for TestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "diagnostic" | "diagnostic_cat" => Ok(Self::Diagnostic),
            "overview" | "smart_cat" | "smart" => Ok(Self::Overview),
            "deep" | "deep_cat" => Ok(Self::Deep),
            "manual" | "standard" => Ok(Self::Manual),
            other => Err(format!("unknown test mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub mode: TestMode,
    pub min_questions: usize,
    pub max_questions: usize,
    pub time_limit_secs: u64,
    /// Explicit skill pool. Left empty, the tutor derives one from the mode.
    #[serde(default)]
    pub skill_pool: BTreeSet<String>,
    /// Chapters for manual mode.
    #[serde(default)]
    pub chapters: Vec<u32>,
}

impl SessionConfig {
    pub fn new(mode: TestMode, defaults: &StoppingConfig) -> Self {
        Self {
            mode,
            min_questions: defaults.default_min_questions,
            max_questions: defaults.default_max_questions,
            time_limit_secs: defaults.default_time_limit_secs,
            skill_pool: BTreeSet::new(),
            chapters: Vec::new(),
        }
    }

    pub fn with_limits(mut self, min_questions: usize, max_questions: usize) -> Self {
        self.min_questions = min_questions;
        self.max_questions = max_questions;
        self
    }

    pub fn with_time_limit(mut self, secs: u64) -> Self {
        self.time_limit_secs = secs;
        self
    }

    pub fn with_pool<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skill_pool = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_chapters(mut self, chapters: &[u32]) -> Self {
        self.chapters = chapters.to_vec();
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_questions == 0 {
            return Err(EngineError::InvalidConfig(
                "max_questions must be > 0".to_string(),
            ));
        }
        if self.min_questions > self.max_questions {
            return Err(EngineError::InvalidConfig(format!(
                "min_questions ({}) exceeds max_questions ({})",
                self.min_questions, self.max_questions
            )));
        }
        if self.time_limit_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "time_limit_secs must be > 0".to_string(),
            ));
        }
        if self.mode == TestMode::Manual && self.chapters.is_empty() && self.skill_pool.is_empty() {
            return Err(EngineError::InvalidConfig(
                "manual mode needs chapters or an explicit skill pool".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Active,
    Finished,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxQuestions,
    Stability,
    TimeLimit,
    LearnerStopped,
    PoolExhausted,
}

/// Stop decision after an attempt, ignoring time. Never stops before `min`,
/// always stops at `max`; in between only the stability rule can stop early.
pub fn stopping_condition(
    outcomes: &[bool],
    min_questions: usize,
    max_questions: usize,
    policy: ModePolicy,
    config: &StoppingConfig,
) -> Option<StopReason> {
    let n = outcomes.len();
    if n < min_questions {
        return None;
    }
    if n >= max_questions {
        return Some(StopReason::MaxQuestions);
    }
    if !policy.stability_stop || n < config.stability_min_attempts {
        return None;
    }
    let window = &outcomes[n.saturating_sub(config.stability_window)..];
    let all_correct = window.iter().all(|c| *c);
    let all_wrong = window.iter().all(|c| !*c);
    if all_correct || all_wrong {
        Some(StopReason::Stability)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub config: SessionConfig,
    pub state: SessionState,
    pub history: Vec<Attempt>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub incomplete: bool,
    pub exhausted: bool,
}

impl Session {
    pub fn new(user_id: &str, subject: &str, config: SessionConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            subject: subject.to_string(),
            config,
            state: SessionState::Idle,
            history: Vec::new(),
            started_at: None,
            finished_at: None,
            stop_reason: None,
            incomplete: false,
            exhausted: false,
        }
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), EngineError> {
        if self.state != expected {
            return Err(EngineError::InvalidSessionState {
                expected: expected.as_str(),
                found: self.state.as_str(),
            });
        }
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.expect_state(SessionState::Idle)?;
        self.config.validate()?;
        self.state = SessionState::Active;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn ensure_active(&self) -> Result<(), EngineError> {
        self.expect_state(SessionState::Active)
    }

    pub fn record(&mut self, attempt: Attempt) -> Result<(), EngineError> {
        self.ensure_active()?;
        self.history.push(attempt);
        Ok(())
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        let end = self.finished_at.unwrap_or(now);
        self.started_at
            .map(|start| (end - start).num_seconds().max(0))
            .unwrap_or(0)
    }

    pub fn time_up(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_secs(now) > i64::try_from(self.config.time_limit_secs).unwrap_or(i64::MAX)
    }

    /// Checks every stop rule; finishes the session when one fires.
    pub fn evaluate_stop(&mut self, now: DateTime<Utc>, config: &StoppingConfig) -> Option<StopReason> {
        if !self.is_active() {
            return self.stop_reason;
        }
        let reason = if self.time_up(now) {
            Some(StopReason::TimeLimit)
        } else {
            let outcomes: Vec<bool> = self.history.iter().map(|a| a.correct).collect();
            stopping_condition(
                &outcomes,
                self.config.min_questions,
                self.config.max_questions,
                self.config.mode.policy(),
                config,
            )
        };
        if let Some(reason) = reason {
            self.finish(reason, now);
        }
        reason
    }

    pub fn finish(&mut self, reason: StopReason, now: DateTime<Utc>) {
        if self.state == SessionState::Finished {
            return;
        }
        match reason {
            StopReason::LearnerStopped => self.incomplete = true,
            StopReason::PoolExhausted => self.exhausted = true,
            _ => {}
        }
        self.state = SessionState::Finished;
        self.stop_reason = Some(reason);
        self.finished_at = Some(now);
    }

    pub fn correct_count(&self) -> usize {
        self.history.iter().filter(|a| a.correct).count()
    }

    pub fn accuracy(&self) -> f64 {
        if self.history.is_empty() {
            0.0
        } else {
            self.correct_count() as f64 / self.history.len() as f64
        }
    }

    pub fn result(&self, granted_skills: Vec<String>, config: &ResultConfig) -> SessionResult {
        let accuracy = self.accuracy();
        SessionResult {
            session_id: self.id.clone(),
            user_id: self.user_id.clone(),
            subject: self.subject.clone(),
            mode: self.config.mode,
            total: self.history.len(),
            correct: self.correct_count(),
            accuracy,
            band: PerformanceBand::from_accuracy(accuracy, config),
            incomplete: self.incomplete,
            stop_reason: self.stop_reason,
            exhausted: self.exhausted,
            duration_secs: self
                .finished_at
                .map(|end| self.elapsed_secs(end))
                .unwrap_or(0),
            granted_skills,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceBand {
    Excellent,
    Fair,
    NeedsReview,
}

impl PerformanceBand {
    pub fn from_accuracy(accuracy: f64, config: &ResultConfig) -> Self {
        if accuracy >= config.excellent_accuracy {
            Self::Excellent
        } else if accuracy >= config.fair_accuracy {
            Self::Fair
        } else {
            Self::NeedsReview
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub session_id: String,
    pub user_id: String,
    pub subject: String,
    pub mode: TestMode,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub band: PerformanceBand,
    pub incomplete: bool,
    pub stop_reason: Option<StopReason>,
    pub exhausted: bool,
    pub duration_secs: i64,
    pub granted_skills: Vec<String>,
}

/// Every skill sharing a chapter with a correctly answered skill.
pub fn diagnostic_grant_candidates(history: &[Attempt], graph: &SkillGraph) -> BTreeSet<String> {
    let chapters: BTreeSet<u32> = history
        .iter()
        .filter(|a| a.correct)
        .filter_map(|a| chapter_of(&a.skill_id))
        .collect();
    if chapters.is_empty() {
        return BTreeSet::new();
    }
    let chapters: Vec<u32> = chapters.into_iter().collect();
    graph.nodes_in_chapters(&chapters)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementQuestion {
    pub chapter: u32,
    pub skill_id: String,
    pub question: Question,
}

/// One question per chapter, medium preferred, in chapter order.
pub fn diagnostic_packet<R: Rng + ?Sized>(
    graph: &SkillGraph,
    index: &QuestionIndex,
    rng: &mut R,
) -> Vec<PlacementQuestion> {
    let mut packet = Vec::new();
    for chapter in graph.chapters() {
        let nodes = graph.nodes_in_chapters(&[chapter]);
        let mut seen = BTreeSet::new();
        let mut candidates: Vec<(&str, &Question)> = Vec::new();
        for node in &nodes {
            for question in index.questions_for(node) {
                if seen.insert(question.id.as_str()) {
                    candidates.push((node.as_str(), question));
                }
            }
        }

        let medium: Vec<(&str, &Question)> = candidates
            .iter()
            .copied()
            .filter(|(_, q)| q.difficulty == Difficulty::Medium)
            .collect();
        let pool = if medium.is_empty() { &candidates } else { &medium };
        if let Some((skill, question)) = pool.choose(rng).copied() {
            packet.push(PlacementQuestion {
                chapter,
                skill_id: skill.to_string(),
                question: shuffle_options(question, rng),
            });
        }
    }
    packet
}
