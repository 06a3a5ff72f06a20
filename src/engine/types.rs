use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LEARNING_RATE, DEFAULT_MASTERY_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    /// Lenient label parsing for imported content: numeric levels and the
    /// localized labels used by question authors. Unknown labels count as medium.
    pub fn parse_label(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "1" | "easy" | "de" | "dễ" => Self::Easy,
            "3" | "hard" | "kho" | "khó" | "advanced" => Self::Hard,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MasteryStatus {
    New,
    InProgress,
    Mastered,
    Review,
}

impl MasteryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Mastered => "mastered",
            Self::Review => "review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryRecord {
    pub skill_id: String,
    pub score: f64,
    pub status: MasteryStatus,
    pub last_updated: DateTime<Utc>,
}

impl MasteryRecord {
    pub fn new(skill_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            skill_id: skill_id.to_string(),
            score: 0.0,
            status: MasteryStatus::New,
            last_updated: now,
        }
    }
}

/// Point-in-time view of one learner's mastery in one subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterySnapshot {
    records: HashMap<String, MasteryRecord>,
}

impl MasterySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = MasteryRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.skill_id.clone(), r))
                .collect(),
        }
    }

    pub fn get(&self, skill_id: &str) -> Option<&MasteryRecord> {
        self.records.get(skill_id)
    }

    /// Score of a skill, 0.0 when the learner never touched it.
    pub fn score(&self, skill_id: &str) -> f64 {
        self.score_or(skill_id, 0.0)
    }

    pub fn score_or(&self, skill_id: &str, default: f64) -> f64 {
        self.records
            .get(skill_id)
            .map(|r| r.score)
            .unwrap_or(default)
    }

    pub fn contains(&self, skill_id: &str) -> bool {
        self.records.contains_key(skill_id)
    }

    pub fn insert(&mut self, record: MasteryRecord) {
        self.records.insert(record.skill_id.clone(), record);
    }

    pub fn records(&self) -> impl Iterator<Item = &MasteryRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteEdge {
    pub source: String,
    pub target: String,
    pub subject: String,
}

impl PrerequisiteEdge {
    pub fn new(source: &str, target: &str, subject: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            subject: subject.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub skill_tags: Vec<String>,
    /// Options in `"<label>. <text>"` form.
    pub options: Vec<String>,
    pub answer: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub question_id: String,
    pub skill_id: String,
    pub correct: bool,
    pub difficulty: Difficulty,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Exploration,
    Initiation,
    Remediation,
    Progression,
    Frontier,
    Drill,
    Fallback,
    RandomLastResort,
    Practice,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exploration => "exploration",
            Self::Initiation => "initiation",
            Self::Remediation => "remediation",
            Self::Progression => "progression",
            Self::Frontier => "frontier",
            Self::Drill => "drill",
            Self::Fallback => "fallback",
            Self::RandomLastResort => "random_last_resort",
            Self::Practice => "practice",
        }
    }
}

/// A question ready to present: options already shuffled, answer key remapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedItem {
    pub question: Question,
    pub skill_id: String,
    pub target_difficulty: Difficulty,
    pub strategy: Strategy,
}

impl SelectedItem {
    pub fn strategy_note(&self) -> String {
        format!("{} ({})", self.strategy.as_str(), self.target_difficulty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerSettings {
    pub mastery_threshold: f64,
    pub learning_rate: f64,
}

impl Default for LearnerSettings {
    fn default() -> Self {
        Self {
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Practice,
    Test,
    Decay,
    SessionStart,
    SessionFinish,
    DiagnosticGrant,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Practice => "practice",
            Self::Test => "test",
            Self::Decay => "decay",
            Self::SessionStart => "session_start",
            Self::SessionFinish => "session_finish",
            Self::DiagnosticGrant => "diagnostic_grant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub user_id: String,
    pub action: ActivityAction,
    pub subject: String,
    pub skill_id: Option<String>,
    pub question_id: Option<String>,
    pub correct: bool,
    pub duration_secs: f64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(user_id: &str, action: ActivityAction, subject: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            action,
            subject: subject.to_string(),
            skill_id: None,
            question_id: None,
            correct: false,
            duration_secs: 0.0,
            note: None,
            created_at: now,
        }
    }

    pub fn with_skill(mut self, skill_id: &str) -> Self {
        self.skill_id = Some(skill_id.to_string());
        self
    }

    pub fn with_question(mut self, question_id: &str, correct: bool, duration_secs: f64) -> Self {
        self.question_id = Some(question_id.to_string());
        self.correct = correct;
        self.duration_secs = duration_secs;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
