//! Mastery update & decay model.
//!
//! Pure functions over scores; persistence happens in the tutor.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::config::{DecayConfig, MasteryConfig};
use crate::engine::graph::SkillGraph;
use crate::engine::index::QuestionIndex;
use crate::engine::types::{LearnerSettings, MasteryRecord, MasterySnapshot, MasteryStatus};

pub fn status_for_score(score: f64, mastery_threshold: f64, review_ceiling: f64) -> MasteryStatus {
    if score >= mastery_threshold {
        MasteryStatus::Mastered
    } else if score <= review_ceiling {
        MasteryStatus::Review
    } else {
        MasteryStatus::InProgress
    }
}

/// Exponential moving average toward the outcome (1.0 correct, 0.0 incorrect).
pub fn ema(old: f64, correct: bool, alpha: f64) -> f64 {
    let outcome = if correct { 1.0 } else { 0.0 };
    ((1.0 - alpha) * old + alpha * outcome).clamp(0.0, 1.0)
}

/// One graded answer credited to a skill.
#[derive(Debug, Clone, Copy)]
pub struct Outcome<'a> {
    pub skill_id: &'a str,
    pub question_id: &'a str,
    pub correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreUpdate {
    pub score: f64,
    pub status: MasteryStatus,
    /// Every question tagged to the skill has been answered correctly once.
    pub exhausted: bool,
}

/// Applies one attempt to a skill score.
///
/// `correct_ids` holds the question ids already answered correctly for the
/// skill, across sessions; the current answer is added before the exhaustion
/// check.
pub fn update_on_attempt(
    old_score: f64,
    outcome: Outcome<'_>,
    correct_ids: &HashSet<String>,
    index: &QuestionIndex,
    settings: &LearnerSettings,
    config: &MasteryConfig,
) -> ScoreUpdate {
    let mut score = ema(old_score, outcome.correct, settings.learning_rate);

    let tagged = index.question_ids(outcome.skill_id);
    let exhausted = !tagged.is_empty()
        && tagged.iter().all(|q| {
            correct_ids.contains(q) || (outcome.correct && q == outcome.question_id)
        });
    if exhausted {
        score = 1.0;
    }

    ScoreUpdate {
        score,
        status: status_for_score(score, settings.mastery_threshold, config.review_ceiling),
        exhausted,
    }
}

/// Penalized prerequisites after an incorrect answer. Only skills that already
/// have a record are touched; their status is carried over unchanged.
pub fn prerequisite_penalties(
    skill_id: &str,
    graph: &SkillGraph,
    snapshot: &MasterySnapshot,
    penalty: f64,
) -> Vec<MasteryRecord> {
    graph
        .parents(skill_id)
        .iter()
        .filter_map(|p| snapshot.get(p))
        .map(|record| MasteryRecord {
            score: (record.score - penalty).max(0.0),
            ..record.clone()
        })
        .collect()
}

pub fn decay_score(score: f64, rate: f64, elapsed_days: i64) -> f64 {
    if elapsed_days <= 0 {
        return score;
    }
    let days = i32::try_from(elapsed_days).unwrap_or(i32::MAX);
    (score * (1.0 - rate).powi(days)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayEvent {
    pub skill_id: String,
    pub old_score: f64,
    pub new_score: f64,
    pub elapsed_days: i64,
    pub flipped_to_review: bool,
}

/// Decays every mastered skill by whole elapsed days since its last update.
/// Returns the events worth persisting; changes below `min_score_change`
/// that keep the skill mastered are dropped.
pub fn apply_decay(
    snapshot: &MasterySnapshot,
    threshold: f64,
    config: &DecayConfig,
    now: DateTime<Utc>,
) -> Vec<DecayEvent> {
    let mut events: Vec<DecayEvent> = snapshot
        .records()
        .filter(|r| r.status == MasteryStatus::Mastered)
        .filter_map(|record| {
            let elapsed_days = (now - record.last_updated).num_days();
            if elapsed_days < config.min_elapsed_days {
                return None;
            }
            let new_score = decay_score(record.score, config.decay_rate, elapsed_days);
            let flipped_to_review = new_score < threshold;
            if !flipped_to_review && (record.score - new_score) <= config.min_score_change {
                return None;
            }
            Some(DecayEvent {
                skill_id: record.skill_id.clone(),
                old_score: record.score,
                new_score,
                elapsed_days,
                flipped_to_review,
            })
        })
        .collect();
    events.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{Difficulty, PrerequisiteEdge, Question};
    use chrono::Duration;

    fn index(ids: &[&str], skill: &str) -> QuestionIndex {
        QuestionIndex::build(
            ids.iter()
                .map(|id| Question {
                    id: id.to_string(),
                    skill_tags: vec![skill.to_string()],
                    options: vec![],
                    answer: "A".to_string(),
                    difficulty: Difficulty::Easy,
                    explanation: String::new(),
                })
                .collect(),
        )
    }

    fn mastered(skill: &str, score: f64, at: DateTime<Utc>) -> MasteryRecord {
        MasteryRecord {
            skill_id: skill.to_string(),
            score,
            status: MasteryStatus::Mastered,
            last_updated: at,
        }
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(status_for_score(0.7, 0.7, 0.3), MasteryStatus::Mastered);
        assert_eq!(status_for_score(0.3, 0.7, 0.3), MasteryStatus::Review);
        assert_eq!(status_for_score(0.31, 0.7, 0.3), MasteryStatus::InProgress);
    }

    #[test]
    fn ema_moves_toward_outcome() {
        assert!((ema(0.0, true, 0.3) - 0.3).abs() < 1e-9);
        assert!((ema(1.0, false, 0.3) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn exhaustion_forces_full_score() {
        let idx = index(&["q1", "q2"], "A");
        let prior: HashSet<String> = ["q1".to_string()].into_iter().collect();
        let update = update_on_attempt(
            0.3,
            Outcome {
                skill_id: "A",
                question_id: "q2",
                correct: true,
            },
            &prior,
            &idx,
            &LearnerSettings::default(),
            &MasteryConfig::default(),
        );
        assert!(update.exhausted);
        assert_eq!(update.score, 1.0);
        assert_eq!(update.status, MasteryStatus::Mastered);
    }

    #[test]
    fn incorrect_answer_never_exhausts() {
        let idx = index(&["q1"], "A");
        let update = update_on_attempt(
            0.5,
            Outcome {
                skill_id: "A",
                question_id: "q1",
                correct: false,
            },
            &HashSet::new(),
            &idx,
            &LearnerSettings::default(),
            &MasteryConfig::default(),
        );
        assert!(!update.exhausted);
        assert!((update.score - 0.35).abs() < 1e-9);
        assert_eq!(update.status, MasteryStatus::InProgress);
    }

    #[test]
    fn penalties_floor_and_keep_status() {
        let graph = SkillGraph::from_edges(&[
            PrerequisiteEdge::new("A", "C", "s"),
            PrerequisiteEdge::new("B", "C", "s"),
        ]);
        let now = Utc::now();
        let snapshot = MasterySnapshot::from_records(vec![mastered("A", 0.1, now)]);
        let penalized = prerequisite_penalties("C", &graph, &snapshot, 0.15);
        assert_eq!(penalized.len(), 1);
        assert_eq!(penalized[0].score, 0.0);
        assert_eq!(penalized[0].status, MasteryStatus::Mastered);
    }

    #[test]
    fn decay_respects_whole_days() {
        let now = Utc::now();
        let snapshot = MasterySnapshot::from_records(vec![
            mastered("fresh", 0.9, now - Duration::hours(20)),
            mastered("old", 0.9, now - Duration::days(2)),
            mastered("stale", 0.75, now - Duration::days(3)),
        ]);
        let events = apply_decay(&snapshot, 0.7, &DecayConfig::default(), now);
        assert_eq!(events.len(), 2);

        let old = &events[0];
        assert_eq!(old.skill_id, "old");
        assert!((old.new_score - 0.729).abs() < 1e-9);
        assert!(!old.flipped_to_review);

        let stale = &events[1];
        assert_eq!(stale.elapsed_days, 3);
        assert!(stale.flipped_to_review);
    }

    #[test]
    fn tiny_changes_are_dropped() {
        let now = Utc::now();
        let snapshot =
            MasterySnapshot::from_records(vec![mastered("A", 0.95, now - Duration::days(1))]);
        let config = DecayConfig {
            decay_rate: 0.005,
            ..DecayConfig::default()
        };
        assert!(apply_decay(&snapshot, 0.7, &config, now).is_empty());
    }
}
