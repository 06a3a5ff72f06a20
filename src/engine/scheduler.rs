//! Linear study path: deterministic next-skill recommendation, review queue
//! and the frontier pool used by smart tests.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::engine::config::SchedulerConfig;
use crate::engine::graph::SkillGraph;
use crate::engine::index::QuestionIndex;
use crate::engine::types::{MasteryRecord, MasterySnapshot, MasteryStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    New,
    Decay,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TraceStep {
    Mastered { skill_id: String, score: f64 },
    Excluded { skill_id: String },
    Untestable { skill_id: String },
    Locked { skill_id: String, by: String },
    Chosen { skill_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub skill_id: Option<String>,
    pub reason: ReasonCode,
    pub description: String,
    pub score: f64,
    pub trace: Vec<TraceStep>,
}

/// Walks the topological order and returns the first skill that is testable,
/// unlocked and below the threshold.
pub fn recommend(
    snapshot: &MasterySnapshot,
    graph: &SkillGraph,
    index: &QuestionIndex,
    threshold: f64,
    exclude: Option<&str>,
) -> Recommendation {
    let mut trace = Vec::new();

    for skill in graph.topological_order() {
        if exclude == Some(skill.as_str()) {
            trace.push(TraceStep::Excluded { skill_id: skill });
            continue;
        }

        let score = snapshot.score(&skill);
        if score >= threshold {
            trace.push(TraceStep::Mastered { skill_id: skill, score });
            continue;
        }
        if !index.has_questions(&skill) {
            trace.push(TraceStep::Untestable { skill_id: skill });
            continue;
        }

        // Prerequisites without questions cannot be mastered, so they never lock.
        let blocker = graph
            .parents(&skill)
            .iter()
            .find(|p| index.has_questions(p) && snapshot.score(p) < threshold);
        if let Some(by) = blocker {
            trace.push(TraceStep::Locked {
                skill_id: skill,
                by: by.clone(),
            });
            continue;
        }

        let (reason, description) = if score > 0.0 {
            (
                ReasonCode::Decay,
                format!(
                    "Knowledge of {} is fading ({:.0}%), review it before moving on",
                    skill,
                    score * 100.0
                ),
            )
        } else if graph.parents(&skill).is_empty() {
            (ReasonCode::New, format!("Start with {}, a first lesson", skill))
        } else {
            (
                ReasonCode::New,
                format!("Prerequisites are solid, continue with {}", skill),
            )
        };

        tracing::debug!(skill_id = %skill, reason = ?reason, "Recommended next skill");
        trace.push(TraceStep::Chosen {
            skill_id: skill.clone(),
        });
        return Recommendation {
            skill_id: Some(skill),
            reason,
            description,
            score,
            trace,
        };
    }

    Recommendation {
        skill_id: None,
        reason: ReasonCode::Completed,
        description: "Every reachable skill is mastered".to_string(),
        score: 0.0,
        trace,
    }
}

/// Skills to revisit: Review first, then InProgress, id order within a bucket.
pub fn review_queue<'a>(
    records: impl IntoIterator<Item = &'a MasteryRecord>,
    limit: usize,
) -> Vec<MasteryRecord> {
    let mut review: Vec<&MasteryRecord> = Vec::new();
    let mut in_progress: Vec<&MasteryRecord> = Vec::new();
    for record in records {
        match record.status {
            MasteryStatus::Review => review.push(record),
            MasteryStatus::InProgress => in_progress.push(record),
            _ => {}
        }
    }
    review.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
    in_progress.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));

    review
        .into_iter()
        .chain(in_progress)
        .take(limit)
        .cloned()
        .collect()
}

/// Skills that need attention plus the learning frontier.
///
/// A skill joins the pool when it is in Review, when it is InProgress with a
/// weak score, or when it is not yet mastered and reachable: a root nobody
/// attempted, or a skill whose parents all pass.
pub fn frontier_pool(
    snapshot: &MasterySnapshot,
    graph: &SkillGraph,
    config: &SchedulerConfig,
) -> BTreeSet<String> {
    let mut pool = BTreeSet::new();

    for record in snapshot.records() {
        let weak = match record.status {
            MasteryStatus::Review => true,
            MasteryStatus::InProgress => record.score < config.frontier_weak_score,
            _ => false,
        };
        if weak {
            pool.insert(record.skill_id.clone());
        }
    }

    for skill in graph.nodes() {
        if snapshot.score(skill) >= config.frontier_mastered {
            continue;
        }
        let parents = graph.parents(skill);
        let reachable = if parents.is_empty() {
            !snapshot.contains(skill)
        } else {
            parents
                .iter()
                .all(|p| snapshot.score(p) >= config.frontier_parent_pass)
        };
        if reachable {
            pool.insert(skill.to_string());
        }
    }

    pool
}
