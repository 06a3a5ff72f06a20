//! Adaptive question selection for test sessions.
//!
//! `plan` decides the strategy from history and mastery alone; the rng only
//! picks among equally valid candidates. `select` then walks the retrieval
//! ladder until it finds an unseen in-scope question.

use std::collections::{BTreeSet, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::engine::calibration::shuffle_options;
use crate::engine::config::SelectorConfig;
use crate::engine::graph::SkillGraph;
use crate::engine::index::QuestionIndex;
use crate::engine::session::ModePolicy;
use crate::engine::types::{Attempt, Difficulty, MasterySnapshot, Question, SelectedItem, Strategy};

pub struct SelectionContext<'a> {
    pub history: &'a [Attempt],
    pub snapshot: &'a MasterySnapshot,
    pub graph: &'a SkillGraph,
    pub index: &'a QuestionIndex,
    /// Empty means every skill is in scope.
    pub pool: &'a BTreeSet<String>,
    pub policy: ModePolicy,
}

impl SelectionContext<'_> {
    fn seen(&self) -> HashSet<String> {
        self.history.iter().map(|a| a.question_id.clone()).collect()
    }

    fn in_pool(&self, skill_id: &str) -> bool {
        self.pool.is_empty() || self.pool.contains(skill_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub strategy: Strategy,
    /// `None` leaves the choice to the frontier search or the fallback ladder.
    pub target: Option<String>,
    pub difficulty: Difficulty,
}

/// Number of trailing correct answers on `skill_id`. Attempts on other skills
/// are skipped; the first incorrect answer on the skill ends the streak.
pub fn correct_streak(history: &[Attempt], skill_id: &str) -> u32 {
    let mut streak = 0;
    for attempt in history.iter().rev().filter(|a| a.skill_id == skill_id) {
        if !attempt.correct {
            break;
        }
        streak += 1;
    }
    streak
}

fn pick<R: Rng + ?Sized>(candidates: &[String], rng: &mut R) -> Option<String> {
    candidates.choose(rng).cloned()
}

pub fn plan<R: Rng + ?Sized>(
    ctx: &SelectionContext<'_>,
    config: &SelectorConfig,
    rng: &mut R,
) -> Plan {
    let pool: Vec<String> = ctx.pool.iter().cloned().collect();

    if ctx.policy.exploration && ctx.history.len() < config.exploration_turns {
        let touched: HashSet<&str> = ctx.history.iter().map(|a| a.skill_id.as_str()).collect();
        let untouched: Vec<String> = pool
            .iter()
            .filter(|s| !touched.contains(s.as_str()))
            .cloned()
            .collect();
        let target = pick(&untouched, rng).or_else(|| pick(&pool, rng));
        return Plan {
            strategy: Strategy::Exploration,
            target,
            difficulty: Difficulty::Medium,
        };
    }

    let Some(last) = ctx.history.last() else {
        return Plan {
            strategy: Strategy::Initiation,
            target: pick(&pool, rng),
            difficulty: Difficulty::Medium,
        };
    };

    if !last.correct {
        let weak_parents: Vec<String> = ctx
            .graph
            .parents(&last.skill_id)
            .iter()
            .filter(|p| ctx.in_pool(p))
            .filter(|p| {
                ctx.snapshot.score_or(p, config.unknown_prerequisite_score)
                    < config.weak_prerequisite_threshold
            })
            .cloned()
            .collect();
        let target = pick(&weak_parents, rng).unwrap_or_else(|| last.skill_id.clone());
        return Plan {
            strategy: Strategy::Remediation,
            target: Some(target),
            difficulty: Difficulty::Easy,
        };
    }

    if ctx.policy.drill {
        let streak = correct_streak(ctx.history, &last.skill_id);
        if streak < config.drill_streak {
            return Plan {
                strategy: Strategy::Drill,
                target: Some(last.skill_id.clone()),
                difficulty: if streak == 0 {
                    Difficulty::Medium
                } else {
                    Difficulty::Hard
                },
            };
        }
    }

    let successors: Vec<String> = ctx
        .graph
        .children(&last.skill_id)
        .iter()
        .filter(|c| ctx.in_pool(c))
        .filter(|c| ctx.snapshot.score(c) < config.unmastered_successor_threshold)
        .cloned()
        .collect();
    match pick(&successors, rng) {
        Some(target) => Plan {
            strategy: Strategy::Progression,
            target: Some(target),
            difficulty: Difficulty::Medium,
        },
        None => Plan {
            strategy: Strategy::Frontier,
            target: None,
            difficulty: Difficulty::Hard,
        },
    }
}

fn item<R: Rng + ?Sized>(
    question: &Question,
    skill_id: &str,
    difficulty: Difficulty,
    strategy: Strategy,
    rng: &mut R,
) -> SelectedItem {
    SelectedItem {
        question: shuffle_options(question, rng),
        skill_id: skill_id.to_string(),
        target_difficulty: difficulty,
        strategy,
    }
}

/// Next item for a live session, or `None` when no unseen question is left in
/// scope.
pub fn select<R: Rng + ?Sized>(
    ctx: &SelectionContext<'_>,
    config: &SelectorConfig,
    rng: &mut R,
) -> Option<SelectedItem> {
    let plan = plan(ctx, config, rng);
    let seen = ctx.seen();

    if let Some(target) = plan.target.as_deref() {
        let unseen = ctx.index.unseen_for_skill(target, &seen, ctx.pool);
        let matching: Vec<&Question> = unseen
            .iter()
            .copied()
            .filter(|q| q.difficulty == plan.difficulty)
            .collect();
        let candidates = if matching.is_empty() { &unseen } else { &matching };
        if let Some(question) = candidates.choose(rng) {
            return Some(item(question, target, plan.difficulty, plan.strategy, rng));
        }
        tracing::debug!(
            skill_id = target,
            strategy = plan.strategy.as_str(),
            "Target skill has no unseen question, falling back"
        );
    }

    let mut skills: Vec<String> = ctx.pool.iter().cloned().collect();
    skills.shuffle(rng);

    if plan.strategy == Strategy::Frontier {
        for skill in &skills {
            let hard: Vec<&Question> = ctx
                .index
                .unseen_for_skill(skill, &seen, ctx.pool)
                .into_iter()
                .filter(|q| q.difficulty == Difficulty::Hard)
                .collect();
            if let Some(question) = hard.choose(rng) {
                return Some(item(question, skill, Difficulty::Hard, Strategy::Frontier, rng));
            }
        }
    }

    for skill in skills.iter().take(config.fallback_skill_samples) {
        let unseen = ctx.index.unseen_for_skill(skill, &seen, ctx.pool);
        if let Some(question) = unseen.choose(rng) {
            return Some(item(question, skill, plan.difficulty, Strategy::Fallback, rng));
        }
    }

    // Untagged questions cannot be credited to a skill.
    let remaining: Vec<&Question> = ctx
        .index
        .unseen_in_scope(&seen, ctx.pool)
        .into_iter()
        .filter(|q| !ctx.index.tags_of(&q.id).is_empty())
        .collect();
    let question = remaining.choose(rng)?;
    let skill = ctx.index.primary_skill(&question.id, ctx.pool)?.to_string();
    Some(item(
        question,
        &skill,
        question.difficulty,
        Strategy::RandomLastResort,
        rng,
    ))
}
