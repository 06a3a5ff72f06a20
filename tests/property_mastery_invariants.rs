use std::collections::{BTreeSet, HashSet};

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use mastery_engine::engine::config::{
    DecayConfig, MasteryConfig, SelectorConfig, StoppingConfig,
};
use mastery_engine::engine::graph::SkillGraph;
use mastery_engine::engine::index::QuestionIndex;
use mastery_engine::engine::mastery::{apply_decay, decay_score, ema, update_on_attempt, Outcome};
use mastery_engine::engine::scheduler::recommend;
use mastery_engine::engine::selector::{select, SelectionContext};
use mastery_engine::engine::session::{stopping_condition, StopReason, TestMode};
use mastery_engine::engine::types::{
    Attempt, Difficulty, LearnerSettings, MasteryRecord, MasterySnapshot, MasteryStatus,
    PrerequisiteEdge, Question,
};

const SKILLS: [&str; 5] = ["1.1", "1.2", "1.3", "2.1", "2.2"];

fn chain_graph() -> SkillGraph {
    let edges: Vec<PrerequisiteEdge> = SKILLS
        .windows(2)
        .map(|w| PrerequisiteEdge::new(w[0], w[1], "math"))
        .collect();
    SkillGraph::from_edges(&edges)
}

fn chain_index(per_skill: usize) -> QuestionIndex {
    let ladder = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
    let mut questions = Vec::new();
    for skill in SKILLS {
        for n in 0..per_skill {
            questions.push(Question {
                id: format!("{}-{}", skill, n),
                skill_tags: vec![skill.to_string()],
                options: vec!["A. yes".to_string(), "B. no".to_string()],
                answer: "A".to_string(),
                difficulty: ladder[n % 3],
                explanation: String::new(),
            });
        }
    }
    QuestionIndex::build(questions)
}

fn snapshot_from(scores: &[f64]) -> MasterySnapshot {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    MasterySnapshot::from_records(SKILLS.iter().zip(scores).map(|(skill, score)| {
        MasteryRecord {
            skill_id: skill.to_string(),
            score: *score,
            status: if *score >= 0.7 {
                MasteryStatus::Mastered
            } else {
                MasteryStatus::InProgress
            },
            last_updated: at,
        }
    }))
}

proptest! {
    #[test]
    fn pt_decay_bounded_and_monotonic(
        score in 0.0_f64..=1.0,
        rate in 0.0_f64..1.0,
        d1 in 0_i64..60,
        extra in 0_i64..60,
    ) {
        let s1 = decay_score(score, rate, d1);
        let s2 = decay_score(score, rate, d1 + extra);
        prop_assert!((0.0..=1.0).contains(&s1));
        prop_assert!(s1 <= score + 1e-12);
        prop_assert!(s2 <= s1 + 1e-12);
        prop_assert_eq!(decay_score(score, rate, 0), score);
    }

    #[test]
    fn pt_decay_strictly_decreasing_in_days(
        score in 0.01_f64..=1.0,
        rate in 0.01_f64..0.99,
        d1 in 1_i64..30,
        extra in 1_i64..30,
    ) {
        let s1 = decay_score(score, rate, d1);
        let s2 = decay_score(score, rate, d1 + extra);
        prop_assert!(s1 < score);
        prop_assert!(s2 < s1);
        prop_assert!(s2 > 0.0);
    }

    #[test]
    fn pt_decay_never_touches_unmastered(
        scores in prop::collection::vec(0.0_f64..=1.0, 5),
        days in 0_i64..90,
    ) {
        let snapshot = snapshot_from(&scores);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(days);
        let events = apply_decay(&snapshot, 0.7, &DecayConfig::default(), now);
        for event in &events {
            let record = snapshot.get(&event.skill_id).unwrap();
            prop_assert_eq!(record.status, MasteryStatus::Mastered);
            prop_assert!(event.new_score <= event.old_score);
            prop_assert_eq!(event.flipped_to_review, event.new_score < 0.7);
        }
        if days == 0 {
            prop_assert!(events.is_empty());
        }
    }

    #[test]
    fn pt_ema_bounded_and_directional(
        old in 0.0_f64..=1.0,
        alpha in 0.01_f64..=1.0,
    ) {
        let up = ema(old, true, alpha);
        let down = ema(old, false, alpha);
        prop_assert!((0.0..=1.0).contains(&up));
        prop_assert!((0.0..=1.0).contains(&down));
        prop_assert!(up >= old - 1e-12);
        prop_assert!(down <= old + 1e-12);
    }

    #[test]
    fn pt_update_keeps_score_in_range(
        old in 0.0_f64..=1.0,
        outcomes in prop::collection::vec(any::<bool>(), 1..20),
    ) {
        let index = chain_index(4);
        let settings = LearnerSettings { mastery_threshold: 0.7, learning_rate: 0.3 };
        let config = MasteryConfig::default();
        let mut correct: HashSet<String> = HashSet::new();
        let mut score = old;
        for (n, ok) in outcomes.iter().enumerate() {
            let qid = format!("1.1-{}", n % 4);
            let update = update_on_attempt(
                score,
                Outcome { skill_id: "1.1", question_id: &qid, correct: *ok },
                &correct,
                &index,
                &settings,
                &config,
            );
            prop_assert!((0.0..=1.0).contains(&update.score));
            if update.exhausted {
                prop_assert_eq!(update.score, 1.0);
                prop_assert_eq!(update.status, MasteryStatus::Mastered);
            }
            if *ok {
                correct.insert(qid);
            }
            score = update.score;
        }
    }

    #[test]
    fn pt_stopping_respects_bounds(
        outcomes in prop::collection::vec(any::<bool>(), 0..40),
        min in 0_usize..20,
        span in 0_usize..20,
        deep in any::<bool>(),
    ) {
        let max = (min + span).max(1);
        let mode = if deep { TestMode::Deep } else { TestMode::Overview };
        let stop = stopping_condition(&outcomes, min, max, mode.policy(), &StoppingConfig::default());
        if outcomes.len() < min {
            prop_assert_eq!(stop, None);
        } else if outcomes.len() >= max {
            prop_assert_eq!(stop, Some(StopReason::MaxQuestions));
        }
        if deep {
            prop_assert_ne!(stop, Some(StopReason::Stability));
        }
    }

    #[test]
    fn pt_recommend_is_deterministic(
        scores in prop::collection::vec(0.0_f64..=1.0, 5),
    ) {
        let graph = chain_graph();
        let index = chain_index(2);
        let snapshot = snapshot_from(&scores);
        let a = recommend(&snapshot, &graph, &index, 0.7, None);
        let b = recommend(&snapshot, &graph, &index, 0.7, None);
        prop_assert_eq!(&a.skill_id, &b.skill_id);
        prop_assert_eq!(a.reason, b.reason);
        if let Some(skill) = &a.skill_id {
            prop_assert!(snapshot.score(skill) < 0.7);
            for parent in graph.parents(skill) {
                prop_assert!(snapshot.score(parent) >= 0.7);
            }
        }
    }

    #[test]
    fn pt_selection_stays_in_pool_and_unseen(
        seed in any::<u64>(),
        pool_mask in 1_u8..32,
        answered in 0_usize..8,
    ) {
        let graph = chain_graph();
        let index = chain_index(3);
        let pool: BTreeSet<String> = SKILLS
            .iter()
            .enumerate()
            .filter(|(i, _)| (pool_mask >> *i) & 1 == 1)
            .map(|(_, s)| s.to_string())
            .collect();
        let snapshot = MasterySnapshot::new();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut history: Vec<Attempt> = Vec::new();

        for turn in 0..answered {
            let ctx = SelectionContext {
                history: &history,
                snapshot: &snapshot,
                graph: &graph,
                index: &index,
                pool: &pool,
                policy: TestMode::Overview.policy(),
            };
            let Some(item) = select(&ctx, &SelectorConfig::default(), &mut rng) else {
                break;
            };
            prop_assert!(pool.contains(&item.skill_id));
            prop_assert!(history.iter().all(|a| a.question_id != item.question.id));
            history.push(Attempt {
                question_id: item.question.id.clone(),
                skill_id: item.skill_id.clone(),
                correct: turn % 2 == 0,
                difficulty: item.question.difficulty,
                timestamp: Utc::now(),
            });
        }
    }
}
