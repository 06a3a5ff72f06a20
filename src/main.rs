use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use mastery_engine::config::Config;
use mastery_engine::engine::calibration::parse_option;
use mastery_engine::engine::types::{Difficulty, PrerequisiteEdge, Question, SelectedItem};
use mastery_engine::engine::{EngineConfig, SessionConfig, TestMode, Tutor};
use mastery_engine::logging::{init_tracing, LogConfig};
use mastery_engine::store::Store;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&LogConfig::from(&config)).expect("Failed to initialize tracing");
    tracing::info!("Starting mastery-engine simulation");

    let store = Arc::new(Store::open(&config.sled_path).expect("Failed to open sled database"));
    store.run_migrations().expect("Failed to run migrations");

    let sim = &config.simulation;
    match store.has_content(&sim.subject) {
        Ok(true) => {}
        Ok(false) => {
            seed_demo_course(&store, &sim.subject).expect("Failed to seed demo course");
            tracing::info!(subject = %sim.subject, "Seeded demo course");
        }
        Err(e) => panic!("FATAL: cannot read course content: {}", e),
    }

    let engine_config = EngineConfig::from_env(&config.engine);
    let tutor = Tutor::with_store(engine_config, store.clone()).expect("Invalid engine config");
    let course = tutor.load_course(&sim.subject).expect("Failed to load course");

    let mode: TestMode = sim.mode.parse().unwrap_or_else(|e: String| {
        tracing::warn!(error = %e, "Falling back to overview mode");
        TestMode::Overview
    });
    let mut session_config = SessionConfig::new(mode, &tutor.config().stopping)
        .with_limits(sim.min_questions, sim.max_questions)
        .with_time_limit(sim.time_limit_secs);
    if mode == TestMode::Manual {
        session_config = session_config.with_chapters(&course.graph.chapters());
    }

    let mut rng = ChaCha8Rng::seed_from_u64(sim.seed);
    let learner = SimulatedLearner::new(&course.graph.nodes().collect::<Vec<_>>(), &mut rng);

    let mut now = Utc::now();
    let mut run = match tutor.begin_session(&sim.user_id, &course, session_config, now) {
        Ok(run) => run,
        Err(e) => {
            tracing::error!(error = %e, "Could not start session");
            return;
        }
    };

    loop {
        let item = match tutor.next_item(&mut run, &course, &mut rng, now) {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Selection failed");
                break;
            }
        };
        let selection = learner.answer(&item, &mut rng);
        let think_secs = rng.gen_range(5..40);
        now += Duration::seconds(think_secs);

        match tutor.submit_answer(&mut run, &course, &selection, think_secs as f64, now) {
            Ok(feedback) => tracing::info!(
                skill_id = %feedback.skill_id,
                strategy = %item.strategy_note(),
                correct = feedback.correct,
                score = feedback.score,
                "Answered"
            ),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "Answer not recorded, stopping simulation");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Answer rejected");
                break;
            }
        }
    }

    match tutor.finish(&mut run, &course, now) {
        Ok(result) => tracing::info!(
            total = result.total,
            correct = result.correct,
            accuracy = result.accuracy,
            band = ?result.band,
            stop_reason = ?result.stop_reason,
            "Simulation finished"
        ),
        Err(e) => tracing::error!(error = %e, "Failed to finish session"),
    }

    match tutor.recommend_next(&sim.user_id, &course, None) {
        Ok(rec) => tracing::info!(
            skill_id = ?rec.skill_id,
            reason = ?rec.reason,
            description = %rec.description,
            "Next lesson"
        ),
        Err(e) => tracing::error!(error = %e, "Recommendation failed"),
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
}

/// Answers correctly with a hidden per-skill probability.
struct SimulatedLearner {
    ability: HashMap<String, f64>,
}

impl SimulatedLearner {
    fn new<R: Rng>(skills: &[&str], rng: &mut R) -> Self {
        let ability = skills
            .iter()
            .map(|s| (s.to_string(), rng.gen_range(0.2..0.95)))
            .collect();
        Self { ability }
    }

    fn answer<R: Rng>(&self, item: &SelectedItem, rng: &mut R) -> String {
        let mut p = self.ability.get(&item.skill_id).copied().unwrap_or(0.5);
        p -= match item.question.difficulty {
            Difficulty::Easy => -0.1,
            Difficulty::Medium => 0.0,
            Difficulty::Hard => 0.15,
        };
        let key = item.question.answer.as_str();
        if rng.gen_bool(p.clamp(0.05, 0.95)) {
            return key.to_string();
        }
        item.question
            .options
            .iter()
            .filter_map(|o| parse_option(o).map(|(label, _)| label))
            .find(|label| !label.eq_ignore_ascii_case(key))
            .unwrap_or(key)
            .to_string()
    }
}

fn seed_demo_course(store: &Store, subject: &str) -> Result<(), mastery_engine::store::StoreError> {
    let chain = [
        ("1.1", "1.2"),
        ("1.2", "1.3"),
        ("1.3", "2.1"),
        ("2.1", "2.2"),
        ("2.2", "2.3"),
    ];
    let edges: Vec<PrerequisiteEdge> = chain
        .iter()
        .map(|(s, t)| PrerequisiteEdge::new(s, t, subject))
        .collect();
    store.put_edges(&edges)?;

    let mut questions = Vec::new();
    for skill in ["1.1", "1.2", "1.3", "2.1", "2.2", "2.3"] {
        for (n, difficulty) in [
            Difficulty::Easy,
            Difficulty::Easy,
            Difficulty::Medium,
            Difficulty::Medium,
            Difficulty::Hard,
        ]
        .into_iter()
        .enumerate()
        {
            questions.push(Question {
                id: format!("{}-q{}", skill, n + 1),
                skill_tags: vec![skill.to_string()],
                options: vec![
                    format!("A. {} answer", skill),
                    "B. distractor one".to_string(),
                    "C. distractor two".to_string(),
                    "D. distractor three".to_string(),
                ],
                answer: "A".to_string(),
                difficulty,
                explanation: format!("Lesson {} covers this.", skill),
            });
        }
    }
    store.put_questions(subject, &questions)?;
    Ok(())
}
