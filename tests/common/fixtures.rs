use std::sync::Arc;

use tempfile::TempDir;

use mastery_engine::engine::providers::MemoryProviders;
use mastery_engine::engine::types::{Difficulty, PrerequisiteEdge, Question, SelectedItem};
use mastery_engine::engine::{EngineConfig, Tutor};
use mastery_engine::store::Store;

pub const SUBJECT: &str = "math";

pub fn question(id: &str, skill: &str, difficulty: Difficulty) -> Question {
    Question {
        id: id.to_string(),
        skill_tags: vec![skill.to_string()],
        options: vec![
            "A. correct".to_string(),
            "B. wrong one".to_string(),
            "C. wrong two".to_string(),
        ],
        answer: "A".to_string(),
        difficulty,
        explanation: format!("about {}", skill),
    }
}

pub fn edges(pairs: &[(&str, &str)]) -> Vec<PrerequisiteEdge> {
    pairs
        .iter()
        .map(|(s, t)| PrerequisiteEdge::new(s, t, SUBJECT))
        .collect()
}

/// `per_skill` questions per skill, cycling easy/medium/hard.
pub fn questions_for(skills: &[&str], per_skill: usize) -> Vec<Question> {
    let ladder = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
    let mut out = Vec::new();
    for skill in skills {
        for n in 0..per_skill {
            out.push(question(&format!("{}-{}", skill, n), skill, ladder[n % 3]));
        }
    }
    out
}

pub fn memory_tutor(
    pairs: &[(&str, &str)],
    questions: Vec<Question>,
) -> (Arc<MemoryProviders>, Tutor) {
    let memory = Arc::new(MemoryProviders::new().with_course(SUBJECT, edges(pairs), questions));
    let tutor = Tutor::with_memory(EngineConfig::default(), memory.clone()).expect("valid config");
    (memory, tutor)
}

pub fn store_tutor(pairs: &[(&str, &str)], questions: Vec<Question>) -> (TempDir, Arc<Store>, Tutor) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db");
    let store = Arc::new(Store::open(path.to_str().expect("utf8 path")).expect("open store"));
    store.run_migrations().expect("migrate");
    store.put_edges(&edges(pairs)).expect("seed edges");
    store.put_questions(SUBJECT, &questions).expect("seed questions");
    let tutor = Tutor::with_store(EngineConfig::default(), store.clone()).expect("valid config");
    (dir, store, tutor)
}

/// The option text a learner would click to answer right or wrong.
pub fn choose(item: &SelectedItem, correct: bool) -> String {
    item.question
        .options
        .iter()
        .find(|o| o.contains("correct") == correct)
        .cloned()
        .expect("option present")
}
