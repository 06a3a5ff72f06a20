pub const EDGES: &str = "edges";
pub const QUESTIONS: &str = "questions";
pub const MASTERY: &str = "mastery";
pub const SETTINGS: &str = "learner_settings";
pub const ACTIVITY: &str = "activity_log";
pub const CORRECT_ANSWERS: &str = "correct_answers";
pub const META: &str = "meta";
