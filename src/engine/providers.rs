//! Injected collaborators. The engine never talks to storage directly.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::engine::types::{
    ActivityEntry, LearnerSettings, MasteryRecord, MasteryStatus, PrerequisiteEdge, Question,
};
use crate::store::{Store, StoreError};

pub trait GraphProvider: Send + Sync {
    fn edges(&self, subject: &str) -> Result<Vec<PrerequisiteEdge>, StoreError>;
}

pub trait QuestionProvider: Send + Sync {
    fn questions(&self, subject: &str) -> Result<Vec<Question>, StoreError>;
}

pub trait MasteryStore: Send + Sync {
    fn get(&self, user_id: &str, subject: &str)
        -> Result<HashMap<String, MasteryRecord>, StoreError>;

    fn upsert(
        &self,
        user_id: &str,
        skill_id: &str,
        subject: &str,
        status: MasteryStatus,
        score: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Writes only when the learner has no record for the skill.
    fn insert_if_absent(
        &self,
        user_id: &str,
        subject: &str,
        record: &MasteryRecord,
    ) -> Result<bool, StoreError>;

    fn settings(&self, user_id: &str, subject: &str) -> Result<Option<LearnerSettings>, StoreError>;

    /// Question ids ever answered correctly for the skill.
    fn correct_questions(
        &self,
        user_id: &str,
        subject: &str,
        skill_id: &str,
    ) -> Result<HashSet<String>, StoreError>;

    fn mark_correct(
        &self,
        user_id: &str,
        subject: &str,
        skill_id: &str,
        question_id: &str,
    ) -> Result<(), StoreError>;
}

pub trait ActivityLog: Send + Sync {
    fn append(&self, entry: &ActivityEntry) -> Result<(), StoreError>;
}

impl GraphProvider for Store {
    fn edges(&self, subject: &str) -> Result<Vec<PrerequisiteEdge>, StoreError> {
        self.list_edges(subject)
    }
}

impl QuestionProvider for Store {
    fn questions(&self, subject: &str) -> Result<Vec<Question>, StoreError> {
        self.list_questions(subject)
    }
}

impl MasteryStore for Store {
    fn get(
        &self,
        user_id: &str,
        subject: &str,
    ) -> Result<HashMap<String, MasteryRecord>, StoreError> {
        self.get_mastery(user_id, subject)
    }

    fn upsert(
        &self,
        user_id: &str,
        skill_id: &str,
        subject: &str,
        status: MasteryStatus,
        score: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let record = MasteryRecord {
            skill_id: skill_id.to_string(),
            score,
            status,
            last_updated: timestamp,
        };
        self.upsert_mastery(user_id, subject, &record)
    }

    fn insert_if_absent(
        &self,
        user_id: &str,
        subject: &str,
        record: &MasteryRecord,
    ) -> Result<bool, StoreError> {
        self.insert_mastery_if_absent(user_id, subject, record)
    }

    fn settings(&self, user_id: &str, subject: &str) -> Result<Option<LearnerSettings>, StoreError> {
        self.get_settings(user_id, subject)
    }

    fn correct_questions(
        &self,
        user_id: &str,
        subject: &str,
        skill_id: &str,
    ) -> Result<HashSet<String>, StoreError> {
        self.correct_question_ids(user_id, subject, skill_id)
    }

    fn mark_correct(
        &self,
        user_id: &str,
        subject: &str,
        skill_id: &str,
        question_id: &str,
    ) -> Result<(), StoreError> {
        Store::mark_correct(self, user_id, subject, skill_id, question_id)
    }
}

impl ActivityLog for Store {
    fn append(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        self.append_activity(entry)
    }
}

#[derive(Default)]
struct MemoryState {
    edges: HashMap<String, Vec<PrerequisiteEdge>>,
    questions: HashMap<String, Vec<Question>>,
    /// (user, subject) -> skill -> record
    mastery: HashMap<(String, String), HashMap<String, MasteryRecord>>,
    settings: HashMap<(String, String), LearnerSettings>,
    correct: HashMap<(String, String, String), HashSet<String>>,
    activity: Vec<ActivityEntry>,
}

/// In-process provider set for tests and embedding without a database.
#[derive(Default)]
pub struct MemoryProviders {
    state: Mutex<MemoryState>,
    fail_mastery_writes: AtomicBool,
    fail_activity_writes: AtomicBool,
}

impl MemoryProviders {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store poisoned: {}", e)))
    }

    pub fn with_course(self, subject: &str, edges: Vec<PrerequisiteEdge>, questions: Vec<Question>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.edges.insert(subject.to_string(), edges);
            state.questions.insert(subject.to_string(), questions);
        }
        self
    }

    pub fn set_settings(&self, user_id: &str, subject: &str, settings: LearnerSettings) -> Result<(), StoreError> {
        self.lock()?
            .settings
            .insert((user_id.to_string(), subject.to_string()), settings);
        Ok(())
    }

    /// Makes every subsequent mastery write fail with `Unavailable`.
    pub fn fail_mastery_writes(&self, fail: bool) {
        self.fail_mastery_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_activity_writes(&self, fail: bool) {
        self.fail_activity_writes.store(fail, Ordering::SeqCst);
    }

    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.lock().map(|s| s.activity.clone()).unwrap_or_default()
    }

    fn check_mastery_writable(&self) -> Result<(), StoreError> {
        if self.fail_mastery_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("mastery writes disabled".to_string()));
        }
        Ok(())
    }
}

impl GraphProvider for MemoryProviders {
    fn edges(&self, subject: &str) -> Result<Vec<PrerequisiteEdge>, StoreError> {
        Ok(self.lock()?.edges.get(subject).cloned().unwrap_or_default())
    }
}

impl QuestionProvider for MemoryProviders {
    fn questions(&self, subject: &str) -> Result<Vec<Question>, StoreError> {
        Ok(self.lock()?.questions.get(subject).cloned().unwrap_or_default())
    }
}

impl MasteryStore for MemoryProviders {
    fn get(
        &self,
        user_id: &str,
        subject: &str,
    ) -> Result<HashMap<String, MasteryRecord>, StoreError> {
        Ok(self
            .lock()?
            .mastery
            .get(&(user_id.to_string(), subject.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn upsert(
        &self,
        user_id: &str,
        skill_id: &str,
        subject: &str,
        status: MasteryStatus,
        score: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_mastery_writable()?;
        self.lock()?
            .mastery
            .entry((user_id.to_string(), subject.to_string()))
            .or_default()
            .insert(
                skill_id.to_string(),
                MasteryRecord {
                    skill_id: skill_id.to_string(),
                    score,
                    status,
                    last_updated: timestamp,
                },
            );
        Ok(())
    }

    fn insert_if_absent(
        &self,
        user_id: &str,
        subject: &str,
        record: &MasteryRecord,
    ) -> Result<bool, StoreError> {
        self.check_mastery_writable()?;
        let mut state = self.lock()?;
        let records = state
            .mastery
            .entry((user_id.to_string(), subject.to_string()))
            .or_default();
        if records.contains_key(&record.skill_id) {
            return Ok(false);
        }
        records.insert(record.skill_id.clone(), record.clone());
        Ok(true)
    }

    fn settings(&self, user_id: &str, subject: &str) -> Result<Option<LearnerSettings>, StoreError> {
        Ok(self
            .lock()?
            .settings
            .get(&(user_id.to_string(), subject.to_string()))
            .copied())
    }

    fn correct_questions(
        &self,
        user_id: &str,
        subject: &str,
        skill_id: &str,
    ) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .lock()?
            .correct
            .get(&(user_id.to_string(), subject.to_string(), skill_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn mark_correct(
        &self,
        user_id: &str,
        subject: &str,
        skill_id: &str,
        question_id: &str,
    ) -> Result<(), StoreError> {
        self.check_mastery_writable()?;
        self.lock()?
            .correct
            .entry((user_id.to_string(), subject.to_string(), skill_id.to_string()))
            .or_default()
            .insert(question_id.to_string());
        Ok(())
    }
}

impl ActivityLog for MemoryProviders {
    fn append(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        if self.fail_activity_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("activity log offline".to_string()));
        }
        self.lock()?.activity.push(entry.clone());
        Ok(())
    }
}
