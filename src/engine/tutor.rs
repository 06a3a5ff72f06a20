//! Engine facade: wires providers to the pure scheduling, selection and
//! mastery functions, and owns persistence side effects.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::calibration::{pick_practice_question, shuffle_options};
use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::grading::grade;
use crate::engine::graph::SkillGraph;
use crate::engine::index::QuestionIndex;
use crate::engine::mastery::{self, DecayEvent, Outcome};
use crate::engine::providers::{
    ActivityLog, GraphProvider, MasteryStore, MemoryProviders, QuestionProvider,
};
use crate::engine::scheduler::{self, Recommendation};
use crate::engine::selector::{self, SelectionContext};
use crate::engine::session::{
    diagnostic_grant_candidates, diagnostic_packet, PlacementQuestion, Session, SessionConfig,
    SessionResult, StopReason, TestMode,
};
use crate::engine::types::{
    ActivityAction, ActivityEntry, Attempt, LearnerSettings, MasteryRecord, MasterySnapshot,
    MasteryStatus, Question, SelectedItem,
};
use crate::store::{Store, StoreError};

/// One subject's graph and question index, loaded once and shared by every
/// session on that subject.
#[derive(Debug, Clone)]
pub struct Course {
    pub subject: String,
    pub graph: SkillGraph,
    pub index: QuestionIndex,
}

/// A live test: the caller owns it and passes it back on every turn.
#[derive(Debug, Clone)]
pub struct TestRun {
    pub session: Session,
    pub snapshot: MasterySnapshot,
    pub settings: LearnerSettings,
    /// Resolved skill pool; empty means the whole course.
    pub pool: BTreeSet<String>,
    pub decay_events: Vec<DecayEvent>,
    pending: Option<SelectedItem>,
}

impl TestRun {
    pub fn pending(&self) -> Option<&SelectedItem> {
        self.pending.as_ref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerFeedback {
    pub correct: bool,
    pub correct_option: Option<String>,
    pub explanation: String,
    pub skill_id: String,
    pub score: f64,
    pub status: MasteryStatus,
    pub exhausted: bool,
    /// Prerequisites that lost score because of this answer.
    pub penalized: Vec<String>,
    pub stop_reason: Option<StopReason>,
}

pub struct Tutor {
    config: EngineConfig,
    graph: Arc<dyn GraphProvider>,
    questions: Arc<dyn QuestionProvider>,
    mastery: Arc<dyn MasteryStore>,
    activity: Arc<dyn ActivityLog>,
}

impl Tutor {
    pub fn new(
        config: EngineConfig,
        graph: Arc<dyn GraphProvider>,
        questions: Arc<dyn QuestionProvider>,
        mastery: Arc<dyn MasteryStore>,
        activity: Arc<dyn ActivityLog>,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        Ok(Self {
            config,
            graph,
            questions,
            mastery,
            activity,
        })
    }

    pub fn with_store(config: EngineConfig, store: Arc<Store>) -> Result<Self, EngineError> {
        Self::new(config, store.clone(), store.clone(), store.clone(), store)
    }

    pub fn with_memory(
        config: EngineConfig,
        memory: Arc<MemoryProviders>,
    ) -> Result<Self, EngineError> {
        Self::new(config, memory.clone(), memory.clone(), memory.clone(), memory)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn load_course(&self, subject: &str) -> Result<Course, EngineError> {
        let edges = self.graph.edges(subject)?;
        let questions = self.questions.questions(subject)?;
        if edges.is_empty() && questions.is_empty() {
            return Err(StoreError::NotFound {
                entity: "subject".to_string(),
                key: subject.to_string(),
            }
            .into());
        }

        let index = QuestionIndex::build(questions);
        let tagged: Vec<String> = index.skills().map(str::to_string).collect();
        let graph = SkillGraph::from_edges(&edges).with_nodes(tagged.iter().map(|s| s.as_str()));

        tracing::info!(
            subject,
            skills = graph.len(),
            questions = index.len(),
            "Course loaded"
        );
        Ok(Course {
            subject: subject.to_string(),
            graph,
            index,
        })
    }

    pub fn settings(&self, user_id: &str, subject: &str) -> Result<LearnerSettings, EngineError> {
        Ok(self
            .mastery
            .settings(user_id, subject)?
            .unwrap_or_else(|| self.config.mastery.default_settings()))
    }

    pub fn snapshot(&self, user_id: &str, subject: &str) -> Result<MasterySnapshot, EngineError> {
        let records = self.mastery.get(user_id, subject)?;
        Ok(MasterySnapshot::from_records(records.into_values()))
    }

    /// Best effort: a failing activity log never fails the caller.
    fn log_activity(&self, entry: ActivityEntry) {
        if let Err(e) = self.activity.append(&entry) {
            tracing::warn!(
                user_id = %entry.user_id,
                action = entry.action.as_str(),
                error = %e,
                "Activity log write failed"
            );
        }
    }

    fn decay_into(
        &self,
        user_id: &str,
        subject: &str,
        snapshot: &mut MasterySnapshot,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<DecayEvent>, EngineError> {
        let events = mastery::apply_decay(snapshot, threshold, &self.config.decay, now);
        for event in &events {
            let status = if event.flipped_to_review {
                MasteryStatus::Review
            } else {
                MasteryStatus::Mastered
            };
            self.mastery
                .upsert(user_id, &event.skill_id, subject, status, event.new_score, now)?;
            snapshot.insert(MasteryRecord {
                skill_id: event.skill_id.clone(),
                score: event.new_score,
                status,
                last_updated: now,
            });

            if event.flipped_to_review {
                self.log_activity(
                    ActivityEntry::new(user_id, ActivityAction::Decay, subject, now)
                        .with_skill(&event.skill_id)
                        .with_note(format!(
                            "decayed {:.2} -> {:.2} after {} days",
                            event.old_score, event.new_score, event.elapsed_days
                        )),
                );
            }
        }
        if !events.is_empty() {
            tracing::info!(user_id, subject, decayed = events.len(), "Applied forgetting decay");
        }
        Ok(events)
    }

    /// Applies time decay to the learner's mastered skills and persists it.
    pub fn apply_decay(
        &self,
        user_id: &str,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<DecayEvent>, EngineError> {
        let settings = self.settings(user_id, subject)?;
        let mut snapshot = self.snapshot(user_id, subject)?;
        self.decay_into(user_id, subject, &mut snapshot, settings.mastery_threshold, now)
    }

    pub fn recommend_next(
        &self,
        user_id: &str,
        course: &Course,
        exclude: Option<&str>,
    ) -> Result<Recommendation, EngineError> {
        let settings = self.settings(user_id, &course.subject)?;
        let snapshot = self.snapshot(user_id, &course.subject)?;
        Ok(scheduler::recommend(
            &snapshot,
            &course.graph,
            &course.index,
            settings.mastery_threshold,
            exclude,
        ))
    }

    pub fn review_queue(&self, user_id: &str, subject: &str) -> Result<Vec<MasteryRecord>, EngineError> {
        let snapshot = self.snapshot(user_id, subject)?;
        Ok(scheduler::review_queue(
            snapshot.records(),
            self.config.scheduler.review_queue_limit,
        ))
    }

    /// A practice question for the skill, options already shuffled.
    pub fn practice_question<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        course: &Course,
        skill_id: &str,
        last_question_id: Option<&str>,
        rng: &mut R,
    ) -> Result<Option<Question>, EngineError> {
        let snapshot = self.snapshot(user_id, &course.subject)?;
        let picked = pick_practice_question(
            &course.index,
            skill_id,
            snapshot.score(skill_id),
            last_question_id,
            &self.config.calibration,
            rng,
        );
        Ok(picked.map(|q| shuffle_options(q, rng)))
    }

    /// Grades a practice answer and updates mastery.
    pub fn submit_practice(
        &self,
        user_id: &str,
        course: &Course,
        answer: PracticeAnswer<'_>,
        now: DateTime<Utc>,
    ) -> Result<AnswerFeedback, EngineError> {
        if course.index.get(&answer.question.id).is_none() {
            return Err(EngineError::UnknownItem(answer.question.id.clone()));
        }
        let settings = self.settings(user_id, &course.subject)?;
        let mut snapshot = self.snapshot(user_id, &course.subject)?;
        self.record_answer(
            user_id,
            course,
            &mut snapshot,
            &settings,
            AnswerContext {
                skill_id: answer.skill_id,
                question: answer.question,
                selection: answer.selection,
                duration_secs: answer.duration_secs,
                action: ActivityAction::Practice,
            },
            now,
        )
    }

    fn record_answer(
        &self,
        user_id: &str,
        course: &Course,
        snapshot: &mut MasterySnapshot,
        settings: &LearnerSettings,
        answer: AnswerContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<AnswerFeedback, EngineError> {
        let subject = course.subject.as_str();
        let skill_id = answer.skill_id;
        let question = answer.question;
        let grade = grade(question, answer.selection);

        let correct_ids = self.mastery.correct_questions(user_id, subject, skill_id)?;
        let update = mastery::update_on_attempt(
            snapshot.score(skill_id),
            Outcome {
                skill_id,
                question_id: &question.id,
                correct: grade.correct,
            },
            &correct_ids,
            &course.index,
            settings,
            &self.config.mastery,
        );
        let record = MasteryRecord {
            skill_id: skill_id.to_string(),
            score: update.score,
            status: update.status,
            last_updated: now,
        };
        let penalties: Vec<MasteryRecord> = if grade.correct {
            Vec::new()
        } else {
            mastery::prerequisite_penalties(
                skill_id,
                &course.graph,
                snapshot,
                self.config.mastery.parent_penalty,
            )
            .into_iter()
            .map(|r| MasteryRecord {
                last_updated: now,
                ..r
            })
            .collect()
        };

        // All records are derived from the pre-answer snapshot, which moves
        // only after every write lands: a retry rewrites the same values.
        if grade.correct {
            self.mastery
                .mark_correct(user_id, subject, skill_id, &question.id)?;
        }
        for r in std::iter::once(&record).chain(&penalties) {
            self.mastery
                .upsert(user_id, &r.skill_id, subject, r.status, r.score, now)?;
        }

        let penalized: Vec<String> = penalties.iter().map(|r| r.skill_id.clone()).collect();
        snapshot.insert(record);
        for r in penalties {
            snapshot.insert(r);
        }

        self.log_activity(
            ActivityEntry::new(user_id, answer.action, subject, now)
                .with_skill(skill_id)
                .with_question(&question.id, grade.correct, answer.duration_secs),
        );

        tracing::debug!(
            user_id,
            skill_id,
            question_id = %question.id,
            correct = grade.correct,
            score = update.score,
            status = update.status.as_str(),
            exhausted = update.exhausted,
            "Answer recorded"
        );

        Ok(AnswerFeedback {
            correct: grade.correct,
            correct_option: grade.correct_option,
            explanation: question.explanation.clone(),
            skill_id: skill_id.to_string(),
            score: update.score,
            status: update.status,
            exhausted: update.exhausted,
            penalized,
            stop_reason: None,
        })
    }

    fn resolve_pool(&self, config: &SessionConfig, course: &Course, snapshot: &MasterySnapshot) -> BTreeSet<String> {
        if !config.skill_pool.is_empty() {
            return config.skill_pool.clone();
        }
        match config.mode {
            TestMode::Overview | TestMode::Deep => {
                scheduler::frontier_pool(snapshot, &course.graph, &self.config.scheduler)
            }
            TestMode::Manual => course.graph.nodes_in_chapters(&config.chapters),
            TestMode::Diagnostic => course.graph.nodes_in_chapters(&course.graph.chapters()),
        }
    }

    /// Validates the configuration, applies decay, resolves the skill pool and
    /// starts the session.
    pub fn begin_session(
        &self,
        user_id: &str,
        course: &Course,
        config: SessionConfig,
        now: DateTime<Utc>,
    ) -> Result<TestRun, EngineError> {
        config.validate()?;
        let settings = self.settings(user_id, &course.subject)?;
        let mut snapshot = self.snapshot(user_id, &course.subject)?;
        let decay_events = self.decay_into(
            user_id,
            &course.subject,
            &mut snapshot,
            settings.mastery_threshold,
            now,
        )?;

        let pool = self.resolve_pool(&config, course, &snapshot);
        let mut session = Session::new(user_id, &course.subject, config);
        session.start(now)?;

        tracing::info!(
            user_id,
            subject = %course.subject,
            session_id = %session.id,
            mode = session.config.mode.as_str(),
            pool = pool.len(),
            "Test session started"
        );
        self.log_activity(
            ActivityEntry::new(user_id, ActivityAction::SessionStart, &course.subject, now)
                .with_note(format!("{} session {}", session.config.mode.as_str(), session.id)),
        );

        Ok(TestRun {
            session,
            snapshot,
            settings,
            pool,
            decay_events,
            pending: None,
        })
    }

    /// Next question, or `None` once the session is over. Asking again before
    /// answering returns the same item.
    pub fn next_item<R: Rng + ?Sized>(
        &self,
        run: &mut TestRun,
        course: &Course,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<Option<SelectedItem>, EngineError> {
        if !run.session.is_active() {
            return Ok(None);
        }
        if let Some(item) = &run.pending {
            return Ok(Some(item.clone()));
        }
        if run.session.time_up(now) {
            run.session.finish(StopReason::TimeLimit, now);
            return Ok(None);
        }
        if run.session.history.len() >= run.session.config.max_questions {
            run.session.finish(StopReason::MaxQuestions, now);
            return Ok(None);
        }

        let ctx = SelectionContext {
            history: &run.session.history,
            snapshot: &run.snapshot,
            graph: &course.graph,
            index: &course.index,
            pool: &run.pool,
            policy: run.session.config.mode.policy(),
        };
        match selector::select(&ctx, &self.config.selector, rng) {
            Some(item) => {
                tracing::debug!(
                    session_id = %run.session.id,
                    skill_id = %item.skill_id,
                    question_id = %item.question.id,
                    strategy = %item.strategy_note(),
                    "Selected next item"
                );
                run.pending = Some(item.clone());
                Ok(Some(item))
            }
            None => {
                tracing::info!(
                    session_id = %run.session.id,
                    answered = run.session.history.len(),
                    "Question pool exhausted"
                );
                run.session.finish(StopReason::PoolExhausted, now);
                Ok(None)
            }
        }
    }

    /// Grades the pending item. On a persistence error the item stays pending
    /// so the caller can retry.
    pub fn submit_answer(
        &self,
        run: &mut TestRun,
        course: &Course,
        selection: &str,
        duration_secs: f64,
        now: DateTime<Utc>,
    ) -> Result<AnswerFeedback, EngineError> {
        run.session.ensure_active()?;
        let item = run.pending.clone().ok_or(EngineError::NoPendingItem)?;

        let mut feedback = self.record_answer(
            &run.session.user_id,
            course,
            &mut run.snapshot,
            &run.settings,
            AnswerContext {
                skill_id: &item.skill_id,
                question: &item.question,
                selection,
                duration_secs,
                action: ActivityAction::Test,
            },
            now,
        )?;

        run.session.record(Attempt {
            question_id: item.question.id.clone(),
            skill_id: item.skill_id.clone(),
            correct: feedback.correct,
            difficulty: item.question.difficulty,
            timestamp: now,
        })?;
        run.pending = None;
        feedback.stop_reason = run.session.evaluate_stop(now, &self.config.stopping);
        if let Some(reason) = feedback.stop_reason {
            tracing::info!(session_id = %run.session.id, reason = ?reason, "Session stopping");
        }
        Ok(feedback)
    }

    /// Learner-initiated stop; the result is marked incomplete.
    pub fn stop(&self, run: &mut TestRun, now: DateTime<Utc>) {
        if run.session.is_active() {
            run.pending = None;
            run.session.finish(StopReason::LearnerStopped, now);
        }
    }

    /// Closes the session, applies diagnostic chapter grants and builds the
    /// result. A still-active session counts as stopped by the learner.
    pub fn finish(
        &self,
        run: &mut TestRun,
        course: &Course,
        now: DateTime<Utc>,
    ) -> Result<SessionResult, EngineError> {
        self.stop(run, now);
        let session = &run.session;
        let user_id = session.user_id.as_str();

        let mut granted = Vec::new();
        if session.config.mode.policy().chapter_grant {
            for skill_id in diagnostic_grant_candidates(&session.history, &course.graph) {
                let record = MasteryRecord {
                    skill_id: skill_id.clone(),
                    score: self.config.results.diagnostic_grant_score,
                    status: MasteryStatus::Mastered,
                    last_updated: now,
                };
                if self.mastery.insert_if_absent(user_id, &course.subject, &record)? {
                    run.snapshot.insert(record);
                    granted.push(skill_id);
                }
            }
            if !granted.is_empty() {
                self.log_activity(
                    ActivityEntry::new(user_id, ActivityAction::DiagnosticGrant, &course.subject, now)
                        .with_note(granted.join(",")),
                );
            }
        }

        let result = session.result(granted, &self.config.results);
        self.log_activity(
            ActivityEntry::new(user_id, ActivityAction::SessionFinish, &course.subject, now).with_note(
                format!(
                    "{}/{} correct, {:?}",
                    result.correct, result.total, result.stop_reason
                ),
            ),
        );
        tracing::info!(
            user_id,
            session_id = %result.session_id,
            total = result.total,
            correct = result.correct,
            accuracy = result.accuracy,
            band = ?result.band,
            incomplete = result.incomplete,
            exhausted = result.exhausted,
            granted = result.granted_skills.len(),
            "Test session finished"
        );
        Ok(result)
    }

    /// Fixed placement test: one question per chapter.
    pub fn placement_test<R: Rng + ?Sized>(&self, course: &Course, rng: &mut R) -> Vec<PlacementQuestion> {
        diagnostic_packet(&course.graph, &course.index, rng)
    }
}

/// A practice answer. `question` is the question exactly as presented, so
/// its key matches the shuffled labels.
#[derive(Debug, Clone, Copy)]
pub struct PracticeAnswer<'a> {
    pub skill_id: &'a str,
    pub question: &'a Question,
    pub selection: &'a str,
    pub duration_secs: f64,
}

struct AnswerContext<'a> {
    skill_id: &'a str,
    question: &'a Question,
    selection: &'a str,
    duration_secs: f64,
    action: ActivityAction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{Difficulty, PrerequisiteEdge};
    use chrono::Duration;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn question(id: &str, skill: &str, difficulty: Difficulty) -> Question {
        Question {
            id: id.to_string(),
            skill_tags: vec![skill.to_string()],
            options: vec!["A. right".to_string(), "B. wrong".to_string()],
            answer: "A".to_string(),
            difficulty,
            explanation: format!("explains {}", id),
        }
    }

    fn memory() -> Arc<MemoryProviders> {
        let edges = vec![
            PrerequisiteEdge::new("1.1", "1.2", "math"),
            PrerequisiteEdge::new("1.2", "2.1", "math"),
        ];
        let questions = vec![
            question("a1", "1.1", Difficulty::Easy),
            question("a2", "1.1", Difficulty::Medium),
            question("b1", "1.2", Difficulty::Medium),
            question("c1", "2.1", Difficulty::Hard),
        ];
        Arc::new(MemoryProviders::new().with_course("math", edges, questions))
    }

    fn answer_for(item: &SelectedItem, correct: bool) -> String {
        let wanted = if correct { "right" } else { "wrong" };
        item.question
            .options
            .iter()
            .find(|o| o.ends_with(wanted))
            .cloned()
            .unwrap()
    }

    /// Delegates to memory but fails the next `mark_correct`, or the next
    /// upsert of one skill, exactly once.
    struct FlakyMastery {
        inner: Arc<MemoryProviders>,
        fail_mark: std::sync::atomic::AtomicBool,
        fail_upsert_of: std::sync::Mutex<Option<String>>,
    }

    impl FlakyMastery {
        fn new(inner: Arc<MemoryProviders>) -> Self {
            Self {
                inner,
                fail_mark: std::sync::atomic::AtomicBool::new(false),
                fail_upsert_of: std::sync::Mutex::new(None),
            }
        }

        fn outage() -> StoreError {
            StoreError::Unavailable("transient outage".to_string())
        }
    }

    impl MasteryStore for FlakyMastery {
        fn get(
            &self,
            user_id: &str,
            subject: &str,
        ) -> Result<std::collections::HashMap<String, MasteryRecord>, StoreError> {
            self.inner.get(user_id, subject)
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
            let mut target = self.fail_upsert_of.lock().unwrap();
            if target.as_deref() == Some(skill_id) {
                *target = None;
                return Err(Self::outage());
            }
            self.inner
                .upsert(user_id, skill_id, subject, status, score, timestamp)
        }

        fn insert_if_absent(
            &self,
            user_id: &str,
            subject: &str,
            record: &MasteryRecord,
        ) -> Result<bool, StoreError> {
            self.inner.insert_if_absent(user_id, subject, record)
        }

        fn settings(&self, user_id: &str, subject: &str) -> Result<Option<LearnerSettings>, StoreError> {
            self.inner.settings(user_id, subject)
        }

        fn correct_questions(
            &self,
            user_id: &str,
            subject: &str,
            skill_id: &str,
        ) -> Result<std::collections::HashSet<String>, StoreError> {
            self.inner.correct_questions(user_id, subject, skill_id)
        }

        fn mark_correct(
            &self,
            user_id: &str,
            subject: &str,
            skill_id: &str,
            question_id: &str,
        ) -> Result<(), StoreError> {
            if self.fail_mark.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(Self::outage());
            }
            self.inner.mark_correct(user_id, subject, skill_id, question_id)
        }
    }

    fn flaky_tutor() -> (Arc<MemoryProviders>, Arc<FlakyMastery>, Tutor) {
        let mem = memory();
        let flaky = Arc::new(FlakyMastery::new(mem.clone()));
        let tutor = Tutor::new(
            EngineConfig::default(),
            mem.clone(),
            mem.clone(),
            flaky.clone(),
            mem.clone(),
        )
        .unwrap();
        (mem, flaky, tutor)
    }

    #[test]
    fn retry_after_failed_mark_correct_counts_answer_once() {
        let (_mem, flaky, tutor) = flaky_tutor();
        let course = tutor.load_course("math").unwrap();
        let now = Utc::now();
        let config = SessionConfig::new(TestMode::Manual, &tutor.config().stopping)
            .with_limits(1, 5)
            .with_pool(["1.1"]);
        let mut run = tutor.begin_session("u1", &course, config, now).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let item = tutor.next_item(&mut run, &course, &mut rng, now).unwrap().unwrap();
        assert_eq!(item.skill_id, "1.1");

        flaky.fail_mark.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = tutor
            .submit_answer(&mut run, &course, &answer_for(&item, true), 2.0, now)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(run.pending().is_some());
        assert!(run.session.history.is_empty());
        assert!(!run.snapshot.contains("1.1"));

        let feedback = tutor
            .submit_answer(&mut run, &course, &answer_for(&item, true), 2.0, now)
            .unwrap();
        assert!((feedback.score - 0.3).abs() < 1e-9);
        assert!((run.snapshot.score("1.1") - 0.3).abs() < 1e-9);
        assert!((tutor.snapshot("u1", "math").unwrap().score("1.1") - 0.3).abs() < 1e-9);
        assert_eq!(run.session.history.len(), 1);
    }

    #[test]
    fn retry_after_failed_penalty_write_penalizes_once() {
        let (mem, flaky, tutor) = flaky_tutor();
        let course = tutor.load_course("math").unwrap();
        let now = Utc::now();
        mem.upsert("u1", "1.1", "math", MasteryStatus::Mastered, 0.9, now)
            .unwrap();
        mem.upsert("u1", "1.2", "math", MasteryStatus::InProgress, 0.5, now)
            .unwrap();

        let config = SessionConfig::new(TestMode::Manual, &tutor.config().stopping)
            .with_limits(1, 5)
            .with_pool(["1.2"]);
        let mut run = tutor.begin_session("u1", &course, config, now).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let item = tutor.next_item(&mut run, &course, &mut rng, now).unwrap().unwrap();
        assert_eq!(item.skill_id, "1.2");

        *flaky.fail_upsert_of.lock().unwrap() = Some("1.1".to_string());
        let err = tutor
            .submit_answer(&mut run, &course, &answer_for(&item, false), 2.0, now)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(run.pending().is_some());
        assert!((run.snapshot.score("1.2") - 0.5).abs() < 1e-9);
        assert!((run.snapshot.score("1.1") - 0.9).abs() < 1e-9);

        let feedback = tutor
            .submit_answer(&mut run, &course, &answer_for(&item, false), 2.0, now)
            .unwrap();
        assert_eq!(feedback.penalized, vec!["1.1".to_string()]);
        let stored = tutor.snapshot("u1", "math").unwrap();
        assert!((stored.score("1.2") - 0.35).abs() < 1e-9);
        assert!((stored.score("1.1") - 0.75).abs() < 1e-9);
        assert!((run.snapshot.score("1.2") - 0.35).abs() < 1e-9);
        assert!((run.snapshot.score("1.1") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn unknown_subject_is_not_found() {
        let tutor = Tutor::with_memory(EngineConfig::default(), memory()).unwrap();
        let err = tutor.load_course("history").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Persistence(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn wrong_practice_penalizes_existing_parent_only() {
        let mem = memory();
        let tutor = Tutor::with_memory(EngineConfig::default(), mem.clone()).unwrap();
        let course = tutor.load_course("math").unwrap();
        let now = Utc::now();
        mem.upsert("u1", "1.1", "math", MasteryStatus::Mastered, 0.9, now)
            .unwrap();

        let presented = question("b1", "1.2", Difficulty::Medium);
        let feedback = tutor
            .submit_practice(
                "u1",
                &course,
                PracticeAnswer {
                    skill_id: "1.2",
                    question: &presented,
                    selection: "B",
                    duration_secs: 3.0,
                },
                now,
            )
            .unwrap();
        assert!(!feedback.correct);
        assert_eq!(feedback.correct_option.as_deref(), Some("A. right"));
        assert_eq!(feedback.penalized, vec!["1.1".to_string()]);

        let snapshot = tutor.snapshot("u1", "math").unwrap();
        assert!((snapshot.score("1.1") - 0.75).abs() < 1e-9);
        assert_eq!(snapshot.get("1.1").unwrap().status, MasteryStatus::Mastered);
        assert_eq!(snapshot.get("1.2").unwrap().status, MasteryStatus::Review);
    }

    #[test]
    fn mastery_write_failure_keeps_item_pending() {
        let mem = memory();
        let tutor = Tutor::with_memory(EngineConfig::default(), mem.clone()).unwrap();
        let course = tutor.load_course("math").unwrap();
        let now = Utc::now();
        let config = SessionConfig::new(TestMode::Overview, &tutor.config().stopping).with_limits(1, 5);
        let mut run = tutor.begin_session("u1", &course, config, now).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let item = tutor.next_item(&mut run, &course, &mut rng, now).unwrap().unwrap();

        mem.fail_mastery_writes(true);
        let err = tutor
            .submit_answer(&mut run, &course, &answer_for(&item, true), 2.0, now)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(run.pending().is_some());
        assert!(run.session.history.is_empty());

        mem.fail_mastery_writes(false);
        let feedback = tutor
            .submit_answer(&mut run, &course, &answer_for(&item, true), 2.0, now)
            .unwrap();
        assert!(feedback.correct);
        assert_eq!(run.session.history.len(), 1);
    }

    #[test]
    fn activity_log_failure_is_swallowed() {
        let mem = memory();
        let tutor = Tutor::with_memory(EngineConfig::default(), mem.clone()).unwrap();
        let course = tutor.load_course("math").unwrap();
        mem.fail_activity_writes(true);

        let presented = question("a1", "1.1", Difficulty::Easy);
        let feedback = tutor
            .submit_practice(
                "u1",
                &course,
                PracticeAnswer {
                    skill_id: "1.1",
                    question: &presented,
                    selection: "A. right",
                    duration_secs: 1.0,
                },
                Utc::now(),
            )
            .unwrap();
        assert!(feedback.correct);
        assert!(mem.activity().is_empty());
    }

    #[test]
    fn diagnostic_finish_grants_chapter_siblings() {
        let mem = memory();
        let tutor = Tutor::with_memory(EngineConfig::default(), mem.clone()).unwrap();
        let course = tutor.load_course("math").unwrap();
        let now = Utc::now();
        let config = SessionConfig::new(TestMode::Diagnostic, &tutor.config().stopping)
            .with_limits(1, 1)
            .with_pool(["1.2"]);
        let mut run = tutor.begin_session("u1", &course, config, now).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let item = tutor.next_item(&mut run, &course, &mut rng, now).unwrap().unwrap();
        assert_eq!(item.skill_id, "1.2");
        let feedback = tutor
            .submit_answer(&mut run, &course, &answer_for(&item, true), 2.0, now)
            .unwrap();
        assert_eq!(feedback.stop_reason, Some(StopReason::MaxQuestions));

        let result = tutor.finish(&mut run, &course, now + Duration::seconds(5)).unwrap();
        assert_eq!(result.granted_skills, vec!["1.1".to_string()]);
        assert!(!result.incomplete);

        let snapshot = tutor.snapshot("u1", "math").unwrap();
        assert_eq!(snapshot.score("1.1"), 0.8);
        assert_eq!(snapshot.get("1.1").unwrap().status, MasteryStatus::Mastered);
        // 1.2 was answered, so it keeps its own score.
        assert_eq!(snapshot.score("1.2"), 1.0);
        assert!(!snapshot.contains("2.1"));
    }

    #[test]
    fn exhausted_pool_finishes_session() {
        let tutor = Tutor::with_memory(EngineConfig::default(), memory()).unwrap();
        let course = tutor.load_course("math").unwrap();
        let now = Utc::now();
        let config = SessionConfig::new(TestMode::Manual, &tutor.config().stopping)
            .with_limits(0, 10)
            .with_chapters(&[2]);
        let mut run = tutor.begin_session("u1", &course, config, now).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let item = tutor.next_item(&mut run, &course, &mut rng, now).unwrap().unwrap();
        assert_eq!(item.question.id, "c1");
        tutor
            .submit_answer(&mut run, &course, &answer_for(&item, false), 2.0, now)
            .unwrap();
        assert!(tutor.next_item(&mut run, &course, &mut rng, now).unwrap().is_none());

        let result = tutor.finish(&mut run, &course, now).unwrap();
        assert!(result.exhausted);
        assert_eq!(result.stop_reason, Some(StopReason::PoolExhausted));
        assert_eq!(result.total, 1);
    }

    #[test]
    fn decay_at_session_start_flips_to_review() {
        let mem = memory();
        let tutor = Tutor::with_memory(EngineConfig::default(), mem.clone()).unwrap();
        let course = tutor.load_course("math").unwrap();
        let now = Utc::now();
        mem.upsert(
            "u1",
            "1.1",
            "math",
            MasteryStatus::Mastered,
            0.75,
            now - Duration::days(3),
        )
        .unwrap();

        let config = SessionConfig::new(TestMode::Overview, &tutor.config().stopping);
        let run = tutor.begin_session("u1", &course, config, now).unwrap();
        assert_eq!(run.decay_events.len(), 1);
        assert_eq!(run.snapshot.get("1.1").unwrap().status, MasteryStatus::Review);
        assert!(run.pool.contains("1.1"));
        assert!(mem
            .activity()
            .iter()
            .any(|e| e.action == ActivityAction::Decay));
    }
}
