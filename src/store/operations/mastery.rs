use std::collections::{HashMap, HashSet};

use crate::engine::types::{LearnerSettings, MasteryRecord};
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    pub fn get_mastery(
        &self,
        user_id: &str,
        subject: &str,
    ) -> Result<HashMap<String, MasteryRecord>, StoreError> {
        let prefix = keys::mastery_prefix(user_id, subject)?;
        let mut records = HashMap::new();
        for item in self.mastery.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            let record: MasteryRecord = Self::deserialize(&raw)?;
            records.insert(record.skill_id.clone(), record);
        }
        Ok(records)
    }

    /// Last writer wins.
    pub fn upsert_mastery(
        &self,
        user_id: &str,
        subject: &str,
        record: &MasteryRecord,
    ) -> Result<(), StoreError> {
        let key = keys::mastery_key(user_id, subject, &record.skill_id)?;
        self.mastery.insert(key.as_bytes(), Self::serialize(record)?)?;
        Ok(())
    }

    /// Returns `false` when a record already exists; the existing record is untouched.
    pub fn insert_mastery_if_absent(
        &self,
        user_id: &str,
        subject: &str,
        record: &MasteryRecord,
    ) -> Result<bool, StoreError> {
        let key = keys::mastery_key(user_id, subject, &record.skill_id)?;
        let cas_result = self
            .mastery
            .compare_and_swap(
                key.as_bytes(),
                None::<&[u8]>,
                Some(Self::serialize(record)?),
            )
            .map_err(StoreError::Sled)?;
        Ok(cas_result.is_ok())
    }

    pub fn get_settings(
        &self,
        user_id: &str,
        subject: &str,
    ) -> Result<Option<LearnerSettings>, StoreError> {
        let key = keys::settings_key(user_id, subject)?;
        match self.settings.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_settings(
        &self,
        user_id: &str,
        subject: &str,
        settings: &LearnerSettings,
    ) -> Result<(), StoreError> {
        if !(0.0..=1.0).contains(&settings.mastery_threshold)
            || settings.learning_rate <= 0.0
            || settings.learning_rate > 1.0
        {
            return Err(StoreError::Validation(format!(
                "settings out of range: threshold={}, learning_rate={}",
                settings.mastery_threshold, settings.learning_rate
            )));
        }
        let key = keys::settings_key(user_id, subject)?;
        self.settings.insert(key.as_bytes(), Self::serialize(settings)?)?;
        Ok(())
    }

    pub fn correct_question_ids(
        &self,
        user_id: &str,
        subject: &str,
        skill_id: &str,
    ) -> Result<HashSet<String>, StoreError> {
        let prefix = keys::correct_prefix(user_id, subject, skill_id)?;
        let mut ids = HashSet::new();
        for item in self.correct_answers.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            if let Some(qid) = key.get(prefix.len()..) {
                ids.insert(String::from_utf8_lossy(qid).into_owned());
            }
        }
        Ok(ids)
    }

    pub fn mark_correct(
        &self,
        user_id: &str,
        subject: &str,
        skill_id: &str,
        question_id: &str,
    ) -> Result<(), StoreError> {
        let key = keys::correct_key(user_id, subject, skill_id, question_id)?;
        self.correct_answers.insert(key.as_bytes(), Vec::<u8>::new())?;
        Ok(())
    }
}
