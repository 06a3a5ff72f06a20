use crate::engine::types::{PrerequisiteEdge, Question};
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    /// Writes a subject's prerequisite edges in one batch. Existing edges are kept.
    pub fn put_edges(&self, edges: &[PrerequisiteEdge]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for edge in edges {
            let key = keys::edge_key(&edge.subject, &edge.source, &edge.target)?;
            batch.insert(key.as_bytes(), Self::serialize(edge)?);
        }
        self.edges.apply_batch(batch)?;
        Ok(())
    }

    pub fn list_edges(&self, subject: &str) -> Result<Vec<PrerequisiteEdge>, StoreError> {
        let prefix = keys::edge_prefix(subject)?;
        let mut edges = Vec::new();
        for item in self.edges.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            edges.push(Self::deserialize(&raw)?);
        }
        Ok(edges)
    }

    pub fn put_questions(&self, subject: &str, questions: &[Question]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for question in questions {
            let key = keys::question_key(subject, &question.id)?;
            batch.insert(key.as_bytes(), Self::serialize(question)?);
        }
        self.questions.apply_batch(batch)?;
        Ok(())
    }

    pub fn list_questions(&self, subject: &str) -> Result<Vec<Question>, StoreError> {
        let prefix = keys::question_prefix(subject)?;
        let mut questions = Vec::new();
        for item in self.questions.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = match item {
                Ok(kv) => kv,
                Err(e) => return Err(StoreError::Sled(e)),
            };
            match Self::deserialize::<Question>(&raw) {
                Ok(question) => questions.push(question),
                Err(e) => {
                    tracing::warn!(subject, error = %e, "Skipping unreadable question record");
                }
            }
        }
        Ok(questions)
    }

    pub fn get_question(&self, subject: &str, question_id: &str) -> Result<Question, StoreError> {
        let key = keys::question_key(subject, question_id)?;
        match self.questions.get(key.as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Err(StoreError::NotFound {
                entity: "question".to_string(),
                key,
            }),
        }
    }

    pub fn has_content(&self, subject: &str) -> Result<bool, StoreError> {
        let prefix = keys::question_prefix(subject)?;
        Ok(self.questions.scan_prefix(prefix.as_bytes()).next().is_some())
    }
}
