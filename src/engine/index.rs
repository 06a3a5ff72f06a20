//! Inverted index skill -> questions, built once per subject load.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::engine::types::Question;

/// Splits raw tag entries into skill ids. Accepts well-formed lists as well as
/// a single stringified list such as `"['1.1', '1.2']"`.
pub fn normalize_tags(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in raw {
        for token in entry.split([',', ';', '|']) {
            let tag = token
                .trim()
                .trim_matches(|c: char| matches!(c, '[' | ']' | '\'' | '"'))
                .trim();
            if !tag.is_empty() && !out.iter().any(|t| t == tag) {
                out.push(tag.to_string());
            }
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct QuestionIndex {
    questions: HashMap<String, Question>,
    tags: HashMap<String, Vec<String>>,
    by_skill: HashMap<String, Vec<String>>,
    /// Question ids in load order, so sampling over "all questions" is reproducible.
    order: Vec<String>,
}

impl QuestionIndex {
    pub fn build(questions: Vec<Question>) -> Self {
        let mut index = Self::default();
        for question in questions {
            if index.questions.contains_key(&question.id) {
                tracing::warn!(question_id = %question.id, "Duplicate question id, keeping first");
                continue;
            }
            let tags = normalize_tags(&question.skill_tags);
            for tag in &tags {
                index
                    .by_skill
                    .entry(tag.clone())
                    .or_default()
                    .push(question.id.clone());
            }
            index.order.push(question.id.clone());
            index.tags.insert(question.id.clone(), tags);
            index.questions.insert(question.id.clone(), question);
        }
        index
    }

    pub fn get(&self, question_id: &str) -> Option<&Question> {
        self.questions.get(question_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids of questions tagged with the skill, in load order.
    pub fn question_ids(&self, skill_id: &str) -> &[String] {
        self.by_skill
            .get(skill_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_questions(&self, skill_id: &str) -> bool {
        !self.question_ids(skill_id).is_empty()
    }

    pub fn skills(&self) -> impl Iterator<Item = &str> {
        self.by_skill.keys().map(|s| s.as_str())
    }

    /// Normalized skill tags of a question.
    pub fn tags_of(&self, question_id: &str) -> &[String] {
        self.tags
            .get(question_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn questions_for(&self, skill_id: &str) -> Vec<&Question> {
        self.question_ids(skill_id)
            .iter()
            .filter_map(|id| self.questions.get(id))
            .collect()
    }

    /// A question is in scope when it carries at least one pool skill.
    /// An empty pool puts every question in scope.
    pub fn in_scope(&self, question_id: &str, pool: &BTreeSet<String>) -> bool {
        pool.is_empty() || self.tags_of(question_id).iter().any(|t| pool.contains(t))
    }

    pub fn unseen_for_skill(
        &self,
        skill_id: &str,
        seen: &HashSet<String>,
        pool: &BTreeSet<String>,
    ) -> Vec<&Question> {
        self.question_ids(skill_id)
            .iter()
            .filter(|id| !seen.contains(*id) && self.in_scope(id, pool))
            .filter_map(|id| self.questions.get(id))
            .collect()
    }

    pub fn unseen_in_scope(&self, seen: &HashSet<String>, pool: &BTreeSet<String>) -> Vec<&Question> {
        self.order
            .iter()
            .filter(|id| !seen.contains(*id) && self.in_scope(id, pool))
            .filter_map(|id| self.questions.get(id))
            .collect()
    }

    /// The skill a question is credited to when it was picked without a target:
    /// the first tag inside the pool, else the first tag.
    pub fn primary_skill(&self, question_id: &str, pool: &BTreeSet<String>) -> Option<&str> {
        let tags = self.tags_of(question_id);
        tags.iter()
            .find(|t| pool.contains(*t))
            .or_else(|| tags.first())
            .map(|s| s.as_str())
    }
}
