//! Difficulty calibration and option presentation.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::engine::config::CalibrationConfig;
use crate::engine::grading::normalize_label;
use crate::engine::index::QuestionIndex;
use crate::engine::types::{Difficulty, Question};

/// Lettered labels stop here; later options get a numeric label.
const LETTER_LABELS: &[&str] = &["A", "B", "C", "D", "E", "F"];

pub fn target_difficulty(score: f64, config: &CalibrationConfig) -> Difficulty {
    if score < config.easy_below {
        Difficulty::Easy
    } else if score < config.medium_below {
        Difficulty::Medium
    } else {
        Difficulty::Hard
    }
}

/// Splits `"A. text"` into `("A", "text")`. Returns `None` for options that
/// do not carry a short alphanumeric label.
pub fn parse_option(option: &str) -> Option<(&str, &str)> {
    let (label, text) = option.split_once('.')?;
    let label = label.trim();
    if label.is_empty() || label.len() > 3 || !label.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((label, text.trim()))
}

fn label_for(position: usize) -> String {
    LETTER_LABELS
        .get(position)
        .map(|l| l.to_string())
        .unwrap_or_else(|| (position + 1).to_string())
}

/// Returns a copy of the question with options shuffled, relabelled in order
/// and the answer key remapped. Malformed options, or a key that matches no
/// option, leave the question as authored.
pub fn shuffle_options<R: Rng + ?Sized>(question: &Question, rng: &mut R) -> Question {
    let parsed: Option<Vec<(&str, &str)>> =
        question.options.iter().map(|o| parse_option(o)).collect();
    let Some(parsed) = parsed else {
        tracing::debug!(question_id = %question.id, "Malformed option, presenting unshuffled");
        return question.clone();
    };

    let key = normalize_label(&question.answer);
    let Some(correct_pos) = parsed
        .iter()
        .position(|(label, _)| label.to_uppercase() == key)
    else {
        tracing::debug!(question_id = %question.id, "Answer key matches no option, presenting unshuffled");
        return question.clone();
    };

    let mut order: Vec<usize> = (0..parsed.len()).collect();
    order.shuffle(rng);

    let mut answer = String::new();
    let mut options = Vec::with_capacity(order.len());
    for (i, original) in order.into_iter().enumerate() {
        let label = label_for(i);
        if original == correct_pos {
            answer = label.clone();
        }
        options.push(format!("{}. {}", label, parsed[original].1));
    }

    Question {
        options,
        answer,
        ..question.clone()
    }
}

/// Practice question for one skill, avoiding the previous question when
/// another one exists.
pub fn pick_practice_question<'a, R: Rng + ?Sized>(
    index: &'a QuestionIndex,
    skill_id: &str,
    mastery: f64,
    last_question_id: Option<&str>,
    config: &CalibrationConfig,
    rng: &mut R,
) -> Option<&'a Question> {
    let mut candidates = index.questions_for(skill_id);
    if candidates.len() > 1 {
        if let Some(last) = last_question_id {
            candidates.retain(|q| q.id != last);
        }
    }
    if candidates.is_empty() {
        return None;
    }

    let band = target_difficulty(mastery, config);
    let in_band = |d: Difficulty| -> Vec<&'a Question> {
        candidates.iter().copied().filter(|q| q.difficulty == d).collect()
    };

    let mut pool = in_band(band);
    if pool.is_empty() && mastery >= config.medium_below {
        pool = in_band(Difficulty::Medium);
    }
    if pool.is_empty() {
        pool = candidates.clone();
    }
    pool.choose(rng).copied()
}
