use crate::engine::calibration::parse_option;
use crate::engine::types::Question;

/// Label part of an answer key or a selected option: `"A."`, `"b)"` and
/// `"A. text"` all become `"A"`.
pub fn normalize_label(raw: &str) -> String {
    let trimmed = raw.trim();
    let label = match trimmed.find(['.', ')']) {
        Some(pos) if pos > 0 => &trimmed[..pos],
        _ => trimmed,
    };
    label.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub correct: bool,
    /// Full text of the correct option, when the key resolves to one.
    pub correct_option: Option<String>,
}

pub fn grade(question: &Question, selection: &str) -> Grade {
    let key = normalize_label(&question.answer);
    let chosen = normalize_label(selection);

    let correct_option = question
        .options
        .iter()
        .find(|opt| {
            parse_option(opt)
                .map(|(label, _)| label.to_uppercase() == key)
                .unwrap_or(false)
        })
        .cloned();

    Grade {
        correct: !key.is_empty() && key == chosen,
        correct_option,
    }
}
