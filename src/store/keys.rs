use crate::store::StoreError;

/// Key components are joined with ':' so they may not contain it.
fn component<'a>(name: &str, value: &'a str) -> Result<&'a str, StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{} must not be empty", name)));
    }
    if value.contains(':') {
        return Err(StoreError::Validation(format!(
            "{} must not contain ':' (got {:?})",
            name, value
        )));
    }
    Ok(value)
}

fn reverse_ts(timestamp_ms: i64) -> u64 {
    u64::MAX - timestamp_ms.max(0) as u64
}

pub fn edge_key(subject: &str, source: &str, target: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        component("subject", subject)?,
        component("source", source)?,
        component("target", target)?
    ))
}

pub fn edge_prefix(subject: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component("subject", subject)?))
}

pub fn question_key(subject: &str, question_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}",
        component("subject", subject)?,
        component("question_id", question_id)?
    ))
}

pub fn question_prefix(subject: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component("subject", subject)?))
}

pub fn mastery_key(user_id: &str, subject: &str, skill_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        component("user_id", user_id)?,
        component("subject", subject)?,
        component("skill_id", skill_id)?
    ))
}

pub fn mastery_prefix(user_id: &str, subject: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:",
        component("user_id", user_id)?,
        component("subject", subject)?
    ))
}

pub fn settings_key(user_id: &str, subject: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}",
        component("user_id", user_id)?,
        component("subject", subject)?
    ))
}

/// Newest entries sort first under a user prefix.
pub fn activity_key(user_id: &str, timestamp_ms: i64, entry_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{:020}:{}",
        component("user_id", user_id)?,
        reverse_ts(timestamp_ms),
        component("entry_id", entry_id)?
    ))
}

pub fn activity_prefix(user_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component("user_id", user_id)?))
}

pub fn correct_key(
    user_id: &str,
    subject: &str,
    skill_id: &str,
    question_id: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}{}",
        correct_prefix(user_id, subject, skill_id)?,
        component("question_id", question_id)?
    ))
}

pub fn correct_prefix(user_id: &str, subject: &str, skill_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}:",
        component("user_id", user_id)?,
        component("subject", subject)?,
        component("skill_id", skill_id)?
    ))
}
