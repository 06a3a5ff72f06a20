use std::env;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_DECAY_RATE, DEFAULT_LEARNING_RATE, DEFAULT_MASTERY_THRESHOLD, DEFAULT_PARENT_PENALTY,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub engine: EngineEnvConfig,
    pub simulation: SimulationConfig,
}

/// Engine overrides read from the environment; everything else keeps
/// the defaults in [`crate::engine::config::EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineEnvConfig {
    pub mastery_threshold: f64,
    pub learning_rate: f64,
    pub decay_rate: f64,
    pub parent_penalty: f64,
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub user_id: String,
    pub subject: String,
    pub mode: String,
    pub seed: u64,
    pub min_questions: usize,
    pub max_questions: usize,
    pub time_limit_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/mastery.sled"),
            engine: EngineEnvConfig {
                mastery_threshold: env_or_parse("MASTERY_THRESHOLD", DEFAULT_MASTERY_THRESHOLD),
                learning_rate: env_or_parse("LEARNING_RATE", DEFAULT_LEARNING_RATE),
                decay_rate: env_or_parse("DECAY_RATE", DEFAULT_DECAY_RATE),
                parent_penalty: env_or_parse("PARENT_PENALTY", DEFAULT_PARENT_PENALTY),
            },
            simulation: SimulationConfig {
                user_id: env_or("SIM_USER", "demo-learner"),
                subject: env_or("SIM_SUBJECT", "demo"),
                mode: env_or("SIM_MODE", "overview"),
                seed: env_or_parse("SIM_SEED", 42_u64),
                min_questions: env_or_parse("SIM_MIN_QUESTIONS", 10_usize),
                max_questions: env_or_parse("SIM_MAX_QUESTIONS", 30_usize),
                time_limit_secs: env_or_parse("SIM_TIME_LIMIT_SECS", 1800_u64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
