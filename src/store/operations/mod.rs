pub mod activity;
pub mod content;
pub mod mastery;
