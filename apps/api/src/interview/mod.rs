pub mod access;
pub mod classifier;
pub mod engine;
pub mod handlers;
pub mod prompts;
pub mod sanitize;
