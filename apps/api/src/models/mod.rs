pub mod companion;
pub mod document;
pub mod interview;
pub mod rule;
pub mod user;
