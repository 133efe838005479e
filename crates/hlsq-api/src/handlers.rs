//! HTTP handlers.

pub mod health;
pub mod queue;
pub mod upload;
pub mod videos;

pub use health::{health, ready};
