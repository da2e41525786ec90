//! HTTP request handlers.

pub mod health;
pub mod upload;
pub mod videos;

pub use health::{health, ready};
