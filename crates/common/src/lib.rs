//! Shared types for the careerdesk workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
