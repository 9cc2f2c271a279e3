//! Command errors that aren't backend failures
//!
//! Usage mistakes are reported by clap; backend and storage failures surface
//! as `api_client::HttpError` through `anyhow`.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("login needs {0}")]
    NoCredentials(&'static str),
}
