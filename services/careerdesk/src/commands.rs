//! Command parsing and dispatch

use std::path::PathBuf;

use anyhow::Context;
use api_client::{AuthenticatedHttpClient, JobQuery};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;

use crate::config::LoginConfig;
use crate::error::Error;

#[derive(Parser, Debug)]
#[command(name = "careerdesk")]
#[command(about = "Command-line client for the careerdesk backend")]
#[command(version)]
pub struct Cli {
    /// Config file (default: ./careerdesk.toml)
    #[arg(long, env = "CAREERDESK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sign in with the [login] credentials
    Login,
    /// End the session
    Logout,
    /// Show whether a session is stored
    Status,
    /// Show the signed-in user's profile
    Profile,
    /// List resumes
    Resumes,
    /// Delete a resume
    ResumeDelete { id: u64 },
    /// List jobs
    Jobs { page: Option<u32> },
    /// Show one job
    Job { id: u64 },
    /// Search jobs
    Search {
        query: String,
        location: Option<String>,
    },
    /// Apply to a job
    Apply { job_id: u64 },
    /// Add a job to the wishlist
    WishlistAdd { job_id: u64 },
    /// Remove a job from the wishlist
    WishlistRemove { job_id: u64 },
}

/// Run `command` and return what to print.
pub async fn execute(
    client: &AuthenticatedHttpClient,
    command: &Command,
    login: Option<&LoginConfig>,
) -> anyhow::Result<Value> {
    info!(?command, "running command");
    let output = match command {
        Command::Login => {
            let login = login.ok_or(Error::NoCredentials("a [login] section in the config"))?;
            let password = login.password.as_ref().ok_or(Error::NoCredentials(
                "CAREERDESK_PASSWORD or a non-empty password_file",
            ))?;
            let user = client
                .sign_in(&login.email, password)
                .await
                .context("sign-in failed")?;
            json!({ "signed_in": true, "user": user })
        }
        Command::Logout => {
            let had_session = client.sign_out().await?;
            json!({ "signed_out": had_session })
        }
        Command::Status => {
            let store = client.tokens().store();
            json!({
                "signed_in": store.is_authenticated().await?,
                "user": store.user().await?,
            })
        }
        Command::Profile => serde_json::to_value(client.profile().await?)?,
        Command::Resumes => serde_json::to_value(client.resumes().await?)?,
        Command::ResumeDelete { id } => {
            client.delete_resume(*id).await?;
            json!({ "deleted": id })
        }
        Command::Jobs { page } => serde_json::to_value(client.jobs(*page).await?)?,
        Command::Job { id } => serde_json::to_value(client.job(*id).await?)?,
        Command::Search { query, location } => {
            let query = JobQuery {
                q: query.clone(),
                location: location.clone(),
                page: None,
            };
            serde_json::to_value(client.search_jobs(&query).await?)?
        }
        Command::Apply { job_id } => serde_json::to_value(client.apply(*job_id, None).await?)?,
        Command::WishlistAdd { job_id } => client.add_to_wishlist(*job_id).await?,
        Command::WishlistRemove { job_id } => {
            client.remove_from_wishlist(*job_id).await?;
            json!({ "removed": job_id })
        }
    };
    Ok(output)
}
