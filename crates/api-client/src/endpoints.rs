//! Typed backend endpoints
//!
//! Thin wrappers over `AuthenticatedHttpClient::request`; recovery from 401
//! happens underneath. Models keep unknown fields in `extra` so a backend
//! that grows fields doesn't break decoding.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use session_auth::{JOB_SEARCH_PATH, JOBS_PATH, PROFILE_PATH, RESUMES_PATH, WISHLIST_PATH};

use crate::client::{ApiResponse, AuthenticatedHttpClient, RequestOptions};
use crate::error::Result;

type Extra = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resume {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Result of applying to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Job search parameters.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub q: String,
    pub location: Option<String>,
    pub page: Option<u32>,
}

impl JobQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }

    fn to_options(&self) -> RequestOptions {
        let mut options = RequestOptions::default().query("q", &self.q);
        if let Some(location) = &self.location {
            options = options.query("location", location);
        }
        if let Some(page) = self.page {
            options = options.query("page", page);
        }
        options
    }
}

/// List bodies come either bare or paginated.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Paginated { results: Vec<T> },
}

impl<T> Listing<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Paginated { results: items } => items,
        }
    }
}

fn list<T: DeserializeOwned>(response: ApiResponse) -> Result<Vec<T>> {
    Ok(response.json::<Listing<T>>()?.into_items())
}

impl AuthenticatedHttpClient {
    pub async fn profile(&self) -> Result<UserProfile> {
        self.get(PROFILE_PATH).await?.json()
    }

    /// Partial update; only the fields in `changes` are touched.
    pub async fn update_profile(&self, changes: &serde_json::Value) -> Result<UserProfile> {
        let profile: UserProfile = self.patch(PROFILE_PATH, changes).await?.json()?;
        if let Ok(user) = serde_json::to_value(&profile) {
            self.tokens().store().save_user(&user).await?;
        }
        Ok(profile)
    }

    pub async fn resumes(&self) -> Result<Vec<Resume>> {
        list(self.get(RESUMES_PATH).await?)
    }

    pub async fn create_resume(&self, resume: &serde_json::Value) -> Result<Resume> {
        self.post(RESUMES_PATH, resume).await?.json()
    }

    pub async fn update_resume(&self, id: u64, resume: &serde_json::Value) -> Result<Resume> {
        self.put(&format!("{RESUMES_PATH}{id}/"), resume)
            .await?
            .json()
    }

    pub async fn delete_resume(&self, id: u64) -> Result<()> {
        self.delete(&format!("{RESUMES_PATH}{id}/")).await?;
        Ok(())
    }

    pub async fn jobs(&self, page: Option<u32>) -> Result<Vec<Job>> {
        let options = match page {
            Some(page) => RequestOptions::default().query("page", page),
            None => RequestOptions::default(),
        };
        list(self.request(Method::GET, JOBS_PATH, None, &options).await?)
    }

    pub async fn job(&self, id: u64) -> Result<Job> {
        self.get(&format!("{JOBS_PATH}{id}/")).await?.json()
    }

    pub async fn search_jobs(&self, query: &JobQuery) -> Result<Vec<Job>> {
        let options = query.to_options();
        list(
            self.request(Method::GET, JOB_SEARCH_PATH, None, &options)
                .await?,
        )
    }

    pub async fn apply(&self, job_id: u64, cover_letter: Option<&str>) -> Result<Application> {
        let body = match cover_letter {
            Some(letter) => json!({ "cover_letter": letter }),
            None => json!({}),
        };
        self.post(&format!("{JOBS_PATH}{job_id}/apply/"), &body)
            .await?
            .json()
    }

    pub async fn add_to_wishlist(&self, job_id: u64) -> Result<serde_json::Value> {
        let response = self.post(WISHLIST_PATH, &json!({ "job": job_id })).await?;
        if response.body().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        response.json()
    }

    pub async fn remove_from_wishlist(&self, job_id: u64) -> Result<()> {
        self.delete(&format!("{WISHLIST_PATH}{job_id}/")).await?;
        Ok(())
    }
}
