//! Bugzilla REST client for workaround decisions

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use satupgrade_core::BugTracker;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Errors from a single bug lookup
#[derive(Error, Debug)]
pub enum BugzillaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("bugzilla returned {status} for bug {id}")]
    Api { id: u32, status: u16 },

    #[error("bug {0} not found")]
    NotFound(u32),
}

/// Statuses after which a bug no longer needs its workaround
const FIXED_STATUSES: [&str; 3] = ["CLOSED", "VERIFIED", "RELEASE_PENDING"];

#[derive(Debug, Deserialize)]
struct BugList {
    #[serde(default)]
    bugs: Vec<BugStatus>,
}

#[derive(Debug, Deserialize)]
struct BugStatus {
    status: String,
}

/// Looks bugs up through `rest/bug/{id}`
#[derive(Debug, Clone)]
pub struct BugzillaClient {
    client: Client,
    base_url: Url,
}

impl BugzillaClient {
    /// Create a client for the Bugzilla at `base_url`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self, BugzillaError> {
        let mut base_url = Url::parse(base_url.as_ref())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn bug_url(&self, id: u32) -> Result<Url, BugzillaError> {
        let mut url = self.base_url.join(&format!("rest/bug/{id}"))?;
        url.set_query(Some("include_fields=status"));
        Ok(url)
    }

    /// Current status of bug `id`
    ///
    /// # Errors
    /// Returns an error if the request fails or the bug is missing from the response
    pub async fn status(&self, id: u32) -> Result<String, BugzillaError> {
        let response = self.client.get(self.bug_url(id)?).send().await?;
        if !response.status().is_success() {
            return Err(BugzillaError::Api {
                id,
                status: response.status().as_u16(),
            });
        }

        let list: BugList = response.json().await?;
        list.bugs
            .into_iter()
            .next()
            .map(|bug| bug.status)
            .ok_or(BugzillaError::NotFound(id))
    }
}

fn is_open_status(status: &str) -> bool {
    !FIXED_STATUSES.contains(&status.trim().to_ascii_uppercase().as_str())
}

#[async_trait]
impl BugTracker for BugzillaClient {
    async fn is_bug_open(&self, id: u32) -> bool {
        match self.status(id).await {
            Ok(status) => {
                tracing::debug!(bug = id, %status, "bug status");
                is_open_status(&status)
            }
            Err(e) => {
                tracing::warn!(bug = id, error = %e, "bug lookup failed, treating as open");
                true
            }
        }
    }
}
