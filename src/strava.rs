//! Thin client for the Strava v3 endpoints the exporter reads.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::Session;
use crate::error::{Result, SyncError};

/// Result of fetching one page of the activity list.
#[derive(Debug)]
pub enum PageOutcome {
    /// Activities in API order, newest first. Empty means end of data.
    Activities(Vec<Value>),
    /// The provider answered 429; paging must stop without failing the run.
    RateLimited,
}

#[derive(Debug, Deserialize)]
pub struct Athlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

/// Paged access to the activity list, newest first.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn fetch_activities_page(&self, page: u32, per_page: u32) -> Result<PageOutcome>;
}

pub struct StravaApi {
    base_url: String,
    session: Session,
}

impl StravaApi {
    pub fn new(base_url: &str, session: Session) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub async fn athlete(&self) -> Result<(Athlete, Value)> {
        let url = format!("{}/athlete", self.base_url);
        let resp = self.session.get(&url).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(fetch_error("athlete data", resp).await);
        }
        let raw: Value = resp.json().await?;
        let athlete: Athlete = serde_json::from_value(raw.clone()).map_err(|e| SyncError::Fetch {
            what: "athlete data",
            status: 200,
            body: e.to_string(),
        })?;
        Ok((athlete, raw))
    }

    pub async fn athlete_stats(&self, athlete_id: u64) -> Result<Value> {
        let url = format!("{}/athletes/{}/stats", self.base_url, athlete_id);
        let resp = self.session.get(&url).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(fetch_error("stats", resp).await);
        }
        Ok(resp.json().await?)
    }

    /// Profile plus lifetime stats, as printed before a sync.
    pub async fn account_summary(&self) -> Result<AccountSummary> {
        let (athlete, profile) = self.athlete().await?;
        info!("Retrieved athlete {}", athlete.id);
        let stats = self.athlete_stats(athlete.id).await?;
        Ok(AccountSummary {
            athlete,
            profile,
            stats,
        })
    }
}

#[async_trait]
impl ActivitySource for StravaApi {
    async fn fetch_activities_page(&self, page: u32, per_page: u32) -> Result<PageOutcome> {
        let url = format!("{}/athlete/activities", self.base_url);
        debug!("Fetching activities page {} (per_page={})", page, per_page);

        let resp = self
            .session
            .get(&url)
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(PageOutcome::RateLimited);
        }
        if status != StatusCode::OK {
            return Err(fetch_error("activities", resp).await);
        }

        let activities: Vec<Value> = resp.json().await?;
        debug!("Page {} returned {} activities", page, activities.len());
        Ok(PageOutcome::Activities(activities))
    }
}

#[derive(Debug)]
pub struct AccountSummary {
    pub athlete: Athlete,
    pub profile: Value,
    pub stats: Value,
}

async fn fetch_error(what: &'static str, resp: reqwest::Response) -> SyncError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    SyncError::Fetch { what, status, body }
}
