//! Toggl API client for toggl-watch.
//!
//! Provides the two calls a reconciliation cycle needs:
//! - the account lookup, to find the user and workspace ids
//! - the detailed report, followed across pages

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tw_core::ReportRecord;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_API_URL: &str = "https://api.track.toggl.com/api/v8";
pub const DEFAULT_REPORTS_URL: &str = "https://api.track.toggl.com/reports/api/v2";
/// Password half of the basic-auth pair when authenticating with a token.
const TOKEN_PASSWORD: &str = "api_token";
/// Upper bound on pages followed for one report.
const MAX_PAGES: u32 = 1000;

/// Toggl client errors.
#[derive(Debug, Error)]
pub enum TogglError {
    /// The provided API token was invalid.
    #[error("invalid API token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Toggl rejected the token.
    #[error("authentication rejected (status {status})")]
    Unauthorized { status: StatusCode },
    /// API returned an error response.
    #[error("API error (status {status}): {message}")]
    Api { status: StatusCode, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The account has no workspace to report on.
    #[error("account {account_id} has no workspaces")]
    NoWorkspace { account_id: i64 },
}

/// Toggl API client.
pub struct Client {
    http: reqwest::Client,
    token: String,
    api_url: String,
    reports_url: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("reports_url", &self.reports_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client against the public Toggl endpoints.
    pub fn new(token: impl Into<String>) -> Result<Self, TogglError> {
        Self::with_base_urls(token, DEFAULT_API_URL, DEFAULT_REPORTS_URL)
    }

    /// Creates a client against custom API and reports base URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn with_base_urls(
        token: impl Into<String>,
        api_url: &str,
        reports_url: &str,
    ) -> Result<Self, TogglError> {
        let token = token.into();

        if token.is_empty() {
            return Err(TogglError::InvalidToken {
                reason: "API token cannot be empty",
            });
        }
        if token.trim().is_empty() {
            return Err(TogglError::InvalidToken {
                reason: "API token cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(TogglError::ClientBuild)?;

        Ok(Self {
            http,
            token,
            api_url: api_url.trim_end_matches('/').to_string(),
            reports_url: reports_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches the account that owns the token.
    pub async fn account(&self) -> Result<Account, TogglError> {
        let url = format!("{}/me", self.api_url);
        let body = self.get_text(&url, &[]).await?;
        let payload: AccountResponse = serde_json::from_str(&body)
            .map_err(|err| TogglError::InvalidResponse(err.to_string()))?;
        Ok(payload.data)
    }

    /// Fetches one page (1-based) of a detailed report.
    pub async fn detailed_report_page(
        &self,
        query: &ReportQuery,
        page: u32,
    ) -> Result<ReportPage, TogglError> {
        let url = format!("{}/details", self.reports_url);
        let body = self.get_text(&url, &query.params(page)).await?;
        parse_report_page(&body)
    }

    /// Fetches every record of a detailed report, following pagination.
    pub async fn detailed_report(
        &self,
        query: &ReportQuery,
    ) -> Result<Vec<ReportRecord>, TogglError> {
        let mut records = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch = self.detailed_report_page(query, page).await?;
            let received = batch.data.len();
            records.extend(batch.data);
            tracing::debug!(page, received, total = batch.total_count, "fetched report page");
            if !has_more(records.len(), received, batch.total_count) {
                return Ok(records);
            }
        }
        tracing::warn!(pages = MAX_PAGES, "report truncated at page limit");
        Ok(records)
    }

    async fn get_text(&self, url: &str, params: &[(&str, String)]) -> Result<String, TogglError> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.token, Some(TOKEN_PASSWORD))
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TogglError::Unauthorized { status });
        }
        if !status.is_success() {
            return Err(parse_api_error(status, &body).unwrap_or_else(|| TogglError::Api {
                status,
                message: body.trim().to_string(),
            }));
        }
        Ok(body)
    }
}

/// The account that owns an API token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id: i64,
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
}

impl Account {
    /// Picks `preferred` if given, otherwise the first workspace.
    pub fn workspace_id(&self, preferred: Option<i64>) -> Result<i64, TogglError> {
        if let Some(id) = preferred {
            return Ok(id);
        }
        self.workspaces
            .first()
            .map(|workspace| workspace.id)
            .ok_or(TogglError::NoWorkspace {
                account_id: self.id,
            })
    }
}

/// A Toggl workspace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Workspace {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Parameters of a detailed report request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub workspace_id: i64,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub user_id: Option<i64>,
    /// Required by the reports API to identify the calling application.
    pub user_agent: String,
}

impl ReportQuery {
    fn params(&self, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("workspace_id", self.workspace_id.to_string()),
            ("since", self.since.format("%Y-%m-%d").to_string()),
            ("until", self.until.format("%Y-%m-%d").to_string()),
            ("user_agent", self.user_agent.clone()),
            ("page", page.to_string()),
        ];
        if let Some(user_id) = self.user_id {
            params.push(("user_ids", user_id.to_string()));
        }
        params
    }
}

/// One page of a detailed report.
#[derive(Debug, Deserialize)]
pub struct ReportPage {
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub per_page: usize,
    #[serde(default)]
    pub data: Vec<ReportRecord>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    data: Account,
}

fn parse_report_page(body: &str) -> Result<ReportPage, TogglError> {
    serde_json::from_str(body).map_err(|err| TogglError::InvalidResponse(err.to_string()))
}

/// Whether another page should be requested after reading `read` records,
/// the last page holding `received` of them.
const fn has_more(read: usize, received: usize, total: usize) -> bool {
    received > 0 && read < total
}

fn parse_api_error(status: StatusCode, body: &str) -> Option<TogglError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
        #[serde(default)]
        tip: Option<String>,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| TogglError::Api {
            status,
            message: match payload.error.tip {
                Some(tip) => format!("{} ({tip})", payload.error.message),
                None => payload.error.message,
            },
        })
}
