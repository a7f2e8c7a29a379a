//! Toggl-backed report source.

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tw_core::{FetchWindow, ReportRecord, ReportSource};
use tw_toggl::{Client, ReportQuery, TogglError};

use crate::Config;

/// Fetches detailed reports for the token's own user, blocking on a
/// single-threaded runtime.
#[derive(Debug)]
pub struct TogglSource {
    client: Client,
    runtime: Runtime,
    workspace_id: Option<i64>,
    user_agent: String,
}

impl TogglSource {
    pub fn new(token: &str, config: &Config) -> Result<Self> {
        let client =
            Client::with_base_urls(token, &config.api_base_url, &config.reports_base_url)
                .context("failed to create Toggl client")?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to initialize tokio runtime")?;
        Ok(Self {
            client,
            runtime,
            workspace_id: config.workspace_id,
            user_agent: config.user_agent.clone(),
        })
    }
}

impl ReportSource for TogglSource {
    type Error = TogglError;

    fn fetch_window(&self, window: &FetchWindow) -> Result<Vec<ReportRecord>, Self::Error> {
        self.runtime.block_on(async {
            let account = self.client.account().await?;
            let workspace_id = account.workspace_id(self.workspace_id)?;
            tracing::debug!(account = account.id, workspace_id, "resolved workspace");

            let query = ReportQuery {
                workspace_id,
                since: window.since,
                until: window.until,
                user_id: Some(account.id),
                user_agent: self.user_agent.clone(),
            };
            self.client.detailed_report(&query).await
        })
    }
}
