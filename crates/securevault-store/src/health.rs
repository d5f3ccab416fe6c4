//! Backend liveness monitor.
//!
//! The vault API can go dormant. [`ServiceMonitor::ensure_running`] checks
//! its status, asks for a restart when it is down, then polls at a fixed
//! interval up to a capped number of attempts and reports the outcome
//! instead of retrying forever.

use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;

use crate::api::ApiClient;
use crate::error::{StoreError, StoreResult};

const STATUS_PATH: &str = "/api/service/status";
const RESTART_PATH: &str = "/api/service/restart";

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_attempts: 12,
        }
    }
}

/// Outcome of [`ServiceMonitor::ensure_running`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceHealth {
    /// Already running; nothing was done.
    Running,
    /// Restarted and came back after `attempts` polls.
    Recovered { attempts: u32 },
    /// Restart requested but still down after `attempts` polls.
    Unavailable { attempts: u32 },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    is_running: bool,
}

#[derive(Debug, Deserialize)]
struct RestartResponse {
    #[serde(default)]
    success: bool,
    error: Option<String>,
    message: Option<String>,
}

/// Checks and restarts the vault API.
#[derive(Debug, Clone)]
pub struct ServiceMonitor {
    api: ApiClient,
    config: HealthConfig,
}

impl ServiceMonitor {
    pub fn new(api: ApiClient, config: HealthConfig) -> Self {
        Self { api, config }
    }

    /// Whether the service reports itself as running.
    pub async fn is_running(&self) -> StoreResult<bool> {
        let status: StatusResponse = self
            .api
            .request_json(Method::GET, STATUS_PATH, None)
            .await?;
        Ok(status.success && status.is_running)
    }

    /// Ask the service to restart.
    pub async fn request_restart(&self) -> StoreResult<()> {
        let response: RestartResponse = self
            .api
            .request_json(Method::POST, RESTART_PATH, None)
            .await?;
        if response.success {
            tracing::info!("service restart requested");
            Ok(())
        } else {
            Err(StoreError::api(
                response
                    .error
                    .or(response.message)
                    .unwrap_or_else(|| "Failed to restart service".to_string()),
            ))
        }
    }

    /// Make sure the service is up, restarting and polling when it is not.
    ///
    /// A failed status check counts as "not running". A failed restart
    /// request is returned as an error.
    pub async fn ensure_running(&self) -> StoreResult<ServiceHealth> {
        match self.is_running().await {
            Ok(true) => return Ok(ServiceHealth::Running),
            Ok(false) => tracing::warn!("service is not running"),
            Err(e) => tracing::warn!(error = %e, "service status check failed"),
        }

        self.request_restart().await?;

        for attempt in 1..=self.config.max_attempts {
            tokio::time::sleep(self.config.poll_interval).await;
            match self.is_running().await {
                Ok(true) => {
                    tracing::info!(attempt, "service recovered");
                    return Ok(ServiceHealth::Recovered { attempts: attempt });
                }
                Ok(false) => tracing::debug!(attempt, "service still starting"),
                Err(e) => tracing::debug!(attempt, error = %e, "status poll failed"),
            }
        }

        tracing::warn!(
            attempts = self.config.max_attempts,
            "service did not come back"
        );
        Ok(ServiceHealth::Unavailable {
            attempts: self.config.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_polling_budget() {
        let config = HealthConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_attempts, 12);
    }

    #[test]
    fn status_requires_both_flags() {
        let status: StatusResponse =
            serde_json::from_str(r#"{"success": true, "isRunning": false}"#).unwrap();
        assert!(status.success && !status.is_running);
        let status: StatusResponse = serde_json::from_str("{}").unwrap();
        assert!(!status.success && !status.is_running);
    }
}
