//! Service wiring: the poll, trigger, and sweep loops plus shared health
//! state. Each loop is a stateless pass over the store and the upstream
//! providers; all coordination lives in the persisted tables, so a crashed
//! run is picked up cleanly by the next one.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::{AppConfig, Secrets};
use crate::db::store::Store;
use crate::mailer::{Mailer, ResendMailer};
use crate::pipeline::builder::SnapshotBuilder;
use crate::providers::espn::EspnClient;
use crate::providers::odds_api::OddsApiClient;
use crate::server;
use crate::trigger;

/// Shared health state updated by the loops, read by the health endpoint.
#[derive(Clone)]
pub struct HealthState {
    inner: Arc<RwLock<HealthData>>,
}

#[derive(Debug, Clone, Serialize)]
struct HealthData {
    status: String,
    started_at: DateTime<Utc>,
    last_poll_at: Option<DateTime<Utc>>,
    last_poll_games: usize,
    last_poll_inserted: usize,
    consecutive_errors: usize,
    uptime_seconds: i64,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HealthData {
                status: "ok".to_string(),
                started_at: Utc::now(),
                last_poll_at: None,
                last_poll_games: 0,
                last_poll_inserted: 0,
                consecutive_errors: 0,
                uptime_seconds: 0,
            })),
        }
    }

    pub async fn record_poll(&self, games: usize, inserted: usize) {
        let mut data = self.inner.write().await;
        data.last_poll_at = Some(Utc::now());
        data.last_poll_games = games;
        data.last_poll_inserted = inserted;
        data.consecutive_errors = 0;
        data.status = "ok".to_string();
    }

    pub async fn record_error(&self) {
        let mut data = self.inner.write().await;
        data.consecutive_errors += 1;
        if data.consecutive_errors > 5 {
            data.status = "degraded".to_string();
        }
    }

    pub async fn to_json(&self) -> serde_json::Value {
        let mut data = self.inner.read().await.clone();
        data.uptime_seconds = (Utc::now() - data.started_at).num_seconds();
        serde_json::to_value(&data).unwrap_or_default()
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Service {
    config: Arc<AppConfig>,
    store: Arc<Store>,
    espn: EspnClient,
    odds_api: Option<OddsApiClient>,
    mailer: Arc<dyn Mailer>,
    health: HealthState,
}

impl Service {
    pub async fn new(config: AppConfig, secrets: Secrets) -> Result<Self> {
        let store = Arc::new(Store::new(&config.database.path).await?);
        let espn = EspnClient::new(&config.providers.espn_base_url);

        let odds_api = match secrets.odds_api_key {
            Some(key) if !key.trim().is_empty() => {
                Some(OddsApiClient::new(&config.providers, key))
            }
            _ => {
                tracing::warn!("ODDS_API_KEY not set — running with primary odds only");
                None
            }
        };

        let mailer: Arc<dyn Mailer> = Arc::new(ResendMailer::new(
            secrets.resend_api_key,
            config.trigger.from_address.clone(),
        ));

        info!(
            odds_api = odds_api.is_some(),
            mailer = mailer.is_enabled(),
            db = %config.database.path,
            "Service initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            espn,
            odds_api,
            mailer,
            health: HealthState::new(),
        })
    }

    pub fn health(&self) -> HealthState {
        self.health.clone()
    }

    /// One scoreboard poll.
    pub async fn poll_once(&self) -> Result<()> {
        let builder = SnapshotBuilder::new(
            &self.espn,
            self.odds_api.as_ref(),
            &self.store,
            &self.config.providers,
        );
        match builder.run_poll().await {
            Ok(outcome) => {
                self.health.record_poll(outcome.games, outcome.inserted).await;
                Ok(())
            }
            Err(e) => {
                self.health.record_error().await;
                Err(e)
            }
        }
    }

    /// One halftime trigger pass.
    pub async fn trigger_once(&self) -> Result<trigger::TriggerOutcome> {
        trigger::run_halftime_pass(
            &self.store,
            self.mailer.as_ref(),
            &self.config.trigger,
            Utc::now(),
        )
        .await
    }

    /// One retention sweep.
    pub async fn sweep_once(&self) -> Result<u64> {
        trigger::run_retention_sweep(
            &self.store,
            self.config.service.retention_days,
            Utc::now(),
        )
        .await
    }

    /// Run every loop until ctrl-c.
    pub async fn run(self) -> Result<()> {
        let state = server::ApiState {
            store: self.store.clone(),
            mailer: self.mailer.clone(),
            config: self.config.clone(),
            health: self.health.clone(),
        };
        let server_handle = server::spawn_server(
            state,
            &self.config.server.bind,
            self.config.server.port,
        );

        let service = Arc::new(self);
        let poll_interval =
            std::time::Duration::from_secs(service.config.service.poll_interval_seconds);
        let trigger_interval =
            std::time::Duration::from_secs(service.config.service.trigger_interval_seconds);
        let sweep_interval =
            std::time::Duration::from_secs(service.config.service.sweep_interval_seconds);

        let poll_service = service.clone();
        let poll_handle = tokio::spawn(async move {
            loop {
                if let Err(e) = poll_service.poll_once().await {
                    error!(error = %e, "Poll failed");
                }
                tokio::time::sleep(poll_interval).await;
            }
        });

        let trigger_service = service.clone();
        let trigger_handle = tokio::spawn(async move {
            loop {
                if let Err(e) = trigger_service.trigger_once().await {
                    error!(error = %e, "Halftime trigger failed");
                }
                tokio::time::sleep(trigger_interval).await;
            }
        });

        let sweep_service = service.clone();
        let sweep_handle = tokio::spawn(async move {
            loop {
                if let Err(e) = sweep_service.sweep_once().await {
                    error!(error = %e, "Retention sweep failed");
                }
                tokio::time::sleep(sweep_interval).await;
            }
        });

        info!("Service running; ctrl-c to stop");
        tokio::signal::ctrl_c().await?;
        info!("Shutting down");

        poll_handle.abort();
        trigger_handle.abort();
        sweep_handle.abort();
        server_handle.abort();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_starts_ok_and_degrades_after_repeated_errors() {
        let health = HealthState::new();
        let json = health.to_json().await;
        assert_eq!(json["status"], "ok");

        for _ in 0..6 {
            health.record_error().await;
        }
        let json = health.to_json().await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["consecutive_errors"], 6);

        health.record_poll(14, 14).await;
        let json = health.to_json().await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["last_poll_games"], 14);
    }
}
