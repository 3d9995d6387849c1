// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Learning Persister - Background task that prunes and saves learner state
//!
//! Every interval the persister prunes stale patterns and writes a snapshot
//! through the learner's state store. On shutdown it writes one final
//! snapshot before exiting. A failed write is logged and retried on the
//! next tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::learner::AdaptiveLearner;

/// Longest persistence period honoured; larger values are clamped.
const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct LearningPersisterConfig {
    /// Time between snapshots.
    pub interval: Duration,

    /// Prune expired and over-cap patterns before each snapshot.
    pub prune: bool,

    pub enabled: bool,
}

impl Default for LearningPersisterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            prune: true,
            enabled: true,
        }
    }
}

pub struct LearningPersister {
    learner: Arc<AdaptiveLearner>,
    config: LearningPersisterConfig,
    shutdown_token: CancellationToken,
}

impl LearningPersister {
    pub fn new(
        learner: Arc<AdaptiveLearner>,
        config: LearningPersisterConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            learner,
            config,
            shutdown_token,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Learning persister is disabled");
            return;
        }

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            prune = self.config.prune,
            "Starting learning persister background task"
        );

        // State was just loaded; first write happens one interval from now.
        let period = self.config.interval.clamp(Duration::from_millis(1), MAX_INTERVAL);
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running learning persister cycle");
                    match self.persist_cycle().await {
                        Ok(pruned) => debug!(pruned, "Learning state persisted"),
                        Err(e) => error!("Learning persister cycle failed: {}", e),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, writing final learning snapshot");
                    break;
                }
            }
        }

        if let Err(e) = self.learner.save().await {
            error!("Final learning snapshot failed: {}", e);
        }

        info!("Learning persister background task stopped");
    }

    /// Runs one prune + save cycle and returns the number of patterns pruned.
    pub async fn persist_cycle(&self) -> Result<usize> {
        let pruned = if self.config.prune {
            self.learner.prune(Utc::now()).await
        } else {
            0
        };
        self.learner.save().await?;
        Ok(pruned)
    }
}
