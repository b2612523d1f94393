//! Server node: owns the engine and the timer service and drives their
//! lifecycle.
//!
//! Start order: engine `start`, timer `begin`, engine `started`.
//! Stop order: engine `stop_requested`, timer `stop` (waits for an
//! in-flight tick), engine `stopped`.

use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::config::MatchmakingConfig;
use crate::engine::MatchmakingEngine;
use crate::notify::MatchNotifier;
use crate::service::Service;
use crate::timer::{TimerError, TimerService};
use crate::types::ConfigError;

/// Node setup errors.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("timer setup failed: {0}")]
    Timer(#[from] TimerError),
}

/// A running matchmaking server.
pub struct ServerNode {
    engine: Arc<MatchmakingEngine>,
    timer: TimerService,
}

impl ServerNode {
    /// Build the engine and register its tick. Nothing runs until
    /// [`ServerNode::start`].
    pub fn new(
        config: MatchmakingConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn MatchNotifier>,
    ) -> Result<Self, NodeError> {
        let engine = Arc::new(MatchmakingEngine::new(config, clock, notifier)?);
        let timer = TimerService::new();
        timer.register(engine.clone())?;
        Ok(Self { engine, timer })
    }

    pub fn engine(&self) -> &Arc<MatchmakingEngine> {
        &self.engine
    }

    pub fn timer(&self) -> &TimerService {
        &self.timer
    }

    pub fn start(&self) -> Result<(), NodeError> {
        self.engine.start();
        self.timer.begin()?;
        self.engine.started();
        tracing::info!(service = self.engine.name(), "node started");
        Ok(())
    }

    /// Stop accepting requests, let any running tick finish, then stop.
    pub fn stop(&self) {
        self.engine.stop_requested();
        self.timer.stop();
        self.engine.stopped();
        tracing::info!(service = self.engine.name(), "node stopped");
    }
}
