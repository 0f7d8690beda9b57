//! Tipster Backend Library
//!
//! Settlement engine for private league prediction pools: bet lifecycle,
//! wagers, parimutuel and arcade payouts, disputes and the auto-finalize
//! sweep. Exposed as a library for tests and other consumers.

pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod payout;
pub mod repositories;
pub mod services;
pub mod state_machine;
pub mod websocket;

// Re-export commonly used types
pub use config::{AppConfig, EngineConfig};
pub use error::{AppError, AppResult};

use clock::Clock;
use repositories::LedgerStore;
use services::{
    ActivityFeed, AutoFinalizer, BettingService, DisputeService, ResultOracle, SettlementService,
};
use std::sync::Arc;

/// Every engine service wired over one store, clock and activity feed
pub struct Engine<S: LedgerStore> {
    pub store: Arc<S>,
    pub clock: Arc<dyn Clock>,
    pub feed: ActivityFeed,
    pub betting: Arc<BettingService<S>>,
    pub settlement: Arc<SettlementService<S>>,
    pub disputes: Arc<DisputeService<S>>,
    pub finalizer: Arc<AutoFinalizer<S>>,
}

impl<S: LedgerStore> Engine<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        oracle: Arc<dyn ResultOracle>,
        feed: ActivityFeed,
        config: &EngineConfig,
    ) -> Self {
        let betting = Arc::new(BettingService::new(
            store.clone(),
            clock.clone(),
            feed.clone(),
            config.lock_buffer(),
        ));
        let settlement = Arc::new(SettlementService::new(
            store.clone(),
            clock.clone(),
            feed.clone(),
            config.payout_batch_size,
        ));
        let disputes = Arc::new(DisputeService::new(
            store.clone(),
            clock.clone(),
            feed.clone(),
            settlement.clone(),
            config.finalize_on_upheld_dispute,
        ));
        let finalizer = Arc::new(
            AutoFinalizer::new(
                store.clone(),
                clock.clone(),
                oracle,
                settlement.clone(),
                disputes.clone(),
            )
            .with_interval(config.finalize_interval()),
        );

        Self {
            store,
            clock,
            feed,
            betting,
            settlement,
            disputes,
            finalizer,
        }
    }
}
