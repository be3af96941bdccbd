//! # league-settlement
//!
//! Weekly settlement engine for clubs organised in subclubs, agents and
//! players.
//!
//! Given a week's imported player and agent results, the tenant's fee table,
//! manual adjustments, balances carried from the previous week and the
//! ledger of cash movements, the engine computes what each subclub owes the
//! operator (or is owed), what each player and agent owes, and rolls the
//! ending balances into the next week.
//!
//! ## Architecture
//!
//! - **core**: value types for money, periods, settlements, metric rows, ledger and bank lines
//! - **engine**: pure computations (fees, ledger net, breakdown, carry close, bank matching)
//! - **store**: the persistence trait and an in-memory implementation
//! - **service**: tenant-scoped operations with timeouts, caching and the settlement lifecycle
//! - **simulation**: synthetic weekly data

pub mod cache;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod service;
pub mod simulation;
pub mod store;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::core::ids::{ClubId, EntityId, TenantId};
    pub use crate::core::ledger::{Direction, LedgerEntry, SubclubAdjustment};
    pub use crate::core::metrics::{WeeklyAgentMetric, WeeklyPlayerMetric};
    pub use crate::core::period::Period;
    pub use crate::core::settlement::{Settlement, SettlementStatus};
    pub use crate::engine::aggregator::{SettlementAggregator, SettlementBreakdown, SubclubFilter};
    pub use crate::engine::fees::{FeeBase, FeeEngine, FeeRate, RateTable};
    pub use crate::error::{SettlementError, SettlementResult};
    pub use crate::service::{ImportMode, SettlementService};
    pub use crate::store::{InMemoryStore, SettlementStore};
}
