//! Persistence boundary.
//!
//! Every read and write is scoped by tenant. Implementations must be safe to
//! call from several threads at once; the service issues independent reads
//! concurrently.

pub mod memory;

use crate::core::bank::BankTransaction;
use crate::core::ids::{ClubId, TenantId};
use crate::core::ledger::{CarryForward, LedgerEntry, SubclubAdjustment};
use crate::core::metrics::{WeeklyAgentMetric, WeeklyPlayerMetric};
use crate::core::period::Period;
use crate::core::settlement::Settlement;
use crate::engine::fees::FeeRate;
use crate::error::SettlementError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use memory::{InMemoryStore, StoreSnapshot};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0} ms")]
    Timeout(u128),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("store i/o failed: {0}")]
    Io(String),
}

impl StoreError {
    /// Attach the name of the operation that failed.
    pub fn during(self, operation: impl Into<String>) -> SettlementError {
        SettlementError::UpstreamUnavailable {
            operation: operation.into(),
            reason: self.to_string(),
        }
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        err.during("store")
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A record of a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tenant: TenantId,
    pub settlement_id: Uuid,
    pub action: String,
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub detail: String,
}

pub trait SettlementStore: Send + Sync {
    // settlements
    fn get_settlement(&self, tenant: &TenantId, id: Uuid) -> StoreResult<Option<Settlement>>;
    fn list_settlements(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        period: Period,
    ) -> StoreResult<Vec<Settlement>>;
    fn save_settlement(&self, settlement: &Settlement) -> StoreResult<()>;
    /// Removes the settlement and its metric rows.
    fn delete_settlement(&self, tenant: &TenantId, id: Uuid) -> StoreResult<()>;

    // metrics
    fn player_metrics(&self, tenant: &TenantId, settlement_id: Uuid) -> StoreResult<Vec<WeeklyPlayerMetric>>;
    fn agent_metrics(&self, tenant: &TenantId, settlement_id: Uuid) -> StoreResult<Vec<WeeklyAgentMetric>>;
    fn replace_metrics(
        &self,
        tenant: &TenantId,
        settlement_id: Uuid,
        players: Vec<WeeklyPlayerMetric>,
        agents: Vec<WeeklyAgentMetric>,
    ) -> StoreResult<()>;
    fn update_player_metric(&self, tenant: &TenantId, row: &WeeklyPlayerMetric) -> StoreResult<()>;
    fn update_agent_metric(&self, tenant: &TenantId, row: &WeeklyAgentMetric) -> StoreResult<()>;
    /// The rate the agent identified by `agent_key` carried in its most recent
    /// settlement before `before`.
    fn agent_rate_hint(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        agent_key: &str,
        before: Period,
    ) -> StoreResult<Option<Decimal>>;

    // fees and adjustments
    fn fee_rates(&self, tenant: &TenantId) -> StoreResult<Vec<FeeRate>>;
    fn save_fee_rate(&self, rate: &FeeRate) -> StoreResult<()>;
    fn adjustments(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<SubclubAdjustment>>;
    fn upsert_adjustment(&self, adjustment: &SubclubAdjustment) -> StoreResult<()>;

    // carry-forward
    /// Balances carried into `period`.
    fn carries(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<CarryForward>>;
    /// Insert or overwrite by (tenant, club, entity, period).
    fn upsert_carry(&self, carry: &CarryForward) -> StoreResult<()>;

    // ledger
    fn ledger_entries(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<LedgerEntry>>;
    fn find_ledger_by_reference(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        reference: &str,
    ) -> StoreResult<Option<LedgerEntry>>;
    fn get_ledger_entry(&self, tenant: &TenantId, id: Uuid) -> StoreResult<Option<LedgerEntry>>;
    fn insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<()>;
    /// Flag the entry as reconciled. Returns false if no such entry exists.
    fn mark_reconciled(&self, tenant: &TenantId, entry_id: Uuid) -> StoreResult<bool>;

    // bank
    fn bank_transactions(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        period: Period,
    ) -> StoreResult<Vec<BankTransaction>>;
    fn get_bank_transaction(&self, tenant: &TenantId, id: Uuid) -> StoreResult<Option<BankTransaction>>;
    fn save_bank_transaction(&self, tx: &BankTransaction) -> StoreResult<()>;

    // audit
    fn append_audit(&self, record: &AuditRecord) -> StoreResult<()>;
}

macro_rules! forward_store {
    ($($name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty;)*) => {
        impl<S: SettlementStore + ?Sized> SettlementStore for Arc<S> {
            $(
                fn $name(&self $(, $arg: $ty)*) -> $ret {
                    (**self).$name($($arg),*)
                }
            )*
        }
    };
}

forward_store! {
    get_settlement(&self, tenant: &TenantId, id: Uuid) -> StoreResult<Option<Settlement>>;
    list_settlements(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<Settlement>>;
    save_settlement(&self, settlement: &Settlement) -> StoreResult<()>;
    delete_settlement(&self, tenant: &TenantId, id: Uuid) -> StoreResult<()>;
    player_metrics(&self, tenant: &TenantId, settlement_id: Uuid) -> StoreResult<Vec<WeeklyPlayerMetric>>;
    agent_metrics(&self, tenant: &TenantId, settlement_id: Uuid) -> StoreResult<Vec<WeeklyAgentMetric>>;
    replace_metrics(&self, tenant: &TenantId, settlement_id: Uuid, players: Vec<WeeklyPlayerMetric>, agents: Vec<WeeklyAgentMetric>) -> StoreResult<()>;
    update_player_metric(&self, tenant: &TenantId, row: &WeeklyPlayerMetric) -> StoreResult<()>;
    update_agent_metric(&self, tenant: &TenantId, row: &WeeklyAgentMetric) -> StoreResult<()>;
    agent_rate_hint(&self, tenant: &TenantId, club: &ClubId, agent_key: &str, before: Period) -> StoreResult<Option<Decimal>>;
    fee_rates(&self, tenant: &TenantId) -> StoreResult<Vec<FeeRate>>;
    save_fee_rate(&self, rate: &FeeRate) -> StoreResult<()>;
    adjustments(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<SubclubAdjustment>>;
    upsert_adjustment(&self, adjustment: &SubclubAdjustment) -> StoreResult<()>;
    carries(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<CarryForward>>;
    upsert_carry(&self, carry: &CarryForward) -> StoreResult<()>;
    ledger_entries(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<LedgerEntry>>;
    find_ledger_by_reference(&self, tenant: &TenantId, club: &ClubId, reference: &str) -> StoreResult<Option<LedgerEntry>>;
    get_ledger_entry(&self, tenant: &TenantId, id: Uuid) -> StoreResult<Option<LedgerEntry>>;
    insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<()>;
    mark_reconciled(&self, tenant: &TenantId, entry_id: Uuid) -> StoreResult<bool>;
    bank_transactions(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<BankTransaction>>;
    get_bank_transaction(&self, tenant: &TenantId, id: Uuid) -> StoreResult<Option<BankTransaction>>;
    save_bank_transaction(&self, tx: &BankTransaction) -> StoreResult<()>;
    append_audit(&self, record: &AuditRecord) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_maps_to_upstream() {
        let err: SettlementError = StoreError::Timeout(250).during("ledger_entries");
        assert!(err.is_upstream());
        assert_eq!(
            err.to_string(),
            "backing store unavailable during ledger_entries: store call timed out after 250 ms"
        );
    }

    #[test]
    fn test_store_error_from() {
        let err: SettlementError = StoreError::Poisoned.into();
        assert!(matches!(err, SettlementError::UpstreamUnavailable { .. }));
    }
}
