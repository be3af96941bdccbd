use super::{AuditRecord, SettlementStore, StoreError, StoreResult};
use crate::core::bank::BankTransaction;
use crate::core::ids::{ClubId, TenantId};
use crate::core::ledger::{CarryForward, LedgerEntry, SubclubAdjustment};
use crate::core::metrics::{WeeklyAgentMetric, WeeklyPlayerMetric};
use crate::core::period::Period;
use crate::core::settlement::Settlement;
use crate::engine::fees::FeeRate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;
use uuid::Uuid;

/// Full contents of an [`InMemoryStore`], as read from and written to JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub settlements: Vec<Settlement>,
    pub players: Vec<WeeklyPlayerMetric>,
    pub agents: Vec<WeeklyAgentMetric>,
    pub fee_rates: Vec<FeeRate>,
    pub adjustments: Vec<SubclubAdjustment>,
    pub carries: Vec<CarryForward>,
    pub ledger: Vec<LedgerEntry>,
    pub bank: Vec<BankTransaction>,
    pub audit: Vec<AuditRecord>,
}

impl StoreSnapshot {
    fn tenant_of(&self, settlement_id: Uuid) -> Option<&TenantId> {
        self.settlements
            .iter()
            .find(|s| s.id == settlement_id)
            .map(|s| &s.tenant)
    }

    fn owns(&self, tenant: &TenantId, settlement_id: Uuid) -> bool {
        self.tenant_of(settlement_id) == Some(tenant)
    }
}

/// Thread-safe store backed by a [`StoreSnapshot`].
///
/// Operations can be made to fail or to stall, to exercise the service's
/// error and timeout handling.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<StoreSnapshot>,
    failing: RwLock<HashSet<String>>,
    latency: RwLock<Option<Duration>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        Ok(self.data.read().map_err(|_| StoreError::Poisoned)?.clone())
    }

    pub fn load_json(path: impl AsRef<Path>) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;
        let snapshot: StoreSnapshot =
            serde_json::from_str(&text).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let snapshot = self.snapshot()?;
        let text = serde_json::to_string_pretty(&snapshot).map_err(|e| StoreError::Io(e.to_string()))?;
        std::fs::write(path.as_ref(), text).map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Make every call to `operation` fail until [`recover`](Self::recover).
    pub fn fail_on(&self, operation: &str) {
        if let Ok(mut f) = self.failing.write() {
            f.insert(operation.to_string());
        }
    }

    pub fn recover(&self, operation: &str) {
        if let Ok(mut f) = self.failing.write() {
            f.remove(operation);
        }
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut l) = self.latency.write() {
            *l = latency;
        }
    }

    fn check(&self, operation: &str) -> StoreResult<()> {
        let latency = *self.latency.read().map_err(|_| StoreError::Poisoned)?;
        if let Some(d) = latency {
            std::thread::sleep(d);
        }
        if self
            .failing
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .contains(operation)
        {
            return Err(StoreError::Unavailable(format!("{operation} failed")));
        }
        Ok(())
    }

    fn read<T>(&self, operation: &str, f: impl FnOnce(&StoreSnapshot) -> T) -> StoreResult<T> {
        self.check(operation)?;
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&data))
    }

    fn write<T>(&self, operation: &str, f: impl FnOnce(&mut StoreSnapshot) -> T) -> StoreResult<T> {
        self.check(operation)?;
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut data))
    }
}

fn upsert_by<T: Clone>(rows: &mut Vec<T>, row: &T, same: impl Fn(&T) -> bool) {
    match rows.iter_mut().find(|r| same(r)) {
        Some(existing) => *existing = row.clone(),
        None => rows.push(row.clone()),
    }
}

impl SettlementStore for InMemoryStore {
    fn get_settlement(&self, tenant: &TenantId, id: Uuid) -> StoreResult<Option<Settlement>> {
        self.read("get_settlement", |d| {
            d.settlements
                .iter()
                .find(|s| s.id == id && &s.tenant == tenant)
                .cloned()
        })
    }

    fn list_settlements(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        period: Period,
    ) -> StoreResult<Vec<Settlement>> {
        self.read("list_settlements", |d| {
            let mut out: Vec<Settlement> = d
                .settlements
                .iter()
                .filter(|s| &s.tenant == tenant && &s.club == club && s.period == period)
                .cloned()
                .collect();
            out.sort_by_key(|s| s.version);
            out
        })
    }

    fn save_settlement(&self, settlement: &Settlement) -> StoreResult<()> {
        self.write("save_settlement", |d| {
            upsert_by(&mut d.settlements, settlement, |s| s.id == settlement.id)
        })
    }

    fn delete_settlement(&self, tenant: &TenantId, id: Uuid) -> StoreResult<()> {
        self.write("delete_settlement", |d| {
            if d.owns(tenant, id) {
                d.settlements.retain(|s| s.id != id);
                d.players.retain(|p| p.settlement_id != id);
                d.agents.retain(|a| a.settlement_id != id);
            }
        })
    }

    fn player_metrics(&self, tenant: &TenantId, settlement_id: Uuid) -> StoreResult<Vec<WeeklyPlayerMetric>> {
        self.read("player_metrics", |d| {
            if !d.owns(tenant, settlement_id) {
                return Vec::new();
            }
            d.players
                .iter()
                .filter(|p| p.settlement_id == settlement_id)
                .cloned()
                .collect()
        })
    }

    fn agent_metrics(&self, tenant: &TenantId, settlement_id: Uuid) -> StoreResult<Vec<WeeklyAgentMetric>> {
        self.read("agent_metrics", |d| {
            if !d.owns(tenant, settlement_id) {
                return Vec::new();
            }
            d.agents
                .iter()
                .filter(|a| a.settlement_id == settlement_id)
                .cloned()
                .collect()
        })
    }

    fn replace_metrics(
        &self,
        tenant: &TenantId,
        settlement_id: Uuid,
        players: Vec<WeeklyPlayerMetric>,
        agents: Vec<WeeklyAgentMetric>,
    ) -> StoreResult<()> {
        self.write("replace_metrics", |d| {
            if !d.owns(tenant, settlement_id) {
                return;
            }
            d.players.retain(|p| p.settlement_id != settlement_id);
            d.agents.retain(|a| a.settlement_id != settlement_id);
            d.players.extend(players);
            d.agents.extend(agents);
        })
    }

    fn update_player_metric(&self, tenant: &TenantId, row: &WeeklyPlayerMetric) -> StoreResult<()> {
        self.write("update_player_metric", |d| {
            if d.owns(tenant, row.settlement_id) {
                upsert_by(&mut d.players, row, |p| p.id == row.id);
            }
        })
    }

    fn update_agent_metric(&self, tenant: &TenantId, row: &WeeklyAgentMetric) -> StoreResult<()> {
        self.write("update_agent_metric", |d| {
            if d.owns(tenant, row.settlement_id) {
                upsert_by(&mut d.agents, row, |a| a.id == row.id);
            }
        })
    }

    fn agent_rate_hint(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        agent_key: &str,
        before: Period,
    ) -> StoreResult<Option<Decimal>> {
        self.read("agent_rate_hint", |d| {
            d.agents
                .iter()
                .filter(|a| a.agent_key() == agent_key)
                .filter_map(|a| {
                    let s = d.settlements.iter().find(|s| s.id == a.settlement_id)?;
                    (&s.tenant == tenant && &s.club == club && s.period < before)
                        .then_some(((s.period, s.version), a.rakeback_rate))
                })
                .max_by_key(|(when, _)| *when)
                .map(|(_, rate)| rate)
        })
    }

    fn fee_rates(&self, tenant: &TenantId) -> StoreResult<Vec<FeeRate>> {
        self.read("fee_rates", |d| {
            d.fee_rates
                .iter()
                .filter(|r| &r.tenant == tenant)
                .cloned()
                .collect()
        })
    }

    fn save_fee_rate(&self, rate: &FeeRate) -> StoreResult<()> {
        self.write("save_fee_rate", |d| {
            upsert_by(&mut d.fee_rates, rate, |r| r.tenant == rate.tenant && r.name == rate.name)
        })
    }

    fn adjustments(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<SubclubAdjustment>> {
        self.read("adjustments", |d| {
            d.adjustments
                .iter()
                .filter(|a| &a.tenant == tenant && &a.club == club && a.period == period)
                .cloned()
                .collect()
        })
    }

    fn upsert_adjustment(&self, adjustment: &SubclubAdjustment) -> StoreResult<()> {
        self.write("upsert_adjustment", |d| {
            upsert_by(&mut d.adjustments, adjustment, |a| {
                a.tenant == adjustment.tenant
                    && a.club == adjustment.club
                    && a.period == adjustment.period
                    && a.matches(adjustment.subclub_id.as_ref(), &adjustment.subclub_name)
            })
        })
    }

    fn carries(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<CarryForward>> {
        self.read("carries", |d| {
            d.carries
                .iter()
                .filter(|c| &c.tenant == tenant && &c.club == club && c.period == period)
                .cloned()
                .collect()
        })
    }

    fn upsert_carry(&self, carry: &CarryForward) -> StoreResult<()> {
        self.write("upsert_carry", |d| {
            upsert_by(&mut d.carries, carry, |c| {
                c.tenant == carry.tenant
                    && c.club == carry.club
                    && c.entity == carry.entity
                    && c.period == carry.period
            })
        })
    }

    fn ledger_entries(&self, tenant: &TenantId, club: &ClubId, period: Period) -> StoreResult<Vec<LedgerEntry>> {
        self.read("ledger_entries", |d| {
            d.ledger
                .iter()
                .filter(|e| &e.tenant == tenant && &e.club == club && e.period == period)
                .cloned()
                .collect()
        })
    }

    fn find_ledger_by_reference(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        reference: &str,
    ) -> StoreResult<Option<LedgerEntry>> {
        self.read("find_ledger_by_reference", |d| {
            d.ledger
                .iter()
                .find(|e| &e.tenant == tenant && &e.club == club && e.reference.as_deref() == Some(reference))
                .cloned()
        })
    }

    fn insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<()> {
        self.write("insert_ledger_entry", |d| d.ledger.push(entry.clone()))
    }

    fn get_ledger_entry(&self, tenant: &TenantId, id: Uuid) -> StoreResult<Option<LedgerEntry>> {
        self.read("get_ledger_entry", |d| {
            d.ledger
                .iter()
                .find(|e| e.id == id && &e.tenant == tenant)
                .cloned()
        })
    }

    fn mark_reconciled(&self, tenant: &TenantId, entry_id: Uuid) -> StoreResult<bool> {
        self.write("mark_reconciled", |d| {
            match d
                .ledger
                .iter_mut()
                .find(|e| e.id == entry_id && &e.tenant == tenant)
            {
                Some(e) => {
                    e.reconciled = true;
                    true
                }
                None => false,
            }
        })
    }

    fn bank_transactions(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        period: Period,
    ) -> StoreResult<Vec<BankTransaction>> {
        self.read("bank_transactions", |d| {
            d.bank
                .iter()
                .filter(|t| &t.tenant == tenant && &t.club == club && t.period == period)
                .cloned()
                .collect()
        })
    }

    fn get_bank_transaction(&self, tenant: &TenantId, id: Uuid) -> StoreResult<Option<BankTransaction>> {
        self.read("get_bank_transaction", |d| {
            d.bank
                .iter()
                .find(|t| t.id == id && &t.tenant == tenant)
                .cloned()
        })
    }

    fn save_bank_transaction(&self, tx: &BankTransaction) -> StoreResult<()> {
        self.write("save_bank_transaction", |d| {
            let same_line = |t: &BankTransaction| {
                t.id == tx.id
                    || (t.tenant == tx.tenant && t.source == tx.source && t.external_id == tx.external_id)
            };
            upsert_by(&mut d.bank, tx, same_line)
        })
    }

    fn append_audit(&self, record: &AuditRecord) -> StoreResult<()> {
        self.write("append_audit", |d| d.audit.push(record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::EntityId;
    use crate::core::ledger::Direction;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn period() -> Period {
        "2026-03-02".parse().unwrap()
    }

    fn settlement(tenant: &str) -> Settlement {
        Settlement::draft(TenantId::new(tenant), ClubId::new("c"), period(), 1)
    }

    #[test]
    fn test_reads_are_tenant_scoped() {
        let store = InMemoryStore::new();
        let s = settlement("acme");
        store.save_settlement(&s).unwrap();
        let row = WeeklyPlayerMetric::new(s.id, EntityId::new("p"), "P", "A", "Sub");
        store
            .replace_metrics(&s.tenant, s.id, vec![row], vec![])
            .unwrap();

        let other = TenantId::new("other");
        assert!(store.get_settlement(&other, s.id).unwrap().is_none());
        assert!(store.player_metrics(&other, s.id).unwrap().is_empty());
        assert_eq!(store.player_metrics(&s.tenant, s.id).unwrap().len(), 1);
    }

    #[test]
    fn test_carry_upsert_overwrites() {
        let store = InMemoryStore::new();
        let carry = |amount| CarryForward {
            tenant: TenantId::new("t"),
            club: ClubId::new("c"),
            entity: EntityId::new("ag"),
            period: period(),
            amount,
            source_settlement: Uuid::nil(),
            updated_at: Utc::now(),
        };
        store.upsert_carry(&carry(dec!(10))).unwrap();
        store.upsert_carry(&carry(dec!(20))).unwrap();
        let rows = store.carries(&TenantId::new("t"), &ClubId::new("c"), period()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, dec!(20));
    }

    #[test]
    fn test_mark_reconciled_reports_unknown_entry() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new("t");
        let entry = LedgerEntry::new(
            tenant.clone(),
            ClubId::new("c"),
            EntityId::new("p"),
            period(),
            Direction::Inbound,
            dec!(10),
            period().start(),
        );
        store.insert_ledger_entry(&entry).unwrap();

        assert!(!store.mark_reconciled(&tenant, Uuid::new_v4()).unwrap());
        assert!(!store.mark_reconciled(&TenantId::new("other"), entry.id).unwrap());
        assert!(store.mark_reconciled(&tenant, entry.id).unwrap());
        assert!(store.get_ledger_entry(&tenant, entry.id).unwrap().unwrap().reconciled);
    }

    #[test]
    fn test_injected_failure() {
        let store = InMemoryStore::new();
        store.fail_on("fee_rates");
        assert!(matches!(
            store.fee_rates(&TenantId::new("t")),
            Err(StoreError::Unavailable(_))
        ));
        store.recover("fee_rates");
        assert!(store.fee_rates(&TenantId::new("t")).unwrap().is_empty());
    }

    #[test]
    fn test_rate_hint_uses_latest_earlier_settlement() {
        let store = InMemoryStore::new();
        let old = Settlement::draft(TenantId::new("t"), ClubId::new("c"), period(), 1);
        let newer = Settlement::draft(TenantId::new("t"), ClubId::new("c"), period().next(), 1);
        for (s, rate) in [(&old, dec!(10)), (&newer, dec!(25))] {
            store.save_settlement(s).unwrap();
            let p = WeeklyPlayerMetric::new(s.id, EntityId::new("p"), "P", "Agent X", "Sub");
            let mut a = WeeklyAgentMetric::from_players(&[p], rate).unwrap();
            a.settlement_id = s.id;
            store.replace_metrics(&s.tenant, s.id, vec![], vec![a]).unwrap();
        }
        let later = period().next().next();
        let hint = store
            .agent_rate_hint(&TenantId::new("t"), &ClubId::new("c"), "name:AGENT X", later)
            .unwrap();
        assert_eq!(hint, Some(dec!(25)));
        let hint = store
            .agent_rate_hint(&TenantId::new("t"), &ClubId::new("c"), "name:AGENT X", period().next())
            .unwrap();
        assert_eq!(hint, Some(dec!(10)));
    }

    #[test]
    fn test_snapshot_roundtrip_through_json() {
        let store = InMemoryStore::new();
        store.save_settlement(&settlement("t")).unwrap();
        let json = serde_json::to_string(&store.snapshot().unwrap()).unwrap();
        let back: StoreSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store.snapshot().unwrap());
    }
}
