//! Request-scoped operations over a [`SettlementStore`].
//!
//! Every store call runs on its own worker thread and is abandoned after
//! `EngineConfig::store_timeout`. Reads that feed a single computation are
//! dispatched together and joined afterwards; everything after the join is
//! single-threaded.

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::core::bank::{BankTransaction, BankTxStatus};
use crate::core::ids::{ClubId, EntityId, TenantId};
use crate::core::ledger::{LedgerEntry, SubclubAdjustment};
use crate::core::metrics::{normalize_key, WeeklyAgentMetric, WeeklyPlayerMetric};
use crate::core::period::Period;
use crate::core::settlement::{Settlement, SettlementStatus};
use crate::engine::aggregator::{
    BreakdownInputs, BreakdownOptions, SettlementAggregator, SettlementBreakdown, SubclubFilter,
};
use crate::engine::carry::{plan_close, CarryCloseResult};
use crate::engine::fees::{FeeRate, RateTable};
use crate::engine::matcher::{KnownEntity, MatchContext, MatchSuggestion, Matcher};
use crate::error::{SettlementError, SettlementResult};
use crate::store::{AuditRecord, SettlementStore, StoreError, StoreResult};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// How imported metric rows combine with rows already on the settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Drop every existing row first.
    Replace,
    /// Replace rows for the same player (or agent and subclub); keep the rest.
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub players: usize,
    pub agents: usize,
    /// Player rows whose missing rate was filled from the agent's history.
    pub rates_filled: usize,
}

/// Outcome of a batch whose items succeed or fail independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub ok: usize,
    pub failed: usize,
}

/// A store call in flight.
struct Pending<T> {
    operation: &'static str,
    rx: Receiver<StoreResult<T>>,
    timeout: Duration,
}

impl<T> Pending<T> {
    fn wait(self) -> SettlementResult<T> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(result) => result.map_err(|e| e.during(self.operation)),
            Err(RecvTimeoutError::Timeout) => {
                Err(StoreError::Timeout(self.timeout.as_millis()).during(self.operation))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(StoreError::Unavailable("worker exited".into()).during(self.operation))
            }
        }
    }
}

enum MetricRow {
    Player(WeeklyPlayerMetric),
    Agent(WeeklyAgentMetric),
}

pub struct SettlementService<S> {
    store: Arc<S>,
    config: EngineConfig,
    cache: Arc<TtlCache<SettlementBreakdown>>,
    matcher: Matcher,
}

impl<S: SettlementStore + 'static> SettlementService<S> {
    pub fn new(store: S, config: EngineConfig) -> SettlementResult<Self> {
        config.validate()?;
        let cache = Arc::new(TtlCache::new(config.cache_ttl()));
        Ok(Self {
            store: Arc::new(store),
            config,
            cache,
            matcher: Matcher::new(),
        })
    }

    /// Share a breakdown cache between services.
    pub fn with_cache(mut self, cache: Arc<TtlCache<SettlementBreakdown>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &TtlCache<SettlementBreakdown> {
        &self.cache
    }

    fn dispatch<T, F>(&self, operation: &'static str, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> StoreResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let store = Arc::clone(&self.store);
        thread::spawn(move || {
            // the receiver is gone if the caller already timed out
            let _ = tx.send(f(&*store));
        });
        Pending {
            operation,
            rx,
            timeout: self.config.store_timeout(),
        }
    }

    fn call<T, F>(&self, operation: &'static str, f: F) -> SettlementResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> StoreResult<T> + Send + 'static,
    {
        self.dispatch(operation, f).wait()
    }

    fn audit(&self, settlement: &Settlement, action: &str, actor: &str, detail: String) {
        let record = AuditRecord {
            tenant: settlement.tenant.clone(),
            settlement_id: settlement.id,
            action: action.to_string(),
            actor: actor.to_string(),
            at: Utc::now(),
            detail,
        };
        if let Err(e) = self.call("append_audit", move |s| s.append_audit(&record)) {
            log::warn!("audit record for settlement={} action={action} dropped: {e}", settlement.id);
        }
    }

    fn invalidate(&self, tenant: &TenantId, settlement_id: Uuid) {
        let removed = self
            .cache
            .invalidate_prefix(&format!("breakdown:{tenant}:{settlement_id}:"));
        if removed > 0 {
            log::debug!("invalidated {removed} cached breakdowns for settlement={settlement_id}");
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn get_settlement(&self, tenant: &TenantId, id: Uuid) -> SettlementResult<Settlement> {
        require_tenant(tenant)?;
        let t = tenant.clone();
        self.call("get_settlement", move |s| s.get_settlement(&t, id))?
            .ok_or_else(|| SettlementError::NotFound {
                kind: "settlement",
                id: id.to_string(),
                tenant: tenant.to_string(),
            })
    }

    /// Open a new DRAFT for the period. Its version follows the highest
    /// existing one.
    pub fn open_draft(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        period: Period,
        notes: &str,
    ) -> SettlementResult<Settlement> {
        require_tenant(tenant)?;
        if club.is_blank() {
            return Err(SettlementError::validation("club id is blank"));
        }
        let (t, c) = (tenant.clone(), club.clone());
        let existing = self.call("list_settlements", move |s| s.list_settlements(&t, &c, period))?;
        if let Some(draft) = existing.iter().find(|s| s.is_draft()) {
            return Err(SettlementError::InvalidState {
                kind: "settlement",
                id: draft.id.to_string(),
                action: "open draft over",
                status: draft.status.to_string(),
            });
        }
        let version = existing.iter().map(|s| s.version).max().unwrap_or(0) + 1;
        let settlement = Settlement::draft(tenant.clone(), club.clone(), period, version).with_notes(notes);

        let row = settlement.clone();
        self.call("save_settlement", move |s| s.save_settlement(&row))?;
        log::info!(
            "opened draft settlement={} club={} period={} version={}",
            settlement.id,
            club,
            period,
            version
        );
        self.audit(&settlement, "open_draft", "system", String::new());
        Ok(settlement)
    }

    pub fn delete_draft(&self, tenant: &TenantId, id: Uuid) -> SettlementResult<()> {
        let settlement = self.get_settlement(tenant, id)?;
        settlement.ensure_draft("delete")?;
        let t = tenant.clone();
        self.call("delete_settlement", move |s| s.delete_settlement(&t, id))?;
        log::info!("deleted draft settlement={id}");
        self.audit(&settlement, "delete_draft", "system", String::new());
        Ok(())
    }

    pub fn finalize(&self, tenant: &TenantId, id: Uuid, actor: &str) -> SettlementResult<Settlement> {
        let mut settlement = self.get_settlement(tenant, id)?;
        settlement.finalize(actor, Utc::now())?;
        let row = settlement.clone();
        self.call("save_settlement", move |s| s.save_settlement(&row))?;
        self.invalidate(tenant, id);
        log::info!("finalized settlement={id} by={actor}");
        self.audit(&settlement, "finalize", actor, String::new());
        Ok(settlement)
    }

    pub fn void(&self, tenant: &TenantId, id: Uuid, actor: &str, reason: &str) -> SettlementResult<Settlement> {
        if reason.trim().is_empty() {
            return Err(SettlementError::validation("void reason is required"));
        }
        let mut settlement = self.get_settlement(tenant, id)?;
        settlement.void(actor, reason, Utc::now())?;
        let row = settlement.clone();
        self.call("save_settlement", move |s| s.save_settlement(&row))?;
        self.invalidate(tenant, id);
        log::info!("voided settlement={id} by={actor}");
        self.audit(&settlement, "void", actor, reason.to_string());
        Ok(settlement)
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Load weekly rows into a DRAFT settlement.
    ///
    /// Rounded and derived fields are recomputed on the way in. A player row
    /// without a rate takes its agent's most recent rate if the store knows
    /// one; a failed lookup leaves the rate at 0.
    pub fn import_metrics(
        &self,
        tenant: &TenantId,
        id: Uuid,
        players: Vec<WeeklyPlayerMetric>,
        agents: Vec<WeeklyAgentMetric>,
        mode: ImportMode,
    ) -> SettlementResult<ImportSummary> {
        let settlement = self.get_settlement(tenant, id)?;
        settlement.ensure_draft("import metrics into")?;

        if let Some(bad) = players.iter().find(|p| p.player_id.is_blank()) {
            return Err(SettlementError::validation(format!(
                "player row '{}' has no player id",
                bad.name
            )));
        }

        for p in &players {
            if let Some(rate) = p.rakeback_rate {
                check_rate(rate, &format!("rakeback rate of player '{}'", p.player_id))?;
            }
        }
        for a in &agents {
            check_rate(a.rakeback_rate, &format!("rakeback rate of agent '{}'", a.agent_name))?;
        }

        let hints = self.rate_hints(&settlement, &players);
        let mut rates_filled = 0;
        let mut players: Vec<WeeklyPlayerMetric> = players
            .into_iter()
            .map(|mut p| {
                p.settlement_id = id;
                if p.rakeback_rate.is_none() {
                    if let Some(rate) = hints.get(&p.agent_key()) {
                        p.rakeback_rate = Some(*rate);
                        rates_filled += 1;
                    }
                }
                p.derive();
                p
            })
            .collect();
        let mut agents: Vec<WeeklyAgentMetric> = agents
            .into_iter()
            .map(|mut a| {
                a.settlement_id = id;
                a.derive();
                a
            })
            .collect();

        if mode == ImportMode::Merge {
            let (t1, t2) = (tenant.clone(), tenant.clone());
            let current_players = self.dispatch("player_metrics", move |s| s.player_metrics(&t1, id));
            let current_agents = self.dispatch("agent_metrics", move |s| s.agent_metrics(&t2, id));
            players = merge_players(current_players.wait()?, players);
            agents = merge_agents(current_agents.wait()?, agents);
        }

        let summary = ImportSummary {
            players: players.len(),
            agents: agents.len(),
            rates_filled,
        };
        let t = tenant.clone();
        self.call("replace_metrics", move |s| s.replace_metrics(&t, id, players, agents))?;
        log::info!(
            "imported metrics settlement={id} mode={mode:?} players={} agents={} rates_filled={}",
            summary.players,
            summary.agents,
            summary.rates_filled
        );
        Ok(summary)
    }

    fn rate_hints(&self, settlement: &Settlement, players: &[WeeklyPlayerMetric]) -> HashMap<String, Decimal> {
        let keys: HashSet<String> = players
            .iter()
            .filter(|p| p.rakeback_rate.is_none())
            .map(|p| p.agent_key())
            .collect();

        let mut hints = HashMap::new();
        for key in keys {
            let (t, c, k, period) = (
                settlement.tenant.clone(),
                settlement.club.clone(),
                key.clone(),
                settlement.period,
            );
            match self.call("agent_rate_hint", move |s| s.agent_rate_hint(&t, &c, &k, period)) {
                Ok(Some(rate)) => {
                    hints.insert(key, rate);
                }
                Ok(None) => {}
                Err(e) => log::warn!("rate lookup for agent {key} skipped: {e}"),
            }
        }
        hints
    }

    /// Set an agent's rakeback rate on its agent rows and every one of its
    /// player rows. Rows are written in chunks of `batch_chunk_size`; a failed
    /// row does not stop the others.
    pub fn propagate_agent_rate(
        &self,
        tenant: &TenantId,
        id: Uuid,
        agent: &str,
        rate: Decimal,
    ) -> SettlementResult<BatchOutcome> {
        check_rate(rate, "rakeback rate")?;
        let settlement = self.get_settlement(tenant, id)?;
        settlement.ensure_draft("change rates on")?;

        let (t1, t2) = (tenant.clone(), tenant.clone());
        let players = self.dispatch("player_metrics", move |s| s.player_metrics(&t1, id));
        let agents = self.dispatch("agent_metrics", move |s| s.agent_metrics(&t2, id));
        let (players, agents) = (players.wait()?, agents.wait()?);

        let wanted = normalize_key(agent);
        let is_agent = |agent_id: &Option<EntityId>, name: &str| {
            agent_id.as_ref().is_some_and(|a| a.as_str() == agent) || normalize_key(name) == wanted
        };

        let mut rows: Vec<MetricRow> = agents
            .into_iter()
            .filter(|a| is_agent(&a.agent_id, &a.agent_name))
            .map(|mut a| {
                a.rakeback_rate = rate;
                a.derive();
                MetricRow::Agent(a)
            })
            .collect();
        rows.extend(
            players
                .into_iter()
                .filter(|p| is_agent(&p.agent_id, &p.agent_name))
                .map(|p| MetricRow::Player(p.with_rate(rate))),
        );
        if rows.is_empty() {
            return Err(SettlementError::NotFound {
                kind: "agent",
                id: agent.to_string(),
                tenant: tenant.to_string(),
            });
        }

        let mut outcome = BatchOutcome::default();
        for chunk in rows.chunks(self.config.batch_chunk_size) {
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|row| scope.spawn(move || self.write_metric_row(tenant, row)))
                    .collect();
                for handle in handles {
                    match handle.join() {
                        Ok(Ok(())) => outcome.ok += 1,
                        Ok(Err(e)) => {
                            log::warn!("rate update on settlement={id} failed: {e}");
                            outcome.failed += 1;
                        }
                        Err(_) => outcome.failed += 1,
                    }
                }
            });
        }
        log::info!(
            "propagated rate {rate} to agent '{agent}' settlement={id} ok={} failed={}",
            outcome.ok,
            outcome.failed
        );
        Ok(outcome)
    }

    fn write_metric_row(&self, tenant: &TenantId, row: &MetricRow) -> SettlementResult<()> {
        let t = tenant.clone();
        match row {
            MetricRow::Player(p) => {
                let p = p.clone();
                self.call("update_player_metric", move |s| s.update_player_metric(&t, &p))
            }
            MetricRow::Agent(a) => {
                let a = a.clone();
                self.call("update_agent_metric", move |s| s.update_agent_metric(&t, &a))
            }
        }
    }

    // ------------------------------------------------------------------
    // Breakdown and close
    // ------------------------------------------------------------------

    /// Compute a settlement's breakdown, limited to the subclubs in `filter`
    /// when one is given. FINAL breakdowns are served from cache while fresh.
    pub fn breakdown(
        &self,
        tenant: &TenantId,
        id: Uuid,
        filter: Option<&SubclubFilter>,
    ) -> SettlementResult<SettlementBreakdown> {
        let settlement = self.get_settlement(tenant, id)?;
        let cacheable = settlement.status == SettlementStatus::Final && !self.cache.ttl().is_zero();
        let key = format!(
            "breakdown:{tenant}:{id}:{}",
            filter.map(SubclubFilter::fingerprint).unwrap_or_else(|| "*".into())
        );
        if cacheable {
            if let Some(hit) = self.cache.get(&key) {
                log::debug!("breakdown settlement={id} cache=hit");
                return Ok(hit);
            }
        }

        let inputs = self.load_inputs(settlement)?;
        let options = BreakdownOptions {
            filter: filter.cloned(),
            formula_version: self.config.formula_version.clone(),
            attribute_agent_to_first_player: self.config.attribute_agent_to_first_player,
        };
        let breakdown = SettlementAggregator::build(&inputs, &options);
        log::info!(
            "built breakdown settlement={id} subclubs={} cache={}",
            breakdown.subclubs.len(),
            if cacheable { "miss" } else { "skip" }
        );
        if cacheable {
            self.cache.insert(key, breakdown.clone());
        }
        Ok(breakdown)
    }

    fn load_inputs(&self, settlement: Settlement) -> SettlementResult<BreakdownInputs> {
        let id = settlement.id;
        let period = settlement.period;
        let tenant = settlement.tenant.clone();
        let club = settlement.club.clone();

        let players = {
            let t = tenant.clone();
            self.dispatch("player_metrics", move |s| s.player_metrics(&t, id))
        };
        let agents = {
            let t = tenant.clone();
            self.dispatch("agent_metrics", move |s| s.agent_metrics(&t, id))
        };
        let fee_rates = {
            let t = tenant.clone();
            self.dispatch("fee_rates", move |s| s.fee_rates(&t))
        };
        let adjustments = {
            let (t, c) = (tenant.clone(), club.clone());
            self.dispatch("adjustments", move |s| s.adjustments(&t, &c, period))
        };
        let carries = {
            let (t, c) = (tenant.clone(), club.clone());
            self.dispatch("carries", move |s| s.carries(&t, &c, period))
        };
        let ledger = self.dispatch("ledger_entries", move |s| s.ledger_entries(&tenant, &club, period));

        Ok(BreakdownInputs {
            settlement,
            players: players.wait()?,
            agents: agents.wait()?,
            fee_rates: fee_rates.wait()?,
            adjustments: adjustments.wait()?,
            carries: carries.wait()?,
            ledger: ledger.wait()?,
        })
    }

    /// Carry every agent's ending balance into the next period. Safe to run
    /// more than once: carry rows are overwritten, not accumulated.
    pub fn close_period(&self, tenant: &TenantId, id: Uuid) -> SettlementResult<CarryCloseResult> {
        let settlement = self.get_settlement(tenant, id)?;
        if settlement.status == SettlementStatus::Void {
            return Err(SettlementError::InvalidState {
                kind: "settlement",
                id: id.to_string(),
                action: "close",
                status: settlement.status.to_string(),
            });
        }
        let period = settlement.period;

        let agents = {
            let t = tenant.clone();
            self.dispatch("agent_metrics", move |s| s.agent_metrics(&t, id))
        };
        let carries = {
            let (t, c) = (tenant.clone(), settlement.club.clone());
            self.dispatch("carries", move |s| s.carries(&t, &c, period))
        };
        let ledger = {
            let (t, c) = (tenant.clone(), settlement.club.clone());
            self.dispatch("ledger_entries", move |s| s.ledger_entries(&t, &c, period))
        };
        let (agents, carries, ledger) = (agents.wait()?, carries.wait()?, ledger.wait()?);

        let plan = plan_close(&settlement, &agents, &carries, &ledger, Utc::now());
        for row in plan.rows {
            self.call("upsert_carry", move |s| s.upsert_carry(&row))?;
        }

        let (t, c, next) = (tenant.clone(), settlement.club.clone(), plan.result.destination_period);
        match self.call("list_settlements", move |s| s.list_settlements(&t, &c, next)) {
            Ok(affected) => affected.iter().for_each(|s| self.invalidate(tenant, s.id)),
            Err(e) => log::warn!("could not invalidate breakdowns for period {next}: {e}"),
        }

        log::info!(
            "closed settlement={id} period={} -> {} entities_updated={}",
            plan.result.closed_period,
            plan.result.destination_period,
            plan.result.entities_updated
        );
        self.audit(
            &settlement,
            "close",
            "system",
            format!("entities_updated={}", plan.result.entities_updated),
        );
        Ok(plan.result)
    }

    // ------------------------------------------------------------------
    // Fees, adjustments and ledger
    // ------------------------------------------------------------------

    pub fn fee_table(&self, tenant: &TenantId) -> SettlementResult<RateTable> {
        require_tenant(tenant)?;
        let t = tenant.clone();
        let rates = self.call("fee_rates", move |s| s.fee_rates(&t))?;
        Ok(RateTable::from_rates(&rates))
    }

    pub fn set_fee_rate(&self, rate: FeeRate) -> SettlementResult<()> {
        require_tenant(&rate.tenant)?;
        if rate.name.trim().is_empty() {
            return Err(SettlementError::validation("fee name is blank"));
        }
        if rate.rate < Decimal::ZERO || rate.rate > Decimal::ONE_HUNDRED {
            return Err(SettlementError::validation(format!(
                "fee rate must be within 0-100, got {}",
                rate.rate
            )));
        }
        self.call("save_fee_rate", move |s| s.save_fee_rate(&rate))
    }

    /// Insert or replace the adjustment row for one subclub and period.
    pub fn record_adjustment(&self, adjustment: SubclubAdjustment) -> SettlementResult<()> {
        require_tenant(&adjustment.tenant)?;
        if adjustment.subclub_name.trim().is_empty() && adjustment.subclub_id.is_none() {
            return Err(SettlementError::validation("adjustment has no subclub"));
        }
        log::debug!(
            "adjustment subclub='{}' period={} total={}",
            adjustment.subclub_name,
            adjustment.period,
            adjustment.total()
        );
        self.call("upsert_adjustment", move |s| s.upsert_adjustment(&adjustment))
    }

    /// Record a cash movement. An entry whose reference was already recorded
    /// is not written again; the stored entry is returned instead.
    pub fn record_ledger_entry(&self, entry: LedgerEntry) -> SettlementResult<LedgerEntry> {
        require_tenant(&entry.tenant)?;
        entry.validate()?;

        if let Some(reference) = entry.reference.clone() {
            let (t, c) = (entry.tenant.clone(), entry.club.clone());
            let existing = self.call("find_ledger_by_reference", move |s| {
                s.find_ledger_by_reference(&t, &c, &reference)
            })?;
            if let Some(existing) = existing {
                log::debug!("ledger reference already recorded as {}", existing.id);
                return Ok(existing);
            }
        }

        let row = entry.clone();
        self.call("insert_ledger_entry", move |s| s.insert_ledger_entry(&row))?;
        log::info!(
            "recorded ledger entry={} entity={} {:?} {}",
            entry.id,
            entry.entity,
            entry.direction,
            entry.amount
        );
        Ok(entry)
    }

    // ------------------------------------------------------------------
    // Bank reconciliation
    // ------------------------------------------------------------------

    /// One suggestion per pending bank line of the period.
    pub fn suggest_matches(
        &self,
        tenant: &TenantId,
        club: &ClubId,
        period: Period,
    ) -> SettlementResult<Vec<MatchSuggestion>> {
        require_tenant(tenant)?;
        let txs = {
            let (t, c) = (tenant.clone(), club.clone());
            self.dispatch("bank_transactions", move |s| s.bank_transactions(&t, &c, period))
        };
        let ledger = {
            let (t, c) = (tenant.clone(), club.clone());
            self.dispatch("ledger_entries", move |s| s.ledger_entries(&t, &c, period))
        };
        let settlements = {
            let (t, c) = (tenant.clone(), club.clone());
            self.dispatch("list_settlements", move |s| s.list_settlements(&t, &c, period))
        };
        let (txs, ledger, settlements) = (txs.wait()?, ledger.wait()?, settlements.wait()?);

        let mut known = Vec::new();
        let mut seen = HashSet::new();
        for settlement in settlements.iter().filter(|s| s.status != SettlementStatus::Void) {
            let id = settlement.id;
            let (t1, t2) = (tenant.clone(), tenant.clone());
            let players = self.dispatch("player_metrics", move |s| s.player_metrics(&t1, id));
            let agents = self.dispatch("agent_metrics", move |s| s.agent_metrics(&t2, id));
            for p in players.wait()? {
                if seen.insert(p.player_id.clone()) {
                    known.push(KnownEntity::player(p.player_id, p.name));
                }
            }
            for a in agents.wait()? {
                let agent_id = a.agent_id.unwrap_or_else(|| EntityId::new(a.id.to_string()));
                if seen.insert(agent_id.clone()) {
                    known.push(KnownEntity::agent(agent_id, a.agent_name));
                }
            }
        }

        let ctx = MatchContext::new(known, ledger);
        Ok(self.matcher.suggest_all(&txs, &ctx))
    }

    /// Confirm a suggestion: attach the bank line to `entity`, and mark the
    /// ledger entry it corresponds to as reconciled.
    ///
    /// Repeating a link with the same entity and entry finishes a link whose
    /// reconcile step failed; it is otherwise a no-op.
    pub fn link_bank_transaction(
        &self,
        tenant: &TenantId,
        tx_id: Uuid,
        entity: EntityId,
        ledger_entry: Option<Uuid>,
    ) -> SettlementResult<BankTransaction> {
        if entity.is_blank() {
            return Err(SettlementError::validation("entity id is blank"));
        }
        let mut tx = self.get_bank_transaction(tenant, tx_id)?;
        let relink = tx.status == BankTxStatus::Linked
            && tx.linked_entity.as_ref() == Some(&entity)
            && tx.ledger_entry == ledger_entry;

        let entry = match ledger_entry {
            Some(entry_id) => Some(self.get_ledger_entry(tenant, entry_id)?),
            None => None,
        };
        if relink {
            log::debug!("bank transaction={tx_id} already linked, completing reconcile");
        } else {
            if let Some(entry) = entry.as_ref().filter(|e| e.reconciled) {
                return Err(SettlementError::InvalidState {
                    kind: "ledger entry",
                    id: entry.id.to_string(),
                    action: "link",
                    status: "reconciled".to_string(),
                });
            }
            tx.link(entity, ledger_entry)?;
            let row = tx.clone();
            self.call("save_bank_transaction", move |s| s.save_bank_transaction(&row))?;
        }

        if let Some(entry) = entry.filter(|e| !e.reconciled) {
            let (t, entry_id) = (tenant.clone(), entry.id);
            if !self.call("mark_reconciled", move |s| s.mark_reconciled(&t, entry_id))? {
                return Err(SettlementError::NotFound {
                    kind: "ledger entry",
                    id: entry_id.to_string(),
                    tenant: tenant.to_string(),
                });
            }
        }
        log::info!("linked bank transaction={tx_id} status={}", tx.status);
        Ok(tx)
    }

    pub fn ignore_bank_transaction(&self, tenant: &TenantId, tx_id: Uuid) -> SettlementResult<BankTransaction> {
        let mut tx = self.get_bank_transaction(tenant, tx_id)?;
        tx.ignore()?;
        let row = tx.clone();
        self.call("save_bank_transaction", move |s| s.save_bank_transaction(&row))?;
        log::info!("ignored bank transaction={tx_id}");
        Ok(tx)
    }

    fn get_bank_transaction(&self, tenant: &TenantId, tx_id: Uuid) -> SettlementResult<BankTransaction> {
        require_tenant(tenant)?;
        let t = tenant.clone();
        self.call("get_bank_transaction", move |s| s.get_bank_transaction(&t, tx_id))?
            .ok_or_else(|| SettlementError::NotFound {
                kind: "bank transaction",
                id: tx_id.to_string(),
                tenant: tenant.to_string(),
            })
    }
    fn get_ledger_entry(&self, tenant: &TenantId, entry_id: Uuid) -> SettlementResult<LedgerEntry> {
        let t = tenant.clone();
        self.call("get_ledger_entry", move |s| s.get_ledger_entry(&t, entry_id))?
            .ok_or_else(|| SettlementError::NotFound {
                kind: "ledger entry",
                id: entry_id.to_string(),
                tenant: tenant.to_string(),
            })
    }
}

fn check_rate(rate: Decimal, what: &str) -> SettlementResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(SettlementError::validation(format!("{what} must be within 0-100, got {rate}")));
    }
    Ok(())
}

fn require_tenant(tenant: &TenantId) -> SettlementResult<()> {
    if tenant.is_blank() {
        Err(SettlementError::validation("tenant id is blank"))
    } else {
        Ok(())
    }
}

/// Incoming rows replace existing rows for the same player. A replaced row
/// keeps its id so ledger entries recorded against it still resolve.
fn merge_players(existing: Vec<WeeklyPlayerMetric>, incoming: Vec<WeeklyPlayerMetric>) -> Vec<WeeklyPlayerMetric> {
    let mut out = existing;
    for mut row in incoming {
        match out.iter_mut().find(|p| p.player_id == row.player_id) {
            Some(slot) => {
                row.id = slot.id;
                *slot = row;
            }
            None => out.push(row),
        }
    }
    out
}

fn merge_agents(existing: Vec<WeeklyAgentMetric>, incoming: Vec<WeeklyAgentMetric>) -> Vec<WeeklyAgentMetric> {
    let same = |a: &WeeklyAgentMetric, b: &WeeklyAgentMetric| {
        a.agent_key() == b.agent_key() && normalize_key(&a.subclub_name) == normalize_key(&b.subclub_name)
    };
    let mut out = existing;
    for mut row in incoming {
        match out.iter_mut().find(|a| same(a, &row)) {
            Some(slot) => {
                row.id = slot.id;
                *slot = row;
            }
            None => out.push(row),
        }
    }
    out
}
