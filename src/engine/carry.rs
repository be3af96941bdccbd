//! Period close: roll each agent's ending balance into the next week.

use crate::core::ids::EntityId;
use crate::core::ledger::{CarryForward, LedgerEntry};
use crate::core::metrics::WeeklyAgentMetric;
use crate::core::money::{current_balance, round2};
use crate::core::period::Period;
use crate::core::settlement::Settlement;
use crate::engine::ledger_net::{net_for, AliasSet};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How one agent's balance was carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryDetail {
    pub entity: EntityId,
    pub agent_name: String,
    pub previous_carry: Decimal,
    pub weekly_result: Decimal,
    pub ledger_net: Decimal,
    pub final_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryCloseResult {
    pub entities_updated: usize,
    pub closed_period: Period,
    pub destination_period: Period,
    pub details: Vec<CarryDetail>,
}

/// The outcome of a close before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CarryPlan {
    /// Rows to upsert, keyed by (club, entity, destination period).
    pub rows: Vec<CarryForward>,
    pub result: CarryCloseResult,
}

/// Compute every agent's carry for the period after `settlement`'s.
///
/// `carries` are the balances carried into the settlement's period and
/// `ledger` the movements booked in it. Agent rows without a stable id are
/// skipped: their balance could not be matched to anything next week.
///
/// The plan depends only on its inputs, so persisting it twice leaves the
/// same carry rows behind.
pub fn plan_close(
    settlement: &Settlement,
    agents: &[WeeklyAgentMetric],
    carries: &[CarryForward],
    ledger: &[LedgerEntry],
    now: DateTime<Utc>,
) -> CarryPlan {
    let closed_period = settlement.period;
    let destination_period = closed_period.next();

    let mut by_agent: BTreeMap<EntityId, Vec<&WeeklyAgentMetric>> = BTreeMap::new();
    for row in agents {
        match &row.agent_id {
            Some(id) if !id.is_blank() => by_agent.entry(id.clone()).or_default().push(row),
            _ => log::debug!(
                "close settlement={} skipping agent '{}' without stable id",
                settlement.id,
                row.agent_name
            ),
        }
    }

    let mut rows = Vec::with_capacity(by_agent.len());
    let mut details = Vec::with_capacity(by_agent.len());
    for (entity, agent_rows) in by_agent {
        let aliases = agent_rows
            .iter()
            .fold(AliasSet::new(entity.clone()), |set, r| set.with_uuid(r.id));

        let previous_carry = round2(
            carries
                .iter()
                .filter(|c| c.entity == entity && c.period == closed_period)
                .map(|c| c.amount)
                .sum(),
        );
        let weekly_result = round2(agent_rows.iter().map(|r| r.weekly_result).sum());
        let ledger_net = net_for(ledger, &aliases).net;
        let final_balance = current_balance(previous_carry, weekly_result, ledger_net);

        rows.push(CarryForward {
            tenant: settlement.tenant.clone(),
            club: settlement.club.clone(),
            entity: entity.clone(),
            period: destination_period,
            amount: final_balance,
            source_settlement: settlement.id,
            updated_at: now,
        });
        details.push(CarryDetail {
            entity,
            agent_name: agent_rows[0].agent_name.clone(),
            previous_carry,
            weekly_result,
            ledger_net,
            final_balance,
        });
    }

    CarryPlan {
        result: CarryCloseResult {
            entities_updated: rows.len(),
            closed_period,
            destination_period,
            details,
        },
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{ClubId, TenantId};
    use crate::core::ledger::Direction;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn settlement() -> Settlement {
        Settlement::draft(
            TenantId::new("t"),
            ClubId::new("c"),
            "2026-03-02".parse().unwrap(),
            1,
        )
    }

    fn agent(s: &Settlement, id: Option<&str>, weekly: Decimal) -> WeeklyAgentMetric {
        WeeklyAgentMetric {
            id: Uuid::new_v4(),
            settlement_id: s.id,
            agent_id: id.map(EntityId::new),
            agent_name: "Agent".into(),
            subclub_id: None,
            subclub_name: "Sub".into(),
            player_count: 1,
            rake_total: Decimal::ZERO,
            winnings_total: weekly,
            revenue_total: Decimal::ZERO,
            rakeback_rate: Decimal::ZERO,
            commission: Decimal::ZERO,
            weekly_result: weekly,
            deferred_payment: false,
            settles_individually: false,
        }
    }

    fn carry_into(s: &Settlement, entity: &str, period: Period, amount: Decimal) -> CarryForward {
        CarryForward {
            tenant: s.tenant.clone(),
            club: s.club.clone(),
            entity: EntityId::new(entity),
            period,
            amount,
            source_settlement: Uuid::nil(),
            updated_at: Utc::now(),
        }
    }

    fn paid(s: &Settlement, entity: &str, direction: Direction, amount: Decimal) -> LedgerEntry {
        LedgerEntry::new(
            s.tenant.clone(),
            s.club.clone(),
            EntityId::new(entity),
            s.period,
            direction,
            amount,
            NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
        )
    }

    #[test]
    fn test_final_balance() {
        let s = settlement();
        let agents = vec![agent(&s, Some("ag"), dec!(-200.00))];
        let carries = vec![carry_into(&s, "ag", s.period, dec!(1000.00))];
        let ledger = vec![paid(&s, "ag", Direction::Inbound, dec!(300.00))];

        let plan = plan_close(&s, &agents, &carries, &ledger, Utc::now());
        let d = &plan.result.details[0];
        assert_eq!(d.previous_carry, dec!(1000.00));
        assert_eq!(d.ledger_net, dec!(300.00));
        assert_eq!(d.final_balance, dec!(500.00));
        assert_eq!(plan.rows[0].period, s.period.next());
        assert_eq!(plan.result.destination_period.to_string(), "2026-03-09");
    }

    #[test]
    fn test_rows_without_agent_id_skipped() {
        let s = settlement();
        let agents = vec![agent(&s, None, dec!(50)), agent(&s, Some("ag"), dec!(10))];
        let plan = plan_close(&s, &agents, &[], &[], Utc::now());
        assert_eq!(plan.result.entities_updated, 1);
        assert_eq!(plan.rows[0].entity, EntityId::new("ag"));
    }

    #[test]
    fn test_ledger_against_row_ids_counts() {
        let s = settlement();
        let a = agent(&s, Some("ag"), dec!(0));
        let b = agent(&s, Some("ag"), dec!(40));
        let ledger = vec![
            paid(&s, &a.id.to_string(), Direction::Outbound, dec!(25)),
            paid(&s, &b.id.to_string(), Direction::Inbound, dec!(5)),
        ];
        let plan = plan_close(&s, &[a, b], &[], &ledger, Utc::now());
        assert_eq!(plan.result.entities_updated, 1);
        let d = &plan.result.details[0];
        assert_eq!(d.weekly_result, dec!(40));
        assert_eq!(d.ledger_net, dec!(-20));
        assert_eq!(d.final_balance, dec!(60));
    }

    #[test]
    fn test_carry_from_other_periods_ignored() {
        let s = settlement();
        let agents = vec![agent(&s, Some("ag"), dec!(0))];
        let stale = carry_into(&s, "ag", s.period.next(), dec!(999));
        let plan = plan_close(&s, &agents, &[stale], &[], Utc::now());
        assert_eq!(plan.result.details[0].previous_carry, Decimal::ZERO);
    }

    #[test]
    fn test_plan_is_repeatable() {
        let s = settlement();
        let agents = vec![agent(&s, Some("ag"), dec!(12.34))];
        let at = Utc::now();
        let first = plan_close(&s, &agents, &[], &[], at);
        let second = plan_close(&s, &agents, &[], &[], at);
        assert_eq!(first, second);
    }
}
