use crate::core::ids::{ClubId, EntityId, TenantId};
use crate::core::ledger::{CarryForward, LedgerEntry, SubclubAdjustment};
use crate::core::metrics::{normalize_key, WeeklyAgentMetric, WeeklyPlayerMetric};
use crate::core::money::{self, round2, Situation, EPSILON, ROUNDING_POLICY};
use crate::core::period::Period;
use crate::core::settlement::{Settlement, SettlementStatus};
use crate::engine::fees::{FeeBreakdown, FeeEngine, FeeRate, RateEntry, RateTable};
use crate::engine::ledger_net::{AliasClaims, AliasSet, LedgerIndex};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Formula version reported when the caller does not supply one.
pub const DEFAULT_FORMULA_VERSION: &str = "2026.1";

/// Which way money flows between the operator and a subclub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementDirection {
    OperatorOwesSubclub,
    SubclubOwesOperator,
    Neutral,
}

impl SettlementDirection {
    pub fn from_amount(amount: Decimal) -> Self {
        if amount > EPSILON {
            SettlementDirection::OperatorOwesSubclub
        } else if amount < -EPSILON {
            SettlementDirection::SubclubOwesOperator
        } else {
            SettlementDirection::Neutral
        }
    }
}

/// Everything one breakdown is computed from. The service loads these
/// independently and hands them over in one piece.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownInputs {
    pub settlement: Settlement,
    pub players: Vec<WeeklyPlayerMetric>,
    pub agents: Vec<WeeklyAgentMetric>,
    pub fee_rates: Vec<FeeRate>,
    pub adjustments: Vec<SubclubAdjustment>,
    /// Balances carried into the settlement's period.
    pub carries: Vec<CarryForward>,
    /// Ledger rows booked in the settlement's period.
    pub ledger: Vec<LedgerEntry>,
}

/// Subclubs a caller is allowed to see, by id or by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubclubFilter {
    ids: HashSet<String>,
    names: HashSet<String>,
}

impl SubclubFilter {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for item in items {
            let item = item.as_ref();
            filter.ids.insert(item.trim().to_string());
            filter.names.insert(normalize_key(item));
        }
        filter
    }

    pub fn allows(&self, id: Option<&EntityId>, name: &str) -> bool {
        id.is_some_and(|i| self.ids.contains(i.as_str())) || self.names.contains(&normalize_key(name))
    }

    /// Stable text form, used to build cache keys.
    pub fn fingerprint(&self) -> String {
        let mut ids: Vec<&String> = self.ids.iter().collect();
        ids.sort();
        ids.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",")
    }
}

#[derive(Debug, Clone)]
pub struct BreakdownOptions {
    pub filter: Option<SubclubFilter>,
    pub formula_version: String,
    /// Credit an agent's carry and ledger movements to the first of its
    /// players in the listing.
    pub attribute_agent_to_first_player: bool,
}

impl Default for BreakdownOptions {
    fn default() -> Self {
        Self {
            filter: None,
            formula_version: DEFAULT_FORMULA_VERSION.to_string(),
            attribute_agent_to_first_player: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownHeader {
    pub settlement_id: Uuid,
    pub tenant: TenantId,
    pub club: ClubId,
    pub period: Period,
    pub version: u32,
    pub status: SettlementStatus,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownMetadata {
    pub rounding_policy: String,
    pub formula_version: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubclubTotals {
    pub player_count: usize,
    pub agent_count: usize,
    pub winnings: Decimal,
    pub rake: Decimal,
    pub revenue: Decimal,
    pub rakeback: Decimal,
    pub weekly_result: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentTotals {
    pub overlay: Decimal,
    pub purchases: Decimal,
    pub security: Decimal,
    pub other: Decimal,
    pub total: Decimal,
    pub notes: String,
}

impl AdjustmentTotals {
    fn from_row(row: &SubclubAdjustment) -> Self {
        Self {
            overlay: round2(row.overlay),
            purchases: round2(row.purchases),
            security: round2(row.security),
            other: round2(row.other),
            total: round2(row.total()),
            notes: row.notes.clone(),
        }
    }
}

/// A player row with its balances resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLine {
    pub metric: WeeklyPlayerMetric,
    pub carry: Decimal,
    pub ledger_net: Decimal,
    pub current_balance: Decimal,
    pub situation: Situation,
    /// This line also carries its agent's balance and ledger movements.
    pub carries_agent_balance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLine {
    pub metric: WeeklyAgentMetric,
    pub carry: Decimal,
    pub ledger_net: Decimal,
    pub current_balance: Decimal,
    pub situation: Situation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubclubBreakdown {
    /// Grouping key: `id:<subclub id>` or `name:<NORMALIZED NAME>`.
    pub key: String,
    pub subclub_id: Option<EntityId>,
    pub name: String,
    pub totals: SubclubTotals,
    pub fees: FeeBreakdown,
    pub adjustments: AdjustmentTotals,
    /// `Σ winnings + Σ rake + Σ revenue` over the subclub's players.
    pub subclub_result: Decimal,
    /// `subclub_result − fees + adjustments`.
    pub league_settlement: Decimal,
    pub direction: SettlementDirection,
    pub players: Vec<PlayerLine>,
    pub agents: Vec<AgentLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantRollup {
    pub subclub_count: usize,
    pub player_count: usize,
    pub winnings: Decimal,
    pub rake: Decimal,
    pub revenue: Decimal,
    pub rakeback: Decimal,
    pub weekly_result: Decimal,
    pub subclub_result: Decimal,
    pub fee_total: Decimal,
    pub adjustment_total: Decimal,
    pub league_settlement: Decimal,
    pub direction: Option<SettlementDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementBreakdown {
    pub header: BreakdownHeader,
    pub fee_table: Vec<RateEntry>,
    pub subclubs: Vec<SubclubBreakdown>,
    pub rollup: TenantRollup,
    pub metadata: BreakdownMetadata,
}

impl SettlementBreakdown {
    pub fn subclub(&self, name: &str) -> Option<&SubclubBreakdown> {
        let wanted = normalize_key(name);
        self.subclubs.iter().find(|s| normalize_key(&s.name) == wanted)
    }
}

/// Resolves a row's subclub reference to a grouping key. Rows without an id
/// borrow the id another row recorded for the same name.
struct SubclubKeys {
    id_by_name: HashMap<String, EntityId>,
}

impl SubclubKeys {
    fn new(players: &[WeeklyPlayerMetric], agents: &[WeeklyAgentMetric]) -> Self {
        let mut id_by_name = HashMap::new();
        let refs = players
            .iter()
            .map(|p| (p.subclub_id.as_ref(), p.subclub_name.as_str()))
            .chain(agents.iter().map(|a| (a.subclub_id.as_ref(), a.subclub_name.as_str())));
        for (id, name) in refs {
            if let Some(id) = id {
                id_by_name
                    .entry(normalize_key(name))
                    .or_insert_with(|| id.clone());
            }
        }
        Self { id_by_name }
    }

    fn resolve(&self, id: Option<&EntityId>, name: &str) -> (String, Option<EntityId>) {
        let id = id.cloned().or_else(|| self.id_by_name.get(&normalize_key(name)).cloned());
        match id {
            Some(id) => (format!("id:{id}"), Some(id)),
            None => (format!("name:{}", normalize_key(name)), None),
        }
    }
}

#[derive(Default)]
struct Group<'a> {
    id: Option<EntityId>,
    name: String,
    players: Vec<&'a WeeklyPlayerMetric>,
    agents: Vec<&'a WeeklyAgentMetric>,
}

/// Everything known about one agent across the whole settlement.
struct AgentIdentity {
    aliases: AliasSet,
    settles_individually: bool,
}

fn agent_identities(
    agents: &[WeeklyAgentMetric],
    players: &[WeeklyPlayerMetric],
) -> HashMap<String, AgentIdentity> {
    let mut out: HashMap<String, AgentIdentity> = HashMap::new();
    for a in agents {
        let primary = a
            .agent_id
            .clone()
            .unwrap_or_else(|| EntityId::new(a.id.to_string()));
        let ident = out.entry(a.agent_key()).or_insert_with(|| AgentIdentity {
            aliases: AliasSet::new(primary),
            settles_individually: false,
        });
        ident.aliases.add(EntityId::new(a.id.to_string()));
        ident.settles_individually |= a.settles_individually;
    }

    // A player row naming an agent id that no agent row carries still
    // identifies the agent. An agent row recorded only under the agent's
    // name joins that identity.
    for p in players {
        let Some(agent_id) = p.agent_id.as_ref().filter(|id| !id.is_blank()) else {
            continue;
        };
        let key = p.agent_key();
        if out.contains_key(&key) {
            continue;
        }
        let mut ident = AgentIdentity {
            aliases: AliasSet::new(agent_id.clone()),
            settles_individually: false,
        };
        if let Some(named) = out.get(&format!("name:{}", normalize_key(&p.agent_name))) {
            for alias in named.aliases.iter() {
                ident.aliases.add(alias.clone());
            }
            ident.settles_individually = named.settles_individually;
        }
        out.insert(key, ident);
    }
    out
}

fn player_aliases(p: &WeeklyPlayerMetric) -> AliasSet {
    let mut set = AliasSet::new(p.player_id.clone()).with_uuid(p.id);
    if let Some(src) = &p.source_id {
        set.add(src.clone());
    }
    set
}

fn carry_for(carries: &HashMap<EntityId, Decimal>, aliases: &AliasSet) -> Decimal {
    round2(aliases.iter().filter_map(|a| carries.get(a)).copied().sum())
}

fn player_sort_key(p: &WeeklyPlayerMetric) -> (String, String, String) {
    (
        normalize_key(&p.agent_name),
        normalize_key(&p.name),
        p.player_id.to_string(),
    )
}

/// Builds settlement breakdowns.
pub struct SettlementAggregator;

impl SettlementAggregator {
    /// Compute the full breakdown for one settlement.
    ///
    /// Subclubs are computed in full and only then filtered, so a caller that
    /// sees a subset gets the same per-subclub figures as one that sees
    /// everything. The roll-up covers only the visible subclubs and is summed
    /// from raw player rows.
    pub fn build(inputs: &BreakdownInputs, options: &BreakdownOptions) -> SettlementBreakdown {
        let keys = SubclubKeys::new(&inputs.players, &inputs.agents);
        let rate_table = RateTable::from_rates(&inputs.fee_rates);
        let ledger = LedgerIndex::new(&inputs.ledger);
        let identities = agent_identities(&inputs.agents, &inputs.players);

        let mut carries: HashMap<EntityId, Decimal> = HashMap::new();
        for c in &inputs.carries {
            *carries.entry(c.entity.clone()).or_insert(Decimal::ZERO) += c.amount;
        }

        let mut groups: BTreeMap<String, Group> = BTreeMap::new();
        for p in &inputs.players {
            let (key, id) = keys.resolve(p.subclub_id.as_ref(), &p.subclub_name);
            let g = groups.entry(key).or_default();
            if g.name.is_empty() || (g.id.is_none() && id.is_some()) {
                g.name = p.subclub_name.trim().to_string();
            }
            g.id = g.id.take().or(id);
            g.players.push(p);
        }
        for a in &inputs.agents {
            let (key, id) = keys.resolve(a.subclub_id.as_ref(), &a.subclub_name);
            let g = groups.entry(key).or_default();
            if g.name.is_empty() {
                g.name = a.subclub_name.trim().to_string();
            }
            g.id = g.id.take().or(id);
            g.agents.push(a);
        }

        let mut ordered: Vec<(String, Group)> = groups.into_iter().collect();
        ordered.sort_by(|(ka, a), (kb, b)| {
            normalize_key(&a.name)
                .cmp(&normalize_key(&b.name))
                .then_with(|| ka.cmp(kb))
        });

        let mut player_claims = AliasClaims::new();
        let mut agent_claims = AliasClaims::new();
        let mut attributed_agents: HashSet<String> = HashSet::new();

        let mut subclubs = Vec::with_capacity(ordered.len());
        for (key, mut group) in ordered {
            group.players.sort_by_key(|p| player_sort_key(p));
            group
                .agents
                .sort_by_key(|a| (normalize_key(&a.agent_name), a.id));

            let mut players = Vec::with_capacity(group.players.len());
            for p in &group.players {
                let own = player_claims.claim(&player_aliases(p));
                let mut carry = carry_for(&carries, &own);
                let mut net = ledger.net_for(&own);
                let mut carries_agent_balance = false;

                if let Some(agent) = identities.get(&p.agent_key()) {
                    if options.attribute_agent_to_first_player
                        && !agent.settles_individually
                        && attributed_agents.insert(p.agent_key())
                    {
                        let claimed = player_claims.claim(&agent.aliases);
                        carry = round2(carry + carry_for(&carries, &claimed));
                        net = net.merge(ledger.net_for(&claimed));
                        carries_agent_balance = true;
                    }
                }

                let balance = money::current_balance(carry, p.weekly_result, net.net);
                players.push(PlayerLine {
                    metric: (*p).clone(),
                    carry,
                    ledger_net: net.net,
                    current_balance: balance,
                    situation: Situation::from_balance(balance),
                    carries_agent_balance,
                });
            }

            let agents = group
                .agents
                .iter()
                .map(|a| {
                    let aliases = identities
                        .get(&a.agent_key())
                        .map(|i| i.aliases.clone())
                        .unwrap_or_else(|| AliasSet::new(EntityId::new(a.id.to_string())));
                    let claimed = agent_claims.claim(&aliases);
                    let carry = carry_for(&carries, &claimed);
                    let net = ledger.net_for(&claimed).net;
                    let balance = money::current_balance(carry, a.weekly_result, net);
                    AgentLine {
                        metric: (*a).clone(),
                        carry,
                        ledger_net: net,
                        current_balance: balance,
                        situation: Situation::from_balance(balance),
                    }
                })
                .collect::<Vec<_>>();

            let rows = &group.players;
            let winnings: Decimal = rows.iter().map(|p| p.winnings).sum();
            let rake: Decimal = rows.iter().map(|p| p.rake).sum();
            let revenue: Decimal = rows.iter().map(|p| p.revenue).sum();
            let totals = SubclubTotals {
                player_count: rows.len(),
                agent_count: agents.len(),
                winnings: round2(winnings),
                rake: round2(rake),
                revenue: round2(revenue),
                rakeback: round2(rows.iter().map(|p| p.rakeback_value).sum()),
                weekly_result: round2(rows.iter().map(|p| p.weekly_result).sum()),
            };

            let fees = FeeEngine::compute(totals.rake, totals.revenue, &rate_table);
            let adjustments = inputs
                .adjustments
                .iter()
                .find(|adj| adj.matches(group.id.as_ref(), &group.name))
                .map(AdjustmentTotals::from_row)
                .unwrap_or_default();

            let subclub_result = round2(winnings + rake + revenue);
            let league_settlement = round2(subclub_result + fees.signed_total + adjustments.total);

            subclubs.push(SubclubBreakdown {
                key,
                subclub_id: group.id,
                name: group.name,
                totals,
                fees,
                adjustments,
                subclub_result,
                league_settlement,
                direction: SettlementDirection::from_amount(league_settlement),
                players,
                agents,
            });
        }

        if let Some(filter) = &options.filter {
            subclubs.retain(|s| filter.allows(s.subclub_id.as_ref(), &s.name));
        }

        let rollup = Self::rollup(inputs, &keys, &subclubs);
        log::debug!(
            "breakdown settlement={} subclubs={} players={}",
            inputs.settlement.id,
            subclubs.len(),
            rollup.player_count
        );

        SettlementBreakdown {
            header: BreakdownHeader {
                settlement_id: inputs.settlement.id,
                tenant: inputs.settlement.tenant.clone(),
                club: inputs.settlement.club.clone(),
                period: inputs.settlement.period,
                version: inputs.settlement.version,
                status: inputs.settlement.status,
                notes: inputs.settlement.notes.clone(),
            },
            fee_table: rate_table.entries().to_vec(),
            subclubs,
            rollup,
            metadata: BreakdownMetadata {
                rounding_policy: ROUNDING_POLICY.to_string(),
                formula_version: options.formula_version.clone(),
                generated_at: Utc::now(),
            },
        }
    }

    /// Tenant-level totals over the visible subclubs, summed from raw player
    /// rows and rounded once.
    fn rollup(
        inputs: &BreakdownInputs,
        keys: &SubclubKeys,
        subclubs: &[SubclubBreakdown],
    ) -> TenantRollup {
        let visible: HashSet<&str> = subclubs.iter().map(|s| s.key.as_str()).collect();
        let rows: Vec<&WeeklyPlayerMetric> = inputs
            .players
            .iter()
            .filter(|p| {
                let (key, _) = keys.resolve(p.subclub_id.as_ref(), &p.subclub_name);
                visible.contains(key.as_str())
            })
            .collect();

        let winnings: Decimal = rows.iter().map(|p| p.winnings).sum();
        let rake: Decimal = rows.iter().map(|p| p.rake).sum();
        let revenue: Decimal = rows.iter().map(|p| p.revenue).sum();

        let adjustment_total: Decimal = subclubs
            .iter()
            .filter_map(|s| {
                inputs
                    .adjustments
                    .iter()
                    .find(|adj| adj.matches(s.subclub_id.as_ref(), &s.name))
            })
            .map(|adj| adj.total())
            .sum();
        let fee_total: Decimal = subclubs.iter().map(|s| s.fees.total).sum();

        let subclub_result = round2(winnings + rake + revenue);
        let league_settlement = round2(subclub_result - fee_total + adjustment_total);

        TenantRollup {
            subclub_count: subclubs.len(),
            player_count: rows.len(),
            winnings: round2(winnings),
            rake: round2(rake),
            revenue: round2(revenue),
            rakeback: round2(rows.iter().map(|p| p.rakeback_value).sum()),
            weekly_result: round2(rows.iter().map(|p| p.weekly_result).sum()),
            subclub_result,
            fee_total: round2(fee_total),
            adjustment_total: round2(adjustment_total),
            league_settlement,
            direction: if subclubs.is_empty() {
                None
            } else {
                Some(SettlementDirection::from_amount(league_settlement))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::Direction;
    use crate::engine::fees::{FeeBase, APP_FEE, GGR_APP_FEE, GGR_LEAGUE_FEE, LEAGUE_FEE};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn settlement() -> Settlement {
        Settlement::draft(
            TenantId::new("t"),
            ClubId::new("c"),
            "2026-03-02".parse().unwrap(),
            1,
        )
    }

    fn fee(name: &str, base: FeeBase, rate: Decimal) -> FeeRate {
        FeeRate {
            tenant: TenantId::new("t"),
            name: name.into(),
            rate,
            base,
            active: true,
        }
    }

    fn player(s: &Settlement, id: &str, agent: &str, subclub: &str) -> WeeklyPlayerMetric {
        WeeklyPlayerMetric::new(s.id, EntityId::new(id), id, agent, subclub)
    }

    fn inputs(s: Settlement, players: Vec<WeeklyPlayerMetric>) -> BreakdownInputs {
        BreakdownInputs {
            settlement: s,
            players,
            agents: vec![],
            fee_rates: vec![],
            adjustments: vec![],
            carries: vec![],
            ledger: vec![],
        }
    }

    fn ledger_row(s: &Settlement, entity: &str, direction: Direction, amount: Decimal) -> LedgerEntry {
        LedgerEntry::new(
            s.tenant.clone(),
            s.club.clone(),
            EntityId::new(entity),
            s.period,
            direction,
            amount,
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
        )
    }

    fn carry(s: &Settlement, entity: &str, amount: Decimal) -> CarryForward {
        CarryForward {
            tenant: s.tenant.clone(),
            club: s.club.clone(),
            entity: EntityId::new(entity),
            period: s.period,
            amount,
            source_settlement: Uuid::nil(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_league_settlement_formula() {
        let s = settlement();
        let p = player(&s, "p1", "A", "Sub")
            .with_performance(dec!(-500.00), dec!(800.00), dec!(300.00))
            .with_rate(dec!(0));
        let mut inp = inputs(s.clone(), vec![p]);
        inp.fee_rates = vec![
            fee(APP_FEE, FeeBase::Rake, dec!(10)),
            fee(LEAGUE_FEE, FeeBase::Rake, dec!(5)),
            fee(GGR_LEAGUE_FEE, FeeBase::Revenue, dec!(20)),
            fee(GGR_APP_FEE, FeeBase::Revenue, dec!(10)),
        ];
        let mut adj = SubclubAdjustment::new(s.tenant.clone(), s.club.clone(), s.period, "sub");
        adj.overlay = dec!(-50);
        adj.other = dec!(15.50);
        inp.adjustments = vec![adj];

        let b = SettlementAggregator::build(&inp, &BreakdownOptions::default());
        let sub = &b.subclubs[0];
        // -500 + 800 + 300
        assert_eq!(sub.subclub_result, dec!(600.00));
        assert_eq!(sub.fees.total, dec!(210.00));
        assert_eq!(sub.adjustments.total, dec!(-34.50));
        assert_eq!(sub.league_settlement, dec!(355.50));
        assert_eq!(sub.direction, SettlementDirection::OperatorOwesSubclub);
        assert_eq!(b.rollup.league_settlement, dec!(355.50));
    }

    #[test]
    fn test_missing_adjustment_is_zero() {
        let s = settlement();
        let p = player(&s, "p1", "A", "Sub").with_performance(dec!(-10), dec!(0), dec!(0));
        let b = SettlementAggregator::build(&inputs(s, vec![p]), &BreakdownOptions::default());
        assert_eq!(b.subclubs[0].adjustments, AdjustmentTotals::default());
        assert_eq!(b.subclubs[0].direction, SettlementDirection::SubclubOwesOperator);
    }

    #[test]
    fn test_rows_with_and_without_subclub_id_merge() {
        let s = settlement();
        let a = player(&s, "p1", "A", "Sub One").with_subclub_id(EntityId::new("sc-1"));
        let b = player(&s, "p2", "A", "  sub one ");
        let out = SettlementAggregator::build(&inputs(s, vec![a, b]), &BreakdownOptions::default());
        assert_eq!(out.subclubs.len(), 1);
        assert_eq!(out.subclubs[0].key, "id:sc-1");
        assert_eq!(out.subclubs[0].totals.player_count, 2);
    }

    #[test]
    fn test_agent_balance_goes_to_first_player_only() {
        let s = settlement();
        let p1 = player(&s, "p1", "Agent", "Sub").with_agent_id(EntityId::new("ag"));
        let p2 = player(&s, "p2", "Agent", "Sub").with_agent_id(EntityId::new("ag"));
        let agent = WeeklyAgentMetric::from_players(&[p1.clone(), p2.clone()], dec!(0)).unwrap();
        let mut inp = inputs(s.clone(), vec![p2, p1]);
        inp.agents = vec![agent.clone()];
        inp.carries = vec![carry(&s, "ag", dec!(100))];
        inp.ledger = vec![
            ledger_row(&s, "ag", Direction::Inbound, dec!(40)),
            ledger_row(&s, &agent.id.to_string(), Direction::Inbound, dec!(10)),
        ];

        let b = SettlementAggregator::build(&inp, &BreakdownOptions::default());
        let lines = &b.subclubs[0].players;
        assert_eq!(lines[0].metric.player_id.as_str(), "p1");
        assert!(lines[0].carries_agent_balance);
        assert_eq!(lines[0].carry, dec!(100));
        assert_eq!(lines[0].ledger_net, dec!(50));
        assert_eq!(lines[0].current_balance, dec!(50));
        assert!(!lines[1].carries_agent_balance);
        assert_eq!(lines[1].carry, Decimal::ZERO);
        assert_eq!(lines[1].ledger_net, Decimal::ZERO);

        // agent line sees the same movements once
        assert_eq!(b.subclubs[0].agents[0].ledger_net, dec!(50));
        assert_eq!(b.subclubs[0].agents[0].carry, dec!(100));
    }

    #[test]
    fn test_agent_balance_without_agent_row() {
        let s = settlement();
        let p1 = player(&s, "p1", "Agent", "Sub").with_agent_id(EntityId::new("ag"));
        let p2 = player(&s, "p2", "Agent", "Sub").with_agent_id(EntityId::new("ag"));
        let mut inp = inputs(s.clone(), vec![p1, p2]);
        inp.carries = vec![carry(&s, "ag", dec!(100))];
        inp.ledger = vec![ledger_row(&s, "ag", Direction::Inbound, dec!(40))];

        let b = SettlementAggregator::build(&inp, &BreakdownOptions::default());
        let lines = &b.subclubs[0].players;
        assert!(lines[0].carries_agent_balance);
        assert_eq!(lines[0].carry, dec!(100));
        assert_eq!(lines[0].ledger_net, dec!(40));
        assert_eq!(lines[0].current_balance, dec!(60));
        assert!(!lines[1].carries_agent_balance);
    }

    #[test]
    fn test_agent_row_keyed_by_name_joins_player_agent_id() {
        let s = settlement();
        let p1 = player(&s, "p1", "Agent", "Sub").with_agent_id(EntityId::new("ag"));
        // the agent row lost its id on import
        let mut agent = WeeklyAgentMetric::from_players(&[p1.clone()], dec!(0)).unwrap();
        agent.agent_id = None;
        let mut inp = inputs(s.clone(), vec![p1]);
        inp.agents = vec![agent.clone()];
        inp.carries = vec![carry(&s, "ag", dec!(100))];
        inp.ledger = vec![ledger_row(&s, &agent.id.to_string(), Direction::Outbound, dec!(25))];

        let b = SettlementAggregator::build(&inp, &BreakdownOptions::default());
        let line = &b.subclubs[0].players[0];
        assert!(line.carries_agent_balance);
        assert_eq!(line.carry, dec!(100));
        assert_eq!(line.ledger_net, dec!(-25));
        assert_eq!(line.current_balance, dec!(125));
    }

    #[test]
    fn test_individual_agent_does_not_transfer() {
        let s = settlement();
        let p1 = player(&s, "p1", "Agent", "Sub").with_agent_id(EntityId::new("ag"));
        let mut agent = WeeklyAgentMetric::from_players(&[p1.clone()], dec!(0)).unwrap();
        agent.settles_individually = true;
        let mut inp = inputs(s.clone(), vec![p1]);
        inp.agents = vec![agent];
        inp.carries = vec![carry(&s, "ag", dec!(100))];

        let b = SettlementAggregator::build(&inp, &BreakdownOptions::default());
        assert_eq!(b.subclubs[0].players[0].carry, Decimal::ZERO);
        assert!(!b.subclubs[0].players[0].carries_agent_balance);
    }

    #[test]
    fn test_player_situation() {
        let s = settlement();
        let winner = player(&s, "w", "A", "Sub").with_performance(dec!(100), dec!(0), dec!(0));
        let loser = player(&s, "l", "A", "Sub").with_performance(dec!(-100), dec!(0), dec!(0));
        let even = player(&s, "e", "A", "Sub").with_performance(dec!(60), dec!(0), dec!(0));
        let mut inp = inputs(s.clone(), vec![winner, loser, even]);
        inp.ledger = vec![ledger_row(&s, "e", Direction::Outbound, dec!(60))];
        // e: 0 + 60 - (-60) = 120
        let b = SettlementAggregator::build(&inp, &BreakdownOptions::default());
        let by_id = |id: &str| {
            b.subclubs[0]
                .players
                .iter()
                .find(|l| l.metric.player_id.as_str() == id)
                .unwrap()
                .clone()
        };
        assert_eq!(by_id("w").situation, Situation::Payable);
        assert_eq!(by_id("l").situation, Situation::Receivable);
        assert_eq!(by_id("e").current_balance, dec!(120));
    }

    #[test]
    fn test_filter_applies_after_computation() {
        let s = settlement();
        let a = player(&s, "p1", "A", "Alpha").with_performance(dec!(10.005), dec!(1), dec!(0));
        let b = player(&s, "p2", "B", "Beta").with_performance(dec!(20), dec!(2), dec!(0));
        let inp = inputs(s, vec![a, b]);

        let full = SettlementAggregator::build(&inp, &BreakdownOptions::default());
        let options = BreakdownOptions {
            filter: Some(SubclubFilter::new(["beta"])),
            ..Default::default()
        };
        let only_beta = SettlementAggregator::build(&inp, &options);

        assert_eq!(only_beta.subclubs.len(), 1);
        assert_eq!(&only_beta.subclubs[0], full.subclub("Beta").unwrap());
        assert_eq!(only_beta.rollup.player_count, 1);
        assert_eq!(only_beta.rollup.winnings, dec!(20));
        assert_eq!(full.rollup.subclub_count, 2);
    }

    #[test]
    fn test_rollup_from_raw_rows() {
        let s = settlement();
        // three subclubs whose per-subclub revenue rounds up; raw sum doesn't
        let rows: Vec<WeeklyPlayerMetric> = ["A", "B", "C"]
            .iter()
            .map(|sub| {
                let mut p = player(&s, &format!("p-{sub}"), "Ag", sub);
                p.revenue = dec!(0.005);
                p.rakeback_rate = Some(Decimal::ZERO);
                p
            })
            .collect();
        let b = SettlementAggregator::build(&inputs(s, rows), &BreakdownOptions::default());
        for sub in &b.subclubs {
            assert_eq!(sub.totals.revenue, dec!(0.01));
        }
        assert_eq!(b.rollup.revenue, dec!(0.02));
    }

    #[test]
    fn test_metadata_and_header() {
        let s = settlement().with_notes("first pass");
        let options = BreakdownOptions {
            formula_version: "test-7".into(),
            ..Default::default()
        };
        let b = SettlementAggregator::build(&inputs(s.clone(), vec![]), &options);
        assert_eq!(b.header.settlement_id, s.id);
        assert_eq!(b.header.notes, "first pass");
        assert_eq!(b.metadata.formula_version, "test-7");
        assert_eq!(b.metadata.rounding_policy, ROUNDING_POLICY);
        assert_eq!(b.fee_table.len(), 4);
        assert!(b.subclubs.is_empty());
        assert_eq!(b.rollup.direction, None);
    }
}
