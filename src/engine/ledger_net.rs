//! Net recorded cash movement per logical entity.
//!
//! Ledger rows name their owner by whatever identifier was at hand when the
//! movement was recorded: a player's stable id, the source platform id, an
//! agent id, or the id of an aggregate metric row. An [`AliasSet`] gathers
//! every identifier that refers to one logical entity, and [`net_for`]
//! sums the rows reachable through any of them exactly once.

use crate::core::ids::EntityId;
use crate::core::ledger::{Direction, LedgerEntry};
use crate::core::money::round2;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// Every identifier under which one logical entity may appear in the ledger.
///
/// A new set always contains its primary id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasSet {
    primary: EntityId,
    aliases: BTreeSet<EntityId>,
}

impl AliasSet {
    pub fn new(primary: EntityId) -> Self {
        let mut aliases = BTreeSet::new();
        aliases.insert(primary.clone());
        Self { primary, aliases }
    }

    /// Add an alias. Blank identifiers are ignored.
    pub fn add(&mut self, alias: EntityId) {
        if !alias.is_blank() {
            self.aliases.insert(alias);
        }
    }

    pub fn with(mut self, alias: EntityId) -> Self {
        self.add(alias);
        self
    }

    pub fn with_uuid(self, id: Uuid) -> Self {
        self.with(EntityId::new(id.to_string()))
    }

    pub fn primary(&self) -> &EntityId {
        &self.primary
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.aliases.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.aliases.iter()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// A copy restricted to the aliases accepted by `keep`. The primary id
    /// is kept as the label even if it was filtered out.
    fn restricted(&self, mut keep: impl FnMut(&EntityId) -> bool) -> AliasSet {
        AliasSet {
            primary: self.primary.clone(),
            aliases: self.aliases.iter().filter(|a| keep(*a)).cloned().collect(),
        }
    }
}

/// Net movement for one entity in one period.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerNet {
    pub inbound: Decimal,
    pub outbound: Decimal,
    /// `inbound − outbound`.
    pub net: Decimal,
    /// Contributing rows, newest first.
    pub entries: Vec<LedgerEntry>,
}

impl LedgerNet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combine two results for the same entity. Rows already present are
    /// not counted again.
    pub fn merge(mut self, other: LedgerNet) -> LedgerNet {
        let seen: HashSet<Uuid> = self.entries.iter().map(|e| e.id).collect();
        self.entries
            .extend(other.entries.into_iter().filter(|e| !seen.contains(&e.id)));
        summarize(self.entries)
    }
}

fn summarize(mut entries: Vec<LedgerEntry>) -> LedgerNet {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut inbound = Decimal::ZERO;
    let mut outbound = Decimal::ZERO;
    for e in &entries {
        match e.direction {
            Direction::Inbound => inbound += e.amount,
            Direction::Outbound => outbound += e.amount,
        }
    }
    let inbound = round2(inbound);
    let outbound = round2(outbound);

    LedgerNet {
        inbound,
        outbound,
        net: round2(inbound - outbound),
        entries,
    }
}

/// Net movement of the entity described by `aliases` across `entries`.
///
/// A row is counted once even if `entries` contains it more than once.
///
/// # Examples
///
/// ```
/// use league_settlement::core::ids::{ClubId, EntityId, TenantId};
/// use league_settlement::core::ledger::{Direction, LedgerEntry};
/// use league_settlement::core::period::Period;
/// use league_settlement::engine::ledger_net::{net_for, AliasSet};
/// use chrono::NaiveDate;
/// use rust_decimal::Decimal;
/// use rust_decimal_macros::dec;
///
/// let period: Period = "2026-03-02".parse().unwrap();
/// let day = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
/// let row = |who: &str, dir: Direction, amt: Decimal| LedgerEntry::new(
///     TenantId::new("t"), ClubId::new("c"), EntityId::new(who), period, dir, amt, day,
/// );
///
/// let entries = vec![
///     row("agent-1", Direction::Inbound, dec!(300)),
///     row("row-77", Direction::Outbound, dec!(120)),
///     row("someone-else", Direction::Inbound, dec!(999)),
/// ];
/// let agent = AliasSet::new(EntityId::new("agent-1")).with(EntityId::new("row-77"));
///
/// let net = net_for(&entries, &agent);
/// assert_eq!(net.net, dec!(180));
/// assert_eq!(net.entries.len(), 2);
/// ```
pub fn net_for(entries: &[LedgerEntry], aliases: &AliasSet) -> LedgerNet {
    let mut seen = HashSet::new();
    let matched: Vec<LedgerEntry> = entries
        .iter()
        .filter(|e| aliases.contains(&e.entity) && seen.insert(e.id))
        .cloned()
        .collect();
    summarize(matched)
}

/// Ledger rows indexed by owning identifier, for many lookups over the same
/// period.
#[derive(Debug, Clone, Default)]
pub struct LedgerIndex {
    by_entity: HashMap<EntityId, Vec<LedgerEntry>>,
}

impl LedgerIndex {
    pub fn new(entries: &[LedgerEntry]) -> Self {
        let mut seen = HashSet::new();
        let mut by_entity: HashMap<EntityId, Vec<LedgerEntry>> = HashMap::new();
        for e in entries {
            if seen.insert(e.id) {
                by_entity.entry(e.entity.clone()).or_default().push(e.clone());
            }
        }
        Self { by_entity }
    }

    pub fn net_for(&self, aliases: &AliasSet) -> LedgerNet {
        let rows: Vec<LedgerEntry> = aliases
            .iter()
            .filter_map(|a| self.by_entity.get(a))
            .flatten()
            .cloned()
            .collect();
        summarize(rows)
    }

    pub fn len(&self) -> usize {
        self.by_entity.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}

/// Tracks which aliases have already been attributed to an entity within one
/// breakdown. The first entity to claim an alias keeps it.
#[derive(Debug, Clone, Default)]
pub struct AliasClaims {
    claimed: HashSet<EntityId>,
}

impl AliasClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the part of `aliases` nobody has claimed yet, and claim it.
    pub fn claim(&mut self, aliases: &AliasSet) -> AliasSet {
        let claimed = &mut self.claimed;
        aliases.restricted(|a| claimed.insert(a.clone()))
    }

    pub fn is_claimed(&self, alias: &EntityId) -> bool {
        self.claimed.contains(alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{ClubId, TenantId};
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn row(entity: &str, direction: Direction, amount: Decimal) -> LedgerEntry {
        LedgerEntry::new(
            TenantId::new("t"),
            ClubId::new("c"),
            EntityId::new(entity),
            "2026-03-02".parse().unwrap(),
            direction,
            amount,
            NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
        )
    }

    #[test]
    fn test_empty_input_is_zero() {
        let net = net_for(&[], &AliasSet::new(EntityId::new("x")));
        assert_eq!(net, LedgerNet::default());
        assert_eq!(net.net, Decimal::ZERO);
    }

    #[test]
    fn test_inbound_minus_outbound() {
        let entries = vec![
            row("p1", Direction::Inbound, dec!(100.10)),
            row("p1", Direction::Outbound, dec!(40.05)),
            row("p1", Direction::Inbound, dec!(0.01)),
        ];
        let net = net_for(&entries, &AliasSet::new(EntityId::new("p1")));
        assert_eq!(net.inbound, dec!(100.11));
        assert_eq!(net.outbound, dec!(40.05));
        assert_eq!(net.net, dec!(60.06));
    }

    #[test]
    fn test_duplicate_rows_counted_once() {
        let e = row("p1", Direction::Inbound, dec!(50));
        let entries = vec![e.clone(), e];
        let aliases = AliasSet::new(EntityId::new("p1")).with(EntityId::new("p1-src"));
        assert_eq!(net_for(&entries, &aliases).net, dec!(50));
        assert_eq!(LedgerIndex::new(&entries).net_for(&aliases).net, dec!(50));
    }

    #[test]
    fn test_newest_first() {
        let now = Utc::now();
        let older = row("p1", Direction::Inbound, dec!(1)).with_created_at(now - Duration::hours(2));
        let newer = row("p1", Direction::Inbound, dec!(2)).with_created_at(now);
        let net = net_for(&[older.clone(), newer.clone()], &AliasSet::new(EntityId::new("p1")));
        assert_eq!(net.entries[0].id, newer.id);
        assert_eq!(net.entries[1].id, older.id);
    }

    #[test]
    fn test_index_matches_scan() {
        let entries = vec![
            row("a", Direction::Inbound, dec!(10)),
            row("b", Direction::Outbound, dec!(3)),
            row("c", Direction::Inbound, dec!(7)),
        ];
        let aliases = AliasSet::new(EntityId::new("a")).with(EntityId::new("b"));
        let index = LedgerIndex::new(&entries);
        assert_eq!(index.net_for(&aliases).net, net_for(&entries, &aliases).net);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_claims_first_wins() {
        let mut claims = AliasClaims::new();
        let agent = AliasSet::new(EntityId::new("agent")).with(EntityId::new("row-1"));
        let first = claims.claim(&agent);
        let second = claims.claim(&agent);
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(second.primary(), &EntityId::new("agent"));
        assert!(claims.is_claimed(&EntityId::new("row-1")));
    }

    #[test]
    fn test_blank_alias_ignored() {
        let set = AliasSet::new(EntityId::new("p")).with(EntityId::new("  "));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_merge_does_not_double_count() {
        let shared = row("p1", Direction::Inbound, dec!(20));
        let other = row("p2", Direction::Outbound, dec!(5));
        let a = net_for(&[shared.clone()], &AliasSet::new(EntityId::new("p1")));
        let b = net_for(
            &[shared, other],
            &AliasSet::new(EntityId::new("p1")).with(EntityId::new("p2")),
        );
        let merged = a.merge(b);
        assert_eq!(merged.net, dec!(15));
        assert_eq!(merged.entries.len(), 2);
    }
}
