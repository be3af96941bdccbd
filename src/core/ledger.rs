use crate::core::ids::{ClubId, EntityId, TenantId};
use crate::core::metrics::normalize_key;
use crate::core::period::Period;
use crate::error::{SettlementError, SettlementResult};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a cash movement, seen from the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Money received by the operator.
    Inbound,
    /// Money paid out by the operator.
    Outbound,
}

/// How a ledger row came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Manual,
    BankImport,
    Adjustment,
}

/// A recorded cash movement.
///
/// `entity` is polymorphic: depending on how the movement was recorded it may
/// name a player, an agent, or the id of an aggregate metric row. Resolving
/// it back to a logical entity is the job of
/// [`crate::engine::ledger_net`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub tenant: TenantId,
    pub club: ClubId,
    pub entity: EntityId,
    pub period: Period,
    pub direction: Direction,
    /// Always positive; the sign comes from `direction`.
    pub amount: Decimal,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub description: String,
    pub provenance: Provenance,
    /// Caller-supplied key that makes recording the same movement twice a no-op.
    #[serde(default)]
    pub reference: Option<String>,
    pub booked_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    /// Set once a bank line has been linked to this entry.
    #[serde(default)]
    pub reconciled: bool,
}

impl LedgerEntry {
    pub fn new(
        tenant: TenantId,
        club: ClubId,
        entity: EntityId,
        period: Period,
        direction: Direction,
        amount: Decimal,
        booked_on: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant,
            club,
            entity,
            period,
            direction,
            amount,
            method: String::new(),
            description: String::new(),
            provenance: Provenance::Manual,
            reference: None,
            booked_on,
            created_at: Utc::now(),
            reconciled: false,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Amount with its sign applied: inbound positive, outbound negative.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Inbound => self.amount,
            Direction::Outbound => -self.amount,
        }
    }

    pub fn validate(&self) -> SettlementResult<()> {
        if self.amount <= Decimal::ZERO {
            return Err(SettlementError::validation(format!(
                "ledger amount must be positive, got {}",
                self.amount
            )));
        }
        if self.entity.is_blank() {
            return Err(SettlementError::validation("ledger entry has no entity"));
        }
        Ok(())
    }
}

/// The balance an entity carries into `period`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryForward {
    pub tenant: TenantId,
    pub club: ClubId,
    pub entity: EntityId,
    /// Period the balance is carried into.
    pub period: Period,
    pub amount: Decimal,
    /// Settlement whose close produced this row.
    pub source_settlement: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Manual journal lines for one subclub in one period.
///
/// Positive values are revenue to the subclub, negative values are expenses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubclubAdjustment {
    pub tenant: TenantId,
    pub club: ClubId,
    pub period: Period,
    #[serde(default)]
    pub subclub_id: Option<EntityId>,
    pub subclub_name: String,
    #[serde(default)]
    pub overlay: Decimal,
    #[serde(default)]
    pub purchases: Decimal,
    #[serde(default)]
    pub security: Decimal,
    #[serde(default)]
    pub other: Decimal,
    #[serde(default)]
    pub notes: String,
}

impl SubclubAdjustment {
    pub fn new(tenant: TenantId, club: ClubId, period: Period, subclub_name: impl Into<String>) -> Self {
        Self {
            tenant,
            club,
            period,
            subclub_id: None,
            subclub_name: subclub_name.into(),
            overlay: Decimal::ZERO,
            purchases: Decimal::ZERO,
            security: Decimal::ZERO,
            other: Decimal::ZERO,
            notes: String::new(),
        }
    }

    pub fn total(&self) -> Decimal {
        self.overlay + self.purchases + self.security + self.other
    }

    /// True if this row belongs to the subclub identified by `id` / `name`.
    pub fn matches(&self, id: Option<&EntityId>, name: &str) -> bool {
        match (&self.subclub_id, id) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => normalize_key(&self.subclub_name) == normalize_key(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(direction: Direction, amount: Decimal) -> LedgerEntry {
        LedgerEntry::new(
            TenantId::new("t"),
            ClubId::new("c"),
            EntityId::new("p1"),
            "2026-03-02".parse().unwrap(),
            direction,
            amount,
            NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
        )
    }

    #[test]
    fn test_signed_amount() {
        assert_eq!(entry(Direction::Inbound, dec!(50)).signed_amount(), dec!(50));
        assert_eq!(entry(Direction::Outbound, dec!(50)).signed_amount(), dec!(-50));
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        assert!(entry(Direction::Inbound, Decimal::ZERO).validate().is_err());
        assert!(entry(Direction::Inbound, dec!(-1)).validate().is_err());
        assert!(entry(Direction::Inbound, dec!(0.01)).validate().is_ok());
    }

    #[test]
    fn test_adjustment_total_and_match() {
        let mut adj = SubclubAdjustment::new(
            TenantId::new("t"),
            ClubId::new("c"),
            "2026-03-02".parse().unwrap(),
            "Sub One",
        );
        adj.overlay = dec!(-100);
        adj.purchases = dec!(250.50);
        adj.other = dec!(10);
        assert_eq!(adj.total(), dec!(160.50));
        assert!(adj.matches(None, "  sub   one"));
        assert!(!adj.matches(None, "Sub Two"));
    }

    #[test]
    fn test_adjustment_match_by_id_wins() {
        let mut adj = SubclubAdjustment::new(
            TenantId::new("t"),
            ClubId::new("c"),
            "2026-03-02".parse().unwrap(),
            "Renamed",
        );
        adj.subclub_id = Some(EntityId::new("sc-1"));
        assert!(adj.matches(Some(&EntityId::new("sc-1")), "Sub One"));
        assert!(!adj.matches(Some(&EntityId::new("sc-2")), "Renamed"));
    }
}
