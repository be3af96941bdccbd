use crate::core::ids::{ClubId, EntityId, TenantId};
use crate::core::ledger::Direction;
use crate::core::period::Period;
use crate::error::{SettlementError, SettlementResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankTxStatus {
    Pending,
    Linked,
    Applied,
    Ignored,
}

impl fmt::Display for BankTxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BankTxStatus::Pending => "pending",
            BankTxStatus::Linked => "linked",
            BankTxStatus::Applied => "applied",
            BankTxStatus::Ignored => "ignored",
        };
        f.write_str(s)
    }
}

/// An imported bank-statement line awaiting classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: Uuid,
    pub tenant: TenantId,
    pub club: ClubId,
    pub period: Period,
    /// Which feed or statement format the line came from.
    pub source: String,
    /// Unique per source; re-importing the same line is a no-op.
    pub external_id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub direction: Direction,
    #[serde(default)]
    pub memo: String,
    pub status: BankTxStatus,
    #[serde(default)]
    pub linked_entity: Option<EntityId>,
    #[serde(default)]
    pub ledger_entry: Option<Uuid>,
}

impl BankTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        tenant: TenantId,
        club: ClubId,
        period: Period,
        source: impl Into<String>,
        external_id: impl Into<String>,
        date: NaiveDate,
        amount: Decimal,
        direction: Direction,
        memo: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant,
            club,
            period,
            source: source.into(),
            external_id: external_id.into(),
            date,
            amount,
            direction,
            memo: memo.into(),
            status: BankTxStatus::Pending,
            linked_entity: None,
            ledger_entry: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == BankTxStatus::Pending
    }

    fn invalid(&self, action: &'static str) -> SettlementError {
        SettlementError::InvalidState {
            kind: "bank transaction",
            id: self.id.to_string(),
            action,
            status: self.status.to_string(),
        }
    }

    /// Attach the line to an entity (and optionally an existing ledger entry)
    /// after a human confirmed the suggestion.
    pub fn link(&mut self, entity: EntityId, ledger_entry: Option<Uuid>) -> SettlementResult<()> {
        if !self.is_pending() {
            return Err(self.invalid("link"));
        }
        self.status = BankTxStatus::Linked;
        self.linked_entity = Some(entity);
        self.ledger_entry = ledger_entry;
        Ok(())
    }

    pub fn ignore(&mut self) -> SettlementResult<()> {
        if !self.is_pending() {
            return Err(self.invalid("ignore"));
        }
        self.status = BankTxStatus::Ignored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tx() -> BankTransaction {
        BankTransaction::pending(
            TenantId::new("t"),
            ClubId::new("c"),
            "2026-03-02".parse().unwrap(),
            "ofx",
            "line-1",
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            dec!(150.00),
            Direction::Inbound,
            "PIX JOAO SILVA",
        )
    }

    #[test]
    fn test_link_from_pending() {
        let mut t = tx();
        t.link(EntityId::new("p-1"), None).unwrap();
        assert_eq!(t.status, BankTxStatus::Linked);
        assert_eq!(t.linked_entity, Some(EntityId::new("p-1")));
    }

    #[test]
    fn test_link_twice_rejected() {
        let mut t = tx();
        t.link(EntityId::new("p-1"), None).unwrap();
        assert!(matches!(
            t.link(EntityId::new("p-2"), None),
            Err(SettlementError::InvalidState { action: "link", .. })
        ));
    }

    #[test]
    fn test_ignored_cannot_link() {
        let mut t = tx();
        t.ignore().unwrap();
        assert!(t.link(EntityId::new("p-1"), None).is_err());
    }
}
