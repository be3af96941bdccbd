use crate::core::ids::{ClubId, TenantId};
use crate::core::period::Period;
use crate::error::{SettlementError, SettlementResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a settlement. Transitions only move forward:
/// `Draft → Final → Void`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementStatus {
    Draft,
    Final,
    Void,
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SettlementStatus::Draft => "DRAFT",
            SettlementStatus::Final => "FINAL",
            SettlementStatus::Void => "VOID",
        };
        f.write_str(s)
    }
}

/// One weekly settlement for a club.
///
/// Only one `Draft` may exist per (tenant, club, period); older `Final` and
/// `Void` versions are kept as history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub tenant: TenantId,
    pub club: ClubId,
    pub period: Period,
    pub version: u32,
    pub status: SettlementStatus,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finalized_by: Option<String>,
    #[serde(default)]
    pub voided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub voided_by: Option<String>,
    #[serde(default)]
    pub void_reason: Option<String>,
}

impl Settlement {
    pub fn draft(tenant: TenantId, club: ClubId, period: Period, version: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant,
            club,
            period,
            version,
            status: SettlementStatus::Draft,
            notes: String::new(),
            created_at: Utc::now(),
            finalized_at: None,
            finalized_by: None,
            voided_at: None,
            voided_by: None,
            void_reason: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn is_draft(&self) -> bool {
        self.status == SettlementStatus::Draft
    }

    fn invalid(&self, action: &'static str) -> SettlementError {
        SettlementError::InvalidState {
            kind: "settlement",
            id: self.id.to_string(),
            action,
            status: self.status.to_string(),
        }
    }

    /// Fail unless the settlement is still a draft. `action` names the
    /// attempted operation in the error message.
    pub fn ensure_draft(&self, action: &'static str) -> SettlementResult<()> {
        if self.is_draft() {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    pub fn finalize(&mut self, actor: impl Into<String>, at: DateTime<Utc>) -> SettlementResult<()> {
        if self.status != SettlementStatus::Draft {
            return Err(self.invalid("finalize"));
        }
        self.status = SettlementStatus::Final;
        self.finalized_at = Some(at);
        self.finalized_by = Some(actor.into());
        Ok(())
    }

    pub fn void(
        &mut self,
        actor: impl Into<String>,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> SettlementResult<()> {
        if self.status != SettlementStatus::Final {
            return Err(self.invalid("void"));
        }
        self.status = SettlementStatus::Void;
        self.voided_at = Some(at);
        self.voided_by = Some(actor.into());
        self.void_reason = Some(reason.into());
        Ok(())
    }
}
