use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is empty or only whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Operator account that owns clubs, fee tables and ledgers.
    ///
    /// Every store lookup is scoped by tenant; a settlement id that exists
    /// under another tenant is reported as not found.
    TenantId
);

string_id!(
    /// A club inside a tenant. Settlements are one per (tenant, club, period).
    ClubId
);

string_id!(
    /// Identifier of anything money can be attributed to: a player, an agent,
    /// a subclub, or an aggregate identity used when a movement was recorded.
    ///
    /// The same logical entity may appear under several of these; see
    /// [`crate::engine::ledger_net::AliasSet`].
    ///
    /// # Examples
    ///
    /// ```
    /// use league_settlement::core::ids::EntityId;
    ///
    /// let agent = EntityId::new("agent-7");
    /// assert_eq!(agent.as_str(), "agent-7");
    /// assert!(!agent.is_blank());
    /// ```
    EntityId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_equality() {
        let a = EntityId::new("agent-1");
        let b = EntityId::new("agent-1");
        let c = EntityId::new("agent-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_tenant_display() {
        let t = TenantId::new("acme");
        assert_eq!(format!("{}", t), "acme");
    }

    #[test]
    fn test_blank_detection() {
        assert!(ClubId::new("   ").is_blank());
        assert!(!ClubId::new("club-1").is_blank());
    }

    #[test]
    fn test_serde_transparent() {
        let id = EntityId::new("p-9");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"p-9\"");
    }
}
