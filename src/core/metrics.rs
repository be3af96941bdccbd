use crate::core::ids::EntityId;
use crate::core::money::{percent_of, round2};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Case- and spacing-insensitive form of a display name, used wherever rows
/// recorded by different imports have to be matched by name.
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// One player's performance in one settlement.
///
/// `rakeback_value` and `weekly_result` are derived; call [`derive`](Self::derive)
/// (the builder methods do this for you) after touching any input field.
///
/// # Examples
///
/// ```
/// use league_settlement::core::metrics::WeeklyPlayerMetric;
/// use league_settlement::core::ids::EntityId;
/// use rust_decimal_macros::dec;
/// use uuid::Uuid;
///
/// let row = WeeklyPlayerMetric::new(Uuid::new_v4(), EntityId::new("p-1"), "Joao", "Agent A", "Sub 1")
///     .with_performance(dec!(100.00), dec!(200.00), dec!(0))
///     .with_rate(dec!(10));
///
/// assert_eq!(row.rakeback_value, dec!(20.00));
/// assert_eq!(row.weekly_result, dec!(120.00));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPlayerMetric {
    pub id: Uuid,
    pub settlement_id: Uuid,
    /// Stable player identity.
    pub player_id: EntityId,
    /// Identifier the source platform uses for this player.
    #[serde(default)]
    pub source_id: Option<EntityId>,
    pub name: String,
    pub agent_name: String,
    #[serde(default)]
    pub agent_id: Option<EntityId>,
    pub subclub_name: String,
    #[serde(default)]
    pub subclub_id: Option<EntityId>,
    /// Signed: negative when the player lost.
    pub winnings: Decimal,
    pub rake: Decimal,
    /// Game-type revenue contribution. Signed.
    pub revenue: Decimal,
    /// Percentage in 0–100. `None` when the import carried no rate.
    #[serde(default)]
    pub rakeback_rate: Option<Decimal>,
    #[serde(default)]
    pub rakeback_value: Decimal,
    #[serde(default)]
    pub weekly_result: Decimal,
}

impl WeeklyPlayerMetric {
    pub fn new(
        settlement_id: Uuid,
        player_id: EntityId,
        name: impl Into<String>,
        agent_name: impl Into<String>,
        subclub_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            settlement_id,
            player_id,
            source_id: None,
            name: name.into(),
            agent_name: agent_name.into(),
            agent_id: None,
            subclub_name: subclub_name.into(),
            subclub_id: None,
            winnings: Decimal::ZERO,
            rake: Decimal::ZERO,
            revenue: Decimal::ZERO,
            rakeback_rate: None,
            rakeback_value: Decimal::ZERO,
            weekly_result: Decimal::ZERO,
        }
    }

    pub fn with_performance(mut self, winnings: Decimal, rake: Decimal, revenue: Decimal) -> Self {
        self.winnings = winnings;
        self.rake = rake;
        self.revenue = revenue;
        self.derive();
        self
    }

    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.rakeback_rate = Some(rate);
        self.derive();
        self
    }

    pub fn with_agent_id(mut self, agent_id: EntityId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn with_subclub_id(mut self, subclub_id: EntityId) -> Self {
        self.subclub_id = Some(subclub_id);
        self
    }

    pub fn with_source_id(mut self, source_id: EntityId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    pub fn effective_rate(&self) -> Decimal {
        self.rakeback_rate.unwrap_or(Decimal::ZERO)
    }

    /// Round the imported amounts and recompute the derived ones.
    pub fn derive(&mut self) {
        self.winnings = round2(self.winnings);
        self.rake = round2(self.rake);
        self.revenue = round2(self.revenue);
        self.rakeback_value = percent_of(self.rake, self.effective_rate());
        self.weekly_result = round2(self.winnings + self.rakeback_value);
    }

    /// Key that groups this row with its agent: the stable id when present,
    /// otherwise the normalized agent name.
    pub fn agent_key(&self) -> String {
        match &self.agent_id {
            Some(id) => format!("id:{id}"),
            None => format!("name:{}", normalize_key(&self.agent_name)),
        }
    }
}

/// One agent's aggregate performance inside one subclub for one settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAgentMetric {
    pub id: Uuid,
    pub settlement_id: Uuid,
    #[serde(default)]
    pub agent_id: Option<EntityId>,
    pub agent_name: String,
    #[serde(default)]
    pub subclub_id: Option<EntityId>,
    pub subclub_name: String,
    #[serde(default)]
    pub player_count: usize,
    pub rake_total: Decimal,
    pub winnings_total: Decimal,
    pub revenue_total: Decimal,
    pub rakeback_rate: Decimal,
    #[serde(default)]
    pub commission: Decimal,
    #[serde(default)]
    pub weekly_result: Decimal,
    /// Paid at a later date rather than at the close of this period.
    #[serde(default)]
    pub deferred_payment: bool,
    /// Each of the agent's players settles on their own account.
    #[serde(default)]
    pub settles_individually: bool,
}

impl WeeklyAgentMetric {
    /// Build an agent row by aggregating its player rows.
    ///
    /// Identity (agent and subclub) is taken from the first row. Returns
    /// `None` for an empty slice.
    pub fn from_players(players: &[WeeklyPlayerMetric], rate: Decimal) -> Option<Self> {
        let first = players.first()?;
        let mut agent = Self {
            id: Uuid::new_v4(),
            settlement_id: first.settlement_id,
            agent_id: first.agent_id.clone(),
            agent_name: first.agent_name.clone(),
            subclub_id: first.subclub_id.clone(),
            subclub_name: first.subclub_name.clone(),
            player_count: players.len(),
            rake_total: players.iter().map(|p| p.rake).sum(),
            winnings_total: players.iter().map(|p| p.winnings).sum(),
            revenue_total: players.iter().map(|p| p.revenue).sum(),
            rakeback_rate: rate,
            commission: Decimal::ZERO,
            weekly_result: Decimal::ZERO,
            deferred_payment: false,
            settles_individually: false,
        };
        agent.derive();
        Some(agent)
    }

    pub fn derive(&mut self) {
        self.rake_total = round2(self.rake_total);
        self.winnings_total = round2(self.winnings_total);
        self.revenue_total = round2(self.revenue_total);
        self.commission = percent_of(self.rake_total, self.rakeback_rate);
        self.weekly_result = round2(self.winnings_total + self.commission);
    }

    pub fn agent_key(&self) -> String {
        match &self.agent_id {
            Some(id) => format!("id:{id}"),
            None => format!("name:{}", normalize_key(&self.agent_name)),
        }
    }
}
