use crate::core::ids::TenantId;
use crate::core::money::{percent_of, round2};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const APP_FEE: &str = "app_fee";
pub const LEAGUE_FEE: &str = "league_fee";
pub const GGR_LEAGUE_FEE: &str = "ggr_league_fee";
pub const GGR_APP_FEE: &str = "ggr_app_fee";

/// The four fees every breakdown reports, in display order.
pub const WELL_KNOWN_FEES: [(&str, FeeBase); 4] = [
    (APP_FEE, FeeBase::Rake),
    (LEAGUE_FEE, FeeBase::Rake),
    (GGR_LEAGUE_FEE, FeeBase::Revenue),
    (GGR_APP_FEE, FeeBase::Revenue),
];

/// Aggregate a fee percentage is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeBase {
    Rake,
    Revenue,
}

/// A tenant-wide fee percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRate {
    pub tenant: TenantId,
    pub name: String,
    /// Percentage, e.g. `10` for 10%.
    pub rate: Decimal,
    pub base: FeeBase,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Effective fee rates for one computation.
///
/// Always contains the four well-known fees; names missing from the source
/// rows stay at rate 0. Inactive rows are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    entries: Vec<RateEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub name: String,
    pub base: FeeBase,
    pub rate: Decimal,
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            entries: WELL_KNOWN_FEES
                .iter()
                .map(|(name, base)| RateEntry {
                    name: (*name).to_string(),
                    base: *base,
                    rate: Decimal::ZERO,
                })
                .collect(),
        }
    }
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rates(rates: &[FeeRate]) -> Self {
        let mut table = Self::default();
        let mut extras: Vec<&FeeRate> = rates
            .iter()
            .filter(|r| r.active && table.position(&r.name).is_none())
            .collect();
        extras.sort_by(|a, b| a.name.cmp(&b.name));

        for r in rates.iter().filter(|r| r.active) {
            if table.position(&r.name).is_some() {
                table.set(&r.name, r.base, r.rate);
            }
        }
        for r in extras {
            table.set(&r.name, r.base, r.rate);
        }
        table
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Insert or overwrite a named rate.
    pub fn set(&mut self, name: &str, base: FeeBase, rate: Decimal) {
        match self.position(name) {
            Some(i) => {
                self.entries[i].base = base;
                self.entries[i].rate = rate;
            }
            None => self.entries.push(RateEntry {
                name: name.to_string(),
                base,
                rate,
            }),
        }
    }

    pub fn with(mut self, name: &str, base: FeeBase, rate: Decimal) -> Self {
        self.set(name, base, rate);
        self
    }

    /// Rate for `name`; unknown names are 0.
    pub fn rate(&self, name: &str) -> Decimal {
        self.position(name)
            .map(|i| self.entries[i].rate)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn entries(&self) -> &[RateEntry] {
        &self.entries
    }
}

/// One computed fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeLine {
    pub name: String,
    pub base: FeeBase,
    pub rate: Decimal,
    /// Non-negative display amount.
    pub amount: Decimal,
}

/// Fees owed by one subclub for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub lines: Vec<FeeLine>,
    pub total: Decimal,
    /// `-total`: fees always reduce the subclub's settlement.
    pub signed_total: Decimal,
}

impl FeeBreakdown {
    pub fn amount(&self, name: &str) -> Decimal {
        self.lines
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.amount)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Stateless fee calculator.
pub struct FeeEngine;

impl FeeEngine {
    /// Compute every fee in `rates` against the aggregated totals.
    ///
    /// A non-positive base yields a zero fee, so a revenue deficit never turns
    /// into a credit.
    ///
    /// # Examples
    ///
    /// ```
    /// use league_settlement::engine::fees::*;
    /// use rust_decimal_macros::dec;
    ///
    /// let rates = RateTable::new()
    ///     .with(APP_FEE, FeeBase::Rake, dec!(10))
    ///     .with(LEAGUE_FEE, FeeBase::Rake, dec!(5))
    ///     .with(GGR_LEAGUE_FEE, FeeBase::Revenue, dec!(20))
    ///     .with(GGR_APP_FEE, FeeBase::Revenue, dec!(10));
    ///
    /// let fees = FeeEngine::compute(dec!(800.00), dec!(300.00), &rates);
    /// assert_eq!(fees.total, dec!(210.00));
    /// assert_eq!(fees.signed_total, dec!(-210.00));
    /// ```
    pub fn compute(rake_total: Decimal, revenue_total: Decimal, rates: &RateTable) -> FeeBreakdown {
        let rake_base = rake_total.max(Decimal::ZERO);
        let revenue_base = revenue_total.max(Decimal::ZERO);

        let lines: Vec<FeeLine> = rates
            .entries()
            .iter()
            .map(|entry| {
                let base_amount = match entry.base {
                    FeeBase::Rake => rake_base,
                    FeeBase::Revenue => revenue_base,
                };
                FeeLine {
                    name: entry.name.clone(),
                    base: entry.base,
                    rate: entry.rate,
                    amount: percent_of(base_amount, entry.rate).max(Decimal::ZERO),
                }
            })
            .collect();

        let total = round2(lines.iter().map(|l| l.amount).sum());
        FeeBreakdown {
            lines,
            total,
            signed_total: Decimal::ZERO - total,
        }
    }
}
