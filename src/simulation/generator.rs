//! Synthetic weekly data for benchmarks, tests and the `generate` command.
//!
//! Amounts are drawn as whole cents, so every generated value already has
//! two decimal places.

use crate::core::bank::BankTransaction;
use crate::core::ids::{ClubId, EntityId, TenantId};
use crate::core::ledger::{Direction, LedgerEntry, SubclubAdjustment};
use crate::core::metrics::{WeeklyAgentMetric, WeeklyPlayerMetric};
use crate::core::period::Period;
use crate::core::settlement::Settlement;
use crate::engine::fees::{FeeRate, WELL_KNOWN_FEES};
use crate::store::StoreSnapshot;
use chrono::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const FIRST_NAMES: [&str; 12] = [
    "Joao", "Maria", "Pedro", "Ana", "Lucas", "Julia", "Rafael", "Camila", "Bruno", "Fernanda",
    "Diego", "Larissa",
];
const LAST_NAMES: [&str; 10] = [
    "Silva", "Souza", "Costa", "Santos", "Oliveira", "Pereira", "Lima", "Carvalho", "Almeida",
    "Ribeiro",
];

#[derive(Debug, Clone)]
pub struct WeekConfig {
    pub subclubs: usize,
    pub agents_per_subclub: usize,
    pub players_per_agent: usize,
    /// Largest absolute weekly winnings, in cents.
    pub max_winnings_cents: i64,
    /// Largest weekly rake, in cents.
    pub max_rake_cents: i64,
    /// Rates assigned to agents, picked uniformly.
    pub rate_choices: Vec<Decimal>,
    /// Share of players with a ledger movement this week, in 0.0–1.0.
    pub paid_share: f64,
}

impl Default for WeekConfig {
    fn default() -> Self {
        Self {
            subclubs: 3,
            agents_per_subclub: 4,
            players_per_agent: 8,
            max_winnings_cents: 500_000,
            max_rake_cents: 80_000,
            rate_choices: vec![dec!(0), dec!(10), dec!(20), dec!(30), dec!(50)],
            paid_share: 0.3,
        }
    }
}

/// Everything needed to exercise one settlement end to end.
#[derive(Debug, Clone)]
pub struct GeneratedWeek {
    pub settlement: Settlement,
    pub players: Vec<WeeklyPlayerMetric>,
    pub agents: Vec<WeeklyAgentMetric>,
    pub fee_rates: Vec<FeeRate>,
    pub adjustments: Vec<SubclubAdjustment>,
    pub ledger: Vec<LedgerEntry>,
    pub bank: Vec<BankTransaction>,
}

impl GeneratedWeek {
    pub fn into_snapshot(self) -> StoreSnapshot {
        StoreSnapshot {
            settlements: vec![self.settlement],
            players: self.players,
            agents: self.agents,
            fee_rates: self.fee_rates,
            adjustments: self.adjustments,
            ledger: self.ledger,
            bank: self.bank,
            ..Default::default()
        }
    }
}

fn cents(rng: &mut impl Rng, max: i64) -> Decimal {
    Decimal::new(rng.gen_range(0..=max.max(0)), 2)
}

/// Generate a week with the thread-local RNG.
pub fn generate_week(config: &WeekConfig, tenant: &TenantId, club: &ClubId, period: Period) -> GeneratedWeek {
    generate_week_with(&mut rand::thread_rng(), config, tenant, club, period)
}

/// Generate a week from a fixed seed; the same seed gives the same amounts.
pub fn generate_seeded(seed: u64, config: &WeekConfig, tenant: &TenantId, club: &ClubId, period: Period) -> GeneratedWeek {
    generate_week_with(&mut StdRng::seed_from_u64(seed), config, tenant, club, period)
}

pub fn generate_week_with(
    rng: &mut impl Rng,
    config: &WeekConfig,
    tenant: &TenantId,
    club: &ClubId,
    period: Period,
) -> GeneratedWeek {
    let settlement = Settlement::draft(tenant.clone(), club.clone(), period, 1);
    let mut players = Vec::new();
    let mut agents = Vec::new();
    let mut adjustments = Vec::new();

    for s in 0..config.subclubs {
        let subclub_name = format!("Subclub {:02}", s + 1);
        let subclub_id = EntityId::new(format!("sc-{:02}", s + 1));

        for a in 0..config.agents_per_subclub {
            let agent_id = EntityId::new(format!("ag-{:02}-{:02}", s + 1, a + 1));
            let agent_name = format!("Agent {} {}", LAST_NAMES[(s + a) % LAST_NAMES.len()], a + 1);
            let rate = if config.rate_choices.is_empty() {
                Decimal::ZERO
            } else {
                config.rate_choices[rng.gen_range(0..config.rate_choices.len())]
            };

            let rows: Vec<WeeklyPlayerMetric> = (0..config.players_per_agent)
                .map(|p| {
                    let n = players.len() + p;
                    let name = format!(
                        "{} {} {}",
                        FIRST_NAMES[n % FIRST_NAMES.len()],
                        LAST_NAMES[(n / FIRST_NAMES.len()) % LAST_NAMES.len()],
                        n
                    );
                    let winnings = cents(rng, config.max_winnings_cents * 2) - Decimal::new(config.max_winnings_cents, 2);
                    let rake = cents(rng, config.max_rake_cents);
                    let revenue = cents(rng, config.max_rake_cents / 2) - Decimal::new(config.max_rake_cents / 8, 2);
                    WeeklyPlayerMetric::new(
                        settlement.id,
                        EntityId::new(format!("pl-{n:05}")),
                        name,
                        agent_name.clone(),
                        subclub_name.clone(),
                    )
                    .with_agent_id(agent_id.clone())
                    .with_subclub_id(subclub_id.clone())
                    .with_source_id(EntityId::new(format!("src-{n:05}")))
                    .with_performance(winnings, rake, revenue)
                    .with_rate(rate)
                })
                .collect();

            if let Some(agent) = WeeklyAgentMetric::from_players(&rows, rate) {
                agents.push(agent);
            }
            players.extend(rows);
        }

        let mut adj = SubclubAdjustment::new(tenant.clone(), club.clone(), period, subclub_name);
        adj.subclub_id = Some(subclub_id);
        adj.overlay = -cents(rng, 20_000);
        adj.purchases = cents(rng, 10_000);
        adjustments.push(adj);
    }

    let fee_rates = WELL_KNOWN_FEES
        .iter()
        .zip([dec!(10), dec!(5), dec!(20), dec!(10)])
        .map(|((name, base), rate)| FeeRate {
            tenant: tenant.clone(),
            name: (*name).to_string(),
            rate,
            base: *base,
            active: true,
        })
        .collect();

    let mut ledger = Vec::new();
    let mut bank = Vec::new();
    for p in &players {
        if !rng.gen_bool(config.paid_share.clamp(0.0, 1.0)) {
            continue;
        }
        let direction = if p.weekly_result < Decimal::ZERO {
            Direction::Inbound
        } else {
            Direction::Outbound
        };
        let amount = p.weekly_result.abs().max(dec!(1.00));
        let day = period.start() + Duration::days(rng.gen_range(0..7));

        ledger.push(LedgerEntry::new(
            tenant.clone(),
            club.clone(),
            p.player_id.clone(),
            period,
            direction,
            amount,
            day,
        ));
        let memo = match rng.gen_range(0..3) {
            0 => format!("PIX {}", p.name.to_uppercase()),
            1 => format!("TED {:08}", rng.gen_range(0..100_000_000u32)),
            _ => format!("CREDITO {}", rng.gen_range(1000..9999)),
        };
        bank.push(BankTransaction::pending(
            tenant.clone(),
            club.clone(),
            period,
            "synthetic",
            format!("line-{}", bank.len() + 1),
            day,
            amount,
            direction,
            memo,
        ));
    }

    GeneratedWeek {
        settlement,
        players,
        agents,
        fee_rates,
        adjustments,
        ledger,
        bank,
    }
}
