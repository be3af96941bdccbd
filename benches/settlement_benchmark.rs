use criterion::{black_box, criterion_group, criterion_main, Criterion};
use league_settlement::core::ids::{ClubId, TenantId};
use league_settlement::core::period::Period;
use league_settlement::engine::aggregator::{BreakdownInputs, BreakdownOptions, SettlementAggregator};
use league_settlement::engine::carry::plan_close;
use league_settlement::engine::matcher::{KnownEntity, MatchContext, Matcher};
use league_settlement::simulation::generator::{generate_seeded, GeneratedWeek, WeekConfig};

fn week(config: &WeekConfig) -> GeneratedWeek {
    let period: Period = "2026-03-02".parse().unwrap();
    generate_seeded(42, config, &TenantId::new("bench"), &ClubId::new("club"), period)
}

fn inputs(week: &GeneratedWeek) -> BreakdownInputs {
    BreakdownInputs {
        settlement: week.settlement.clone(),
        players: week.players.clone(),
        agents: week.agents.clone(),
        fee_rates: week.fee_rates.clone(),
        adjustments: week.adjustments.clone(),
        carries: Vec::new(),
        ledger: week.ledger.clone(),
    }
}

fn bench_breakdown_100_players(c: &mut Criterion) {
    let config = WeekConfig {
        subclubs: 2,
        agents_per_subclub: 5,
        players_per_agent: 10,
        ..Default::default()
    };
    let inputs = inputs(&week(&config));
    let options = BreakdownOptions::default();

    c.bench_function("breakdown_100_players", |b| {
        b.iter(|| SettlementAggregator::build(black_box(&inputs), &options))
    });
}

fn bench_breakdown_5000_players(c: &mut Criterion) {
    let config = WeekConfig {
        subclubs: 10,
        agents_per_subclub: 20,
        players_per_agent: 25,
        ..Default::default()
    };
    let inputs = inputs(&week(&config));
    let options = BreakdownOptions::default();

    c.bench_function("breakdown_5000_players", |b| {
        b.iter(|| SettlementAggregator::build(black_box(&inputs), &options))
    });
}

fn bench_close_5000_players(c: &mut Criterion) {
    let config = WeekConfig {
        subclubs: 10,
        agents_per_subclub: 20,
        players_per_agent: 25,
        ..Default::default()
    };
    let week = week(&config);
    let now = chrono::Utc::now();

    c.bench_function("close_5000_players", |b| {
        b.iter(|| plan_close(&week.settlement, black_box(&week.agents), &[], &week.ledger, now))
    });
}

fn bench_matching_1000_players(c: &mut Criterion) {
    let config = WeekConfig {
        subclubs: 5,
        agents_per_subclub: 10,
        players_per_agent: 20,
        ..Default::default()
    };
    let week = week(&config);
    let known = week
        .players
        .iter()
        .map(|p| KnownEntity::player(p.player_id.clone(), p.name.clone()))
        .chain(
            week.agents
                .iter()
                .filter_map(|a| Some(KnownEntity::agent(a.agent_id.clone()?, a.agent_name.clone()))),
        )
        .collect();
    let ctx = MatchContext::new(known, week.ledger.clone());
    let matcher = Matcher::new();

    c.bench_function("matching_1000_players", |b| {
        b.iter(|| matcher.suggest_all(black_box(&week.bank), &ctx))
    });
}

criterion_group!(
    benches,
    bench_breakdown_100_players,
    bench_breakdown_5000_players,
    bench_close_5000_players,
    bench_matching_1000_players
);
criterion_main!(benches);
