//! One club's week, start to finish.
//!
//! Imports player rows for two subclubs, prints the breakdown, finalizes
//! the week and carries every agent's balance into the next one.

use chrono::NaiveDate;
use league_settlement::engine::fees::{APP_FEE, GGR_APP_FEE, GGR_LEAGUE_FEE, LEAGUE_FEE};
use league_settlement::prelude::*;
use rust_decimal_macros::dec;

fn main() -> Result<(), SettlementError> {
    println!("╔══════════════════════════════════════════════╗");
    println!("║  league-settlement: Weekly Settlement Example ║");
    println!("╚══════════════════════════════════════════════╝\n");

    let tenant = TenantId::new("demo-operator");
    let club = ClubId::new("club-7");
    let period: Period = "2026-03-02".parse()?;
    let svc = SettlementService::new(InMemoryStore::new(), EngineConfig::default())?;

    for (name, base, rate) in [
        (APP_FEE, FeeBase::Rake, dec!(10)),
        (LEAGUE_FEE, FeeBase::Rake, dec!(5)),
        (GGR_LEAGUE_FEE, FeeBase::Revenue, dec!(20)),
        (GGR_APP_FEE, FeeBase::Revenue, dec!(10)),
    ] {
        svc.set_fee_rate(FeeRate {
            tenant: tenant.clone(),
            name: name.to_string(),
            rate,
            base,
            active: true,
        })?;
    }

    // --- Import ---
    println!("━━━ Import ━━━\n");
    let draft = svc.open_draft(&tenant, &club, period, "week 10")?;

    let row = |id: &str, name: &str, agent: &str, subclub: &str| {
        WeeklyPlayerMetric::new(draft.id, EntityId::new(id), name, agent, subclub)
            .with_agent_id(EntityId::new(format!("ag-{}", agent.to_lowercase())))
            .with_subclub_id(EntityId::new(format!("sc-{}", subclub.to_lowercase())))
    };
    let north = vec![
        row("p1", "Joao Silva", "Ramos", "North")
            .with_performance(dec!(-500.00), dec!(800.00), dec!(300.00))
            .with_rate(dec!(10)),
        row("p2", "Maria Costa", "Ramos", "North")
            .with_performance(dec!(1250.00), dec!(420.00), dec!(-80.00))
            .with_rate(dec!(10)),
    ];
    let south = vec![row("p3", "Pedro Lima", "Alves", "South")
        .with_performance(dec!(100.00), dec!(200.00), dec!(50.00))
        .with_rate(dec!(25))];

    let agents = [(&north, dec!(10)), (&south, dec!(25))]
        .into_iter()
        .filter_map(|(rows, rate)| WeeklyAgentMetric::from_players(rows, rate))
        .collect();
    let players = north.into_iter().chain(south).collect();
    let summary = svc.import_metrics(&tenant, draft.id, players, agents, ImportMode::Replace)?;
    println!("Imported {} players and {} agents\n", summary.players, summary.agents);

    let mut overlay = SubclubAdjustment::new(tenant.clone(), club.clone(), period, "North");
    overlay.overlay = dec!(-150.00);
    overlay.notes = "guarantee shortfall".into();
    svc.record_adjustment(overlay)?;

    let paid_on = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap_or_else(|| period.start());
    svc.record_ledger_entry(
        LedgerEntry::new(
            tenant.clone(),
            club.clone(),
            EntityId::new("ag-ramos"),
            period,
            Direction::Inbound,
            dec!(300.00),
            paid_on,
        )
        .with_method("PIX")
        .with_reference("demo-pix-1"),
    )?;

    // --- Breakdown ---
    println!("━━━ Breakdown ━━━\n");
    let breakdown = svc.breakdown(&tenant, draft.id, None)?;
    for sub in &breakdown.subclubs {
        println!("{} ({} players)", sub.name, sub.totals.player_count);
        println!("  Subclub result:    {:>12}", sub.subclub_result);
        for fee in &sub.fees.lines {
            println!("  {:<18} {:>12}", fee.name, -fee.amount);
        }
        println!("  Adjustments:       {:>12}", sub.adjustments.total);
        println!("  League settlement: {:>12}  {:?}", sub.league_settlement, sub.direction);
        for line in &sub.players {
            println!(
                "    {:<14} weekly {:>10}  balance {:>10}  [{:?}]",
                line.metric.name, line.metric.weekly_result, line.current_balance, line.situation
            );
        }
        println!();
    }
    println!("Total league settlement: {}\n", breakdown.rollup.league_settlement);

    // --- Close ---
    println!("━━━ Close ━━━\n");
    svc.finalize(&tenant, draft.id, "demo")?;
    let closed = svc.close_period(&tenant, draft.id)?;
    println!(
        "Carried {} balances from {} into {}:",
        closed.entities_updated, closed.closed_period, closed.destination_period
    );
    for d in &closed.details {
        println!(
            "  {:<10} {:>10} + {:>10} - {:>10} = {:>10}",
            d.agent_name, d.previous_carry, d.weekly_result, d.ledger_net, d.final_balance
        );
    }
    Ok(())
}
