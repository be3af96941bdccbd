//! league-settlement CLI
//!
//! Run settlement operations against a JSON snapshot of the store.
//!
//! # Usage
//!
//! ```bash
//! # Generate a synthetic week to play with
//! league-settlement generate --output week.json
//!
//! # Show a settlement's breakdown
//! league-settlement breakdown --store week.json --tenant demo --settlement <UUID>
//!
//! # Finalize it and carry balances into next week
//! league-settlement finalize --store week.json --tenant demo --settlement <UUID> --actor ops
//! league-settlement close --store week.json --tenant demo --settlement <UUID>
//! ```

use league_settlement::config::EngineConfig;
use league_settlement::core::ids::{ClubId, TenantId};
use league_settlement::core::period::Period;
use league_settlement::engine::aggregator::{SettlementBreakdown, SubclubFilter};
use league_settlement::error::SettlementResult;
use league_settlement::service::SettlementService;
use league_settlement::simulation::generator::{generate_seeded, generate_week, WeekConfig};
use league_settlement::store::InMemoryStore;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::process;
use uuid::Uuid;

fn print_usage() {
    eprintln!(
        r#"league-settlement: weekly club settlement engine

USAGE:
    league-settlement <COMMAND> [OPTIONS]

COMMANDS:
    breakdown   Compute a settlement's breakdown
    close       Carry agent balances into the next period
    match       Suggest entity links for pending bank lines
    finalize    Move a DRAFT settlement to FINAL
    void        Move a FINAL settlement to VOID
    fees        Show the tenant's effective fee table
    generate    Write a synthetic week as a store snapshot
    help        Show this message

COMMON OPTIONS:
    --store <FILE>        JSON store snapshot (read, and rewritten by close/finalize/void)
    --tenant <ID>         Tenant id
    --config <FILE>       Engine config JSON (optional)
    --format <FORMAT>     Output format: text (default) or json

COMMAND OPTIONS:
    breakdown   --settlement <UUID> [--subclubs <LIST>]
    close       --settlement <UUID>
    match       --club <ID> --period <YYYY-MM-DD>
    finalize    --settlement <UUID> --actor <NAME>
    void        --settlement <UUID> --actor <NAME> --reason <TEXT>
    generate    --output <FILE> [--tenant <ID>] [--club <ID>] [--period <YYYY-MM-DD>]
                [--subclubs <N>] [--agents <N>] [--players <N>] [--seed <N>]

EXAMPLES:
    league-settlement generate --output week.json --seed 7
    league-settlement breakdown --store week.json --tenant demo --settlement <UUID> --subclubs "Subclub 01"
    league-settlement match --store week.json --tenant demo --club club-1 --period 2026-03-02"#
    );
}

fn fail(message: impl Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// `--key value` pairs following the command name.
struct Options {
    values: HashMap<String, String>,
}

impl Options {
    fn parse(args: &[String], allowed: &[&str]) -> Self {
        let mut values = HashMap::new();
        let mut i = 0;
        while i < args.len() {
            let key = args[i].trim_start_matches("--");
            if !args[i].starts_with("--") || !allowed.contains(&key) {
                fail(format!("unknown option: {}", args[i]));
            }
            i += 1;
            let value = args
                .get(i)
                .cloned()
                .unwrap_or_else(|| fail(format!("--{} requires a value", key)));
            values.insert(key.to_string(), value);
            i += 1;
        }
        Self { values }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> &str {
        self.get(key)
            .unwrap_or_else(|| fail(format!("--{} is required", key)))
    }

    fn number(&self, key: &str, default: usize) -> usize {
        match self.get(key) {
            Some(v) => v
                .parse()
                .unwrap_or_else(|_| fail(format!("--{} requires a number", key))),
            None => default,
        }
    }

    fn json(&self) -> bool {
        self.get("format") == Some("json")
    }

    fn tenant(&self) -> TenantId {
        TenantId::new(self.require("tenant"))
    }

    fn settlement(&self) -> Uuid {
        let raw = self.require("settlement");
        raw.parse()
            .unwrap_or_else(|e| fail(format!("invalid settlement id '{}': {}", raw, e)))
    }

    fn period(&self) -> Period {
        let raw = self.require("period");
        raw.parse().unwrap_or_else(|e| fail(e))
    }
}

const COMMON: [&str; 4] = ["store", "tenant", "config", "format"];

fn allowed(extra: &[&'static str]) -> Vec<&'static str> {
    COMMON.iter().chain(extra).copied().collect()
}

fn service(opts: &Options) -> SettlementService<InMemoryStore> {
    let config = match opts.get("config") {
        Some(path) => EngineConfig::from_json_file(path).unwrap_or_else(|e| fail(e)),
        None => EngineConfig::default(),
    };
    let path = opts.require("store");
    let store = InMemoryStore::load_json(path)
        .unwrap_or_else(|e| fail(format!("cannot load store '{}': {}", path, e)));
    SettlementService::new(store, config).unwrap_or_else(|e| fail(e))
}

fn save(svc: &SettlementService<InMemoryStore>, opts: &Options) {
    let path = opts.require("store");
    svc.store()
        .save_json(path)
        .unwrap_or_else(|e| fail(format!("cannot write store '{}': {}", path, e)));
}

fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|e| fail(e));
    println!("{}", json);
}

fn or_fail<T>(result: SettlementResult<T>) -> T {
    result.unwrap_or_else(|e| fail(e))
}

fn print_breakdown(b: &SettlementBreakdown) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!(
        "║  Settlement {} v{} [{}]",
        b.header.period, b.header.version, b.header.status
    );
    println!("║  Club {} / tenant {}", b.header.club, b.header.tenant);
    println!("╚══════════════════════════════════════════════════════════════╝");

    for sub in &b.subclubs {
        println!("\n{} ({} players, {} agents)", sub.name, sub.totals.player_count, sub.totals.agent_count);
        println!("  Winnings:          {:>14}", sub.totals.winnings);
        println!("  Rake:              {:>14}", sub.totals.rake);
        println!("  Revenue:           {:>14}", sub.totals.revenue);
        println!("  Rakeback:          {:>14}", sub.totals.rakeback);
        println!("  Subclub result:    {:>14}", sub.subclub_result);
        println!("  Fees:              {:>14}", sub.fees.signed_total);
        println!("  Adjustments:       {:>14}", sub.adjustments.total);
        println!("  League settlement: {:>14}  {:?}", sub.league_settlement, sub.direction);
    }

    let r = &b.rollup;
    println!("\nTotal ({} subclubs, {} players)", r.subclub_count, r.player_count);
    println!("  Subclub result:    {:>14}", r.subclub_result);
    println!("  Fees:              {:>14}", r.fee_total);
    println!("  Adjustments:       {:>14}", r.adjustment_total);
    println!("  League settlement: {:>14}", r.league_settlement);
    println!(
        "\nformula {} / rounding: {}",
        b.metadata.formula_version, b.metadata.rounding_policy
    );
}

fn cmd_breakdown(args: &[String]) {
    let opts = Options::parse(args, &allowed(&["settlement", "subclubs"]));
    let svc = service(&opts);
    let filter = opts
        .get("subclubs")
        .map(|list| SubclubFilter::new(list.split(',').map(str::trim)));
    let breakdown = or_fail(svc.breakdown(&opts.tenant(), opts.settlement(), filter.as_ref()));

    if opts.json() {
        print_json(&breakdown);
    } else {
        print_breakdown(&breakdown);
    }
}

fn cmd_close(args: &[String]) {
    let opts = Options::parse(args, &allowed(&["settlement"]));
    let svc = service(&opts);
    let result = or_fail(svc.close_period(&opts.tenant(), opts.settlement()));
    save(&svc, &opts);

    if opts.json() {
        print_json(&result);
    } else {
        println!(
            "Closed {} → {}: {} balances carried",
            result.closed_period, result.destination_period, result.entities_updated
        );
        for d in &result.details {
            println!(
                "  {:<24} prev {:>12}  week {:>12}  ledger {:>12}  → {:>12}",
                d.agent_name, d.previous_carry, d.weekly_result, d.ledger_net, d.final_balance
            );
        }
    }
}

fn cmd_match(args: &[String]) {
    let opts = Options::parse(args, &allowed(&["club", "period"]));
    let svc = service(&opts);
    let club = ClubId::new(opts.require("club"));
    let suggestions = or_fail(svc.suggest_matches(&opts.tenant(), &club, opts.period()));

    if opts.json() {
        print_json(&suggestions);
    } else if suggestions.is_empty() {
        println!("No pending bank lines.");
    } else {
        for s in &suggestions {
            println!(
                "{} {:>12} {:<32} tier {} {:?} → {}  ({})",
                s.date,
                s.amount,
                s.memo,
                s.tier,
                s.confidence,
                s.entity_name.as_deref().unwrap_or("-"),
                s.reason
            );
        }
    }
}

fn cmd_finalize(args: &[String]) {
    let opts = Options::parse(args, &allowed(&["settlement", "actor"]));
    let svc = service(&opts);
    let settlement = or_fail(svc.finalize(&opts.tenant(), opts.settlement(), opts.require("actor")));
    save(&svc, &opts);
    println!("Settlement {} is now {}", settlement.id, settlement.status);
}

fn cmd_void(args: &[String]) {
    let opts = Options::parse(args, &allowed(&["settlement", "actor", "reason"]));
    let svc = service(&opts);
    let settlement = or_fail(svc.void(
        &opts.tenant(),
        opts.settlement(),
        opts.require("actor"),
        opts.require("reason"),
    ));
    save(&svc, &opts);
    println!("Settlement {} is now {}", settlement.id, settlement.status);
}

fn cmd_fees(args: &[String]) {
    let opts = Options::parse(args, &allowed(&[]));
    let svc = service(&opts);
    let table = or_fail(svc.fee_table(&opts.tenant()));

    if opts.json() {
        print_json(&table);
    } else {
        for entry in table.entries() {
            println!("{:<20} {:>8}%  of {:?}", entry.name, entry.rate, entry.base);
        }
    }
}

fn cmd_generate(args: &[String]) {
    let opts = Options::parse(
        args,
        &["output", "tenant", "club", "period", "subclubs", "agents", "players", "seed"],
    );
    let output = opts.require("output");
    let tenant = TenantId::new(opts.get("tenant").unwrap_or("demo"));
    let club = ClubId::new(opts.get("club").unwrap_or("club-1"));
    let period: Period = opts
        .get("period")
        .unwrap_or("2026-03-02")
        .parse()
        .unwrap_or_else(|e| fail(e));

    let defaults = WeekConfig::default();
    let config = WeekConfig {
        subclubs: opts.number("subclubs", defaults.subclubs),
        agents_per_subclub: opts.number("agents", defaults.agents_per_subclub),
        players_per_agent: opts.number("players", defaults.players_per_agent),
        ..defaults
    };

    let week = match opts.get("seed") {
        Some(_) => generate_seeded(opts.number("seed", 0) as u64, &config, &tenant, &club, period),
        None => generate_week(&config, &tenant, &club, period),
    };
    let settlement_id = week.settlement.id;
    let players = week.players.len();

    let store = InMemoryStore::from_snapshot(week.into_snapshot());
    store
        .save_json(output)
        .unwrap_or_else(|e| fail(format!("cannot write '{}': {}", output, e)));
    eprintln!(
        "Generated settlement {} with {} players → {}",
        settlement_id, players, output
    );
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let rest = &args[2..];
    match args[1].as_str() {
        "breakdown" => cmd_breakdown(rest),
        "close" => cmd_close(rest),
        "match" => cmd_match(rest),
        "finalize" => cmd_finalize(rest),
        "void" => cmd_void(rest),
        "fees" => cmd_fees(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            process::exit(1);
        }
    }
}
