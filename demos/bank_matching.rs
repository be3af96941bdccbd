//! Suggesting owners for imported bank lines.
//!
//! Each line is run through the tiered matcher; the printout shows which
//! tier fired and why.

use league_settlement::core::bank::BankTransaction;
use league_settlement::engine::matcher::{KnownEntity, MatchContext, Matcher};
use league_settlement::prelude::*;
use rust_decimal_macros::dec;

fn main() {
    println!("╔═══════════════════════════════════════════╗");
    println!("║  league-settlement: Bank Matching Example ║");
    println!("╚═══════════════════════════════════════════╝\n");

    let tenant = TenantId::new("demo-operator");
    let club = ClubId::new("club-7");
    let period: Period = "2026-03-02".parse().unwrap();
    let day = period.start() + chrono::Duration::days(2);

    let known = vec![
        KnownEntity::player("p1", "João Silva"),
        KnownEntity::player("p2", "Maria Costa"),
        KnownEntity::player("p3", "Pedro Lima"),
        KnownEntity::agent("ag-ramos", "Ramos Agency"),
    ];
    let ledger = vec![LedgerEntry::new(
        tenant.clone(),
        club.clone(),
        EntityId::new("p2"),
        period,
        Direction::Inbound,
        dec!(420.00),
        day,
    )];
    let ctx = MatchContext::new(known, ledger);

    let lines = [
        ("PIX JOAO SILVA", dec!(150.00)),
        ("TED 00012345", dec!(420.00)),
        ("TRANSF RAMOS AGENCY LTDA", dec!(1000.00)),
        ("PAGAMENTO FORNECEDOR", dec!(75.50)),
        ("CREDITO 8841", dec!(12.00)),
    ];
    let txs: Vec<BankTransaction> = lines
        .iter()
        .enumerate()
        .map(|(i, (memo, amount))| {
            BankTransaction::pending(
                tenant.clone(),
                club.clone(),
                period,
                "ofx",
                format!("line-{}", i + 1),
                day,
                *amount,
                Direction::Inbound,
                *memo,
            )
        })
        .collect();

    println!("━━━ Suggestions ━━━\n");
    for s in Matcher::new().suggest_all(&txs, &ctx) {
        println!(
            "  {:<26} {:>9}  tier {} {:<6} -> {:<14} {}",
            s.memo,
            s.amount,
            s.tier,
            format!("{:?}", s.confidence),
            s.entity_name.as_deref().unwrap_or("-"),
            s.reason
        );
    }
}
