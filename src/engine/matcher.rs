//! Suggests which player or agent a bank-statement line belongs to.
//!
//! Suggestions are only ever proposals; linking is a separate, human-confirmed
//! step (see [`crate::core::bank::BankTransaction::link`]).

use crate::core::bank::BankTransaction;
use crate::core::ids::EntityId;
use crate::core::ledger::{Direction, LedgerEntry};
use crate::core::money::EPSILON;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Shortest entity name a memo may be matched against in tier 1.
pub const MIN_NAME_LEN: usize = 3;
/// Shortest common substring accepted in tier 3.
pub const MIN_COMMON_LEN: usize = 5;

/// Payment-method vocabulary seen on statement memos.
pub const PAYMENT_KEYWORDS: [&str; 10] = [
    "PIX", "TED", "DOC", "TRANSF", "TRANSFER", "WIRE", "DEPOSITO", "DEPOSIT", "SAQUE", "WITHDRAWAL",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Agent,
}

/// A player or agent active in the period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownEntity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
}

impl KnownEntity {
    pub fn player(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntityKind::Player,
        }
    }

    pub fn agent(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntityKind::Agent,
        }
    }
}

/// One proposal for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub transaction_id: Uuid,
    pub entity: Option<EntityId>,
    pub entity_name: Option<String>,
    /// 1 (strongest) to 5 (no match).
    pub tier: u8,
    pub confidence: Confidence,
    pub reason: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub direction: Direction,
    pub memo: String,
}

impl MatchSuggestion {
    fn for_tx(tx: &BankTransaction, tier: u8, confidence: Confidence, reason: String) -> Self {
        Self {
            transaction_id: tx.id,
            entity: None,
            entity_name: None,
            tier,
            confidence,
            reason,
            date: tx.date,
            amount: tx.amount,
            direction: tx.direction,
            memo: tx.memo.clone(),
        }
    }

    fn with_entity(mut self, entity: &KnownEntity) -> Self {
        self.entity = Some(entity.id.clone());
        self.entity_name = Some(entity.name.clone());
        self
    }
}

/// Upper-case, fold common Latin accents and reduce everything that is not a
/// letter or digit to single spaces.
///
/// ```
/// use league_settlement::engine::matcher::normalize_text;
///
/// assert_eq!(normalize_text("Pix-João  da Silva!"), "PIX JOAO DA SILVA");
/// ```
pub fn normalize_text(text: &str) -> String {
    let folded: String = text.chars().map(fold_accent).collect();
    folded
        .to_uppercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_payment_vocabulary(memo: &str) -> bool {
    memo.split(' ').all(|word| PAYMENT_KEYWORDS.contains(&word))
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

/// Length in characters of the longest common substring of `a` and `b`.
pub fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = 0;
    for i in 1..=a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                row[j] = prev[j - 1] + 1;
                best = best.max(row[j]);
            }
        }
        prev = row;
    }
    best
}

/// What the strategies match against: the period's active entities and its
/// unreconciled ledger rows.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    entities: Vec<(KnownEntity, String)>,
    ledger: Vec<LedgerEntry>,
}

impl MatchContext {
    pub fn new(entities: Vec<KnownEntity>, ledger: Vec<LedgerEntry>) -> Self {
        let entities = entities
            .into_iter()
            .map(|e| {
                let key = normalize_text(&e.name);
                (e, key)
            })
            .collect();
        let ledger = ledger.into_iter().filter(|e| !e.reconciled).collect();
        Self { entities, ledger }
    }

    /// Entities with their normalized names, in the order they were given.
    pub fn entities(&self) -> impl Iterator<Item = (&KnownEntity, &str)> {
        self.entities.iter().map(|(e, k)| (e, k.as_str()))
    }

    pub fn entity(&self, id: &EntityId) -> Option<&KnownEntity> {
        self.entities.iter().map(|(e, _)| e).find(|e| &e.id == id)
    }

    pub fn unreconciled(&self) -> &[LedgerEntry] {
        &self.ledger
    }
}

/// One tier of the matching cascade.
pub trait MatchStrategy: Send + Sync {
    fn tier(&self) -> u8;
    fn try_match(&self, tx: &BankTransaction, ctx: &MatchContext) -> Option<MatchSuggestion>;
}

/// Tier 1: the memo contains a known name, or the name contains the memo.
pub struct NameSubstring;

impl MatchStrategy for NameSubstring {
    fn tier(&self) -> u8 {
        1
    }

    fn try_match(&self, tx: &BankTransaction, ctx: &MatchContext) -> Option<MatchSuggestion> {
        let memo = normalize_text(&tx.memo);
        if memo.is_empty() {
            return None;
        }
        // A memo made only of payment vocabulary names nobody, even when a
        // name happens to start with it.
        let reverse = memo.chars().count() >= MIN_NAME_LEN && !is_payment_vocabulary(&memo);
        let mut best: Option<(&KnownEntity, usize)> = None;
        for (entity, name) in ctx.entities() {
            let len = name.chars().count();
            if len < MIN_NAME_LEN {
                continue;
            }
            let hit = memo.contains(name) || (reverse && name.contains(&memo));
            if hit && best.map_or(true, |(_, l)| len > l) {
                best = Some((entity, len));
            }
        }
        best.map(|(entity, _)| {
            MatchSuggestion::for_tx(
                tx,
                self.tier(),
                Confidence::High,
                format!("memo names '{}'", entity.name),
            )
            .with_entity(entity)
        })
    }
}

/// Tier 2: same amount (within a cent) booked the same day in the ledger.
pub struct AmountAndDate;

impl MatchStrategy for AmountAndDate {
    fn tier(&self) -> u8 {
        2
    }

    fn try_match(&self, tx: &BankTransaction, ctx: &MatchContext) -> Option<MatchSuggestion> {
        let entry = ctx.unreconciled().iter().find(|e| {
            !e.entity.is_blank()
                && e.direction == tx.direction
                && e.booked_on == tx.date
                && (e.amount - tx.amount).abs() <= EPSILON
        })?;
        let suggestion = MatchSuggestion::for_tx(
            tx,
            self.tier(),
            Confidence::Medium,
            format!("amount {} on {} matches ledger entry {}", tx.amount, tx.date, entry.id),
        );
        Some(match ctx.entity(&entry.entity) {
            Some(known) => suggestion.with_entity(known),
            None => MatchSuggestion {
                entity: Some(entry.entity.clone()),
                ..suggestion
            },
        })
    }
}

/// Tier 3: memo and a known name share a long enough run of characters.
pub struct CommonSubstring;

impl MatchStrategy for CommonSubstring {
    fn tier(&self) -> u8 {
        3
    }

    fn try_match(&self, tx: &BankTransaction, ctx: &MatchContext) -> Option<MatchSuggestion> {
        let memo = normalize_text(&tx.memo);
        let mut best: Option<(&KnownEntity, usize)> = None;
        for (entity, name) in ctx.entities() {
            let common = longest_common_substring(&memo, name);
            if common >= MIN_COMMON_LEN && best.map_or(true, |(_, l)| common > l) {
                best = Some((entity, common));
            }
        }
        best.map(|(entity, common)| {
            MatchSuggestion::for_tx(
                tx,
                self.tier(),
                Confidence::Low,
                format!("memo shares {common} characters with '{}'", entity.name),
            )
            .with_entity(entity)
        })
    }
}

/// Tier 4: a payment-method keyword, without an entity.
pub struct PaymentKeyword;

impl MatchStrategy for PaymentKeyword {
    fn tier(&self) -> u8 {
        4
    }

    fn try_match(&self, tx: &BankTransaction, _ctx: &MatchContext) -> Option<MatchSuggestion> {
        let memo = normalize_text(&tx.memo);
        let keyword = memo
            .split(' ')
            .find_map(|word| PAYMENT_KEYWORDS.iter().find(|kw| word.starts_with(*kw)))?;
        Some(MatchSuggestion::for_tx(
            tx,
            self.tier(),
            Confidence::Low,
            format!("payment keyword {keyword}, entity unresolved"),
        ))
    }
}

/// Tier 5: nothing matched; needs manual classification.
pub struct Unmatched;

impl MatchStrategy for Unmatched {
    fn tier(&self) -> u8 {
        5
    }

    fn try_match(&self, tx: &BankTransaction, _ctx: &MatchContext) -> Option<MatchSuggestion> {
        Some(unmatched(tx))
    }
}

fn unmatched(tx: &BankTransaction) -> MatchSuggestion {
    MatchSuggestion::for_tx(tx, 5, Confidence::None, "no match, classify manually".to_string())
}

/// Runs the strategies in order; the first one that matches wins.
pub struct Matcher {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(NameSubstring),
                Box::new(AmountAndDate),
                Box::new(CommonSubstring),
                Box::new(PaymentKeyword),
                Box::new(Unmatched),
            ],
        }
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suggest(&self, tx: &BankTransaction, ctx: &MatchContext) -> MatchSuggestion {
        self.strategies
            .iter()
            .find_map(|s| s.try_match(tx, ctx))
            .unwrap_or_else(|| unmatched(tx))
    }

    /// One suggestion per pending transaction, in input order.
    pub fn suggest_all(&self, txs: &[BankTransaction], ctx: &MatchContext) -> Vec<MatchSuggestion> {
        let suggestions: Vec<MatchSuggestion> = txs
            .iter()
            .filter(|tx| tx.is_pending())
            .map(|tx| self.suggest(tx, ctx))
            .collect();

        let mut per_tier: BTreeMap<u8, usize> = BTreeMap::new();
        for s in &suggestions {
            *per_tier.entry(s.tier).or_default() += 1;
        }
        log::debug!(
            "matched {} pending of {} transactions, per tier {:?}",
            suggestions.len(),
            txs.len(),
            per_tier
        );
        suggestions
    }
}
