use serde::Serialize;
use shared::constants::STARTING_BALANCE;
use shared::shared_roulette_game::PrizeKind;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Durable per-user ledger record. `balance` is in hundredths and only
/// ever increases; `last_spin_at` is non-decreasing for the lifetime of
/// the account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAccount {
    pub user_id: String,
    pub balance: i64,
    pub last_spin_at: Option<OffsetDateTime>,
    pub total_spins: i64,
    pub total_wins: i64,
    pub created_at: OffsetDateTime,
}

impl UserAccount {
    pub fn new(user_id: &str, now: OffsetDateTime) -> Self {
        Self {
            user_id: user_id.to_string(),
            balance: STARTING_BALANCE,
            last_spin_at: None,
            total_spins: 0,
            total_wins: 0,
            created_at: now,
        }
    }
}

/// One audit record, owned by its account. Appended in chronological
/// order; the store keeps only the most recent entries, evicting from the
/// head on overflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub spun_at: OffsetDateTime,
    pub prize_name: String,
    pub prize_kind: PrizeKind,
    pub success: bool,
    pub description: String,
}

/// Transient result of one permitted spin: the selected prize plus the
/// kind-specific reveal data. Not persisted as-is; the matching history
/// entry and ledger delta are written by the store.
#[derive(Debug, Clone)]
pub struct SpinOutcome {
    pub prize_name: String,
    pub prize_kind: PrizeKind,
    pub success: bool,
    pub message: String,
    pub amount: Option<i64>,
    pub new_balance: Option<i64>,
    pub key: Option<String>,
    pub download_url: Option<String>,
    pub spin_time: OffsetDateTime,
    pub next_spin_time: OffsetDateTime,
}

pub fn rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.to_string())
}
