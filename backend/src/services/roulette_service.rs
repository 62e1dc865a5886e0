use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use time::{Duration, OffsetDateTime};

use shared::constants::{
    CHEAT_KEY_LENGTH, CHEAT_KEY_PREFIX, CHEAT_WIN_MESSAGE, CONFIG_WIN_MESSAGE, RETRY_MESSAGE,
    SCRIPT_WIN_MESSAGE,
};
use shared::shared_roulette_game::{Prize, PrizeKind, PrizeTable};

use crate::error::RouletteError;
use crate::models::{HistoryEntry, SpinOutcome, UserAccount};
use crate::store::{RouletteStore, StoreError};

/// Cooldown gate result. Pure function of the last spin and the clock, so
/// it is safe to evaluate repeatedly for status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Cooldown {
        next_spin_time: OffsetDateTime,
        hours_remaining: i64,
    },
}

/// A user with no prior spin is always eligible; otherwise eligibility
/// opens at `last_spin_at + cooldown`, boundary inclusive. The remaining
/// wait is reported in whole hours, rounded up — an active cooldown never
/// reports zero.
pub fn check_eligibility(
    last_spin_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
    cooldown: Duration,
) -> Eligibility {
    let Some(last_spin_at) = last_spin_at else {
        return Eligibility::Eligible;
    };
    let next_spin_time = last_spin_at + cooldown;
    if now >= next_spin_time {
        return Eligibility::Eligible;
    }
    let remaining_seconds = (next_spin_time - now).whole_seconds();
    let hours_remaining = ((remaining_seconds + 3599) / 3600).max(1);
    Eligibility::Cooldown { next_spin_time, hours_remaining }
}

/// The authoritative spin state machine: gate, draw, atomic apply. All
/// four storefront operations go through here; callers never touch the
/// store directly.
#[derive(Clone)]
pub struct RouletteService {
    store: RouletteStore,
    table: Arc<PrizeTable>,
    cooldown: Duration,
}

impl std::fmt::Debug for RouletteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouletteService")
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl RouletteService {
    /// Validates the prize table up front; a service is never constructed
    /// around a table that could fail a draw.
    pub fn new(
        store: RouletteStore,
        table: PrizeTable,
        cooldown: Duration,
    ) -> Result<Self, RouletteError> {
        table
            .validate()
            .map_err(|err| RouletteError::Configuration(err.to_string()))?;
        Ok(Self { store, table: Arc::new(table), cooldown })
    }

    pub async fn spin(&self, user_id: &str) -> Result<SpinOutcome, RouletteError> {
        self.spin_at(user_id, OffsetDateTime::now_utc(), &mut OsRng).await
    }

    /// Deterministic entry point: clock and roll source are injected;
    /// `spin` wires in the real ones.
    pub async fn spin_at<R: Rng>(
        &self,
        user_id: &str,
        now: OffsetDateTime,
        rng: &mut R,
    ) -> Result<SpinOutcome, RouletteError> {
        let account = self
            .store
            .load_or_create(user_id, now)
            .await
            .map_err(storage_error)?;

        if let Eligibility::Cooldown { next_spin_time, hours_remaining } =
            check_eligibility(account.last_spin_at, now, self.cooldown)
        {
            return Err(RouletteError::CooldownActive { next_spin_time, hours_remaining });
        }

        let prize = self.table.draw(rng).clone();
        let (mut outcome, description) = self.build_outcome(&prize, now, rng);

        let entry = HistoryEntry {
            spun_at: now,
            prize_name: outcome.prize_name.clone(),
            prize_kind: outcome.prize_kind,
            success: outcome.success,
            description,
        };
        let credit = match prize.kind {
            PrizeKind::Currency => prize.amount.unwrap_or(0),
            _ => 0,
        };

        match self
            .store
            .apply_spin(user_id, now, credit, outcome.success, entry)
            .await
        {
            Ok(updated) => {
                if prize.kind == PrizeKind::Currency {
                    outcome.new_balance = Some(updated.balance);
                }
                Ok(outcome)
            }
            // Lost the race to a concurrent spin. The draw is discarded —
            // the prize was never granted, so nothing of it is revealed.
            Err(StoreError::AlreadySpun { last_spin_at }) => {
                Err(self.cooldown_error(last_spin_at, now))
            }
            Err(err) => Err(storage_error(err)),
        }
    }

    /// Read-only; lazily creates the account like `spin` does. Expiry is
    /// computed against `now`, so a stale ineligible flag is never
    /// returned once the window has passed.
    pub async fn status(
        &self,
        user_id: &str,
    ) -> Result<(UserAccount, Eligibility), RouletteError> {
        self.status_at(user_id, OffsetDateTime::now_utc()).await
    }

    pub async fn status_at(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<(UserAccount, Eligibility), RouletteError> {
        let account = self
            .store
            .load_or_create(user_id, now)
            .await
            .map_err(storage_error)?;
        let eligibility = check_eligibility(account.last_spin_at, now, self.cooldown);
        Ok((account, eligibility))
    }

    /// Oldest first, bounded by the retention limit.
    pub async fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>, RouletteError> {
        self.store
            .history(user_id, OffsetDateTime::now_utc())
            .await
            .map_err(storage_error)
    }

    pub async fn clear_history(&self, user_id: &str) -> Result<(), RouletteError> {
        self.store
            .clear_history(user_id, OffsetDateTime::now_utc())
            .await
            .map_err(storage_error)
    }

    fn cooldown_error(&self, last_spin_at: OffsetDateTime, now: OffsetDateTime) -> RouletteError {
        match check_eligibility(Some(last_spin_at), now, self.cooldown) {
            Eligibility::Cooldown { next_spin_time, hours_remaining } => {
                RouletteError::CooldownActive { next_spin_time, hours_remaining }
            }
            // The store re-check and this one use the same clock, so this
            // arm is unreachable in practice; report the smallest wait.
            Eligibility::Eligible => RouletteError::CooldownActive {
                next_spin_time: last_spin_at + self.cooldown,
                hours_remaining: 1,
            },
        }
    }

    fn build_outcome<R: Rng>(
        &self,
        prize: &Prize,
        now: OffsetDateTime,
        rng: &mut R,
    ) -> (SpinOutcome, String) {
        let mut outcome = SpinOutcome {
            prize_name: prize.name.clone(),
            prize_kind: prize.kind,
            success: prize.kind != PrizeKind::Retry,
            message: String::new(),
            amount: None,
            new_balance: None,
            key: None,
            download_url: None,
            spin_time: now,
            next_spin_time: now + self.cooldown,
        };

        let description = match prize.kind {
            PrizeKind::Cheat => {
                let key = generate_redemption_key(rng);
                outcome.message = CHEAT_WIN_MESSAGE.to_string();
                let description = format!("{} Key: {}", CHEAT_WIN_MESSAGE, key);
                outcome.key = Some(key);
                description
            }
            PrizeKind::Currency => {
                let amount = prize.amount.unwrap_or(0);
                outcome.amount = Some(amount);
                outcome.message = format!("You won {} NLE!", amount);
                outcome.message.clone()
            }
            PrizeKind::Config => {
                outcome.message = CONFIG_WIN_MESSAGE.to_string();
                outcome.download_url = prize.download_ref.clone();
                outcome.message.clone()
            }
            PrizeKind::Script => {
                outcome.message = SCRIPT_WIN_MESSAGE.to_string();
                outcome.download_url = prize.download_ref.clone();
                outcome.message.clone()
            }
            PrizeKind::Retry => {
                outcome.message = RETRY_MESSAGE.to_string();
                outcome.message.clone()
            }
        };

        (outcome, description)
    }
}

/// One-time artifact for cheat wins; generated at draw time, surfaced only
/// in the outcome and the audit entry, never stored on the account.
fn generate_redemption_key<R: Rng>(rng: &mut R) -> String {
    let suffix: String = (0..CHEAT_KEY_LENGTH)
        .map(|_| char::from(rng.sample(Alphanumeric)).to_ascii_uppercase())
        .collect();
    format!("{}{}", CHEAT_KEY_PREFIX, suffix)
}

fn storage_error(err: StoreError) -> RouletteError {
    match err {
        StoreError::Unavailable(detail) => {
            tracing::error!("roulette storage failure: {}", detail);
            RouletteError::StorageUnavailable
        }
        // apply_spin handles the race explicitly; anywhere else it is a
        // storage-level surprise.
        StoreError::AlreadySpun { .. } => RouletteError::StorageUnavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use time::macros::datetime;

    use shared::constants::{SPIN_COOLDOWN_HOURS, STARTING_BALANCE};
    use shared::shared_roulette_game::DEFAULT_PRIZE_TABLE;

    use crate::store::MemoryStore;

    fn service(table: PrizeTable, history_limit: usize) -> RouletteService {
        let cooldown = Duration::hours(SPIN_COOLDOWN_HOURS);
        let store = RouletteStore::Memory(MemoryStore::new(cooldown, history_limit));
        RouletteService::new(store, table, cooldown).unwrap()
    }

    fn single_prize_table(prize: Prize) -> PrizeTable {
        PrizeTable { version: "test".to_string(), prizes: vec![prize] }
    }

    fn currency_table(amount: i64) -> PrizeTable {
        single_prize_table(Prize {
            name: format!("{} NLE", amount),
            kind: PrizeKind::Currency,
            weight: 1,
            amount: Some(amount),
            download_ref: None,
        })
    }

    fn retry_table() -> PrizeTable {
        single_prize_table(Prize {
            name: "Try Again".to_string(),
            kind: PrizeKind::Retry,
            weight: 1,
            amount: None,
            download_ref: None,
        })
    }

    fn cheat_table() -> PrizeTable {
        single_prize_table(Prize {
            name: "NEVERLOSE Cheat".to_string(),
            kind: PrizeKind::Cheat,
            weight: 1,
            amount: None,
            download_ref: None,
        })
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_gate_with_no_prior_spin_is_eligible() {
        let now = datetime!(2024-03-01 12:00 UTC);
        assert_eq!(
            check_eligibility(None, now, Duration::hours(24)),
            Eligibility::Eligible
        );
    }

    #[test]
    fn test_gate_boundary_is_inclusive() {
        let cooldown = Duration::hours(24);
        let last = datetime!(2024-03-01 12:00 UTC);

        assert_eq!(
            check_eligibility(Some(last), last + cooldown, cooldown),
            Eligibility::Eligible
        );
        assert_eq!(
            check_eligibility(Some(last), last + cooldown + Duration::seconds(1), cooldown),
            Eligibility::Eligible
        );
        assert!(matches!(
            check_eligibility(Some(last), last + cooldown - Duration::seconds(1), cooldown),
            Eligibility::Cooldown { .. }
        ));
    }

    #[test]
    fn test_gate_rounds_hours_up_and_never_reports_zero() {
        let cooldown = Duration::hours(24);
        let last = datetime!(2024-03-01 12:00 UTC);

        match check_eligibility(Some(last), last, cooldown) {
            Eligibility::Cooldown { next_spin_time, hours_remaining } => {
                assert_eq!(next_spin_time, last + cooldown);
                assert_eq!(hours_remaining, 24);
            }
            other => panic!("expected cooldown, got {:?}", other),
        }

        // One second short of eligibility still reports a whole hour.
        match check_eligibility(Some(last), last + cooldown - Duration::seconds(1), cooldown) {
            Eligibility::Cooldown { hours_remaining, .. } => assert_eq!(hours_remaining, 1),
            other => panic!("expected cooldown, got {:?}", other),
        }

        match check_eligibility(Some(last), last + Duration::hours(1), cooldown) {
            Eligibility::Cooldown { hours_remaining, .. } => assert_eq!(hours_remaining, 23),
            other => panic!("expected cooldown, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_table_rejected_at_startup() {
        let cooldown = Duration::hours(SPIN_COOLDOWN_HOURS);
        let store = RouletteStore::Memory(MemoryStore::new(cooldown, 20));
        let empty = PrizeTable { version: "empty".to_string(), prizes: vec![] };

        let err = RouletteService::new(store, empty, cooldown).unwrap_err();
        assert!(matches!(err, RouletteError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_first_spin_succeeds_and_credits_exactly_once() {
        let service = service(currency_table(100), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        let outcome = service.spin_at("2001", now, &mut rng()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.amount, Some(100));
        assert_eq!(outcome.new_balance, Some(STARTING_BALANCE + 100));
        assert_eq!(outcome.next_spin_time, now + Duration::hours(24));

        let (account, _) = service.status_at("2001", now).await.unwrap();
        assert_eq!(account.balance, STARTING_BALANCE + 100);
        assert_eq!(account.total_spins, 1);
        assert_eq!(account.total_wins, 1);
        assert_eq!(account.last_spin_at, Some(now));
    }

    #[tokio::test]
    async fn test_second_spin_within_window_reports_full_cooldown() {
        let service = service(currency_table(100), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        service.spin_at("2001", now, &mut rng()).await.unwrap();
        let err = service.spin_at("2001", now, &mut rng()).await.unwrap_err();

        match err {
            RouletteError::CooldownActive { next_spin_time, hours_remaining } => {
                assert_eq!(next_spin_time, now + Duration::hours(24));
                assert_eq!(hours_remaining, 24);
            }
            other => panic!("expected CooldownActive, got {:?}", other),
        }

        // The refused spin credited nothing.
        let (account, _) = service.status_at("2001", now).await.unwrap();
        assert_eq!(account.balance, STARTING_BALANCE + 100);
        assert_eq!(account.total_spins, 1);
    }

    #[tokio::test]
    async fn test_spin_allowed_again_after_window() {
        let service = service(currency_table(100), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        service.spin_at("2001", now, &mut rng()).await.unwrap();

        // Exactly at the boundary and one second past it.
        let at_boundary = now + Duration::hours(24);
        service.spin_at("2001", at_boundary, &mut rng()).await.unwrap();

        let later = at_boundary + Duration::hours(24) + Duration::seconds(1);
        let outcome = service.spin_at("2001", later, &mut rng()).await.unwrap();
        assert_eq!(outcome.new_balance, Some(STARTING_BALANCE + 300));
    }

    #[tokio::test]
    async fn test_concurrent_spins_credit_at_most_once() {
        let service = service(currency_table(100), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(2);
        let (a, b) = tokio::join!(
            service.spin_at("2001", now, &mut rng_a),
            service.spin_at("2001", now, &mut rng_b),
        );

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(RouletteError::CooldownActive { .. })));

        let (account, _) = service.status_at("2001", now).await.unwrap();
        assert_eq!(account.balance, STARTING_BALANCE + 100);
        assert_eq!(account.total_spins, 1);
        assert_eq!(service.history("2001").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_different_users_spin_independently() {
        let service = service(currency_table(100), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(2);
        let (a, b) = tokio::join!(
            service.spin_at("2001", now, &mut rng_a),
            service.spin_at("2002", now, &mut rng_b),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_status_reflects_expiry_without_a_write() {
        let service = service(currency_table(100), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        service.spin_at("2001", now, &mut rng()).await.unwrap();

        let (_, eligibility) = service
            .status_at("2001", now + Duration::hours(23))
            .await
            .unwrap();
        match eligibility {
            Eligibility::Cooldown { hours_remaining, .. } => assert_eq!(hours_remaining, 1),
            other => panic!("expected cooldown, got {:?}", other),
        }

        // Past the window the flag flips with no intervening spin.
        let (account, eligibility) = service
            .status_at("2001", now + Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(eligibility, Eligibility::Eligible);
        assert_eq!(account.last_spin_at, Some(now));
    }

    #[tokio::test]
    async fn test_status_creates_account_lazily() {
        let service = service(currency_table(100), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        let (account, eligibility) = service.status_at("fresh", now).await.unwrap();
        assert_eq!(account.balance, STARTING_BALANCE);
        assert_eq!(eligibility, Eligibility::Eligible);
    }

    #[tokio::test]
    async fn test_retry_prize_consumes_window_without_winning() {
        let service = service(retry_table(), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        let outcome = service.spin_at("2001", now, &mut rng()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.amount, None);
        assert_eq!(outcome.new_balance, None);

        let (account, eligibility) = service.status_at("2001", now).await.unwrap();
        assert_eq!(account.balance, STARTING_BALANCE);
        assert_eq!(account.total_spins, 1);
        assert_eq!(account.total_wins, 0);
        assert!(matches!(eligibility, Eligibility::Cooldown { .. }));

        let history = service.history("2001").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
    }

    #[tokio::test]
    async fn test_cheat_prize_reveals_key_once() {
        let service = service(cheat_table(), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        let outcome = service.spin_at("2001", now, &mut rng()).await.unwrap();
        let key = outcome.key.unwrap();
        assert!(key.starts_with(CHEAT_KEY_PREFIX));
        assert_eq!(key.len(), CHEAT_KEY_PREFIX.len() + CHEAT_KEY_LENGTH);

        // The audit entry carries the same key; the account does not.
        let history = service.history("2001").await.unwrap();
        assert!(history[0].description.contains(&key));

        let (account, _) = service.status_at("2001", now).await.unwrap();
        assert_eq!(account.balance, STARTING_BALANCE);
    }

    #[tokio::test]
    async fn test_history_is_bounded_oldest_evicted_first() {
        let service = service(currency_table(100), 3);
        let mut now = datetime!(2024-03-01 12:00 UTC);

        for _ in 0..5 {
            service.spin_at("2001", now, &mut rng()).await.unwrap();
            now += Duration::hours(25);
        }

        let history = service.history("2001").await.unwrap();
        assert_eq!(history.len(), 3);
        // Canonical order is oldest-first; the survivors are the newest 3.
        assert!(history[0].spun_at < history[1].spun_at);
        assert!(history[1].spun_at < history[2].spun_at);
        assert_eq!(
            history[2].spun_at,
            datetime!(2024-03-01 12:00 UTC) + Duration::hours(100)
        );
    }

    #[tokio::test]
    async fn test_clear_history_never_touches_balance_or_cooldown() {
        let service = service(currency_table(100), 20);
        let now = datetime!(2024-03-01 12:00 UTC);

        service.spin_at("2001", now, &mut rng()).await.unwrap();
        service.clear_history("2001").await.unwrap();

        assert!(service.history("2001").await.unwrap().is_empty());
        let (account, eligibility) = service.status_at("2001", now).await.unwrap();
        assert_eq!(account.balance, STARTING_BALANCE + 100);
        assert!(matches!(eligibility, Eligibility::Cooldown { .. }));
    }

    #[tokio::test]
    async fn test_balance_never_decreases_over_many_spins() {
        let service = service(DEFAULT_PRIZE_TABLE.clone(), 20);
        let mut now = datetime!(2024-03-01 12:00 UTC);
        let mut rng = StdRng::seed_from_u64(99);
        let mut last_balance = STARTING_BALANCE;

        for _ in 0..50 {
            service.spin_at("2001", now, &mut rng).await.unwrap();
            let (account, _) = service.status_at("2001", now).await.unwrap();
            assert!(account.balance >= last_balance);
            last_balance = account.balance;
            now += Duration::hours(24);
        }
    }
}
