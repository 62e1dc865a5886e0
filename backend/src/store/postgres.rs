use sqlx::postgres::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use shared::constants::STARTING_BALANCE;
use shared::shared_roulette_game::PrizeKind;

use super::StoreError;
use crate::models::{HistoryEntry, UserAccount};

const INSERT_ACCOUNT: &str = "INSERT INTO roulette_users (user_id, balance, total_spins, total_wins, created_at) \
     VALUES ($1, $2, 0, 0, $3) ON CONFLICT (user_id) DO NOTHING";

const SELECT_ACCOUNT: &str = "SELECT user_id, balance, last_spin_at, total_spins, total_wins, created_at \
     FROM roulette_users WHERE user_id = $1";

const SELECT_ACCOUNT_FOR_UPDATE: &str = "SELECT user_id, balance, last_spin_at, total_spins, total_wins, created_at \
     FROM roulette_users WHERE user_id = $1 FOR UPDATE";

/// Postgres backend. The account row lock taken inside the transaction is
/// the per-user critical section: the ledger update, the history insert
/// and the retention prune commit together or not at all, and unrelated
/// users lock unrelated rows.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    cooldown: Duration,
    history_limit: usize,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    user_id: String,
    balance: i64,
    last_spin_at: Option<OffsetDateTime>,
    total_spins: i64,
    total_wins: i64,
    created_at: OffsetDateTime,
}

impl AccountRow {
    fn into_account(self) -> UserAccount {
        UserAccount {
            user_id: self.user_id,
            balance: self.balance,
            last_spin_at: self.last_spin_at,
            total_spins: self.total_spins,
            total_wins: self.total_wins,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    spun_at: OffsetDateTime,
    prize_name: String,
    prize_kind: String,
    success: bool,
    description: String,
}

impl HistoryRow {
    fn into_entry(self) -> Result<HistoryEntry, StoreError> {
        let prize_kind = self.prize_kind.parse::<PrizeKind>().map_err(|_| {
            log::error!("unknown prize kind '{}' in roulette_history", self.prize_kind);
            StoreError::Unavailable(format!("unknown prize kind '{}'", self.prize_kind))
        })?;
        Ok(HistoryEntry {
            spun_at: self.spun_at,
            prize_name: self.prize_name,
            prize_kind,
            success: self.success,
            description: self.description,
        })
    }
}

impl PostgresStore {
    pub fn new(pool: PgPool, cooldown: Duration, history_limit: usize) -> Self {
        Self { pool, cooldown, history_limit }
    }

    async fn ensure_account(&self, user_id: &str, now: OffsetDateTime) -> Result<(), StoreError> {
        sqlx::query(INSERT_ACCOUNT)
            .bind(user_id)
            .bind(STARTING_BALANCE)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn load_or_create(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<UserAccount, StoreError> {
        self.ensure_account(user_id, now).await?;
        let row: AccountRow = sqlx::query_as(SELECT_ACCOUNT)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_account())
    }

    pub async fn apply_spin(
        &self,
        user_id: &str,
        now: OffsetDateTime,
        credit: i64,
        win: bool,
        entry: HistoryEntry,
    ) -> Result<UserAccount, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(INSERT_ACCOUNT)
            .bind(user_id)
            .bind(STARTING_BALANCE)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let row: AccountRow = sqlx::query_as(SELECT_ACCOUNT_FOR_UPDATE)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(last_spin_at) = row.last_spin_at {
            if now < last_spin_at + self.cooldown {
                // Dropping the transaction rolls back the implicit insert.
                return Err(StoreError::AlreadySpun { last_spin_at });
            }
        }

        let updated: AccountRow = sqlx::query_as(
            "UPDATE roulette_users \
             SET balance = balance + $1, total_spins = total_spins + 1, \
                 total_wins = total_wins + $2, last_spin_at = $3 \
             WHERE user_id = $4 \
             RETURNING user_id, balance, last_spin_at, total_spins, total_wins, created_at",
        )
        .bind(credit)
        .bind(if win { 1i64 } else { 0i64 })
        .bind(now)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO roulette_history \
             (id, user_id, spun_at, prize_name, prize_kind, success, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(entry.spun_at)
        .bind(&entry.prize_name)
        .bind(entry.prize_kind.to_string())
        .bind(entry.success)
        .bind(&entry.description)
        .execute(&mut *tx)
        .await?;

        // FIFO retention: keep the newest N entries, drop the rest.
        sqlx::query(
            "DELETE FROM roulette_history \
             WHERE user_id = $1 AND id NOT IN ( \
                 SELECT id FROM roulette_history WHERE user_id = $1 \
                 ORDER BY spun_at DESC, id DESC LIMIT $2)",
        )
        .bind(user_id)
        .bind(self.history_limit as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated.into_account())
    }

    pub async fn history(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        self.ensure_account(user_id, now).await?;
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT spun_at, prize_name, prize_kind, success, description \
             FROM roulette_history WHERE user_id = $1 \
             ORDER BY spun_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HistoryRow::into_entry).collect()
    }

    pub async fn clear_history(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.ensure_account(user_id, now).await?;
        sqlx::query("DELETE FROM roulette_history WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
