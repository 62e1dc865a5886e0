use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Serialize, Deserialize};
use strum::{Display, EnumString};

use crate::constants::{CONFIG_DOWNLOAD_URL, SCRIPT_DOWNLOAD_URL};

/// Categories of prizes on the roulette track
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PrizeKind {
    Cheat,
    Currency,
    Config,
    Script,
    Retry,
}

/// One slot on the roulette track. `weight` is relative probability mass;
/// `amount` is set for currency prizes, `download_ref` for downloadable ones.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Prize {
    pub name: String,
    pub kind: PrizeKind,
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_ref: Option<String>,
}

/// Versioned, ordered prize table. The declared order is significant: it
/// fixes which cumulative band each prize occupies, so reordering prizes
/// changes outcomes even when no weight changes. Published tables are
/// immutable; a replacement table gets a new version.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PrizeTable {
    pub version: String,
    pub prizes: Vec<Prize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrizeTableError {
    Empty,
    ZeroWeight(String),
    MissingAmount(String),
    MissingDownload(String),
}

impl std::fmt::Display for PrizeTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "prize table has no prizes"),
            Self::ZeroWeight(name) => write!(f, "prize '{}' has zero weight", name),
            Self::MissingAmount(name) => write!(f, "currency prize '{}' has no amount", name),
            Self::MissingDownload(name) => write!(f, "prize '{}' has no download reference", name),
        }
    }
}

impl std::error::Error for PrizeTableError {}

impl PrizeTable {
    pub fn total_weight(&self) -> u64 {
        self.prizes.iter().map(|p| u64::from(p.weight)).sum()
    }

    /// Checked at service startup. A table that fails validation must never
    /// reach the draw path.
    pub fn validate(&self) -> Result<(), PrizeTableError> {
        if self.prizes.is_empty() {
            return Err(PrizeTableError::Empty);
        }
        for prize in &self.prizes {
            if prize.weight == 0 {
                return Err(PrizeTableError::ZeroWeight(prize.name.clone()));
            }
            match prize.kind {
                PrizeKind::Currency if prize.amount.unwrap_or(0) <= 0 => {
                    return Err(PrizeTableError::MissingAmount(prize.name.clone()));
                }
                PrizeKind::Config | PrizeKind::Script if prize.download_ref.is_none() => {
                    return Err(PrizeTableError::MissingDownload(prize.name.clone()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resolves a roll in `[1, total_weight]` to a prize: the first prize
    /// whose cumulative weight is >= the roll.
    pub fn draw_at(&self, roll: u64) -> &Prize {
        debug_assert!(roll >= 1 && roll <= self.total_weight());
        let mut cumulative = 0u64;
        for prize in &self.prizes {
            cumulative += u64::from(prize.weight);
            if roll <= cumulative {
                return prize;
            }
        }
        // Unreachable on a validated table with an in-range roll.
        &self.prizes[self.prizes.len() - 1]
    }

    /// Draws one prize with a uniformly distributed roll from `rng`.
    /// Deterministic under a seeded generator.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> &Prize {
        let roll = rng.gen_range(1..=self.total_weight());
        self.draw_at(roll)
    }
}

/// The v1 production table: total weight 100, declared order fixed.
pub static DEFAULT_PRIZE_TABLE: Lazy<PrizeTable> = Lazy::new(|| PrizeTable {
    version: "v1".to_string(),
    prizes: vec![
        Prize {
            name: "NEVERLOSE Cheat".to_string(),
            kind: PrizeKind::Cheat,
            weight: 2,
            amount: None,
            download_ref: None,
        },
        Prize {
            name: "500 NLE".to_string(),
            kind: PrizeKind::Currency,
            weight: 5,
            amount: Some(500),
            download_ref: None,
        },
        Prize {
            name: "Premium Config".to_string(),
            kind: PrizeKind::Config,
            weight: 8,
            amount: None,
            download_ref: Some(CONFIG_DOWNLOAD_URL.to_string()),
        },
        Prize {
            name: "Lua Script".to_string(),
            kind: PrizeKind::Script,
            weight: 10,
            amount: None,
            download_ref: Some(SCRIPT_DOWNLOAD_URL.to_string()),
        },
        Prize {
            name: "250 NLE".to_string(),
            kind: PrizeKind::Currency,
            weight: 15,
            amount: Some(250),
            download_ref: None,
        },
        Prize {
            name: "100 NLE".to_string(),
            kind: PrizeKind::Currency,
            weight: 20,
            amount: Some(100),
            download_ref: None,
        },
        Prize {
            name: "Try Again".to_string(),
            kind: PrizeKind::Retry,
            weight: 40,
            amount: None,
            download_ref: None,
        },
    ],
});

// === API Types ===

/// Request body shared by every roulette endpoint. `user_id` arrives
/// already authenticated by the platform layer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RouletteRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserDataResponse {
    pub balance: i64,
    pub daily_available: bool,
    pub next_spin_time: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SpinResponse {
    pub success: bool,
    pub prize_name: String,
    #[serde(rename = "prize_type")]
    pub prize_kind: PrizeKind,
    pub spin_time: String,
    pub next_spin_time: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntryResponse {
    pub date: String,
    pub prize: String,
    #[serde(rename = "type")]
    pub kind: PrizeKind,
    pub description: String,
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
}
