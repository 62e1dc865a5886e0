pub const SPIN_COOLDOWN_HOURS: i64 = 24;
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

// Balances are carried in hundredths of one display unit. A fresh account
// starts at 10.00; a "500 NLE" prize credits 500 hundredths (5.00).
pub const STARTING_BALANCE: i64 = 1_000;

pub const CHEAT_KEY_PREFIX: &str = "NL-ROULETTE-";
pub const CHEAT_KEY_LENGTH: usize = 10;

pub const CONFIG_DOWNLOAD_URL: &str = "https://neverlose.cc/roulette/config.zip";
pub const SCRIPT_DOWNLOAD_URL: &str = "https://neverlose.cc/roulette/script.lua";

pub const COOLDOWN_ERROR: &str = "cooldown";
pub const STORAGE_ERROR: &str = "storage_unavailable";
pub const MISSING_USER_ID_ERROR: &str = "No user_id";

pub const CHEAT_WIN_MESSAGE: &str = "You won a 30-day cheat subscription!";
pub const CONFIG_WIN_MESSAGE: &str = "You won the premium config!";
pub const SCRIPT_WIN_MESSAGE: &str = "You won the Lua script!";
pub const RETRY_MESSAGE: &str = "Try again tomorrow!";
