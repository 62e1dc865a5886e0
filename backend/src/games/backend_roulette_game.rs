use axum::{
    routing::post,
    Router,
    Json,
    extract::State,
    debug_handler,
};
use shared::shared_roulette_game::{
    ClearHistoryResponse, HistoryEntryResponse, RouletteRequest, SpinResponse, UserDataResponse,
};

use crate::error::RouletteError;
use crate::models::{rfc3339, HistoryEntry, SpinOutcome};
use crate::services::roulette_service::Eligibility;
use crate::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/user-data", post(user_data))
        .route("/spin-roulette", post(spin_roulette))
        .route("/get-history", post(get_history))
        .route("/clear-history", post(clear_history))
}

// `user_id` is authenticated upstream by the platform layer; here it only
// has to be present.
fn require_user_id(request: &RouletteRequest) -> Result<&str, RouletteError> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(RouletteError::MissingUserId);
    }
    Ok(user_id)
}

#[debug_handler]
async fn user_data(
    State(state): State<AppState>,
    Json(request): Json<RouletteRequest>,
) -> Result<Json<UserDataResponse>, RouletteError> {
    let user_id = require_user_id(&request)?;
    let (account, eligibility) = state.service.status(user_id).await?;

    let next_spin_time = match eligibility {
        Eligibility::Eligible => None,
        Eligibility::Cooldown { next_spin_time, .. } => Some(rfc3339(next_spin_time)),
    };

    Ok(Json(UserDataResponse {
        balance: account.balance,
        daily_available: next_spin_time.is_none(),
        next_spin_time,
    }))
}

#[debug_handler]
async fn spin_roulette(
    State(state): State<AppState>,
    Json(request): Json<RouletteRequest>,
) -> Result<Json<SpinResponse>, RouletteError> {
    let user_id = require_user_id(&request)?;
    let outcome = state.service.spin(user_id).await?;

    if outcome.success {
        tracing::info!(
            "🎰 ROULETTE: User {} won '{}' ({})",
            user_id,
            outcome.prize_name,
            outcome.prize_kind
        );
    } else {
        tracing::info!("🎰 ROULETTE: User {} rolled a retry", user_id);
    }

    Ok(Json(spin_response(outcome)))
}

#[debug_handler]
async fn get_history(
    State(state): State<AppState>,
    Json(request): Json<RouletteRequest>,
) -> Result<Json<Vec<HistoryEntryResponse>>, RouletteError> {
    let user_id = require_user_id(&request)?;
    let mut entries = state.service.history(user_id).await?;
    // Stored oldest-first; the app shows the most recent win on top.
    entries.reverse();
    Ok(Json(entries.into_iter().map(history_response).collect()))
}

#[debug_handler]
async fn clear_history(
    State(state): State<AppState>,
    Json(request): Json<RouletteRequest>,
) -> Result<Json<ClearHistoryResponse>, RouletteError> {
    let user_id = require_user_id(&request)?;
    state.service.clear_history(user_id).await?;
    tracing::info!("🧹 ROULETTE: User {} cleared their history", user_id);
    Ok(Json(ClearHistoryResponse { success: true }))
}

fn spin_response(outcome: SpinOutcome) -> SpinResponse {
    SpinResponse {
        success: outcome.success,
        prize_name: outcome.prize_name,
        prize_kind: outcome.prize_kind,
        spin_time: rfc3339(outcome.spin_time),
        next_spin_time: rfc3339(outcome.next_spin_time),
        message: outcome.message,
        amount: outcome.amount,
        new_balance: outcome.new_balance,
        key: outcome.key,
        download_url: outcome.download_url,
    }
}

fn history_response(entry: HistoryEntry) -> HistoryEntryResponse {
    HistoryEntryResponse {
        date: rfc3339(entry.spun_at),
        prize: entry.prize_name,
        kind: entry.prize_kind,
        description: entry.description,
        success: entry.success,
    }
}
