use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::timestamp_secs;
use types::pow::PowChallengeResp;

use crate::{AppResult, AppState};

/// Hand out a fresh challenge, or an empty 204 when admission control is
/// switched off so clients know not to solve anything.
pub(crate) async fn issue_challenge(State(state): State<AppState>) -> AppResult<Response> {
    match state.pow.issue(timestamp_secs()) {
        Some(issued) => Ok(Json(PowChallengeResp {
            challenge: issued.challenge,
            difficulty: issued.difficulty,
            expires_at: issued.expires_at,
        })
        .into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
