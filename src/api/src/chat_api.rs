use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use common::error::ApiError;
use common::timestamp_secs;
use storage::chat::AppendOutcome;
use types::chat::{AppendMessageReq, AppendMessageResp, ListMessagesResp, MessageItem};

use crate::{check_rate_limit, AppResult, AppState};

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/:paste_id/messages", post(append_message).get(list_messages))
}

async fn append_message(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(paste_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<AppendMessageResp>> {
    check_rate_limit(&state, &headers, addr)?;

    let req: AppendMessageReq =
        serde_json::from_slice(&body).map_err(|_| ApiError::MalformedBody)?;
    let ct_bytes = utils::b64_decode(&req.ct).map_err(|_| ApiError::MalformedBody)?;
    if ct_bytes.len() > state.config.chat.max_message_size_bytes {
        return Err(ApiError::TooLarge.into());
    }
    let iv_bytes = utils::b64_decode(&req.iv).map_err(|_| ApiError::MalformedBody)?;

    let outcome = storage::chat::append(
        &state.pool,
        &paste_id,
        &utils::b64_encode(&ct_bytes),
        &utils::b64_encode(&iv_bytes),
        timestamp_secs(),
        state.config.chat.max_messages_per_paste,
    )
    .await?;

    match outcome {
        AppendOutcome::Appended(count) => Ok(Json(AppendMessageResp { count })),
        AppendOutcome::ParentNotFound => Err(ApiError::NotFound.into()),
        AppendOutcome::ChatDisabled => Err(ApiError::ChatDisabled.into()),
    }
}

async fn list_messages(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(paste_id): Path<String>,
) -> AppResult<Json<ListMessagesResp>> {
    check_rate_limit(&state, &headers, addr)?;

    match storage::chat::list(&state.pool, &paste_id, timestamp_secs()).await? {
        Some(rows) => Ok(Json(ListMessagesResp {
            messages: rows
                .into_iter()
                .map(|row| MessageItem {
                    ct: row.ct,
                    iv: row.iv,
                    created_ts: row.created_ts,
                })
                .collect(),
        })),
        None => Err(ApiError::NotFound.into()),
    }
}
