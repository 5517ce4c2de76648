use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use common::error::ApiError;
use common::timestamp_secs;
use pow::VerifyOutcome;
use storage::paste::{ConsumeOutcome, DeleteOutcome, GetOutcome, InsertOutcome, PasteRow};
use tokio::time::timeout;
use types::paste::{
    CreatePasteReq, CreatePasteResp, DeleteAuthReq, DeleteTokenQuery, PasteMeta, ReadPasteResp,
};

use crate::{check_rate_limit, AppResult, AppState};

/// Id collisions are vanishingly rare at 53^10; a handful of retries is
/// plenty before giving up.
const ID_MINT_ATTEMPTS: u32 = 5;

const READ_DEADLINE: Duration = Duration::from_secs(5);

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_paste))
        .route("/:paste_id", get(read_paste).delete(delete_by_token))
        .route("/:paste_id/delete", post(delete_by_auth))
}

async fn create_paste(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<CreatePasteResp>> {
    check_rate_limit(&state, &headers, addr)?;

    let req: CreatePasteReq =
        serde_json::from_slice(&body).map_err(|_| ApiError::MalformedBody)?;
    let now = timestamp_secs();

    if state.pow.enabled() {
        let solution = req.pow.as_ref().ok_or(ApiError::PowRequired)?;
        match state
            .pow
            .verify(&solution.challenge, &solution.nonce.to_ascii(), now)
        {
            VerifyOutcome::Ok => {}
            VerifyOutcome::Invalid => return Err(ApiError::PowInvalid.into()),
            VerifyOutcome::Expired => return Err(ApiError::PowExpired.into()),
            VerifyOutcome::AlreadyUsed => return Err(ApiError::PowUsed.into()),
            VerifyOutcome::Insufficient => return Err(ApiError::PowInsufficient.into()),
        }
    }

    let ct_bytes = utils::b64_decode(&req.ct).map_err(|_| ApiError::MalformedBody)?;
    if ct_bytes.len() > state.config.paste.max_size_bytes {
        return Err(ApiError::TooLarge.into());
    }
    let iv_bytes = utils::b64_decode(&req.iv).map_err(|_| ApiError::MalformedBody)?;

    let meta = &req.meta;
    if meta.expire_ts <= now || meta.expire_ts > now + state.config.paste.max_expiration_seconds {
        return Err(ApiError::BadExpiration.into());
    }
    let views_allowed = meta.views_allowed.unwrap_or(1);
    if views_allowed != 1 {
        // Multi-view counters are not supported; unlimited reads come from
        // singleView=false.
        return Err(ApiError::MalformedBody.into());
    }
    let mime = meta
        .mime
        .clone()
        .unwrap_or_else(|| "text/plain".to_string());
    if mime.len() > 255 {
        return Err(ApiError::MalformedBody.into());
    }

    // Scheme P adopts the client authenticator; Scheme T mints a token that
    // is returned exactly once. Either way only a peppered hash is stored.
    let (delete_token, proof_bytes) = match &req.delete_auth {
        Some(auth) => {
            let bytes = utils::b64_decode(auth).map_err(|_| ApiError::MalformedBody)?;
            if bytes.is_empty() {
                return Err(ApiError::MissingField.into());
            }
            (String::new(), bytes)
        }
        None => {
            let (encoded, raw) = utils::new_delete_token();
            (encoded, raw.to_vec())
        }
    };
    let delete_auth_hash = utils::delete_auth_hash(&state.config.pepper, &proof_bytes);

    for _ in 0..ID_MINT_ATTEMPTS {
        let row = PasteRow {
            id: utils::new_paste_id(state.config.paste.id_length),
            ct: utils::b64_encode(&ct_bytes),
            iv: utils::b64_encode(&iv_bytes),
            mime: mime.clone(),
            expire_ts: meta.expire_ts,
            single_view: meta.single_view,
            views_allowed,
            allow_chat: meta.allow_chat,
            delete_auth_hash: delete_auth_hash.to_vec(),
            created_ts: now,
        };
        match storage::paste::insert(&state.pool, &row).await? {
            InsertOutcome::Inserted => {
                return Ok(Json(CreatePasteResp {
                    id: row.id,
                    delete_token,
                }))
            }
            InsertOutcome::IdConflict => continue,
        }
    }

    tracing::error!("paste id minting kept colliding after {ID_MINT_ATTEMPTS} attempts");
    Err(ApiError::Internal.into())
}

async fn read_paste(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(paste_id): Path<String>,
) -> AppResult<Json<ReadPasteResp>> {
    check_rate_limit(&state, &headers, addr)?;

    let now = timestamp_secs();
    let outcome = timeout(READ_DEADLINE, storage::paste::consume(&state.pool, &paste_id, now))
        .await
        .map_err(|_| ApiError::Unavailable)??;

    match outcome {
        ConsumeOutcome::Served(row) => Ok(Json(ReadPasteResp {
            ct: row.ct,
            iv: row.iv,
            meta: PasteMeta {
                expire_ts: row.expire_ts,
                mime: row.mime,
                single_view: row.single_view,
                views_allowed: row.views_allowed,
                allow_chat: row.allow_chat,
            },
        })),
        ConsumeOutcome::NotFound => Err(ApiError::NotFound.into()),
        ConsumeOutcome::Gone => Err(ApiError::Gone.into()),
    }
}

async fn delete_by_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(paste_id): Path<String>,
    Query(query): Query<DeleteTokenQuery>,
) -> AppResult<StatusCode> {
    check_rate_limit(&state, &headers, addr)?;

    let token = query.token.ok_or(ApiError::MissingField)?;
    let token_bytes = utils::b64_decode(&token).map_err(|_| ApiError::MalformedBody)?;
    verify_and_delete(&state, &paste_id, &token_bytes, ApiError::InvalidToken).await
}

async fn delete_by_auth(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(paste_id): Path<String>,
    body: Bytes,
) -> AppResult<StatusCode> {
    check_rate_limit(&state, &headers, addr)?;

    let req: DeleteAuthReq = serde_json::from_slice(&body).map_err(|_| ApiError::MalformedBody)?;
    if req.delete_auth.is_empty() {
        return Err(ApiError::MissingField.into());
    }
    let auth_bytes =
        utils::b64_decode(&req.delete_auth).map_err(|_| ApiError::MalformedBody)?;
    if auth_bytes.is_empty() {
        return Err(ApiError::MissingField.into());
    }
    verify_and_delete(&state, &paste_id, &auth_bytes, ApiError::InvalidAuth).await
}

/// Shared tail of both delete schemes: hash the presented proof with the
/// pepper and compare constant-time against the stored hash.
async fn verify_and_delete(
    state: &AppState,
    paste_id: &str,
    proof: &[u8],
    mismatch: ApiError,
) -> AppResult<StatusCode> {
    let now = timestamp_secs();
    let row = match storage::paste::get(&state.pool, paste_id, now).await? {
        GetOutcome::Found(row) => row,
        GetOutcome::NotFound => return Err(ApiError::NotFound.into()),
        GetOutcome::Gone => return Err(ApiError::Gone.into()),
    };

    let presented = utils::delete_auth_hash(&state.config.pepper, proof);
    if !utils::constant_time_eq(&presented, &row.delete_auth_hash) {
        return Err(mismatch.into());
    }

    match storage::paste::delete(&state.pool, paste_id).await? {
        DeleteOutcome::Deleted => Ok(StatusCode::NO_CONTENT),
        DeleteOutcome::NotFound => Err(ApiError::NotFound.into()),
    }
}
