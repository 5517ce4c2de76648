use serde::{Deserialize, Serialize};

use crate::pow::PowSolution;

#[derive(Debug, Deserialize)]
pub struct CreatePasteReq {
    pub ct: String,
    pub iv: String,
    pub meta: CreateMeta,
    pub pow: Option<PowSolution>,
    #[serde(rename = "deleteAuth")]
    pub delete_auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeta {
    pub expire_ts: i64,
    pub mime: Option<String>,
    #[serde(default)]
    pub single_view: bool,
    pub views_allowed: Option<i64>,
    #[serde(default)]
    pub allow_chat: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePasteResp {
    pub id: String,
    /// Cleartext delete token for token-scheme pastes, empty when the client
    /// supplied its own delete authenticator.
    pub delete_token: String,
}

#[derive(Serialize)]
pub struct ReadPasteResp {
    pub ct: String,
    pub iv: String,
    pub meta: PasteMeta,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteMeta {
    pub expire_ts: i64,
    pub mime: String,
    pub single_view: bool,
    pub views_allowed: i64,
    pub allow_chat: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAuthReq {
    pub delete_auth: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteTokenQuery {
    pub token: Option<String>,
}
