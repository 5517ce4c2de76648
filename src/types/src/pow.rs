use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowChallengeResp {
    pub challenge: String,
    pub difficulty: u32,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct PowSolution {
    pub challenge: String,
    pub nonce: Nonce,
}

/// Clients send the nonce either as a JSON number or a string; the digest is
/// computed over its ASCII form either way.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Nonce {
    Int(u64),
    Str(String),
}

impl Nonce {
    pub fn to_ascii(&self) -> String {
        match self {
            Nonce::Int(n) => n.to_string(),
            Nonce::Str(s) => s.clone(),
        }
    }
}
