use thiserror::Error;

/// Everything a request can fail with. Each variant maps to a stable wire
/// identifier surfaced in the JSON `error` field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("rate limited")]
    RateLimited,

    #[error("proof of work required")]
    PowRequired,
    #[error("proof of work challenge not recognized")]
    PowInvalid,
    #[error("proof of work challenge expired")]
    PowExpired,
    #[error("proof of work challenge already redeemed")]
    PowUsed,
    #[error("proof of work below required difficulty")]
    PowInsufficient,

    #[error("request body is not valid")]
    MalformedBody,
    #[error("payload exceeds the size limit")]
    TooLarge,
    #[error("expiration out of range")]
    BadExpiration,
    #[error("required field missing")]
    MissingField,

    #[error("delete token does not match")]
    InvalidToken,
    #[error("delete authenticator does not match")]
    InvalidAuth,

    #[error("not found")]
    NotFound,
    #[error("gone")]
    Gone,
    #[error("chat is disabled for this paste")]
    ChatDisabled,

    #[error("internal error")]
    Internal,
    #[error("unavailable")]
    Unavailable,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::RateLimited => "rate_limited",
            ApiError::PowRequired => "pow_required",
            ApiError::PowInvalid => "pow_invalid",
            ApiError::PowExpired => "pow_expired",
            ApiError::PowUsed => "pow_used",
            ApiError::PowInsufficient => "pow_insufficient",
            ApiError::MalformedBody => "malformed_body",
            ApiError::TooLarge => "too_large",
            ApiError::BadExpiration => "bad_expiration",
            ApiError::MissingField => "missing_field",
            ApiError::InvalidToken => "invalid_token",
            ApiError::InvalidAuth => "invalid_auth",
            ApiError::NotFound => "not_found",
            ApiError::Gone => "gone",
            ApiError::ChatDisabled => "chat_disabled",
            ApiError::Internal => "internal",
            ApiError::Unavailable => "unavailable",
        }
    }
}
