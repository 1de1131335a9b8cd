//! Error taxonomy and Result alias for the trading engine.

use thiserror::Error;

/// All errors the engine can surface, spanning broker transport (KIA_*),
/// settings validation (CSM_*), and engine lifecycle (UAG_*/OPM_*) codes.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("token expired or rejected by broker")]
    KiaAuthTokenExpired,

    #[error("broker rejected request as forbidden")]
    KiaAuthForbidden,

    #[error("symbol not found: {0}")]
    KiaQuoteSymbolNotFound(String),

    #[error("duplicate order: {0}")]
    KiaOrderDuplicated(String),

    #[error("rate limited by broker")]
    KiaRateLimited,

    #[error("broker upstream unavailable: {0}")]
    KiaUpstreamUnavailable(String),

    #[error("broker call timed out")]
    KiaApiTimeout,

    #[error("broker response could not be decoded: {0}")]
    KiaResponseInvalid(String),

    #[error("no route configured for service type {0}")]
    KiaRouteNotFound(String),

    #[error("invalid request: {0}")]
    KiaInvalidRequest(String),

    #[error("unmapped broker error: {0}")]
    KiaUnknown(String),

    #[error("watch symbol count out of range: {0}")]
    CsmSymbolCountOutOfRange(usize),

    #[error("watch symbol format invalid: {0}")]
    CsmSymbolFormatInvalid(String),

    #[error("watch symbol duplicated: {0}")]
    CsmSymbolDuplicated(String),

    #[error("mode invalid: {0}")]
    CsmModeInvalid(String),

    #[error("live mode requires explicit confirmation")]
    CsmLiveConfirmRequired,

    #[error("credential field missing: {0}")]
    CsmCredentialRequiredFieldMissing(String),

    #[error("mode switch precondition failed: {0}")]
    CsmModeSwitchPreconditionFailed(String),

    #[error("engine already running")]
    UagEngineAlreadyRunning,

    #[error("illegal order transition: {from} -> {to}")]
    OpmIllegalTransition { from: String, to: String },

    #[error("order submit failed at broker")]
    OpmKiaSubmitFailed,

    #[error("price arithmetic invalid: {0}")]
    InvalidPrice(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("decimal conversion error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether this error kind should be retried by the broker client's
    /// retry policy. Kept on the enum rather than a parallel lookup table.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EngineError::KiaAuthTokenExpired
                | EngineError::KiaRateLimited
                | EngineError::KiaUpstreamUnavailable(_)
                | EngineError::KiaApiTimeout
        )
    }

    /// Stable string code for logs and the (out-of-scope) HTTP envelope.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::KiaAuthTokenExpired => "KIA_AUTH_TOKEN_EXPIRED",
            EngineError::KiaAuthForbidden => "KIA_AUTH_FORBIDDEN",
            EngineError::KiaQuoteSymbolNotFound(_) => "KIA_QUOTE_SYMBOL_NOT_FOUND",
            EngineError::KiaOrderDuplicated(_) => "KIA_ORDER_DUPLICATED",
            EngineError::KiaRateLimited => "KIA_RATE_LIMITED",
            EngineError::KiaUpstreamUnavailable(_) => "KIA_UPSTREAM_UNAVAILABLE",
            EngineError::KiaApiTimeout => "KIA_API_TIMEOUT",
            EngineError::KiaResponseInvalid(_) => "KIA_RESPONSE_INVALID",
            EngineError::KiaRouteNotFound(_) => "KIA_ROUTE_NOT_FOUND",
            EngineError::KiaInvalidRequest(_) => "KIA_INVALID_REQUEST",
            EngineError::KiaUnknown(_) => "KIA_UNKNOWN",
            EngineError::CsmSymbolCountOutOfRange(_) => "CSM_SYMBOL_COUNT_OUT_OF_RANGE",
            EngineError::CsmSymbolFormatInvalid(_) => "CSM_SYMBOL_FORMAT_INVALID",
            EngineError::CsmSymbolDuplicated(_) => "CSM_SYMBOL_DUPLICATED",
            EngineError::CsmModeInvalid(_) => "CSM_MODE_INVALID",
            EngineError::CsmLiveConfirmRequired => "CSM_LIVE_CONFIRM_REQUIRED",
            EngineError::CsmCredentialRequiredFieldMissing(_) => {
                "CSM_CREDENTIAL_REQUIRED_FIELD_MISSING"
            }
            EngineError::CsmModeSwitchPreconditionFailed(_) => {
                "CSM_MODE_SWITCH_PRECONDITION_FAILED"
            }
            EngineError::UagEngineAlreadyRunning => "UAG_ENGINE_ALREADY_RUNNING",
            EngineError::OpmIllegalTransition { .. } => "OPM_ILLEGAL_TRANSITION",
            EngineError::OpmKiaSubmitFailed => "OPM_KIA_SUBMIT_FAILED",
            EngineError::InvalidPrice(_) => "KIA_INVALID_REQUEST",
            EngineError::Persistence(_) => "PRP_STORAGE_ERROR",
            EngineError::Decimal(_) => "PRP_DECIMAL_ERROR",
            EngineError::Transport(_) => "KIA_API_TIMEOUT",
            EngineError::Deserialize(_) => "KIA_RESPONSE_INVALID",
        }
    }
}

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;
