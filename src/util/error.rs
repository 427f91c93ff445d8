//! Unified error handling for the state machine and its persistence layer.
//! Provides an error type using thiserror so every fallible path in the
//! crate routes through one taxonomy, plus a small helper for recording
//! error counts to prometheus.

use thiserror::Error;

/// Type alias for the crate's universal result type
pub type Result<T> = std::result::Result<T, FsmError>;

/// thiserror enum for all possible errors raised while driving the
/// state machine, talking to storage, or rendering a view.
#[derive(Debug, Error)]
pub enum FsmError {
    #[error("unknown state code: {0}")]
    UnknownState(String),
    #[error("no default state configured")]
    NoDefaultState,
    #[error("duplicate state code registered: {0}")]
    DuplicateState(String),
    #[error("transition chain exceeded max depth of {0}")]
    ChainTooDeep(usize),
    #[error("storage error: {0}")]
    Storage(#[from] StorageErrorKind),
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("static resource not found: {0}")]
    StaticNotFound(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("json serialization error: {0}")]
    SerdeJsonErr(#[from] serde_json::Error),
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("http error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("handler error: {0}")]
    Handler(String),
}

/// Errors specific to a [`crate::persist::StorageBackend`] implementation.
#[derive(Debug, Error)]
pub enum StorageErrorKind {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("transaction error: {0}")]
    Transaction(#[from] sea_orm::TransactionError<sea_orm::DbErr>),
    #[error("context payload was not a json object")]
    MalformedContext,
}

impl From<sea_orm::DbErr> for FsmError {
    fn from(value: sea_orm::DbErr) -> Self {
        Self::Storage(StorageErrorKind::Db(value))
    }
}

impl FsmError {
    /// Builds a [`FsmError::Handler`]: the variant a hook returns when it
    /// rejects its input or otherwise fails on its own terms, as opposed
    /// to a storage or registry failure. Contained by the core per §7 —
    /// logged, context persisted, action consumed, no transition.
    pub fn handler<T: ToString>(text: T) -> Self {
        Self::Handler(text.to_string())
    }

    /// record this error using prometheus error counters, bucketed by
    /// the error's variant name.
    pub fn record_stats(&self) {
        crate::metrics::count_error(self.variant_name());
        log::warn!("fsm error: {}", self);
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Self::UnknownState(_) => "unknown_state",
            Self::NoDefaultState => "no_default_state",
            Self::DuplicateState(_) => "duplicate_state",
            Self::ChainTooDeep(_) => "chain_too_deep",
            Self::Storage(_) => "storage",
            Self::Gateway(_) => "gateway",
            Self::StaticNotFound(_) => "static_not_found",
            Self::IoError(_) => "io",
            Self::SerdeJsonErr(_) => "serde_json",
            Self::ConfigError(_) => "config",
            Self::Hyper(_) => "hyper",
            Self::Handler(_) => "handler",
        }
    }
}
