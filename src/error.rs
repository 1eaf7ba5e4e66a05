//local shortcuts

//third-party shortcuts
use serde::{Deserialize, Serialize};

//standard shortcuts
use core::fmt::Debug;

//-------------------------------------------------------------------------------------------------------------------

/// Stable wire-facing error codes. See spec §7.
///
/// These are serialized as SCREAMING_SNAKE_CASE strings and must never be renumbered or removed once shipped to
/// clients; add new variants, never repurpose old ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode
{
    AuthRequired,
    Unauthorized,
    Forbidden,
    ValidationError,
    InvalidPayload,
    ContentTooLong,
    MessageNotFound,
    InvalidTransition,
    RoomReadNotSupported,
    NotAMember,
    InvalidLastMessageId,
    InternalError,
    RateLimited,
    Backpressure,
    RecipientBufferFull,
    VersionMismatch,
    UnsupportedFormat,
    HelloRequired,
    UnknownType,
}

//-------------------------------------------------------------------------------------------------------------------

/// Internal result type returned by service-layer calls.
///
/// Services never throw; they return this record and handlers translate it into the outbound NACK/ERROR envelope
/// (spec §7, "Propagation").
#[derive(Debug, Clone)]
pub struct ServiceError
{
    pub code: ErrorCode,
    pub message: String,
}

impl ServiceError
{
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self
    {
        Self{ code, message: message.into() }
    }
}

impl std::fmt::Display for ServiceError
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

pub type ServiceResult<T> = Result<T, ServiceError>;

//-------------------------------------------------------------------------------------------------------------------

/// Errors surfaced by the persistence adapter.
///
/// These never cross the wire directly; the lifecycle service maps them to [`ErrorCode::InternalError`]
/// (`PERSISTENCE_ERROR` in spec terms).
#[derive(Debug, thiserror::Error)]
pub enum DbError
{
    #[error("underlying store error: {0}")]
    Backend(String),
    #[error("unique index violation on {0}")]
    UniqueViolation(&'static str),
    #[error("row not found")]
    NotFound,
}

pub type DbResult<T> = Result<T, DbError>;

//-------------------------------------------------------------------------------------------------------------------
