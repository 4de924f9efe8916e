//! `glacierdb-http` is the resilient HTTP session/request engine for the
//! GlacierDB query service.
//!
//! It owns the parts of a driver that have to be right: token lifecycle and
//! automatic session renewal, retryable-error classification with
//! decorrelated-jitter backoff, long-running-operation polling, and
//! per-attempt URL construction with fresh idempotency tokens. The SQL
//! statement layer sits on top of [`Connection::request`] and
//! [`Connection::submit_query`].

pub mod contract;

mod backoff;
mod encode;
mod error;
mod headers;
mod options;
mod session;
mod transport;
mod wire;

pub use backoff::{entropy_u64, JitterBackoff};
pub use contract::FieldError;
pub use encode::{encode_value, RequestTarget, DEFAULT_BASE_DOMAIN};
pub use error::GlacierDbError;
pub use headers::AcceptType;
pub use options::{ClientOptions, ConnectParams, StatusCodes};
pub use session::{Connection, LOGIN_PATH, QUERY_PATH, RENEW_SESSION_PATH};
pub use transport::{is_retryable_status, HttpMethod};
pub use wire::{
    AuthData, AuthRequest, ClientEnvironment, QueryRequest, RenewRequest, SessionParameters,
};

pub type Result<T> = std::result::Result<T, GlacierDbError>;
