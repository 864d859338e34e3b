//! Unified error model for document store operations.
//! Every backend fault is classified into one of these kinds at the adapter boundary,
//! so callers can inspect what went wrong without ever seeing a raw transport error.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::store::keys::RowKeyError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DmsError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Precondition { code: String, message: String },
    Timeout { code: String, message: String },
    Connect { code: String, message: String },
    Malformed { code: String, message: String },
    Auth { code: String, message: String },
    Backend { code: String, message: String, status: u16 },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl DmsError {
    pub fn code_str(&self) -> &str {
        match self {
            DmsError::UserInput { code, .. }
            | DmsError::NotFound { code, .. }
            | DmsError::Precondition { code, .. }
            | DmsError::Timeout { code, .. }
            | DmsError::Connect { code, .. }
            | DmsError::Malformed { code, .. }
            | DmsError::Auth { code, .. }
            | DmsError::Backend { code, .. }
            | DmsError::Io { code, .. }
            | DmsError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DmsError::UserInput { message, .. }
            | DmsError::NotFound { message, .. }
            | DmsError::Precondition { message, .. }
            | DmsError::Timeout { message, .. }
            | DmsError::Connect { message, .. }
            | DmsError::Malformed { message, .. }
            | DmsError::Auth { message, .. }
            | DmsError::Backend { message, .. }
            | DmsError::Io { message, .. }
            | DmsError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { DmsError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { DmsError::NotFound { code: code.into(), message: msg.into() } }
    pub fn precondition<S: Into<String>>(code: S, msg: S) -> Self { DmsError::Precondition { code: code.into(), message: msg.into() } }
    pub fn timeout<S: Into<String>>(code: S, msg: S) -> Self { DmsError::Timeout { code: code.into(), message: msg.into() } }
    pub fn connect<S: Into<String>>(code: S, msg: S) -> Self { DmsError::Connect { code: code.into(), message: msg.into() } }
    pub fn malformed<S: Into<String>>(code: S, msg: S) -> Self { DmsError::Malformed { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { DmsError::Auth { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { DmsError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { DmsError::Internal { code: code.into(), message: msg.into() } }

    /// Non-success HTTP status from a backend. 401/403 are reported as `Auth`, 404 as `NotFound`.
    pub fn from_status<S: Into<String>>(service: &str, status: u16, msg: S) -> Self {
        let message = msg.into();
        match status {
            401 | 403 => DmsError::Auth { code: format!("{service}_auth"), message },
            404 => DmsError::NotFound { code: format!("{service}_not_found"), message },
            _ => DmsError::Backend { code: format!("{service}_status"), message, status },
        }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, DmsError::NotFound { .. }) }

    /// Whether retrying the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DmsError::Timeout { .. } | DmsError::Connect { .. } => true,
            DmsError::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Process exit code used by the command line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            DmsError::UserInput { .. } => 2,
            DmsError::NotFound { .. } => 3,
            DmsError::Precondition { .. } => 4,
            DmsError::Timeout { .. } | DmsError::Connect { .. } => 5,
            DmsError::Auth { .. } => 6,
            DmsError::Malformed { .. } | DmsError::Backend { .. } => 7,
            DmsError::Io { .. } => 8,
            DmsError::Internal { .. } => 1,
        }
    }
}

impl Display for DmsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for DmsError {}

pub type DmsResult<T> = Result<T, DmsError>;

impl From<reqwest::Error> for DmsError {
    fn from(err: reqwest::Error) -> Self {
        let msg = err.to_string();
        if err.is_timeout() {
            DmsError::timeout("http_timeout".to_string(), msg)
        } else if err.is_connect() {
            DmsError::connect("http_connect".to_string(), msg)
        } else if err.is_decode() || err.is_body() {
            DmsError::malformed("http_body".to_string(), msg)
        } else if let Some(status) = err.status() {
            DmsError::from_status("http", status.as_u16(), msg)
        } else if err.is_builder() {
            DmsError::user("http_request".to_string(), msg)
        } else {
            DmsError::connect("http_transport".to_string(), msg)
        }
    }
}

impl From<std::io::Error> for DmsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DmsError::not_found("io_not_found".to_string(), err.to_string()),
            std::io::ErrorKind::TimedOut => DmsError::timeout("io_timeout".to_string(), err.to_string()),
            _ => DmsError::io("io_error".to_string(), err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DmsError {
    fn from(err: serde_json::Error) -> Self {
        DmsError::malformed("json".to_string(), err.to_string())
    }
}

impl From<base64::DecodeError> for DmsError {
    fn from(err: base64::DecodeError) -> Self {
        DmsError::malformed("base64".to_string(), err.to_string())
    }
}

impl From<RowKeyError> for DmsError {
    fn from(err: RowKeyError) -> Self {
        DmsError::user("row_key".to_string(), err.to_string())
    }
}
