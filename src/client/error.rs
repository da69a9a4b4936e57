//! Error types for resource client operations

use std::fmt;

use crate::MalformedPayload;

/// Errors from a single-shot fetch.
///
/// All variants except [`FetchError::NotFound`] are transient: the next poll
/// cycle retries by construction. `NotFound` during the startup probe means
/// a misconfigured resource path and is fatal there.
#[derive(Debug)]
pub enum FetchError {
    /// Sending or receiving on the socket failed
    Io(std::io::Error),

    /// No response arrived within the request timeout
    Timeout,

    /// The server does not know the requested resource path
    NotFound,

    /// The server answered with a non-success response code
    ErrorResponse(String),

    /// The response payload could not be decoded into a scalar value
    Payload(MalformedPayload),

    /// The response was not a decodable protocol message
    Protocol(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Io(err) => write!(f, "I/O error: {err}"),
            FetchError::Timeout => write!(f, "request timed out"),
            FetchError::NotFound => write!(f, "no such resource"),
            FetchError::ErrorResponse(code) => write!(f, "error response: {code}"),
            FetchError::Payload(err) => write!(f, "{err}"),
            FetchError::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Io(err) => Some(err),
            FetchError::Payload(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err)
    }
}

/// Errors while establishing an observation. Fatal to the one observer that
/// hit them; sibling tasks are unaffected.
#[derive(Debug)]
pub enum SubscribeError {
    /// Sending or receiving on the socket failed
    Io(std::io::Error),

    /// The server never answered the registration request
    Timeout,

    /// The server answered but did not accept the observation
    Rejected(String),

    /// The initial response payload could not be decoded
    Payload(MalformedPayload),

    /// The response was not a decodable protocol message
    Protocol(String),
}

impl fmt::Display for SubscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscribeError::Io(err) => write!(f, "I/O error: {err}"),
            SubscribeError::Timeout => write!(f, "registration timed out"),
            SubscribeError::Rejected(reason) => write!(f, "observation rejected: {reason}"),
            SubscribeError::Payload(err) => write!(f, "{err}"),
            SubscribeError::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for SubscribeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubscribeError::Io(err) => Some(err),
            SubscribeError::Payload(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SubscribeError {
    fn from(err: std::io::Error) -> Self {
        SubscribeError::Io(err)
    }
}
