// src/core/errors.rs

//! Defines the primary error type for the entire client.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the client.
///
/// The type is `Clone` so that a single connection failure can be fanned out
/// to every client with a pending operation; `std::io::Error` is wrapped in
/// an `Arc` to make that cheap.
#[derive(Error, Debug)]
pub enum CitrineError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Server rejected the request: {0}")]
    Server(String),

    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("Server did not handle the request: {0}")]
    NotHandled(String),

    #[error("Operation timed out: {0}")]
    OperationTimedOut(String),

    #[error("Subscription dropped: {0}")]
    SubscriptionDropped(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for CitrineError {
    fn clone(&self) -> Self {
        match self {
            CitrineError::Io(e) => CitrineError::Io(Arc::clone(e)),
            CitrineError::ConnectionLost => CitrineError::ConnectionLost,
            CitrineError::Protocol(s) => CitrineError::Protocol(s.clone()),
            CitrineError::Decode(s) => CitrineError::Decode(s.clone()),
            CitrineError::Server(s) => CitrineError::Server(s.clone()),
            CitrineError::NotAuthenticated(s) => CitrineError::NotAuthenticated(s.clone()),
            CitrineError::NotHandled(s) => CitrineError::NotHandled(s.clone()),
            CitrineError::OperationTimedOut(s) => CitrineError::OperationTimedOut(s.clone()),
            CitrineError::SubscriptionDropped(s) => CitrineError::SubscriptionDropped(s.clone()),
        }
    }
}

impl PartialEq for CitrineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CitrineError::Io(e1), CitrineError::Io(e2)) => e1.to_string() == e2.to_string(),
            (CitrineError::Protocol(s1), CitrineError::Protocol(s2)) => s1 == s2,
            (CitrineError::Decode(s1), CitrineError::Decode(s2)) => s1 == s2,
            (CitrineError::Server(s1), CitrineError::Server(s2)) => s1 == s2,
            (CitrineError::NotAuthenticated(s1), CitrineError::NotAuthenticated(s2)) => s1 == s2,
            (CitrineError::NotHandled(s1), CitrineError::NotHandled(s2)) => s1 == s2,
            (CitrineError::OperationTimedOut(s1), CitrineError::OperationTimedOut(s2)) => s1 == s2,
            (CitrineError::SubscriptionDropped(s1), CitrineError::SubscriptionDropped(s2)) => {
                s1 == s2
            }
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for CitrineError {
    fn from(e: std::io::Error) -> Self {
        CitrineError::Io(Arc::new(e))
    }
}
