//! Asynchronous outcome vocabulary
//!
//! [`Signal`] is the message type of one-shot sequences: exactly one
//! `Loading`, then exactly one terminal `Success` or `Error`, then the stream
//! closes. [`Feed`] is the message type of listener-driven streams, which
//! emit any number of `Update`s and end only when cancelled.

use crate::error::app_error::AppError;
use crate::error::kind::ErrorKind;

/// One-shot sequence message
#[derive(Debug)]
pub enum Signal<T> {
    Loading,
    Success(T),
    Error(AppError),
}

impl<T> Signal<T> {
    /// Whether this message ends the sequence
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Loading)
    }

    /// Error kind of a terminal error, if any
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Signal::Error(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// Build the terminal message from a result
    pub fn from_result(result: Result<T, AppError>) -> Self {
        match result {
            Ok(value) => Signal::Success(value),
            Err(err) => Signal::Error(err),
        }
    }
}

/// Listener-driven stream message
#[derive(Debug)]
pub enum Feed<T> {
    Loading,
    Update(T),
    Error(AppError),
}

impl<T> Feed<T> {
    pub fn update(&self) -> Option<&T> {
        match self {
            Feed::Update(value) => Some(value),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Feed::Error(err) => Some(err.kind()),
            _ => None,
        }
    }
}

/// Checks that a recorded one-shot sequence honours the ordering contract
///
/// Returns the offending index on violation: a sequence must start with
/// `Loading`, contain exactly one terminal message, and end with it.
pub fn check_sequence<T>(signals: &[Signal<T>]) -> Result<(), usize> {
    match signals.first() {
        Some(Signal::Loading) => {}
        _ => return Err(0),
    }
    let mut terminal_at = None;
    for (i, signal) in signals.iter().enumerate() {
        if signal.is_terminal() {
            if terminal_at.is_some() {
                return Err(i);
            }
            terminal_at = Some(i);
        } else if terminal_at.is_some() {
            return Err(i);
        }
    }
    match terminal_at {
        Some(_) => Ok(()),
        None => Err(signals.len()),
    }
}
