//! Status categories carried by every user-reachable error.
//!
//! Each module defines its own `thiserror` enum. What the page-serving
//! layer needs from them is narrower: which response to give and what may
//! be shown to a visitor. [`Categorized`] answers both without the caller
//! matching on every module's variants.

use std::fmt;

/// How a failure should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The named story, picture or size does not exist (404).
    NotFound,
    /// The content exists but is broken; the message is shown as-is (500).
    BadContent,
    /// Storage or environment failure; details stay in the log (500).
    Internal,
}

impl Status {
    pub fn http_code(self) -> u16 {
        match self {
            Status::NotFound => 404,
            Status::BadContent | Status::Internal => 500,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::NotFound => "not found",
            Status::BadContent => "content error",
            Status::Internal => "internal error",
        };
        f.write_str(label)
    }
}

/// Message shown in place of internal error details.
pub const INTERNAL_MESSAGE: &str = "An internal error occurred";

pub trait Categorized: std::error::Error {
    fn status(&self) -> Status;

    /// Text safe to show to a visitor.
    fn public_message(&self) -> String {
        match self.status() {
            Status::Internal => INTERNAL_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }
}

/// Render an error and its whole `source()` chain on one line, for logs.
pub fn chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut next = err.source();
    while let Some(e) = next {
        out.push_str(": ");
        out.push_str(&e.to_string());
        next = e.source();
    }
    out
}
