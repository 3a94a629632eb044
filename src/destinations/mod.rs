//! Destination naming and classification
//!
//! Destinations are slash-separated paths: `/topic/orders`, `/app/chat/message`.
//! Each segment must match: [a-zA-Z0-9_.-]+
//!
//! The first segment decides how the broker treats the destination:
//! - `/topic/...` and `/queue/...` are broker destinations, fanned out as-is
//! - `/app/...` is handled by the server before anything is broadcast
//! - `/user/...` is scoped to the connection's principal

use std::fmt;
use thiserror::Error;

/// Valid characters for a destination segment
fn is_valid_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Validate a single segment
fn is_valid_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_valid_segment_char)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationError {
    #[error("destination cannot be empty")]
    Empty,

    #[error("destination must start with '/'")]
    MissingLeadingSlash,

    #[error("invalid segment '{0}': must match [a-zA-Z0-9_.-]+")]
    InvalidSegment(String),

    #[error("empty segment in destination")]
    EmptySegment,

    #[error("unknown destination prefix '/{0}'")]
    UnknownPrefix(String),

    #[error("user destination needs a path after '/user'")]
    BareUserPrefix,
}

/// How the broker treats a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    Topic,
    Queue,
    Application,
    User,
}

/// A validated destination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    path: String,
    kind: DestinationKind,
}

impl Destination {
    /// Parse and validate a destination
    pub fn parse(path: &str) -> Result<Self, DestinationError> {
        if path.is_empty() {
            return Err(DestinationError::Empty);
        }

        let Some(rest) = path.strip_prefix('/') else {
            return Err(DestinationError::MissingLeadingSlash);
        };

        let mut segments = rest.split('/');
        let first = segments.next().unwrap_or_default();

        for part in rest.split('/') {
            if part.is_empty() {
                return Err(DestinationError::EmptySegment);
            }

            if !is_valid_segment(part) {
                return Err(DestinationError::InvalidSegment(part.to_string()));
            }
        }

        let kind = match first {
            "topic" => DestinationKind::Topic,
            "queue" => DestinationKind::Queue,
            "app" => DestinationKind::Application,
            "user" => DestinationKind::User,
            other => return Err(DestinationError::UnknownPrefix(other.to_string())),
        };

        if kind == DestinationKind::User && segments.next().is_none() {
            return Err(DestinationError::BareUserPrefix);
        }

        Ok(Self {
            path: path.to_string(),
            kind,
        })
    }

    /// Get the destination as a string slice
    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    /// Path after the first segment (`/app/chat/message` -> `/chat/message`)
    pub fn remainder(&self) -> &str {
        let first_len = self.path[1..].find('/').map(|i| i + 1).unwrap_or(self.path.len());
        &self.path[first_len..]
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}
