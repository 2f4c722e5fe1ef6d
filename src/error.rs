//! Error taxonomy shared by every pipeline stage.
//!
//! Every fallible operation returns [`Result`]. The [`ErrorKind`] set is closed;
//! `NoMatch` is the internal backtracking signal and must be converted by the last
//! alternative of a chain before it reaches a caller outside the crate.

use std::fmt;

use thiserror::Error;

use crate::source::SourceLocation;

/// Closed set of result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    MalformedInput,
    NotImplemented,
    NotSupported,
    OutOfBounds,
    NoMatch,
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::MalformedInput => "malformed input",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::OutOfBounds => "out of bounds",
            ErrorKind::NoMatch => "no match",
            ErrorKind::InternalError => "internal error",
        };
        f.write_str(text)
    }
}

/// A failure with an optional source location and a human-readable message.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct Error {
    pub kind: ErrorKind,
    pub location: Option<SourceLocation>,
    pub message: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}: {}", loc, self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, location: Option<SourceLocation>, message: impl Into<String>) -> Self {
        Error {
            kind,
            location,
            message: message.into(),
        }
    }

    pub fn malformed(location: impl Into<Option<SourceLocation>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedInput, location.into(), message)
    }

    pub fn not_found(location: impl Into<Option<SourceLocation>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, location.into(), message)
    }

    pub fn not_implemented(location: impl Into<Option<SourceLocation>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, location.into(), message)
    }

    pub fn not_supported(location: impl Into<Option<SourceLocation>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, location.into(), message)
    }

    pub fn out_of_bounds(location: impl Into<Option<SourceLocation>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfBounds, location.into(), message)
    }

    pub fn no_match(location: impl Into<Option<SourceLocation>>) -> Self {
        Self::new(ErrorKind::NoMatch, location.into(), "no alternative matched")
    }

    /// Invariant violation inside the compiler itself.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, None, message)
    }

    pub fn is_no_match(&self) -> bool {
        self.kind == ErrorKind::NoMatch
    }

    /// Programmer-error tier. Everything else is reportable to the end user.
    pub fn is_internal(&self) -> bool {
        self.kind == ErrorKind::InternalError
    }
}

/// Helpers for alternation chains built on `NoMatch`.
pub trait ResultExt<T> {
    /// Turns a trailing `NoMatch` into a user-facing error; other errors pass through.
    fn or_else_no_match<F>(self, f: F) -> Result<T>
    where
        F: FnOnce(Error) -> Error;

    /// `Ok(None)` on `NoMatch`, for optional alternatives.
    fn optional(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn or_else_no_match<F>(self, f: F) -> Result<T>
    where
        F: FnOnce(Error) -> Error,
    {
        match self {
            Err(e) if e.is_no_match() => Err(f(e)),
            other => other,
        }
    }

    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_no_match() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbol_table::GlobalSymbol as Symbol;

    #[test]
    fn test_no_match_conversion() {
        let r: Result<()> = Err(Error::no_match(None));
        let converted = r.or_else_no_match(|e| Error::malformed(e.location, "expected literal"));
        assert_eq!(converted.unwrap_err().kind, ErrorKind::MalformedInput);

        let r: Result<()> = Err(Error::not_found(None, "x"));
        let kept = r.or_else_no_match(|_| Error::internal("unreachable"));
        assert_eq!(kept.unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_display_with_location() {
        let loc = SourceLocation::new(Symbol::new("a.c"), 3, 7);
        let err = Error::malformed(loc, "unexpected token");
        assert_eq!(err.to_string(), "a.c:3:7: malformed input: unexpected token");
        assert!(!err.is_internal());
        assert!(Error::internal("bad").is_internal());
    }
}
