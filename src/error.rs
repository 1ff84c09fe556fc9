//! [`Error`] is the error type of the crate.

use thiserror::Error;

/// Errors reported by [`ConcurrentMap`](crate::ConcurrentMap) and its components.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// An argument was out of range or absent.
    ///
    /// The operation that reported it made no change.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Resizing a segment failed.
    ///
    /// Never returned from a put or delete; the segment records it instead, see
    /// [`ConcurrentMap::last_redistribution_error`](crate::ConcurrentMap::last_redistribution_error).
    #[error("redistribution fault: {0}")]
    Redistribution(String),
}

impl Error {
    pub(crate) fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub(crate) fn redistribution<S: Into<String>>(msg: S) -> Self {
        Error::Redistribution(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::Error;

    #[test]
    fn display() {
        assert_eq!(
            Error::invalid_input("element is absent").to_string(),
            "invalid input: element is absent"
        );
        assert_eq!(
            Error::redistribution("too many buckets").to_string(),
            "redistribution fault: too many buckets"
        );
    }
}
