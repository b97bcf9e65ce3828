use std::fmt;

/// A call was rejected before any work was scheduled. Positions are 1-based and follow the
/// interpreter's `bad argument #n (...)` convention so a host can re-raise the error verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentError {
    position: usize,
    message: String,
}

impl ArgumentError {
    pub fn new(position: usize, message: impl Into<String>) -> ArgumentError {
        ArgumentError {
            position,
            message: message.into(),
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bad argument #{} ({})", self.position, self.message)
    }
}

impl std::error::Error for ArgumentError {}
