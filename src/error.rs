use std::fmt;

use thiserror::Error;

use crate::MAX_BIN_RADIUS;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("insertion error: {0}")]
    Insertion(#[from] InsertionError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Errors that can only come from a caller bug, as opposed to data the index cannot hold.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Error::Insertion(InsertionError::AlreadyIndexed(_)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertionError {
    AlreadyIndexed(i32),
    RadiusTooLarge(f32),
    OutOfRange([f32; 3]),
}

impl fmt::Display for InsertionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InsertionError::AlreadyIndexed(index) => {
                write!(f, "invalid element, already indexed at bin {index}")
            }
            InsertionError::RadiusTooLarge(radius) => write!(
                f,
                "element radius {radius} exceeds maximum size of {MAX_BIN_RADIUS}"
            ),
            InsertionError::OutOfRange(position) => write!(
                f,
                "element at {position:?} exceeds range of spatial partition"
            ),
        }
    }
}

impl std::error::Error for InsertionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

pub type Result<T> = std::result::Result<T, Error>;
