//! Conditions that abort the encoding of a single edge

use crate::cfa::FileLocation;

/// Why an edge could not be encoded. None of these poison the converter: the caller may continue
/// with other edges, or decide to give up on the whole path.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// A construct the type or expression model cannot interpret
    #[error("Unrecognized C code{}: {message}", located(.location))]
    UnrecognizedCode {
        message: String,
        location: Option<FileLocation>,
    },
    /// A recognized construct that is deliberately not modelled
    #[error("Unsupported feature{}: {message}", located(.location))]
    UnsupportedCode {
        message: String,
        location: Option<FileLocation>,
    },
    /// The shutdown notifier requested cancellation
    #[error("Encoding interrupted")]
    Interrupted,
}

fn located(location: &Option<FileLocation>) -> String {
    match location {
        Some(l) => format!(" ({})", l),
        None => String::new(),
    }
}

impl EncodingError {
    pub fn unrecognized(message: impl Into<String>) -> Self {
        EncodingError::UnrecognizedCode {
            message: message.into(),
            location: None,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        EncodingError::UnsupportedCode {
            message: message.into(),
            location: None,
        }
    }

    /// Attach `at` as the source location, unless a location is already known
    pub fn at(self, at: &FileLocation) -> Self {
        match self {
            EncodingError::UnrecognizedCode {
                message,
                location: None,
            } => EncodingError::UnrecognizedCode {
                message,
                location: Some(at.clone()),
            },
            EncodingError::UnsupportedCode {
                message,
                location: None,
            } => EncodingError::UnsupportedCode {
                message,
                location: Some(at.clone()),
            },
            e => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, EncodingError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn location_is_attached_once() {
        let first = FileLocation::new("a.c", 3);
        let second = FileLocation::new("b.c", 9);
        let e = EncodingError::unsupported("setjmp").at(&first).at(&second);
        assert_eq!(e.to_string(), "Unsupported feature (a.c:3): setjmp");
        assert_eq!(EncodingError::Interrupted.at(&first), EncodingError::Interrupted);
    }
}
