use std::fmt;

use crate::surface::SurfaceError;

#[derive(Debug)]
pub enum ReportError {
    /// Results and images sequences disagree in length, or the input is
    /// otherwise structurally unusable.
    InputShape(String),
    InvalidConfiguration(String),
    /// The drawing surface failed to produce the final artifact. Fatal: no
    /// partial document is returned.
    Serialization(String),
    Io(std::io::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::InputShape(message) => {
                write!(f, "invalid input shape: {}", message)
            }
            ReportError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ReportError::Serialization(message) => {
                write!(f, "report serialization failed: {}", message)
            }
            ReportError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ReportError {
    fn from(value: std::io::Error) -> Self {
        ReportError::Io(value)
    }
}

impl From<SurfaceError> for ReportError {
    fn from(value: SurfaceError) -> Self {
        ReportError::Serialization(value.to_string())
    }
}
