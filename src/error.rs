//! Defines the error type used throughout the crate.

use std::fmt;

/// Enumerates all the errors that can be reported by this crate.
/// Client implementations (AC, sensor, weather) should map their own
/// failures into one of these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A configuration value was missing or malformed.
    Config(String),

    /// A client trait (`AcClient`, `SensorClient`, `WeatherClient`,
    /// ...) failed to complete a request.
    Transport(String),

    /// `force()` was called with arguments that violate a state
    /// machine precondition. Only reachable from test/manual-override
    /// code, never from normal operation.
    Precondition(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {}", msg),
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
            Error::Precondition(msg) => {
                write!(f, "precondition violation: {}", msg)
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
