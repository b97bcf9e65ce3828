use std::fmt;
use std::io;

use netbridge::prelude::ArgumentError;

#[derive(Debug)]
pub enum Error {
    /// A dispatch call was rejected synchronously. No operation id was allocated.
    Argument(ArgumentError),
    /// The bridge is switched off in the configuration.
    Disabled,
    HandleClosed,
    NotOpen,
    Tls(native_tls::Error),
    Io(io::Error),
    InvalidConfig(toml::de::Error),
    NoConfigDirectory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Error::*;
        match self {
            Argument(err) => write!(f, "{}", err),
            Disabled => write!(f, "Network access is disabled"),
            HandleClosed => write!(f, "Handle is closed"),
            NotOpen => write!(f, "Connection is not open"),
            Tls(err) => write!(f, "Failed to set up TLS: {}", err),
            Io(err) => write!(f, "{}", err),
            InvalidConfig(err) => write!(f, "Invalid config file: {}", err),
            NoConfigDirectory => write!(f, "Couldn't find a config directory"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ArgumentError> for Error {
    fn from(error: ArgumentError) -> Self {
        Error::Argument(error)
    }
}

impl From<native_tls::Error> for Error {
    fn from(error: native_tls::Error) -> Self {
        Error::Tls(error)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::InvalidConfig(error)
    }
}

/// Why a transport operation failed. Only ever surfaces as the message of a failure event.
#[derive(Debug)]
pub(crate) enum TransportError {
    UnsupportedScheme(String),
    Request(hyper::http::Error),
    Http(hyper::Error),
    Websocket(tungstenite::Error),
    InvalidHeader(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::TransportError::*;
        match self {
            UnsupportedScheme(scheme) => write!(f, "Unsupported scheme '{}'", scheme),
            Request(err) => write!(f, "Invalid request: {}", err),
            Http(err) => write!(f, "{}", err),
            Websocket(err) => write!(f, "{}", err),
            InvalidHeader(name) => write!(f, "Invalid header '{}'", name),
        }
    }
}

impl From<hyper::http::Error> for TransportError {
    fn from(error: hyper::http::Error) -> Self {
        TransportError::Request(error)
    }
}

impl From<hyper::Error> for TransportError {
    fn from(error: hyper::Error) -> Self {
        TransportError::Http(error)
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(error: tungstenite::Error) -> Self {
        TransportError::Websocket(error)
    }
}
