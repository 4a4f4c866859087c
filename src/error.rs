use std::fmt::Formatter;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Setup(String),
    Rpc(reqwest::Error),
    Ledger { code: i64, message: String },
    Channel { status: u16, body: String },
    BadResponse(String),
    Json(serde_json::Error),
    Io(std::io::Error),
    Unknown(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Setup(e) => write!(f, "setup failed: {}", e),
            Error::Rpc(e) => write!(f, "rpc transport error: {}", e),
            Error::Ledger { code, message } => write!(f, "ledger error {}: {}", code, message),
            Error::Channel { status, body } => write!(f, "channel error {}: {}", status, body),
            Error::BadResponse(e) => write!(f, "unexpected response shape: {}", e),
            Error::Json(e) => write!(f, "json error: {}", e),
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Unknown(e) => write!(f, "a unknown error happened: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Rpc(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Rpc(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
