use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{message}")]
    App {
        message: String,
        login_required: bool,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NavError {
    /// Application-level error carried inside a successful HTTP response.
    pub fn app(message: impl Into<String>, login_required: bool) -> Self {
        NavError::App {
            message: message.into(),
            login_required,
        }
    }
}

impl From<reqwest::Error> for NavError {
    fn from(err: reqwest::Error) -> Self {
        NavError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
