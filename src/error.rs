use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to encrypt data: {0}")]
    Encrypt(String),

    #[error("Failed to decrypt data - wrong password or corrupt data")]
    Decrypt,

    #[error("Username already exists: {0}")]
    DuplicateUser(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("No active session")]
    NoSession,

    #[error("Storage has not been initialized")]
    NotInitialized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl JournalError {
    /// Authentication failures the UI should answer with a login prompt.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            JournalError::InvalidCredentials | JournalError::DuplicateUser(_)
        )
    }
}

impl From<anyhow::Error> for JournalError {
    fn from(err: anyhow::Error) -> Self {
        JournalError::Unknown(err.to_string())
    }
}
