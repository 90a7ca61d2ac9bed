use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Database error: {message}")]
    Database { message: String },

    /// A stored snapshot could not be decoded
    #[error("Corrupt cached schedule: {message}")]
    Corrupt { message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database {
            message: err.to_string(),
        }
    }
}
