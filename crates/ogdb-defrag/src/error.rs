use ogdb_format::FormatError;
use ogdb_marshal::MarshalError;
use ogdb_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefragError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("marshal error: {0}")]
    Marshal(#[from] MarshalError),

    #[error("invalid defrag configuration: {0}")]
    Config(String),
}

pub type DefragResult<T> = Result<T, DefragError>;
