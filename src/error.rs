use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open {0:?}")]
    MissingFile(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("unknown epoch: {0}")]
    UnknownEpoch(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("csv error: {0}")]
    Csv(String),
}

pub type Result<T> = std::result::Result<T, Error>;
