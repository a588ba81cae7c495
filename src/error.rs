use std::{io, path::PathBuf};

use thiserror::Error;

use crate::ms2::Ms2Error;

#[derive(Debug, Error)]
pub enum ScanSelectError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("Scan {scan} was not found in {}", path.display())]
    MissingScan { scan: u64, path: PathBuf },
    #[error("Failed to parse MS2 file: {0}")]
    Ms2(
        #[from]
        #[source]
        Ms2Error,
    ),
    #[error("An IO error occurred: {0}")]
    Io(
        #[from]
        #[source]
        io::Error,
    ),
}

impl From<ScanSelectError> for io::Error {
    fn from(value: ScanSelectError) -> Self {
        match value {
            ScanSelectError::Io(e) => e,
            ScanSelectError::UnsupportedFormat(_) => {
                io::Error::new(io::ErrorKind::Unsupported, value)
            }
            ScanSelectError::MissingScan { .. } => io::Error::new(io::ErrorKind::NotFound, value),
            _ => io::Error::new(io::ErrorKind::InvalidInput, value),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanSelectError>;
