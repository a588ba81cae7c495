//! Reading and writing the MS2 text format, a line-oriented container for
//! tandem mass spectra.
//!
//! ```text
//! H   Extractor   scan_select
//! S   000100  000100  445.1200
//! I   RTime   12.3400
//! I   NativeID    controllerType=0 controllerNumber=1 scan=100
//! Z   2   889.2327
//! 120.0811 1500.0
//! ```
//!
//! `H` lines form the file header, each `S` line opens a new spectrum followed by its
//! `I` (info) and `Z` (charge state) lines and then its peak list.
mod reader;
mod writer;

use thiserror::Error;

pub use reader::{MS2Reader, MS2ReaderType};
pub use writer::{MS2Writer, MS2WriterType};

/// The mass of a proton, used to convert between m/z and [M+H]+ masses on `Z` lines
pub const PROTON: f64 = 1.00727646677;

#[derive(Debug, Error)]
pub enum Ms2Error {
    #[error("Malformed S line at line {line}: {text}")]
    MalformedScanLine { line: usize, text: String },
    #[error("Malformed {kind} line at line {line}: {text}")]
    MalformedLine {
        kind: char,
        line: usize,
        text: String,
    },
    #[error("Malformed peak line at line {line}: {text}")]
    MalformedPeakLine { line: usize, text: String },
    #[error("Found {kind} line outside of a spectrum at line {line}")]
    OutsideSpectrum { kind: char, line: usize },
    #[error("Encountered an IO error: {0}")]
    IOError(
        #[from]
        #[source]
        std::io::Error,
    ),
}

/// Test whether a buffer looks like the start of an MS2 file
pub fn is_ms2(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    match lines.next() {
        Some(line) => {
            (line.starts_with("H\t") || line.starts_with("S\t"))
                && line.split('\t').count() >= 2
        }
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_ms2() {
        assert!(is_ms2(b"H\tExtractor\tProteoWizard\nS\t1\t1\t400.0\n"));
        assert!(is_ms2(b"\nS\t1\t1\t400.0\n"));
        assert!(!is_ms2(b"BEGIN IONS\nTITLE=foo\n"));
        assert!(!is_ms2(b"<?xml version=\"1.0\"?>"));
        assert!(!is_ms2(b""));
    }
}
