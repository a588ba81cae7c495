use std::{
    fs, io,
    path::{Path, PathBuf},
};

use regex::Regex;

use crate::error::{Result, ScanSelectError};

pub const DEFAULT_SCAN_COLUMN: &str = "scanNum";
pub const DEFAULT_FILE_COLUMN: &str = "precursorFile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTableRow {
    pub source_file: String,
    pub scan_number: u64,
}

/// The scans requested for a single input file, in table order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTargets {
    pub path: PathBuf,
    pub scans: Vec<u64>,
}

/// A tab-separated table listing which scan numbers to keep from which files.
///
/// Only the file name and scan number columns are read, all other columns
/// are ignored.
#[derive(Debug, Default, Clone)]
pub struct ScanTable {
    rows: Vec<ScanTableRow>,
}

/// The largest float that still holds every smaller integer exactly
const MAX_EXACT_FLOAT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn parse_scan_cell(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(scan) = value.parse::<u64>() {
        return Some(scan);
    }
    // Spreadsheet tools sometimes write integral columns as floats
    value
        .parse::<f64>()
        .ok()
        .filter(|v| {
            v.is_finite() && *v >= 0.0 && *v <= MAX_EXACT_FLOAT_INTEGER && v.fract() == 0.0
        })
        .map(|v| v as u64)
}

/// The last path component of a table's file name cell, which may hold a path
/// written with either separator
fn cell_file_name(cell: &str) -> &str {
    cell.rsplit(['/', '\\']).next().unwrap_or(cell)
}

/// Build the pattern a table's file name must match to belong to `file`.
///
/// The file's extension is stripped, and the table entry must be that stem followed
/// by a single extension, e.g. `sample1` matches `sample1.mzML` and `sample1.raw`, but
/// not `sample10.mzML`. The pattern is matched against the file name part of an entry,
/// so entries holding paths match too.
pub fn file_name_pattern(file: &Path) -> Result<Regex> {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy())
        .ok_or_else(|| {
            ScanSelectError::Configuration(format!("{} has no file name", file.display()))
        })?;
    Regex::new(&format!(r"^{}\.\w+$", regex::escape(&stem)))
        .map_err(|e| ScanSelectError::Configuration(e.to_string()))
}

impl ScanTable {
    pub fn new(rows: Vec<ScanTableRow>) -> Self {
        Self { rows }
    }

    pub fn from_path(
        path: impl AsRef<Path>,
        file_column: &str,
        scan_column: &str,
    ) -> Result<Self> {
        let path = path.as_ref();
        let handle = fs::File::open(path).map_err(|e| {
            ScanSelectError::Configuration(format!(
                "Failed to open scan table {}: {e}",
                path.display()
            ))
        })?;
        Self::from_reader(io::BufReader::new(handle), file_column, scan_column)
    }

    pub fn from_reader<R: io::Read>(
        reader: R,
        file_column: &str,
        scan_column: &str,
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| ScanSelectError::Configuration(format!("Failed to read table header: {e}")))?
            .clone();

        let find_column = |name: &str| {
            headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
                ScanSelectError::Configuration(format!(
                    "Column \"{name}\" is missing from the scan table"
                ))
            })
        };
        let file_idx = find_column(file_column)?;
        let scan_idx = find_column(scan_column)?;

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                ScanSelectError::Configuration(format!("Failed to parse scan table: {e}"))
            })?;
            let source_file = record.get(file_idx).unwrap_or_default().trim().to_string();
            let scan_cell = record.get(scan_idx).unwrap_or_default();
            let scan_number = parse_scan_cell(scan_cell).ok_or_else(|| {
                ScanSelectError::Configuration(format!(
                    "Invalid scan number \"{scan_cell}\" in row {} of column \"{scan_column}\"",
                    i + 1
                ))
            })?;
            rows.push(ScanTableRow {
                source_file,
                scan_number,
            });
        }
        log::debug!("Read {} rows from scan table", rows.len());
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ScanTableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All scan numbers whose file name matches `file`, in table order. Duplicate
    /// rows yield duplicate scan numbers.
    pub fn scans_for(&self, file: &Path) -> Result<Vec<u64>> {
        let pattern = file_name_pattern(file)?;
        Ok(self
            .rows
            .iter()
            .filter(|row| pattern.is_match(cell_file_name(&row.source_file)))
            .map(|row| row.scan_number)
            .collect())
    }

    /// Resolve the scans for each of `files`, preserving the order of `files`
    pub fn targets_for<P: AsRef<Path>>(&self, files: &[P]) -> Result<Vec<ScanTargets>> {
        files
            .iter()
            .map(|file| {
                let path = file.as_ref();
                Ok(ScanTargets {
                    path: path.to_path_buf(),
                    scans: self.scans_for(path)?,
                })
            })
            .collect()
    }
}
