use std::{
    fmt::Display,
    io,
    path::{Path, PathBuf},
};

use serde::Serialize;

/// How processing a single input file ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// An output file was written
    Success,
    /// Nothing was selected, so no output was written
    Skipped,
    /// Processing failed, carrying the error message
    Error(String),
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Success => f.write_str("success"),
            FileStatus::Skipped => f.write_str("skipped"),
            FileStatus::Error(e) => write!(f, "error: {e}"),
        }
    }
}

impl Serialize for FileStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A summary of what happened to one input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub requested: usize,
    pub found: usize,
    pub missing: usize,
    pub precursors_added: usize,
    pub written: usize,
    pub status: FileStatus,
}

impl FileReport {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            requested: 0,
            found: 0,
            missing: 0,
            precursors_added: 0,
            written: 0,
            status: FileStatus::Skipped,
        }
    }

    /// A report for a file that could not be processed at all
    pub fn failed(input: impl Into<PathBuf>, error: impl Display) -> Self {
        let mut this = Self::new(input);
        this.status = FileStatus::Error(error.to_string());
        this
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, FileStatus::Error(_))
    }
}

/// Write one tab-separated row per report, with a header
pub fn write_report<W: io::Write>(handle: W, reports: &[FileReport]) -> io::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(handle);
    for report in reports {
        writer.serialize(report)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_report_to_path(path: &Path, reports: &[FileReport]) -> io::Result<()> {
    let handle = std::fs::File::create(path)?;
    write_report(io::BufWriter::new(handle), reports)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_write_report() -> io::Result<()> {
        let mut done = FileReport::new("data/run1.mzML");
        done.output = Some("data/run1_short.mzML".into());
        done.requested = 2;
        done.found = 2;
        done.precursors_added = 2;
        done.written = 4;
        done.status = FileStatus::Success;
        let skipped = FileReport::new("data/run2.mzML");
        let failed = FileReport::failed("data/run3.mzXML", "Unsupported file format: mzXML");
        assert!(failed.is_error());

        let mut buffer = Vec::new();
        write_report(&mut buffer, &[done, skipped, failed])?;
        let text = String::from_utf8_lossy(&buffer);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "input\toutput\trequested\tfound\tmissing\tprecursors_added\twritten\tstatus"
        );
        assert_eq!(
            lines[1],
            "data/run1.mzML\tdata/run1_short.mzML\t2\t2\t0\t2\t4\tsuccess"
        );
        assert_eq!(lines[2], "data/run2.mzML\t\t0\t0\t0\t0\t0\tskipped");
        assert_eq!(
            lines[3],
            "data/run3.mzXML\t\t0\t0\t0\t0\t0\terror: Unsupported file format: mzXML"
        );
        Ok(())
    }
}
