pub mod error;
pub mod experiment;
pub mod format;
pub mod ms2;
pub mod report;
pub mod scan_index;
pub mod scan_table;

pub mod processor;

pub use error::{Result, ScanSelectError};
pub use experiment::Experiment;
pub use format::SpectrumFormat;
pub use processor::{ProcessOptions, process_file};
pub use report::{FileReport, FileStatus};
pub use scan_index::{PrecursorLink, ScanIndex, parse_scan_number};
pub use scan_table::{ScanTable, ScanTargets};
