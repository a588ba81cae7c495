use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use mzdata::prelude::*;

use crate::{
    error::{Result, ScanSelectError},
    format::SpectrumFormat,
    report::{FileReport, FileStatus},
    scan_index::{PrecursorLink, ScanIndex},
};

pub const DEFAULT_SUFFIX: &str = "_short";

/// Controls where and how the selected spectra of each file are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Write outputs into this directory instead of next to their inputs. Takes
    /// precedence over `inplace`.
    pub output_dir: Option<PathBuf>,
    pub inplace: bool,
    pub suffix: String,
    pub source_format: Option<SpectrumFormat>,
    pub target_format: Option<SpectrumFormat>,
    pub include_precursors: bool,
    /// Treat scans missing from a file as an error for that file
    pub strict: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            inplace: false,
            suffix: DEFAULT_SUFFIX.to_string(),
            source_format: None,
            target_format: None,
            include_precursors: true,
            strict: false,
        }
    }
}

impl ProcessOptions {
    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_inplace(mut self, inplace: bool) -> Self {
        self.inplace = inplace;
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_source_format(mut self, format: Option<SpectrumFormat>) -> Self {
        self.source_format = format;
        self
    }

    pub fn with_target_format(mut self, format: Option<SpectrumFormat>) -> Self {
        self.target_format = format;
        self
    }

    pub fn with_include_precursors(mut self, include_precursors: bool) -> Self {
        self.include_precursors = include_precursors;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn describe(&self, target: SpectrumFormat) -> String {
        format!(
            "precursor={} strict={} output_format={target}",
            self.include_precursors as u8, self.strict
        )
    }
}

/// The positions chosen from one file, with counts for reporting
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    pub positions: BTreeSet<usize>,
    pub requested: usize,
    pub found: usize,
    pub missing: usize,
    pub precursors_added: usize,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn handle_missing(scan: u64, path: &Path, strict: bool, what: &str) -> Result<()> {
    if strict {
        Err(ScanSelectError::MissingScan {
            scan,
            path: path.to_path_buf(),
        })
    } else {
        log::warn!("{what} {scan} was not found in {}, skipping", path.display());
        Ok(())
    }
}

/// Resolve target scan numbers to positions, optionally adding the position of
/// each target's MS1 precursor.
///
/// `path` is only used for messages.
pub fn select_positions(
    index: &ScanIndex,
    scans: &[u64],
    include_precursors: bool,
    strict: bool,
    path: &Path,
) -> Result<Selection> {
    let mut selection = Selection::default();
    let mut target_positions = BTreeSet::new();
    let mut precursor_positions = BTreeSet::new();

    for scan in scans.iter().copied().unique() {
        selection.requested += 1;
        let Some(position) = index.position_of(scan) else {
            selection.missing += 1;
            handle_missing(scan, path, strict, "Scan")?;
            continue;
        };
        selection.found += 1;
        target_positions.insert(position);

        if !include_precursors {
            continue;
        }
        match index.precursor_of(scan) {
            PrecursorLink::Found(precursor) => match index.position_of(precursor) {
                Some(precursor_position) => {
                    precursor_positions.insert(precursor_position);
                }
                None => handle_missing(precursor, path, strict, "Precursor scan")?,
            },
            PrecursorLink::NoPrecursor => {
                log::warn!(
                    "MS2 scan {scan} in {} has no preceding MS1 scan",
                    path.display()
                );
            }
            PrecursorLink::NotApplicable => {}
        }
    }

    selection.precursors_added = precursor_positions.difference(&target_positions).count();
    target_positions.extend(precursor_positions);
    selection.positions = target_positions;
    Ok(selection)
}

/// Use the input's own extension spelling when the format is unchanged
fn extension_for(input: &Path, format: SpectrumFormat) -> String {
    input
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.parse::<SpectrumFormat>().ok() == Some(format))
        .map(|e| e.to_string())
        .unwrap_or_else(|| format.extension().to_string())
}

/// Where the output for `input` goes
pub fn output_path(input: &Path, format: SpectrumFormat, options: &ProcessOptions) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension_for(input, format);
    if let Some(dir) = options.output_dir.as_ref() {
        dir.join(format!("{stem}{}.{extension}", options.suffix))
    } else if options.inplace {
        input.with_file_name(format!("{stem}.{extension}"))
    } else {
        input.with_file_name(format!("{stem}{}.{extension}", options.suffix))
    }
}

/// Select `scans` (and their precursors) from `path` and write them to a new file.
///
/// An empty scan list, or a selection that matches nothing, is skipped without
/// writing anything.
pub fn process_file(path: &Path, scans: &[u64], options: &ProcessOptions) -> Result<FileReport> {
    let mut report = FileReport::new(path);
    if scans.is_empty() {
        log::warn!("No scans in table for file {}", path.display());
        return Ok(report);
    }

    let source = match options.source_format {
        Some(format) => format,
        None => SpectrumFormat::from_path(path)?,
    };
    let target = options.target_format.unwrap_or(source);
    if target == SpectrumFormat::MzXML {
        return Err(ScanSelectError::UnsupportedFormat(format!(
            "writing {target} is not supported"
        )));
    }

    let mut experiment = source.load(path)?;
    if !experiment.is_sorted() {
        log::debug!("Sorting spectra of {} by start time", path.display());
        experiment.sort_spectra();
    }

    let index = ScanIndex::from_spectra(experiment.iter());
    let selection = select_positions(
        &index,
        scans,
        options.include_precursors,
        options.strict,
        path,
    )?;
    report.requested = selection.requested;
    report.found = selection.found;
    report.missing = selection.missing;
    report.precursors_added = selection.precursors_added;

    if selection.is_empty() {
        log::warn!(
            "None of the requested scans were found in {}, nothing to write",
            path.display()
        );
        return Ok(report);
    }
    if !target.stores_ms1() {
        let only_ms1 = selection
            .positions
            .iter()
            .all(|&i| experiment.spectra()[i].ms_level() == 1);
        if only_ms1 {
            log::warn!(
                "Only MS1 spectra were selected from {} and {target} files cannot hold them, nothing to write",
                path.display()
            );
            return Ok(report);
        }
        if options.include_precursors && selection.precursors_added > 0 {
            log::warn!(
                "{target} files cannot hold MS1 spectra, {} precursor scans will not be written",
                selection.precursors_added
            );
        }
    }

    let mut subset = experiment.extract(&selection.positions);
    subset.add_processing_step(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        options.describe(target),
    );

    let output = output_path(path, target, options);
    log::info!("\tWriting {}...", output.display());
    report.written = target.store(&output, &subset)?;
    log::info!("\tDone!");

    report.output = Some(output);
    report.status = FileStatus::Success;
    Ok(report)
}
