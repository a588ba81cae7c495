use std::{collections::HashMap, sync::LazyLock};

use mzdata::prelude::*;
use regex::Regex;

static SCAN_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"scan=(\d+)").expect("scan number pattern is valid"));

/// Extract the scan number embedded in a native ID string, e.g.
/// `controllerType=0 controllerNumber=1 scan=1024` yields `Some(1024)`.
pub fn parse_scan_number(native_id: &str) -> Option<u64> {
    SCAN_NUMBER_RE
        .captures(native_id)
        .and_then(|m| m.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// The outcome of asking which MS1 scan an MSn scan was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecursorLink {
    /// The nearest MS1 scan acquired before this scan
    Found(u64),
    /// An MS2 scan acquired before any MS1 scan was seen
    NoPrecursor,
    /// The scan is not an MS2 scan, or is not in the index at all
    NotApplicable,
}

/// Maps scan numbers to positions in a spectrum sequence and MS2 scan numbers
/// to their nearest preceding MS1 scan number.
#[derive(Debug, Default, Clone)]
pub struct ScanIndex {
    positions: HashMap<u64, usize>,
    precursors: HashMap<u64, Option<u64>>,
}

impl ScanIndex {
    /// Build the index from `(ms_level, native_id)` pairs in acquisition order.
    ///
    /// Entries whose native ID carries no scan number are skipped with a warning.
    /// When a scan number occurs more than once, the last occurrence wins.
    pub fn build<'a, I: IntoIterator<Item = (u8, &'a str)>>(entries: I) -> Self {
        let mut positions = HashMap::new();
        let mut precursors = HashMap::new();
        let mut current_precursor = None;

        for (i, (ms_level, native_id)) in entries.into_iter().enumerate() {
            let Some(scan) = parse_scan_number(native_id) else {
                log::warn!("Could not parse native ID: {native_id}");
                continue;
            };
            match ms_level {
                1 => current_precursor = Some(scan),
                2 => {
                    precursors.insert(scan, current_precursor);
                }
                _ => {}
            }
            if positions.insert(scan, i).is_some() {
                log::debug!("Scan {scan} occurs more than once, keeping position {i}");
            }
        }

        Self {
            positions,
            precursors,
        }
    }

    pub fn from_spectra<'a, S: SpectrumLike + 'a>(spectra: impl IntoIterator<Item = &'a S>) -> Self {
        Self::build(spectra.into_iter().map(|s| (s.ms_level(), s.id())))
    }

    pub fn position_of(&self, scan: u64) -> Option<usize> {
        self.positions.get(&scan).copied()
    }

    pub fn precursor_of(&self, scan: u64) -> PrecursorLink {
        match self.precursors.get(&scan) {
            Some(Some(precursor)) => PrecursorLink::Found(*precursor),
            Some(None) => PrecursorLink::NoPrecursor,
            None => PrecursorLink::NotApplicable,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
