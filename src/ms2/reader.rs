use std::{
    fs,
    io::{self, prelude::*},
    path::Path,
};

use mzdata::{
    Param,
    prelude::PrecursorSelection,
    meta::{FileMetadataConfig, MSDataFileMetadata},
    spectrum::{
        ArrayType, BinaryArrayMap, BinaryDataArrayType, DataArray, MultiLayerSpectrum, Precursor,
        ScanEvent, SelectedIon, SignalContinuity, SpectrumDescription, bindata::to_bytes,
    },
};

use super::{Ms2Error, PROTON};

#[derive(Debug, Default)]
struct SpectrumBuilder {
    scan: u64,
    precursor_mz: f64,
    native_id: Option<String>,
    start_time: f64,
    charges: Vec<i32>,
    params: Vec<Param>,
    mz_array: Vec<f64>,
    intensity_array: Vec<f32>,
}

impl SpectrumBuilder {
    fn build(self, index: usize) -> MultiLayerSpectrum {
        let mut descr = SpectrumDescription::default();
        descr.id = self
            .native_id
            .unwrap_or_else(|| format!("scan={}", self.scan));
        descr.index = index;
        descr.ms_level = 2;
        descr.signal_continuity = SignalContinuity::Centroid;
        descr.params.extend(self.params);

        let mut event = ScanEvent::default();
        event.start_time = self.start_time;
        descr.acquisition.scans.push(event);

        let mut precursor = Precursor::default();
        if self.charges.is_empty() {
            precursor.add_ion(SelectedIon {
                mz: self.precursor_mz,
                ..Default::default()
            });
        }
        for charge in self.charges {
            precursor.add_ion(SelectedIon {
                mz: self.precursor_mz,
                charge: Some(charge),
                ..Default::default()
            });
        }
        descr.precursor = Some(precursor);

        let mut arrays = BinaryArrayMap::new();
        arrays.add(DataArray::wrap(
            &ArrayType::MZArray,
            BinaryDataArrayType::Float64,
            to_bytes(&self.mz_array),
        ));
        arrays.add(DataArray::wrap(
            &ArrayType::IntensityArray,
            BinaryDataArrayType::Float32,
            to_bytes(&self.intensity_array),
        ));
        MultiLayerSpectrum::from_arrays_and_description(arrays, descr)
    }
}

/// Split an `H` or `I` line into its key and the remainder of the line.
///
/// Values may contain spaces (native IDs do), so tab-separated lines are split on
/// tabs only and anything else falls back to whitespace.
fn split_key_value(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim_start_matches(['\t', ' ']);
    if rest.is_empty() {
        return None;
    }
    let (key, value) = if rest.contains('\t') {
        rest.split_once('\t').unwrap_or((rest, ""))
    } else {
        rest.split_once(char::is_whitespace).unwrap_or((rest, ""))
    };
    Some((key.trim(), value.trim()))
}

/// A streaming reader for MS2 files which produces one [`MultiLayerSpectrum`] per `S` block.
///
/// The `H` header lines are exposed as key-value parameters of the
/// [`FileDescription`](mzdata::meta::FileDescription).
pub struct MS2ReaderType<R: io::Read> {
    handle: io::BufReader<R>,
    line_number: usize,
    pending_scan_line: Option<String>,
    index: usize,
    error: Option<Ms2Error>,
    mz_metadata: FileMetadataConfig,
}

pub type MS2Reader = MS2ReaderType<fs::File>;

impl MS2ReaderType<fs::File> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, Ms2Error> {
        let handle = fs::File::open(path)?;
        Self::new(handle)
    }
}

impl<R: io::Read> MS2ReaderType<R> {
    /// Create a reader and consume the file header
    pub fn new(file: R) -> Result<Self, Ms2Error> {
        let mut this = Self {
            handle: io::BufReader::new(file),
            line_number: 0,
            pending_scan_line: None,
            index: 0,
            error: None,
            mz_metadata: Default::default(),
        };
        this.read_header()?;
        Ok(this)
    }

    /// The last error encountered while iterating, if any
    pub fn error(&self) -> Option<&Ms2Error> {
        self.error.as_ref()
    }

    fn next_line(&mut self) -> Result<Option<String>, Ms2Error> {
        let mut buffer = String::new();
        loop {
            buffer.clear();
            let z = self.handle.read_line(&mut buffer)?;
            if z == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = buffer.trim_end_matches(['\r', '\n']);
            if !line.trim().is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }

    fn read_header(&mut self) -> Result<(), Ms2Error> {
        while let Some(line) = self.next_line()? {
            match line.as_bytes()[0] {
                b'H' => {
                    if let Some((key, value)) = split_key_value(&line[1..]) {
                        self.mz_metadata
                            .file_description_mut()
                            .contents
                            .push(Param::new_key_value(key.to_string(), value.to_string()));
                    }
                }
                b'S' => {
                    self.pending_scan_line = Some(line);
                    break;
                }
                kind => {
                    return Err(Ms2Error::OutsideSpectrum {
                        kind: kind as char,
                        line: self.line_number,
                    });
                }
            }
        }
        log::debug!(
            "Read {} header entries from MS2 file",
            self.mz_metadata.file_description().contents.len()
        );
        Ok(())
    }

    fn parse_scan_line(&self, line: &str) -> Result<SpectrumBuilder, Ms2Error> {
        let malformed = || Ms2Error::MalformedScanLine {
            line: self.line_number,
            text: line.to_string(),
        };
        let mut tokens = line[1..].split_whitespace();
        let scan = tokens
            .next()
            .and_then(|t| t.parse::<u64>().ok())
            .ok_or_else(malformed)?;
        let _end_scan = tokens.next().ok_or_else(malformed)?;
        let precursor_mz = tokens
            .next()
            .and_then(|t| t.parse::<f64>().ok())
            .ok_or_else(malformed)?;
        Ok(SpectrumBuilder {
            scan,
            precursor_mz,
            ..Default::default()
        })
    }

    fn parse_info_line(&self, line: &str, builder: &mut SpectrumBuilder) -> Result<(), Ms2Error> {
        let malformed = || Ms2Error::MalformedLine {
            kind: 'I',
            line: self.line_number,
            text: line.to_string(),
        };
        let (key, value) = split_key_value(&line[1..]).ok_or_else(malformed)?;
        match key {
            "RTime" => {
                builder.start_time = value.parse().map_err(|_| malformed())?;
            }
            "NativeID" => {
                builder.native_id = Some(value.trim_matches('"').to_string());
            }
            _ => builder
                .params
                .push(Param::new_key_value(key.to_string(), value.to_string())),
        }
        Ok(())
    }

    fn parse_charge_line(&self, line: &str, builder: &mut SpectrumBuilder) -> Result<(), Ms2Error> {
        let malformed = || Ms2Error::MalformedLine {
            kind: 'Z',
            line: self.line_number,
            text: line.to_string(),
        };
        let mut tokens = line[1..].split_whitespace();
        let charge: i32 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(malformed)?;
        if let Some(mass) = tokens.next().and_then(|t| t.parse::<f64>().ok()) {
            if charge != 0 && builder.precursor_mz == 0.0 {
                builder.precursor_mz = (mass + (charge - 1) as f64 * PROTON) / charge as f64;
            }
        }
        builder.charges.push(charge);
        Ok(())
    }

    fn parse_peak_line(&self, line: &str, builder: &mut SpectrumBuilder) -> Result<(), Ms2Error> {
        let malformed = || Ms2Error::MalformedPeakLine {
            line: self.line_number,
            text: line.to_string(),
        };
        let mut tokens = line.split_whitespace();
        let mz: f64 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(malformed)?;
        let intensity: f32 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(malformed)?;
        builder.mz_array.push(mz);
        builder.intensity_array.push(intensity);
        Ok(())
    }

    /// Read the next spectrum, returning `Ok(None)` at the end of the file
    pub fn read_next(&mut self) -> Result<Option<MultiLayerSpectrum>, Ms2Error> {
        let Some(scan_line) = self.pending_scan_line.take() else {
            return Ok(None);
        };
        let mut builder = self.parse_scan_line(&scan_line)?;

        while let Some(line) = self.next_line()? {
            match line.as_bytes()[0] {
                b'S' => {
                    self.pending_scan_line = Some(line);
                    break;
                }
                b'I' => self.parse_info_line(&line, &mut builder)?,
                b'Z' => self.parse_charge_line(&line, &mut builder)?,
                b'D' => {
                    log::trace!("Skipping D line {}", self.line_number);
                }
                b'H' => {
                    log::warn!(
                        "Ignoring header line {} found after the first spectrum",
                        self.line_number
                    );
                }
                _ => self.parse_peak_line(&line, &mut builder)?,
            }
        }

        let spectrum = builder.build(self.index);
        self.index += 1;
        Ok(Some(spectrum))
    }
}

impl<R: io::Read> Iterator for MS2ReaderType<R> {
    type Item = MultiLayerSpectrum;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(spectrum) => spectrum,
            Err(e) => {
                log::error!("An error occurred while reading MS2 file: {e}");
                self.error = Some(e);
                None
            }
        }
    }
}

impl<R: io::Read> MSDataFileMetadata for MS2ReaderType<R> {
    mzdata::delegate_impl_metadata_trait!(mz_metadata);
}

#[cfg(test)]
mod test {
    use super::*;
    use mzdata::prelude::*;

    const TEXT: &str = "H\tCreationDate\tMon Jan 01 00:00:00 2024\n\
H\tExtractor\tProteoWizard\n\
S\t100\t100\t445.12\n\
I\tRTime\t0.6\n\
I\tNativeID\tcontrollerType=0 controllerNumber=1 scan=100\n\
I\tBPI\t2000\n\
Z\t2\t889.2327\n\
120.5 1500\n\
250.25\t300.5\n\
\n\
S\t000150\t000150\t512.3\n\
I\tRTime\t0.8\n\
Z\t2\t1023.593\n\
Z\t3\t1534.886\n\
101.0 10\n";

    #[test]
    fn test_read_spectra() -> Result<(), Ms2Error> {
        let mut reader = MS2ReaderType::new(TEXT.as_bytes())?;
        assert_eq!(reader.file_description().contents.len(), 2);

        let first = reader.read_next()?.unwrap();
        assert_eq!(first.id(), "controllerType=0 controllerNumber=1 scan=100");
        assert_eq!(first.ms_level(), 2);
        assert_eq!(first.index(), 0);
        assert!((first.start_time() - 0.6).abs() < 1e-9);
        let prec = first.precursor().unwrap();
        assert_eq!(prec.ions.len(), 1);
        assert!((prec.ions[0].mz - 445.12).abs() < 1e-9);
        assert_eq!(prec.ions[0].charge, Some(2));
        let arrays = first.raw_arrays().unwrap();
        assert_eq!(arrays.mzs().unwrap().len(), 2);
        assert!((arrays.intensities().unwrap()[1] - 300.5).abs() < 1e-6);

        let second = reader.read_next()?.unwrap();
        assert_eq!(second.id(), "scan=150");
        assert_eq!(second.index(), 1);
        assert_eq!(second.precursor().unwrap().ions.len(), 2);

        assert!(reader.read_next()?.is_none());
        Ok(())
    }

    #[test]
    fn test_iterator() -> Result<(), Ms2Error> {
        let reader = MS2ReaderType::new(TEXT.as_bytes())?;
        let ids: Vec<_> = reader.map(|s| s.id().to_string()).collect();
        assert_eq!(ids.len(), 2);
        Ok(())
    }

    #[test]
    fn test_empty_file() -> Result<(), Ms2Error> {
        let mut reader = MS2ReaderType::new("H\tExtractor\tnothing\n".as_bytes())?;
        assert!(reader.read_next()?.is_none());
        Ok(())
    }

    #[test]
    fn test_malformed_lines() -> Result<(), Ms2Error> {
        let err = MS2ReaderType::new("S\tabc\tabc\t400.0\n".as_bytes())?
            .read_next()
            .unwrap_err();
        assert!(matches!(err, Ms2Error::MalformedScanLine { line: 1, .. }));

        let mut reader = MS2ReaderType::new("S\t1\t1\t400.0\n100.0 abc\n".as_bytes())?;
        assert!(matches!(
            reader.read_next(),
            Err(Ms2Error::MalformedPeakLine { line: 2, .. })
        ));

        let mut reader = MS2ReaderType::new("S\t1\t1\t400.0\nI\tRTime\tsoon\n".as_bytes())?;
        assert!(reader.next().is_none());
        assert!(matches!(
            reader.error(),
            Some(Ms2Error::MalformedLine { kind: 'I', .. })
        ));

        let err = MS2ReaderType::new("I\tRTime\t1.0\n".as_bytes()).err().unwrap();
        assert!(matches!(err, Ms2Error::OutsideSpectrum { kind: 'I', line: 1 }));
        Ok(())
    }
}
