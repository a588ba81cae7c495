use std::{
    io::{self, prelude::*},
    marker::PhantomData,
};

use mzdata::{
    meta::{FileMetadataConfig, MSDataFileMetadata},
    prelude::*,
    spectrum::{RefPeakDataLevel, SignalContinuity},
};
use mzpeaks::{CentroidPeak, DeconvolutedPeak, IntensityMeasurement, MZLocated};

use super::PROTON;
use crate::scan_index::parse_scan_number;

const EXTRACTOR: &str = "Extractor";
const EXTRACTOR_VERSION: &str = "ExtractorVersion";

/// Writes MSn spectra as MS2 text. MS1 spectra are skipped.
///
/// The file header is built from the key-value parameters of the
/// [`FileDescription`](mzdata::meta::FileDescription), so metadata should be
/// copied in before the first spectrum is written.
pub struct MS2WriterType<
    W: io::Write,
    C: CentroidLike = CentroidPeak,
    D: DeconvolutedCentroidLike = DeconvolutedPeak,
> {
    handle: io::BufWriter<W>,
    wrote_header: bool,
    spectrum_count: usize,
    centroid_type: PhantomData<C>,
    deconvoluted_type: PhantomData<D>,
    mz_metadata: FileMetadataConfig,
}

pub type MS2Writer<W> = MS2WriterType<W, CentroidPeak, DeconvolutedPeak>;

impl<W: io::Write, C: CentroidLike, D: DeconvolutedCentroidLike> MS2WriterType<W, C, D> {
    pub fn new(file: W) -> Self {
        Self {
            handle: io::BufWriter::new(file),
            wrote_header: false,
            spectrum_count: 0,
            centroid_type: PhantomData,
            deconvoluted_type: PhantomData,
            mz_metadata: Default::default(),
        }
    }

    /// The number of spectra written so far
    pub fn spectrum_count(&self) -> usize {
        self.spectrum_count
    }

    pub fn into_inner(self) -> io::BufWriter<W> {
        self.handle
    }

    fn write_header(&mut self) -> io::Result<()> {
        if self.wrote_header {
            return Ok(());
        }
        self.wrote_header = true;

        let mut has_extractor = false;
        for param in self.mz_metadata.file_description().contents.iter() {
            let value = param.value.to_string();
            if value.is_empty() {
                continue;
            }
            has_extractor |= param.name == EXTRACTOR;
            writeln!(self.handle, "H\t{}\t{}", param.name, value)?;
        }
        if !has_extractor {
            writeln!(self.handle, "H\t{EXTRACTOR}\t{}", env!("CARGO_PKG_NAME"))?;
            writeln!(
                self.handle,
                "H\t{EXTRACTOR_VERSION}\t{}",
                env!("CARGO_PKG_VERSION")
            )?;
        }
        Ok(())
    }

    fn write_spectrum_header<S: SpectrumLike<C, D>>(&mut self, spectrum: &S) -> io::Result<()> {
        let description = spectrum.description();
        let scan = parse_scan_number(spectrum.id()).unwrap_or_else(|| {
            log::debug!(
                "{} has no scan number, using its position instead",
                spectrum.id()
            );
            spectrum.index() as u64 + 1
        });

        let ions = spectrum.precursor().map(|p| p.ions.as_slice()).unwrap_or_default();
        let precursor_mz = ions.first().map(|ion| ion.mz).unwrap_or_default();

        writeln!(self.handle, "S\t{scan}\t{scan}\t{precursor_mz}")?;
        writeln!(self.handle, "I\tRTime\t{}", spectrum.start_time())?;
        writeln!(self.handle, "I\tNativeID\t{}", spectrum.id())?;
        for param in description.params.iter() {
            let value = param.value.to_string();
            if value.is_empty() || param.name == "ms level" {
                continue;
            }
            writeln!(self.handle, "I\t{}\t{}", param.name, value)?;
        }
        for ion in ions {
            if let Some(charge) = ion.charge.filter(|z| *z != 0) {
                let z = charge as f64;
                let mass = ion.mz * z - (z - 1.0) * PROTON;
                writeln!(self.handle, "Z\t{charge}\t{mass}")?;
            }
        }
        Ok(())
    }

    fn write_peaks<S: SpectrumLike<C, D>>(&mut self, spectrum: &S) -> io::Result<()> {
        let description = spectrum.description();
        match spectrum.peaks() {
            RefPeakDataLevel::Missing => {
                log::warn!(
                    "Attempting to write a spectrum without any peak data, {}",
                    description.id
                )
            }
            RefPeakDataLevel::RawData(arrays) => {
                if description.signal_continuity == SignalContinuity::Profile {
                    log::debug!("Writing profile spectrum {} as a peak list", description.id);
                }
                let mzs = arrays.mzs()?;
                let intensities = arrays.intensities()?;
                for (mz, intensity) in mzs.iter().zip(intensities.iter()) {
                    writeln!(self.handle, "{mz} {intensity}")?;
                }
            }
            RefPeakDataLevel::Centroid(centroids) => {
                for peak in centroids.iter() {
                    writeln!(self.handle, "{} {}", peak.mz(), peak.intensity())?;
                }
            }
            RefPeakDataLevel::Deconvoluted(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "Cannot write deconvoluted spectrum to MS2",
                ));
            }
        }
        Ok(())
    }

    /// Write a single MSn spectrum. MS1 spectra are skipped and count as zero
    pub fn write_spectrum<S: SpectrumLike<C, D>>(&mut self, spectrum: &S) -> io::Result<usize> {
        self.write_header()?;
        if spectrum.ms_level() == 1 {
            log::trace!("Skipping writing MS1 spectrum {} to MS2", spectrum.id());
            return Ok(0);
        }
        self.write_spectrum_header(spectrum)?;
        self.write_peaks(spectrum)?;
        self.spectrum_count += 1;
        Ok(1)
    }
}

impl<W: io::Write, C: CentroidLike, D: DeconvolutedCentroidLike> MSDataFileMetadata
    for MS2WriterType<W, C, D>
{
    mzdata::delegate_impl_metadata_trait!(mz_metadata);
}

impl<W: io::Write, C: CentroidLike + 'static, D: DeconvolutedCentroidLike + 'static>
    SpectrumWriter<C, D> for MS2WriterType<W, C, D>
{
    fn write<S: SpectrumLike<C, D> + 'static>(&mut self, spectrum: &S) -> io::Result<usize> {
        self.write_spectrum(spectrum)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.write_header()?;
        self.handle.flush()
    }
}
