use std::{
    fmt::Display,
    fs,
    io::{self, prelude::*},
    path::Path,
    str::FromStr,
};

use mzdata::{
    io::{MGFReader, MGFWriter, MassSpectrometryFormat, MzMLReader, MzMLWriter, infer_format},
    prelude::*,
};
use mzpeaks::{CentroidPeak, DeconvolutedPeak};

use crate::{
    error::{Result, ScanSelectError},
    experiment::Experiment,
    ms2::{self, MS2Reader, MS2Writer},
};

/// The spectrum file formats that can be named on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectrumFormat {
    MzML,
    MzXML,
    MS2,
    MGF,
}

impl SpectrumFormat {
    pub const ALL: [SpectrumFormat; 4] = [Self::MzML, Self::MzXML, Self::MS2, Self::MGF];

    /// The canonical file extension, without the leading `.`
    pub fn extension(&self) -> &'static str {
        match self {
            Self::MzML => "mzML",
            Self::MzXML => "mzXML",
            Self::MS2 => "ms2",
            Self::MGF => "mgf",
        }
    }

    /// Guess the format of `path` from its extension, then from its content.
    ///
    /// mzML and MGF detection is left to [`infer_format`]. Compressed inputs and formats
    /// that [`mzdata`] recognizes but this tool cannot select from are rejected. MS2 and
    /// mzXML are not known to [`mzdata`], so their leading bytes are checked here.
    pub fn from_path(path: &Path) -> Result<Self> {
        if let Some(format) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
        {
            return Ok(format);
        }

        let (inferred, gzipped) = infer_format(path)?;
        if gzipped {
            return Err(ScanSelectError::UnsupportedFormat(format!(
                "{} is compressed, decompress it first",
                path.display()
            )));
        }
        match inferred {
            MassSpectrometryFormat::MzML => return Ok(Self::MzML),
            MassSpectrometryFormat::MGF => return Ok(Self::MGF),
            MassSpectrometryFormat::Unknown => {}
            other => {
                return Err(ScanSelectError::UnsupportedFormat(format!(
                    "{} is {other:?}, which cannot be selected from",
                    path.display()
                )));
            }
        }

        let mut buffer = [0u8; 512];
        let z = fs::File::open(path)?.read(&mut buffer)?;
        let head = &buffer[..z];
        if ms2::is_ms2(head) {
            Ok(Self::MS2)
        } else if String::from_utf8_lossy(head).contains("<mzXML") {
            Ok(Self::MzXML)
        } else {
            Err(ScanSelectError::UnsupportedFormat(format!(
                "could not infer the format of {}",
                path.display()
            )))
        }
    }

    /// Whether this format can hold MS1 spectra
    pub fn stores_ms1(&self) -> bool {
        matches!(self, Self::MzML | Self::MzXML)
    }

    /// Read every spectrum in `path` into memory
    pub fn load(&self, path: &Path) -> Result<Experiment> {
        let format = *self;
        log::debug!("Loading {} as {format}", path.display());
        let experiment = match format {
            SpectrumFormat::MzML => Experiment::from_source(MzMLReader::open_path(path)?),
            SpectrumFormat::MGF => Experiment::from_source(MGFReader::open_path(path)?),
            SpectrumFormat::MS2 => {
                let mut reader = MS2Reader::open_path(path)?;
                let mut experiment = Experiment::default();
                experiment.copy_metadata_from(&reader);
                while let Some(spectrum) = reader.read_next()? {
                    experiment.push(spectrum);
                }
                experiment
            }
            SpectrumFormat::MzXML => {
                return Err(ScanSelectError::UnsupportedFormat(format!(
                    "reading {format} is not supported"
                )));
            }
        };
        log::debug!("Loaded {} spectra from {}", experiment.len(), path.display());
        Ok(experiment)
    }

    /// Write `experiment` to `path`, replacing it only once the new file is complete
    pub fn store(&self, path: &Path, experiment: &Experiment) -> Result<usize> {
        let format = *self;
        if format == SpectrumFormat::MzXML {
            return Err(ScanSelectError::UnsupportedFormat(format!(
                "writing {format} is not supported"
            )));
        }
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut staging = tempfile::NamedTempFile::new_in(dir)?;
        let written = write_experiment(staging.as_file_mut(), format, experiment)?;
        staging.as_file_mut().sync_all()?;
        staging.persist(path).map_err(|e| e.error)?;
        log::debug!("Wrote {written} spectra to {}", path.display());
        Ok(written)
    }
}

impl FromStr for SpectrumFormat {
    type Err = ScanSelectError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(s))
            .ok_or_else(|| ScanSelectError::UnsupportedFormat(s.to_string()))
    }
}

impl Display for SpectrumFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

fn write_spectra<W>(writer: &mut W, experiment: &Experiment) -> io::Result<usize>
where
    W: SpectrumWriter<CentroidPeak, DeconvolutedPeak>,
{
    writer.write_all(experiment.iter())?;
    writer.close()?;
    Ok(experiment.len())
}

/// Write `experiment` to `handle`, returning the number of spectra the format could hold
pub fn write_experiment<W: io::Write + io::Seek>(
    handle: W,
    format: SpectrumFormat,
    experiment: &Experiment,
) -> Result<usize> {
    let written = match format {
        SpectrumFormat::MzML => {
            let mut writer = MzMLWriter::new(handle);
            writer.copy_metadata_from(experiment);
            // The copied hint still counts the source file
            writer.set_spectrum_count(experiment.len() as u64);
            write_spectra(&mut writer, experiment)?
        }
        SpectrumFormat::MGF => {
            let mut writer = MGFWriter::new(handle);
            writer.copy_metadata_from(experiment);
            write_spectra(&mut writer, experiment)?;
            experiment.iter().filter(|s| s.ms_level() != 1).count()
        }
        SpectrumFormat::MS2 => {
            let mut writer = MS2Writer::new(handle);
            writer.copy_metadata_from(experiment);
            write_spectra(&mut writer, experiment)?;
            writer.spectrum_count()
        }
        SpectrumFormat::MzXML => {
            return Err(ScanSelectError::UnsupportedFormat(format!(
                "writing {format} is not supported"
            )));
        }
    };
    Ok(written)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::experiment::test::make_run;

    #[test]
    fn test_parse_format() -> Result<()> {
        assert_eq!("mzML".parse::<SpectrumFormat>()?, SpectrumFormat::MzML);
        assert_eq!("MZML".parse::<SpectrumFormat>()?, SpectrumFormat::MzML);
        assert_eq!(".mzxml".parse::<SpectrumFormat>()?, SpectrumFormat::MzXML);
        assert_eq!("MS2".parse::<SpectrumFormat>()?, SpectrumFormat::MS2);
        assert_eq!("mgf".parse::<SpectrumFormat>()?, SpectrumFormat::MGF);
        assert!("raw".parse::<SpectrumFormat>().is_err());
        assert_eq!(SpectrumFormat::MzML.to_string(), "mzML");
        Ok(())
    }

    #[test]
    fn test_from_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(
            SpectrumFormat::from_path(Path::new("a/b/run.mzML"))?,
            SpectrumFormat::MzML
        );
        let sniffed = dir.path().join("run.txt");
        fs::write(&sniffed, "H\tExtractor\tother\nS\t1\t1\t400.0\n")?;
        assert_eq!(SpectrumFormat::from_path(&sniffed)?, SpectrumFormat::MS2);
        let unknown = dir.path().join("run.bin");
        fs::write(&unknown, [0u8, 1, 2, 3])?;
        assert!(matches!(
            SpectrumFormat::from_path(&unknown),
            Err(ScanSelectError::UnsupportedFormat(_))
        ));
        Ok(())
    }

    #[test]
    fn test_from_path_by_content() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let run = make_run();

        let mzml = dir.path().join("run_mzml.xml");
        SpectrumFormat::MzML.store(&mzml, &run)?;
        assert_eq!(SpectrumFormat::from_path(&mzml)?, SpectrumFormat::MzML);

        let mgf = dir.path().join("run_mgf.txt");
        SpectrumFormat::MGF.store(&mgf, &run)?;
        assert_eq!(SpectrumFormat::from_path(&mgf)?, SpectrumFormat::MGF);

        let mzxml = dir.path().join("run_mzxml.xml");
        fs::write(&mzxml, "<?xml version=\"1.0\"?>\n<mzXML xmlns=\"http://sashimi.sourceforge.net/schema_revision/mzXML_3.2\">\n")?;
        assert_eq!(SpectrumFormat::from_path(&mzxml)?, SpectrumFormat::MzXML);
        Ok(())
    }

    #[test]
    fn test_compressed_is_unsupported() {
        // Detected from the name alone, the file does not need to exist
        let err = SpectrumFormat::from_path(Path::new("data/run1.mzML.gz")).unwrap_err();
        assert!(matches!(err, ScanSelectError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_store_and_load_mzml() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("run.mzML");
        let run = make_run();
        assert_eq!(SpectrumFormat::MzML.store(&path, &run)?, 5);

        let loaded = SpectrumFormat::MzML.load(&path)?;
        assert_eq!(loaded.len(), 5);
        let ids: Vec<_> = loaded.iter().map(|s| s.id().to_string()).collect();
        let expected: Vec<_> = run.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, expected);
        assert_eq!(loaded.spectra()[1].ms_level(), 2);
        Ok(())
    }

    #[test]
    fn test_store_ms2_drops_ms1() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("run.ms2");
        assert_eq!(SpectrumFormat::MS2.store(&path, &make_run())?, 3);
        let loaded = SpectrumFormat::MS2.load(&path)?;
        assert_eq!(loaded.len(), 3);
        assert!(loaded.iter().all(|s| s.ms_level() == 2));
        Ok(())
    }

    #[test]
    fn test_store_mgf_drops_ms1() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("run.mgf");
        let run = make_run();
        assert_eq!(SpectrumFormat::MGF.store(&path, &run)?, 3);
        let loaded = SpectrumFormat::MGF.load(&path)?;
        assert_eq!(loaded.len(), 3);
        assert!(loaded.iter().all(|s| s.ms_level() == 2));
        let ids: Vec<_> = loaded.iter().map(|s| s.id().to_string()).collect();
        let expected: Vec<_> = run
            .iter()
            .filter(|s| s.ms_level() == 2)
            .map(|s| s.id().to_string())
            .collect();
        // The writer wraps the native ID in a generated title
        assert_eq!(ids.len(), expected.len());
        for (id, native_id) in ids.iter().zip(expected.iter()) {
            assert!(id.contains(native_id.as_str()), "{id} vs {native_id}");
            assert_eq!(crate::parse_scan_number(id), crate::parse_scan_number(native_id));
        }
        Ok(())
    }

    #[test]
    fn test_mzxml_is_unsupported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("run.mzXML");
        assert!(matches!(
            SpectrumFormat::MzXML.store(&path, &make_run()),
            Err(ScanSelectError::UnsupportedFormat(_))
        ));
        assert!(!path.exists());
        fs::write(&path, "<mzXML/>")?;
        assert!(matches!(
            SpectrumFormat::MzXML.load(&path),
            Err(ScanSelectError::UnsupportedFormat(_))
        ));
        Ok(())
    }
}
