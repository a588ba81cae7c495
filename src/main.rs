use std::{fs, io, path::PathBuf, time::Instant};

use clap::{ArgAction, Parser};

use scan_select::{
    FileReport, ProcessOptions, ScanTable, SpectrumFormat, process_file,
    processor::DEFAULT_SUFFIX,
    report::write_report_to_path,
    scan_table::{DEFAULT_FILE_COLUMN, DEFAULT_SCAN_COLUMN},
};

fn format_parser(name: &str) -> Result<SpectrumFormat, String> {
    name.parse::<SpectrumFormat>().map_err(|e| e.to_string())
}

/// Select scans and their precursors listed in a table from mass spectrometry files
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct ScanSelectCli {
    /// Path to a tab-separated table listing the scans to keep
    pub table_path: PathBuf,

    /// Spectrum file(s) to extract scans from
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(
        long = "scanCol",
        default_value = DEFAULT_SCAN_COLUMN,
        help = "Column in the table to read scan numbers from"
    )]
    pub scan_column: String,

    #[arg(
        long = "fileCol",
        default_value = DEFAULT_FILE_COLUMN,
        help = "Column in the table to read spectrum file names from"
    )]
    pub file_column: String,

    #[arg(
        short = 's',
        long = "suffix",
        help = "Suffix to add to output file names. Defaults to \"_short\", or nothing when --outputDir is given"
    )]
    pub suffix: Option<String>,

    #[arg(
        short = 'd',
        long = "outputDir",
        help = "Destination directory for output files. Takes precedence over --inplace"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(long, help = "Overwrite the input files")]
    pub inplace: bool,

    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u8).range(0..=1),
        help = "Also keep the MS1 precursor scan of each selected scan (0 or 1)"
    )]
    pub precursor: u8,

    #[arg(
        short = 'i',
        long = "inputFormat",
        value_parser = format_parser,
        help = "Format of the input files (mzML, mzXML, MS2, MGF). Inferred from the file extension by default"
    )]
    pub input_format: Option<SpectrumFormat>,

    #[arg(
        short = 'o',
        long = "outputFormat",
        value_parser = format_parser,
        help = "Format to write (mzML, mzXML, MS2, MGF). Defaults to the input format"
    )]
    pub output_format: Option<SpectrumFormat>,

    #[arg(long, help = "Fail a file when any requested scan is missing from it")]
    pub strict: bool,

    #[arg(long, help = "Write a tab-separated summary of each file to this path")]
    pub report: Option<PathBuf>,

    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, help = "Increase log verbosity, may be repeated")]
    pub verbose: u8,
}

impl ScanSelectCli {
    fn process_options(&self) -> ProcessOptions {
        let suffix = match (&self.suffix, &self.output_dir) {
            (Some(suffix), _) => suffix.clone(),
            (None, Some(_)) => String::new(),
            (None, None) => DEFAULT_SUFFIX.to_string(),
        };
        ProcessOptions::default()
            .with_output_dir(self.output_dir.clone())
            .with_inplace(self.inplace)
            .with_suffix(suffix)
            .with_source_format(self.input_format)
            .with_target_format(self.output_format)
            .with_include_precursors(self.precursor == 1)
            .with_strict(self.strict)
    }
}

fn run_select(cli: &ScanSelectCli) -> io::Result<()> {
    let start = Instant::now();

    let table = ScanTable::from_path(&cli.table_path, &cli.file_column, &cli.scan_column)?;
    let targets = table.targets_for(&cli.files)?;

    if let Some(dir) = cli.output_dir.as_ref() {
        if !dir.is_dir() {
            log::info!("Creating directory: {}", dir.display());
            fs::create_dir_all(dir)?;
        }
    }

    let options = cli.process_options();
    log::debug!("Processing options: {options:?}");

    let mut reports = Vec::with_capacity(targets.len());
    for target in targets {
        log::info!("Working on {}...", target.path.display());
        let report = match process_file(&target.path, &target.scans, &options) {
            Ok(report) => report,
            Err(e) => {
                log::error!("Failed to process {}: {e}", target.path.display());
                FileReport::failed(&target.path, e)
            }
        };
        reports.push(report);
    }

    if let Some(path) = cli.report.as_ref() {
        write_report_to_path(path, &reports)?;
        log::info!("Wrote report to {}", path.display());
    }

    let failures = reports.iter().filter(|r| r.is_error()).count();
    if failures > 0 {
        log::warn!("{failures} of {} files could not be processed", reports.len());
    }
    eprintln!("{:0.2} seconds elapsed", start.elapsed().as_secs_f64());
    Ok(())
}

fn main() -> io::Result<()> {
    let cli = ScanSelectCli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    run_select(&cli)
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        ScanSelectCli::command().debug_assert();
    }

    #[test]
    fn test_suffix_defaults() {
        let cli = ScanSelectCli::parse_from(["scan_select", "table.tsv", "a.mzML"]);
        let options = cli.process_options();
        assert_eq!(options.suffix, "_short");
        assert!(options.include_precursors);

        let cli = ScanSelectCli::parse_from(["scan_select", "-d", "out", "table.tsv", "a.mzML"]);
        assert_eq!(cli.process_options().suffix, "");

        let cli = ScanSelectCli::parse_from([
            "scan_select", "-d", "out", "-s", "_sub", "--precursor", "0", "-o", "ms2",
            "-vv", "table.tsv", "a.mzML", "b.mzML",
        ]);
        let options = cli.process_options();
        assert_eq!(options.suffix, "_sub");
        assert!(!options.include_precursors);
        assert_eq!(options.target_format, Some(SpectrumFormat::MS2));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.files.len(), 2);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(
            ScanSelectCli::try_parse_from(["scan_select", "--precursor", "2", "t.tsv", "a.mzML"])
                .is_err()
        );
        assert!(
            ScanSelectCli::try_parse_from(["scan_select", "-i", "raw", "t.tsv", "a.mzML"]).is_err()
        );
        assert!(ScanSelectCli::try_parse_from(["scan_select", "t.tsv"]).is_err());
    }

    const RUN_MS2: &str = "H\tExtractor\tfixture\n\
S\t100\t100\t500.0\nI\tRTime\t0.6\nZ\t2\t998.99\n150.0 10.0\n250.0 20.0\n\
S\t150\t150\t520.0\nI\tRTime\t0.8\nZ\t2\t1038.99\n160.0 15.0\n\
S\t170\t170\t540.0\nI\tRTime\t0.9\n170.0 5.0\n";

    #[test]
    fn test_run_end_to_end() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("run1.ms2");
        fs::write(&good, RUN_MS2)?;
        let bad = dir.path().join("run2.mzXML");
        fs::write(&bad, "<mzXML/>")?;

        let table = dir.path().join("scans.tsv");
        fs::write(
            &table,
            "scanNum\tprecursorFile\n100\tdata/run1.raw\n150\trun1.raw\n7\trun2.mzXML\n",
        )?;
        let report = dir.path().join("report.tsv");
        let out = dir.path().join("out");

        let cli = ScanSelectCli::parse_from([
            "scan_select".into(),
            "-d".into(),
            out.clone().into_os_string(),
            "--report".into(),
            report.clone().into_os_string(),
            table.into_os_string(),
            good.into_os_string(),
            bad.into_os_string(),
        ]);
        run_select(&cli)?;

        let written = SpectrumFormat::MS2.load(&out.join("run1.ms2"))?;
        assert_eq!(written.len(), 2);

        let summary = fs::read_to_string(&report)?;
        let rows: Vec<_> = summary.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].ends_with("\t2\t2\t0\t0\t2\tsuccess"), "{}", rows[1]);
        assert!(rows[2].contains("error: Unsupported file format"));
        Ok(())
    }
}
