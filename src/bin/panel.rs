//! Panel CLI - Command-line interface for Clinical Panel
//!
//! Commands:
//! - build: Bin long-format sources onto the roster × bin skeleton
//! - coverage: Recompute patient coverage from a written panel
//! - inspect: Show how a source table would be resolved and normalized

use clap::{Args, Parser, Subcommand};
use log::info;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clinical_panel::adapters::{CsvFileSource, TableSource};
use clinical_panel::config::{CohortPreset, PanelConfig, VariableSpec};
use clinical_panel::coverage::{CoverageReport, CoverageReporter};
use clinical_panel::encoder::{read_panel_csv_path, ManifestEncoder, PanelEncoder};
use clinical_panel::normalizer::TimeNormalizer;
use clinical_panel::schema::SchemaResolver;
use clinical_panel::{build_panel, PanelError, PANEL_VERSION};

/// Panel - Patient × time-bin panels from long-format clinical tables
#[derive(Parser)]
#[command(name = "panel")]
#[command(version = PANEL_VERSION)]
#[command(about = "Bin clinical measurements onto a patient × time grid", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a panel and write it as CSV
    Build(BuildArgs),

    /// Recompute coverage from a panel CSV
    Coverage {
        /// Panel CSV written by `panel build`
        #[arg(short, long)]
        panel: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show resolved columns and time semantics of a source table
    Inspect {
        /// Source CSV
        #[arg(short, long)]
        source: PathBuf,

        /// Variable name used for column resolution
        #[arg(long)]
        variable: String,

        /// Preferred identifier column
        #[arg(long)]
        id_column: Option<String>,

        /// Median magnitude above which offsets are read as minutes
        #[arg(long)]
        offset_threshold: Option<f64>,
    },
}

#[derive(Args)]
struct BuildArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Roster (base cohort) CSV
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Dataset preset (eicu, mimic-iii, mimic-iv)
    #[arg(long)]
    preset: Option<String>,

    /// Identifier column in the roster and sources
    #[arg(long)]
    id_column: Option<String>,

    /// t0 column in the roster
    #[arg(long)]
    t0_column: Option<String>,

    /// Variable source as NAME=PATH (repeatable)
    #[arg(long = "var", value_name = "NAME=PATH")]
    variables: Vec<String>,

    /// Start of the binning window in hours
    #[arg(long)]
    window_start: Option<f64>,

    /// End of the binning window in hours (exclusive)
    #[arg(long)]
    window_end: Option<f64>,

    /// Bin width in hours
    #[arg(long)]
    bin_width: Option<f64>,

    /// Median magnitude above which offsets are read as minutes
    #[arg(long)]
    offset_threshold: Option<f64>,

    /// Reduce variables in parallel
    #[arg(long)]
    parallel: bool,

    /// Output panel CSV (use - for stdout)
    #[arg(short, long)]
    output: PathBuf,

    /// Write the JSON run manifest here
    #[arg(long)]
    manifest: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(command: Commands) -> Result<(), PanelCliError> {
    match command {
        Commands::Build(args) => cmd_build(args),
        Commands::Coverage { panel, json } => cmd_coverage(&panel, json),
        Commands::Inspect {
            source,
            variable,
            id_column,
            offset_threshold,
        } => cmd_inspect(&source, &variable, id_column.as_deref(), offset_threshold),
    }
}

fn cmd_build(args: BuildArgs) -> Result<(), PanelCliError> {
    let config = resolve_config(&args)?;
    let build = build_panel(&config)?;

    if args.output.to_string_lossy() == "-" {
        let stdout = io::stdout();
        PanelEncoder::write_csv(&build.panel, stdout.lock())?;
    } else {
        PanelEncoder::write_csv_path(&build.panel, &args.output)?;
        info!(
            "Wrote {} rows to {}",
            build.panel.row_count(),
            args.output.display()
        );
    }

    if let Some(manifest_path) = &args.manifest {
        let json = ManifestEncoder::new().encode_to_json(&build)?;
        fs::write(manifest_path, json)?;
        info!("Wrote manifest to {}", manifest_path.display());
    }

    for v in &build.coverage.variables {
        info!(
            "coverage {}: {}/{} ({:.2}%)",
            v.variable, v.covered, v.total, v.percent
        );
    }

    Ok(())
}

/// Merge the optional config file with command-line overrides
fn resolve_config(args: &BuildArgs) -> Result<PanelConfig, PanelCliError> {
    let mut config = match &args.config {
        Some(path) => PanelConfig::from_file(path)?,
        None => PanelConfig::default(),
    };

    if let Some(roster) = &args.roster {
        config.cohort.roster = Some(roster.clone());
    }
    if let Some(preset) = &args.preset {
        config.cohort.preset = Some(
            CohortPreset::parse(preset).ok_or_else(|| PanelCliError::UnknownPreset(preset.clone()))?,
        );
    }
    if let Some(id_column) = &args.id_column {
        config.cohort.id_column = Some(id_column.clone());
    }
    if let Some(t0_column) = &args.t0_column {
        config.cohort.t0_column = Some(t0_column.clone());
    }
    for entry in &args.variables {
        config.variables.push(VariableSpec::parse_assignment(entry)?);
    }
    if let Some(start) = args.window_start {
        config.grid.window_start_hours = start;
    }
    if let Some(end) = args.window_end {
        config.grid.window_end_hours = end;
    }
    if let Some(width) = args.bin_width {
        config.grid.bin_width_hours = width;
    }
    if let Some(threshold) = args.offset_threshold {
        config.grid.offset_unit_threshold = threshold;
    }
    if args.parallel {
        config.parallel = true;
    }

    if config.variables.is_empty() {
        return Err(PanelCliError::NoVariables);
    }
    config.validate()?;
    Ok(config)
}

fn cmd_coverage(panel_path: &Path, json: bool) -> Result<(), PanelCliError> {
    let panel = read_panel_csv_path(panel_path)?;
    let report = CoverageReporter::report(&panel);

    if json || !atty::is(atty::Stream::Stdout) {
        println!("{}", serde_json::to_string_pretty(&report.as_map())?);
    } else {
        print_coverage(&report, panel.row_count())?;
    }
    Ok(())
}

fn print_coverage(report: &CoverageReport, rows: usize) -> Result<(), PanelCliError> {
    let mut out = io::stdout().lock();
    writeln!(out, "Coverage Report")?;
    writeln!(out, "===============")?;
    writeln!(out, "Rows: {}", rows)?;
    writeln!(out)?;
    write!(out, "{}", report)?;
    Ok(())
}

fn cmd_inspect(
    source: &Path,
    variable: &str,
    id_column: Option<&str>,
    offset_threshold: Option<f64>,
) -> Result<(), PanelCliError> {
    let table = CsvFileSource::new(source).load()?;
    let columns = SchemaResolver::with_preferred_id(id_column).resolve(&table, variable)?;

    let normalizer = offset_threshold
        .map(TimeNormalizer::new)
        .unwrap_or_default();
    let semantics = normalizer.classify(table.header(columns.time), &table.column(columns.time));

    let report = InspectReport {
        source: source.display().to_string(),
        rows: table.len(),
        id_column: table.header(columns.id).to_string(),
        time_column: table.header(columns.time).to_string(),
        value_column: table.header(columns.value).to_string(),
        semantics: semantics.describe(),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// Error types

#[derive(Debug)]
enum PanelCliError {
    Io(io::Error),
    Panel(PanelError),
    Json(serde_json::Error),
    UnknownPreset(String),
    NoVariables,
}

impl From<io::Error> for PanelCliError {
    fn from(e: io::Error) -> Self {
        PanelCliError::Io(e)
    }
}

impl From<PanelError> for PanelCliError {
    fn from(e: PanelError) -> Self {
        PanelCliError::Panel(e)
    }
}

impl From<serde_json::Error> for PanelCliError {
    fn from(e: serde_json::Error) -> Self {
        PanelCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PanelCliError> for CliError {
    fn from(e: PanelCliError) -> Self {
        match e {
            PanelCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PanelCliError::Panel(e) => {
                let (code, hint) = match &e {
                    PanelError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    PanelError::Csv(_) => ("CSV_ERROR", "Check that the file is comma-separated with a header row"),
                    PanelError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    PanelError::TomlError(_) | PanelError::Config(_) => {
                        ("CONFIG_ERROR", "Check the configuration file and flags")
                    }
                    PanelError::MissingColumn { .. } => {
                        ("MISSING_COLUMN", "Pass --id-column or --t0-column to name the column")
                    }
                    PanelError::EmptyRoster | PanelError::EmptyTable(_) => {
                        ("EMPTY_INPUT", "Ensure the roster file is not empty")
                    }
                    PanelError::TimeColumn(_) => ("TIME_ERROR", "Run 'panel inspect' on the source"),
                    PanelError::Encoding(_) => ("PANEL_FORMAT_ERROR", "Use a CSV written by 'panel build'"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PanelCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            PanelCliError::UnknownPreset(name) => CliError {
                code: "UNKNOWN_PRESET".to_string(),
                message: format!("Unknown cohort preset '{}'", name),
                hint: Some("Use one of: eicu, mimic-iii, mimic-iv".to_string()),
            },
            PanelCliError::NoVariables => CliError {
                code: "NO_VARIABLES".to_string(),
                message: "No variables configured".to_string(),
                hint: Some("Add [[variables]] to the config or pass --var NAME=PATH".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct InspectReport {
    source: String,
    rows: usize,
    id_column: String,
    time_column: String,
    value_column: String,
    semantics: String,
}
