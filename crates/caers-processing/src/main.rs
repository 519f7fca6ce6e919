//! CLI entry point for the CAERS processing pipeline.

use anyhow::{Context, Result, anyhow};
use caers_processing::unifier::{discover_input_files, read_source_file};
use caers_processing::{
    AgeIssuePolicy, BrandCountQuery, EmptyValuePolicy, OutputFormat, Pipeline, PipelineConfig,
    PipelineResult, brand_report_counts,
};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// CLI-compatible age issue policy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliAgePolicy {
    /// Leave rows with unusable ages out of the age table
    Exclude,
    /// Keep them with an age of -1
    Sentinel,
}

impl From<CliAgePolicy> for AgeIssuePolicy {
    fn from(cli: CliAgePolicy) -> Self {
        match cli {
            CliAgePolicy::Exclude => AgeIssuePolicy::Exclude,
            CliAgePolicy::Sentinel => AgeIssuePolicy::Sentinel,
        }
    }
}

/// CLI-compatible empty outcome policy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutcomePolicy {
    /// Reports without outcomes produce no exploded row
    Drop,
    /// Reports without outcomes produce one row with a null outcome
    NullRow,
}

impl From<CliOutcomePolicy> for EmptyValuePolicy {
    fn from(cli: CliOutcomePolicy) -> Self {
        match cli {
            CliOutcomePolicy::Drop => EmptyValuePolicy::Drop,
            CliOutcomePolicy::NullRow => EmptyValuePolicy::NullRow,
        }
    }
}

/// CLI-compatible output format enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFormat {
    Csv,
    Parquet,
}

impl From<CliFormat> for OutputFormat {
    fn from(cli: CliFormat) -> Self {
        match cli {
            CliFormat::Csv => OutputFormat::Csv,
            CliFormat::Parquet => OutputFormat::Parquet,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "CAERS adverse event report processing",
    long_about = "Unifies the CFSAN Adverse Event Reporting System exports and derives \
                  brand, age and outcome tables.\n\n\
                  EXAMPLES:\n  \
                  # Process every CSV under data/raw\n  \
                  caers-processing -i data/raw -o data/processed\n\n  \
                  # Keep rows with unusable ages, marked with -1\n  \
                  caers-processing -i data/raw --age-policy sentinel\n\n  \
                  # Top brands for serious outcomes in one category\n  \
                  caers-processing -i data/raw --top-brands \"Nuts/Edible Seed\""
)]
struct Args {
    /// Directory holding the source CSV exports
    #[arg(short, long, default_value = "data/raw")]
    input: PathBuf,

    /// Output directory for derived tables
    ///
    /// Overrides the output directory of --config when given
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with a full or partial pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List the source files and their shapes without processing
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Number of leading brand tokens kept for multi-token categories
    #[arg(long)]
    trim_len: Option<usize>,

    /// Handling of rows whose age cannot be converted
    #[arg(long, value_enum)]
    age_policy: Option<CliAgePolicy>,

    /// Handling of reports without any outcome
    #[arg(long, value_enum)]
    empty_outcomes: Option<CliOutcomePolicy>,

    /// Format of the derived tables
    #[arg(long, value_enum)]
    format: Option<CliFormat>,

    /// Skip the symptom term counts
    #[arg(long)]
    no_symptom_counts: bool,

    /// Keep results in memory only
    #[arg(long)]
    no_write: bool,

    /// Print the brands with the most serious outcomes for this category
    #[arg(long, value_name = "CATEGORY")]
    top_brands: Option<String>,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final run report.
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    if !args.input.is_dir() {
        return Err(anyhow!("Input directory not found: {}", args.input.display()));
    }

    let config = load_config(&args)?;

    if args.dry_run {
        return run_dry_run(&args, &config);
    }

    let mut builder = Pipeline::builder().config(config);
    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }
    let pipeline = builder.build()?;

    match pipeline.run(&args.input) {
        Ok(result) => handle_pipeline_output(&result, &args),
        Err(e) => {
            let offending_file = e
                .is_ingestion_error()
                .then(|| e.source_file().map(|p| p.display().to_string()))
                .flatten();
            if args.json {
                let mut value = serde_json::json!({ "error": e });
                if let Some(ref file) = offending_file {
                    value["file"] = serde_json::Value::String(file.clone());
                }
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                error!("Pipeline failed: {}", e);
                if e.is_ingestion_error() {
                    match offending_file {
                        Some(file) => error!("Fix or remove {} and rerun", file),
                        None => error!("Check the input directory {}", args.input.display()),
                    }
                }
            }
            Err(anyhow!("Pipeline failed: {}", e))
        }
    }
}

/// Build the configuration from --config and the flag overrides.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str::<PipelineConfig>(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(ref output) = args.output {
        config.output_dir = output.clone();
    }
    if let Some(trim_len) = args.trim_len {
        config.brand.trim_len = trim_len;
    }
    if let Some(policy) = args.age_policy {
        config.age_issue_policy = policy.into();
    }
    if let Some(policy) = args.empty_outcomes {
        config.empty_outcome_policy = policy.into();
    }
    if let Some(format) = args.format {
        config.output_format = format.into();
    }
    if args.no_symptom_counts {
        config.emit_symptom_counts = false;
    }
    if args.no_write {
        config.save_to_disk = false;
    }

    config.validate()?;
    Ok(config)
}

/// Show which files would be ingested and their shapes.
///
/// Uses `println!` intentionally: this output is the point of --dry-run and
/// must be visible regardless of log level.
fn run_dry_run(args: &Args, config: &PipelineConfig) -> Result<()> {
    let files = discover_input_files(&args.input, &config.input_extension)?;

    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Source files that would be processed");
    println!("{}\n", "=".repeat(80));

    println!("{:<48} {:>10} {:>10}", "File", "Rows", "Columns");
    println!("{}", "-".repeat(70));
    for path in &files {
        let frame = read_source_file(path)?;
        println!(
            "{:<48} {:>10} {:>10}",
            truncate_str(&file_label(path), 47),
            frame.height(),
            frame.width()
        );
    }
    println!();

    println!("OUTPUT FILES (will be created in {})", config.output_dir.display());
    println!("{}", "-".repeat(40));
    let ext = config.output_format.extension();
    let names = &config.output_names;
    for name in [&names.clean, &names.brand, &names.processed, &names.exploded] {
        println!("  - {}.{}", name, ext);
    }
    println!("  - {}.csv", names.rejected);
    if config.emit_symptom_counts {
        println!("  - {}.csv", names.symptom_counts);
    }
    println!("  - {}.json", names.report);
    println!("{}", "=".repeat(80));

    Ok(())
}

/// Handle pipeline output based on CLI flags.
///
/// - Default: Print human-readable summary to stdout
/// - `--json`: Print the run report as JSON to stdout only
fn handle_pipeline_output(result: &PipelineResult, args: &Args) -> Result<()> {
    let top_brands = match &args.top_brands {
        Some(category) => Some(brand_report_counts(
            &result.exploded,
            &BrandCountQuery::serious(category.clone()),
        )?),
        None => None,
    };

    if args.json {
        let mut value = serde_json::to_value(&result.report)?;
        if let (Some(counts), Some(object)) = (&top_brands, value.as_object_mut()) {
            object.insert("top_brands".to_string(), serde_json::to_value(counts)?);
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_human_readable_summary(result);

    if let (Some(category), Some(counts)) = (&args.top_brands, &top_brands) {
        println!("Top brands for serious outcomes in '{}':", category);
        if counts.is_empty() {
            println!("  (none)");
        }
        for (brand, events) in counts {
            println!("  {:<40} {:>8}", truncate_str(brand, 39), events);
        }
        println!("{}", "=".repeat(80));
    }

    Ok(())
}

fn print_human_readable_summary(result: &PipelineResult) {
    let report = &result.report;

    println!();
    println!("{}", "=".repeat(80));
    println!("PROCESSING COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!("Input files:");
    for (path, rows) in report.input_files.iter().zip(&report.rows_per_file) {
        println!("  {} ({} rows)", file_label(path), rows);
    }
    println!();

    println!("Tables:");
    for (label, shape) in [
        ("Unified", &report.unified),
        ("Brand enriched", &report.brand_enriched),
        ("Age normalized", &report.age_normalized),
        ("Exploded", &report.exploded),
    ] {
        println!(
            "  {:<16} {} rows x {} columns",
            label, shape.rows, shape.columns
        );
    }
    println!();

    println!("Data quality:");
    println!("  Rows without product: {}", report.rows_without_product);
    println!("  Unparsed dates: {}", report.unparsed_dates);
    println!("  Reports without outcomes: {}", report.reports_without_outcomes);
    for (kind, count) in &report.issue_counts {
        println!("  {}: {}", kind.as_str(), count);
    }
    println!();

    if !report.outputs.is_empty() {
        println!("Outputs:");
        for name in &report.outputs {
            println!("  - {}", name);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("?")
        .to_string()
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
