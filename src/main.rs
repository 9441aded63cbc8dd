use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;

use marksplit::batch::{
    check_split_column, compact_table, plan_compaction, process_table, read_table,
    resolve_columns, BatchOptions, BatchOutcome,
};
use marksplit::buffered_eprintln;
use marksplit::config::{self, Config};
use marksplit::distribution::{distribute, presets, Mode, RngSource, Sentinel, Step, Template};
use marksplit::output::{self, BatchReport, DistributionReport, OutputFormat, TemplateEntry};
use marksplit::stderr_buffer;

const EXIT_SUCCESS: i32 = 0;
const EXIT_DISTRIBUTE: i32 = 1;
const EXIT_IO: i32 = 2;
const EXIT_CONFIG: i32 = 4;

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split the total columns of CSV or XLSX files into per-question marks
    Split {
        /// Input CSV/XLSX files or glob patterns
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Directory for processed_* and unprocessed_* files
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Split mode (overrides config)
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Seed for reproducible output (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Marker written for not-attempted questions (overrides config)
        #[arg(long, value_enum)]
        sentinel: Option<Sentinel>,

        /// Output file format
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        /// Write one processed file per distinct value of this column
        #[arg(long)]
        split_by: Option<String>,

        /// Print a JSON report instead of the summary
        #[arg(long)]
        json: bool,
    },
    /// Split a single total and print the result
    Distribute {
        /// Total to split
        #[arg(long, allow_hyphen_values = true)]
        total: f64,

        /// Template name (built-in or from config)
        #[arg(long, required_unless_present = "divisions", conflicts_with = "divisions")]
        template: Option<String>,

        /// Split into N equal divisions instead of a template
        #[arg(long)]
        divisions: Option<usize>,

        /// Maximum per division (default: uncapped)
        #[arg(long, requires = "divisions")]
        cap: Option<f64>,

        #[arg(long, value_enum)]
        mode: Option<Mode>,

        #[arg(long)]
        seed: Option<u64>,

        /// Rounding step (default: 1 for whole totals, 0.25 otherwise)
        #[arg(long)]
        step: Option<f64>,

        #[arg(long, value_enum)]
        sentinel: Option<Sentinel>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Drop not-attempted slots from split marks and renumber the columns
    Compact {
        /// CSV or XLSX file with split marks
        input: PathBuf,

        /// Output file (defaults to compact_<input> next to the input; the
        /// extension picks CSV or XLSX)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List built-in and configured templates
    Templates,
    /// Write a config file (interactive when run in a terminal)
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "marksplit")]
#[command(about = "Split aggregate exam marks into sub-question components", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (defaults to ~/.config/marksplit/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.map(PathBuf::from);

    // Init must work even when the existing config is broken
    if let Commands::Init { force } = cli.command {
        match config::run_init(config_path, force, std::io::stdin().is_terminal()) {
            Ok(path) => {
                println!("Wrote config to {}", path.display());
                std::process::exit(EXIT_SUCCESS);
            }
            Err(e) => {
                eprintln!("Init failed: {:#}", e);
                std::process::exit(EXIT_CONFIG);
            }
        }
    }

    let config = match config::load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {:#}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    if cli.verbose {
        eprintln!("Loaded {} column mappings from config", config.columns.len());
        for (i, column) in config.columns.iter().enumerate() {
            let shape = match &column.divisions_from {
                Some(count) => format!("divisions from {}", count),
                None => column.template.clone(),
            };
            eprintln!(
                "  Column {}: {} -> {}-* ({})",
                i + 1,
                column.source,
                column.prefix,
                shape
            );
        }
    }

    // Validate config at startup, before any file is touched
    if let Err(errors) = config::validate_config(&config) {
        eprintln!("Config errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        std::process::exit(EXIT_CONFIG);
    }

    let code = match cli.command {
        Commands::Split {
            inputs,
            out_dir,
            mode,
            seed,
            sentinel,
            format,
            split_by,
            json,
        } => {
            let options = BatchOptions {
                mode: mode.or(config.mode).unwrap_or_default(),
                seed: seed.or(config.seed),
                sentinel: sentinel.or(config.sentinel).unwrap_or_default(),
            };
            let split_by = split_by.or_else(|| config.split_by.clone());
            let run = SplitRun {
                config: &config,
                options,
                out_dir: &out_dir,
                format,
                split_by: split_by.as_deref(),
                verbose: cli.verbose,
            };
            run_split(&run, &inputs, json)
        }
        Commands::Distribute {
            total,
            template,
            divisions,
            cap,
            mode,
            seed,
            step,
            sentinel,
            json,
        } => {
            let template = match resolve_template(&config, template.as_deref(), divisions, cap, total)
            {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(EXIT_CONFIG);
                }
            };
            let step = match step {
                Some(s) => match Step::new(s) {
                    Some(step) => step,
                    None => {
                        eprintln!("Invalid step {}: must be a positive number", s);
                        std::process::exit(EXIT_CONFIG);
                    }
                },
                None => Step::infer(total),
            };
            let mode = mode.or(config.mode).unwrap_or_default();
            let sentinel = sentinel.or(config.sentinel).unwrap_or_default();
            run_distribute(total, &template, mode, step, seed.or(config.seed), sentinel, json)
        }
        Commands::Compact { input, out } => run_compact(&config, &input, out, cli.verbose),
        Commands::Templates => {
            println!("{}", list_templates(&config));
            EXIT_SUCCESS
        }
        Commands::Init { .. } => EXIT_SUCCESS,
    };

    std::process::exit(code);
}

/// Template for `distribute`: a named one, or N uniform divisions.
/// Uncapped divisions are each capped at the total.
fn resolve_template(
    config: &Config,
    name: Option<&str>,
    divisions: Option<usize>,
    cap: Option<f64>,
    total: f64,
) -> Result<Template, String> {
    match (name, divisions) {
        (Some(name), _) => match config.template(name) {
            Some(Ok(t)) => Ok(t),
            Some(Err(e)) => Err(format!("Invalid template '{}': {}", name, e)),
            None => Err(format!("Unknown template '{}'", name)),
        },
        (None, Some(n)) => {
            let cap = cap.unwrap_or(if total.is_finite() { total.max(0.0) } else { 0.0 });
            presets::uniform(n, cap).map_err(|e| format!("Invalid divisions: {}", e))
        }
        (None, None) => Err("Either --template or --divisions is required".to_string()),
    }
}

fn run_distribute(
    total: f64,
    template: &Template,
    mode: Mode,
    step: Step,
    seed: Option<u64>,
    sentinel: Sentinel,
    json: bool,
) -> i32 {
    let mut rng = match seed {
        Some(s) => RngSource::seeded(s),
        None => RngSource::from_entropy(),
    };

    let dist = match distribute(total, template, mode, step, &mut rng) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Distribution failed: {}", e);
            return EXIT_DISTRIBUTE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&DistributionReport::new(&dist, sentinel)) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                return EXIT_IO;
            }
        }
    } else {
        let use_colors = output::should_use_colors();
        println!("{}", output::format_distribution(&dist, sentinel, use_colors));
    }
    EXIT_SUCCESS
}

struct SplitRun<'a> {
    config: &'a Config,
    options: BatchOptions,
    out_dir: &'a Path,
    format: OutputFormat,
    split_by: Option<&'a str>,
    verbose: bool,
}

/// Expand glob patterns. A pattern that matches nothing is reported and skipped.
fn expand_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matches = match glob::glob(pattern) {
            Ok(m) => m,
            Err(e) => {
                buffered_eprintln!("Invalid pattern '{}': {}", pattern, e);
                continue;
            }
        };
        let before = paths.len();
        for entry in matches {
            match entry {
                Ok(path) => paths.push(path),
                Err(e) => buffered_eprintln!("Cannot read {}: {}", e.path().display(), e),
            }
        }
        if paths.len() == before {
            buffered_eprintln!("No files match '{}'", pattern);
        }
    }
    paths
}

fn run_split(run: &SplitRun, inputs: &[String], json: bool) -> i32 {
    let start_time = Instant::now();
    if json {
        stderr_buffer::activate();
    }

    let paths = expand_inputs(inputs);
    let mut reports = Vec::new();
    let mut succeeded = 0;

    for path in &paths {
        let file_start = Instant::now();
        match split_file(run, path) {
            Ok((outcome, files)) => {
                succeeded += 1;
                if run.verbose {
                    for file in &files {
                        buffered_eprintln!("  Wrote {}", file.display());
                    }
                    buffered_eprintln!("  {} done in {:?}", path.display(), file_start.elapsed());
                }
                if json {
                    // The text summary already lists these rows on stdout
                    let name = path.display().to_string();
                    for warning in output::quarantine_warnings(&name, &outcome) {
                        buffered_eprintln!("{}", warning);
                    }
                    reports.push(BatchReport::new(path.clone(), &outcome, files));
                } else {
                    let name = path.display().to_string();
                    let use_colors = output::should_use_colors();
                    println!("{}", output::format_batch_summary(&name, &outcome, use_colors));
                }
            }
            Err(e) => {
                // Continue with other files
                buffered_eprintln!("Failed to process {}: {:#}", path.display(), e);
            }
        }
    }

    let mut code = if succeeded > 0 { EXIT_SUCCESS } else { EXIT_IO };

    if json {
        match serde_json::to_string_pretty(&reports) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                buffered_eprintln!("Failed to serialize report: {}", e);
                code = EXIT_IO;
            }
        }
        for msg in stderr_buffer::drain() {
            eprintln!("{}", msg);
        }
    }

    if run.verbose {
        eprintln!(
            "Total: {} of {} files in {:?}",
            succeeded,
            paths.len(),
            start_time.elapsed()
        );
    }
    code
}

/// Split one input file and write its processed and unprocessed sets.
fn split_file(run: &SplitRun, path: &Path) -> anyhow::Result<(BatchOutcome, Vec<PathBuf>)> {
    use anyhow::Context;

    let table = read_table(path)?;
    let columns = resolve_columns(run.config, &table)
        .with_context(|| format!("Cannot map columns of {}", path.display()))?;
    check_split_column(&table, run.split_by)?;

    if run.verbose {
        buffered_eprintln!("Splitting {} ({} rows)", path.display(), table.len());
    }
    let outcome = process_table(&table, &columns, &run.options);

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let files = output::write_outcome(run.out_dir, &stem, &outcome, run.format, run.split_by)?;

    Ok((outcome, files))
}

fn run_compact(config: &Config, input: &Path, out: Option<PathBuf>, verbose: bool) -> i32 {
    let table = match read_table(input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{:#}", e);
            return EXIT_IO;
        }
    };

    let plans = match plan_compaction(config, &table) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Cannot compact {}: {:#}", input.display(), e);
            return EXIT_IO;
        }
    };
    if verbose {
        for plan in &plans {
            eprintln!("  {}: {} columns after compaction", plan.prefix(), plan.headers().len());
        }
    }

    let compacted = compact_table(&table, &plans);
    let target = out.unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let ext = OutputFormat::for_path(input).extension();
        input.with_file_name(format!("compact_{}.{}", stem, ext))
    });

    let format = OutputFormat::for_path(&target);
    if let Err(e) = output::write_table(&target, &compacted, format, false) {
        eprintln!("{:#}", e);
        return EXIT_IO;
    }
    println!("Wrote {}", target.display());
    EXIT_SUCCESS
}

fn list_templates(config: &Config) -> String {
    let mut named: Vec<(String, Template, bool)> = presets::BUILTIN_NAMES
        .iter()
        .filter(|name| !config.templates.contains_key(**name))
        .filter_map(|name| presets::builtin(name).map(|t| (name.to_string(), t, true)))
        .collect();
    // Validation already rejected broken user templates
    named.extend(
        config
            .templates
            .iter()
            .filter_map(|(name, t)| t.build().ok().map(|t| (name.clone(), t, false))),
    );

    let entries: Vec<TemplateEntry> = named
        .iter()
        .map(|(name, template, builtin)| TemplateEntry {
            name,
            template,
            builtin: *builtin,
        })
        .collect();
    output::format_template_list(&entries, output::should_use_colors())
}
