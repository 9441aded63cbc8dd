use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::config::{get_config_path, save_config, ColumnMapping, Config};
use crate::distribution::{Mode, Sentinel};

/// Prompt user with a message and return their trimmed input.
fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    std::io::stdout()
        .flush()
        .context("Failed to flush stdout")?;
    let mut input = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut input)
        .context("Failed to read input")?;
    Ok(input.trim().to_string())
}

/// Prompt user with a message and a default value. Returns default if input is empty.
fn prompt_with_default(message: &str, default: &str) -> Result<String> {
    let input = prompt(&format!("{} [{}]: ", message, default))?;
    if input.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(input)
    }
}

/// Prompt user with a yes/no question. Returns bool based on input and default.
fn prompt_yes_no(message: &str, default_yes: bool) -> Result<bool> {
    let hint = if default_yes { "Y/n" } else { "y/N" };
    let input = prompt(&format!("{} [{}]: ", message, hint))?;
    let input = input.to_lowercase();
    if input.is_empty() {
        Ok(default_yes)
    } else {
        Ok(input == "y" || input == "yes")
    }
}

fn parse_mode(input: &str) -> Result<Mode, String> {
    match input.trim().to_lowercase().as_str() {
        "equal" => Ok(Mode::Equal),
        "random" => Ok(Mode::Random),
        other => Err(format!("unknown mode '{}' (expected equal or random)", other)),
    }
}

fn parse_sentinel(input: &str) -> Result<Sentinel, String> {
    match input.trim().to_lowercase().as_str() {
        "u" => Ok(Sentinel::U),
        "n/a" | "na" => Ok(Sentinel::NotApplicable),
        other => Err(format!("unknown marker '{}' (expected U or N/A)", other)),
    }
}

fn parse_seed(input: &str) -> Result<Option<u64>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    input
        .parse()
        .map(Some)
        .map_err(|_| format!("'{}' is not a non-negative integer", input))
}

fn parse_max_total(input: &str) -> Result<Option<f64>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    match input.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        _ => Err(format!("'{}' is not a non-negative number", input)),
    }
}

/// Ask until `parse` accepts the answer.
fn prompt_parsed<T>(
    message: &str,
    default: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T> {
    loop {
        let input = if default.is_empty() {
            prompt(&format!("{}: ", message))?
        } else {
            prompt_with_default(message, default)?
        };
        match parse(&input) {
            Ok(v) => return Ok(v),
            Err(e) => println!("  Invalid: {}. Try again.", e),
        }
    }
}

fn prompt_columns(config: &Config) -> Result<Vec<ColumnMapping>> {
    println!();
    println!("Add one entry per total column. Leave the column name blank to finish.");
    let mut columns = Vec::new();
    loop {
        println!();
        let source = prompt("Input column holding the total: ")?;
        if source.is_empty() {
            if columns.is_empty() {
                println!("  At least one column is required.");
                continue;
            }
            break;
        }
        let prefix = prompt_with_default("Output column prefix", &source)?;
        let template = prompt_parsed("Template", "st-13", |name| match config.template(name) {
            Some(Ok(_)) => Ok(name.to_string()),
            Some(Err(e)) => Err(e.to_string()),
            None => Err(format!("unknown template '{}'", name)),
        })?;
        let max_total = prompt_parsed("Maximum total (blank for none)", "", parse_max_total)?;
        columns.push(ColumnMapping {
            source,
            prefix,
            template,
            divisions_from: None,
            max_total,
            step: None,
        });
    }
    Ok(columns)
}

fn run_wizard() -> Result<Config> {
    println!();
    println!("marksplit configuration");
    println!("=======================");
    println!();

    let defaults = Config::default();
    let mode = prompt_parsed("Split mode (equal/random)", "random", parse_mode)?;
    let sentinel = prompt_parsed("Marker for not-attempted questions (U or N/A)", "U", parse_sentinel)?;
    let seed = prompt_parsed("Seed for reproducible runs (blank for a fresh one each run)", "", parse_seed)?;

    let split_by = prompt("Column to split processed files by, e.g. course-code (blank for none): ")?;
    let split_by = if split_by.is_empty() { None } else { Some(split_by) };

    let columns = if prompt_yes_no(
        "Use the standard mapping (st1-marks, st2-marks -> st-13; ete-marks -> ete-16)?",
        true,
    )? {
        defaults.columns.clone()
    } else {
        prompt_columns(&defaults)?
    };

    Ok(Config {
        mode: Some(mode),
        sentinel: Some(sentinel),
        seed,
        split_by,
        columns,
        templates: defaults.templates,
    })
}

/// Create a config file.
///
/// Interactive runs walk through a short wizard; otherwise the defaults are
/// written. An existing file is only replaced with `force` or after the user
/// confirms.
pub fn run_init(path: Option<PathBuf>, force: bool, interactive: bool) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p,
        None => get_config_path()?,
    };

    if path.exists() && !force {
        if !interactive {
            bail!(
                "Config file already exists at {} (use --force to overwrite)",
                path.display()
            );
        }
        if !prompt_yes_no(
            &format!("Config file already exists at {}. Overwrite?", path.display()),
            false,
        )? {
            bail!("Aborted; {} left unchanged", path.display());
        }
    }

    let config = if interactive {
        run_wizard()?
    } else {
        Config::default()
    };
    save_config(&path, &config)?;
    Ok(path)
}
