use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::borrow::Cow;

use super::table::Table;
use crate::config::Config;
use crate::distribution::{
    distribute, presets, DistributeError, Distribution, MarkRng, Mode, RngSource, Sentinel, Step,
    Template,
};

/// Name of the extra column on quarantined rows.
pub const REASON_COLUMN: &str = "reason";

/// Largest per-row division count accepted from a `divisions_from` column.
pub const MAX_DIVISIONS: usize = 100;

/// How a column's total is split.
#[derive(Debug, Clone)]
pub enum ColumnShape {
    /// The same template for every row
    Fixed(Template),
    /// Equal-capacity divisions, counted by another column of the same row.
    /// `width` is the largest valid count in the table.
    PerRow { index: usize, column: String, width: usize },
}

/// A column mapping bound to a concrete input table.
#[derive(Debug, Clone)]
pub struct ResolvedColumn {
    pub source: String,
    pub source_index: usize,
    pub prefix: String,
    pub shape: ColumnShape,
    pub max_total: Option<f64>,
    pub step: Option<Step>,
}

impl ResolvedColumn {
    /// Output headers for this column, in structure order.
    pub fn output_headers(&self) -> Vec<String> {
        match &self.shape {
            ColumnShape::Fixed(template) => template
                .components()
                .iter()
                .map(|c| format!("{}-{}", self.prefix, c.id))
                .collect(),
            ColumnShape::PerRow { width, .. } => (1..=*width)
                .map(|n| format!("{}-div_{}", self.prefix, n))
                .collect(),
        }
    }

    fn width(&self) -> usize {
        match &self.shape {
            ColumnShape::Fixed(template) => template.len(),
            ColumnShape::PerRow { width, .. } => *width,
        }
    }

    /// Template for one row. Per-row shapes read the division count from
    /// `row`; every division may take the whole total.
    pub fn template_for(&self, row: &[String], total: f64) -> Result<Cow<'_, Template>, String> {
        match &self.shape {
            ColumnShape::Fixed(template) => Ok(Cow::Borrowed(template)),
            ColumnShape::PerRow { index, column, .. } => {
                let raw = row.get(*index).map(String::as_str).unwrap_or("");
                let divisions = parse_divisions(raw).map_err(|e| format!("{} {}", column, e))?;
                presets::uniform(divisions, total)
                    .map(Cow::Owned)
                    .map_err(|e| e.to_string())
            }
        }
    }
}

/// Parse a division count: a whole number from 1 to [`MAX_DIVISIONS`].
/// Spreadsheet exports may write counts as `3.0`.
pub fn parse_divisions(raw: &str) -> Result<usize, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("is empty".to_string());
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.fract() == 0.0 && n >= 1.0 && n <= MAX_DIVISIONS as f64 => Ok(n as usize),
        _ => Err(format!(
            "'{}' is not a whole number from 1 to {}",
            trimmed, MAX_DIVISIONS
        )),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub mode: Mode,
    pub seed: Option<u64>,
    pub sentinel: Sentinel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarantinedRow {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub reasons: Vec<String>,
}

/// Processed and unprocessed sets of one batch run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub processed: Table,
    pub unprocessed: Table,
    pub quarantined: Vec<QuarantinedRow>,
}

/// Bind the configured column mappings to `table`.
///
/// Fails if a source or count column is missing or a template cannot be
/// resolved, since no row could be processed correctly in that case.
pub fn resolve_columns(config: &Config, table: &Table) -> Result<Vec<ResolvedColumn>> {
    let mut resolved = Vec::new();
    for mapping in &config.columns {
        let source_index = find_column(table, &mapping.source)?;

        let shape = match &mapping.divisions_from {
            Some(column) => {
                let index = find_column(table, column)?;
                let width = table
                    .rows
                    .iter()
                    .filter_map(|row| row.get(index).and_then(|v| parse_divisions(v).ok()))
                    .max()
                    .unwrap_or(0);
                ColumnShape::PerRow {
                    index,
                    column: column.clone(),
                    width,
                }
            }
            None => ColumnShape::Fixed(
                config
                    .template(&mapping.template)
                    .with_context(|| format!("Unknown template '{}'", mapping.template))?
                    .with_context(|| format!("Invalid template '{}'", mapping.template))?,
            ),
        };

        let step = match mapping.step {
            Some(s) => Some(Step::new(s).with_context(|| {
                format!("Invalid step {} for column '{}'", s, mapping.source)
            })?),
            None => None,
        };

        resolved.push(ResolvedColumn {
            source: mapping.source.clone(),
            source_index,
            prefix: mapping.prefix.clone(),
            shape,
            max_total: mapping.max_total,
            step,
        });
    }
    Ok(resolved)
}

/// Check that the `split_by` column exists before any row is split.
pub fn check_split_column(table: &Table, split_by: Option<&str>) -> Result<()> {
    if let Some(column) = split_by {
        find_column(table, column).context("Cannot split processed rows")?;
    }
    Ok(())
}

fn find_column(table: &Table, name: &str) -> Result<usize> {
    match table.column_index(name) {
        Some(index) => Ok(index),
        None => bail!(
            "Column '{}' not found (available: {})",
            name,
            table.headers.join(", ")
        ),
    }
}

/// Parse a total cell. Empty, non-numeric, negative or over-maximum values
/// are rejected, never clamped.
pub fn parse_total(raw: &str, max_total: Option<f64>) -> Result<f64, DistributeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DistributeError::invalid_total(raw, "empty cell"));
    }
    let total: f64 = trimmed
        .parse()
        .map_err(|_| DistributeError::invalid_total(trimmed, "not a number"))?;
    if !total.is_finite() {
        return Err(DistributeError::invalid_total(trimmed, "not a finite number"));
    }
    if total < 0.0 {
        return Err(DistributeError::invalid_total(trimmed, "must not be negative"));
    }
    if let Some(max) = max_total {
        if total > max {
            return Err(DistributeError::invalid_total(
                trimmed,
                format!("exceeds the maximum of {}", max),
            ));
        }
    }
    Ok(total)
}

/// Distribute one cell's total under `column`, using `row` for per-row
/// division counts.
pub fn split_cell<R: MarkRng + ?Sized>(
    raw: &str,
    row: &[String],
    column: &ResolvedColumn,
    mode: Mode,
    rng: &mut R,
) -> Result<Distribution, String> {
    let total = parse_total(raw, column.max_total).map_err(|e| e.to_string())?;
    let template = column.template_for(row, total)?;
    let step = column.step.unwrap_or_else(|| Step::infer(total));
    distribute(total, &template, mode, step, rng).map_err(|e| e.to_string())
}

/// Split every row of `table`.
///
/// Rows where any column fails go to the unprocessed set with every reason
/// listed; all other rows are processed. One bad row never stops the batch.
pub fn process_table(
    table: &Table,
    columns: &[ResolvedColumn],
    options: &BatchOptions,
) -> BatchOutcome {
    let mut processed_headers = table.headers.clone();
    for column in columns {
        processed_headers.extend(column.output_headers());
    }
    let mut unprocessed_headers = table.headers.clone();
    unprocessed_headers.push(REASON_COLUMN.to_string());

    let mut outcome = BatchOutcome {
        processed: Table::new(processed_headers),
        unprocessed: Table::new(unprocessed_headers),
        quarantined: Vec::new(),
    };

    for (i, row) in table.rows.iter().enumerate() {
        let mut rng = RngSource::for_row(options.seed, i);
        match split_row(row, columns, options, &mut rng) {
            Ok(cells) => {
                let mut out = row.clone();
                out.extend(cells);
                outcome.processed.push_row(out);
            }
            Err(reasons) => {
                let mut out = row.clone();
                out.push(reasons.join("; "));
                outcome.unprocessed.push_row(out);
                outcome.quarantined.push(QuarantinedRow {
                    row: i + 1,
                    reasons,
                });
            }
        }
    }

    outcome
}

fn split_row<R: MarkRng + ?Sized>(
    row: &[String],
    columns: &[ResolvedColumn],
    options: &BatchOptions,
    rng: &mut R,
) -> Result<Vec<String>, Vec<String>> {
    let mut cells = Vec::new();
    let mut reasons = Vec::new();

    for column in columns {
        let raw = row.get(column.source_index).map(String::as_str).unwrap_or("");
        match split_cell(raw, row, column, options.mode, rng) {
            Ok(d) => {
                let start = cells.len();
                cells.extend(d.entries().iter().map(|a| a.mark.render(options.sentinel)));
                cells.resize(start + column.width(), String::new());
            }
            Err(e) => reasons.push(format!("{}: {}", column.source, e)),
        }
    }

    if reasons.is_empty() {
        Ok(cells)
    } else {
        Err(reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnMapping;

    fn input() -> Table {
        let mut t = Table::new(
            ["sno", "id", "name", "course-code", "st1-marks", "st2-marks", "ete-marks"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        for row in [
            ["1", "2410994001", "avik", "24ME0101", "39", "38", "58"],
            ["2", "2410994002", "sanya", "24ME0102", "abc", "39", "58"],
            ["3", "2410994003", "aman", "24ME0103", "36", "41", "-3"],
            ["4", "2410994004", "riya", "24ME0101", "0", "40", "60"],
        ] {
            t.push_row(row.iter().map(|s| s.to_string()).collect());
        }
        t
    }

    fn options(seed: u64) -> BatchOptions {
        BatchOptions {
            mode: Mode::Random,
            seed: Some(seed),
            sentinel: Sentinel::U,
        }
    }

    // Sum of one prefix's split cells; the 7 input columns are skipped since
    // `st1-marks` shares the `st1-` prefix
    fn sum_prefix(table: &Table, row: &[String], prefix: &str) -> (f64, usize) {
        let mut sum = 0.0;
        let mut na = 0;
        for (h, v) in table.headers.iter().zip(row).skip(7) {
            if h.starts_with(&format!("{}-", prefix)) {
                if v == "U" {
                    na += 1;
                } else {
                    sum += v.parse::<f64>().unwrap();
                }
            }
        }
        (sum, na)
    }

    #[test]
    fn test_parse_total() {
        assert_eq!(parse_total(" 39 ", Some(40.0)), Ok(39.0));
        assert_eq!(parse_total("39.5", None), Ok(39.5));
        for raw in ["", "  ", "abc", "-1", "41", "NaN", "inf"] {
            assert!(
                matches!(parse_total(raw, Some(40.0)), Err(DistributeError::InvalidTotal { .. })),
                "{:?}",
                raw
            );
        }
    }

    #[test]
    fn test_resolve_missing_column() {
        let mut config = Config::default();
        config.columns[0].source = "st3-marks".to_string();
        let err = resolve_columns(&config, &input()).unwrap_err();
        assert!(err.to_string().contains("st3-marks"));
    }

    #[test]
    fn test_resolve_unknown_template() {
        let mut config = Config::default();
        config.columns[0].template = "nope".to_string();
        assert!(resolve_columns(&config, &input()).is_err());
    }

    #[test]
    fn test_bad_rows_are_quarantined() {
        let table = input();
        let columns = resolve_columns(&Config::default(), &table).unwrap();
        let outcome = process_table(&table, &columns, &options(1));

        assert_eq!(outcome.processed.len(), 2);
        assert_eq!(outcome.unprocessed.len(), 2);
        assert_eq!(outcome.processed.rows[0][2], "avik");
        assert_eq!(outcome.processed.rows[1][2], "riya");

        assert_eq!(outcome.quarantined[0].row, 2);
        assert_eq!(outcome.quarantined[0].reasons.len(), 1);
        assert!(outcome.quarantined[0].reasons[0].starts_with("st1-marks"));

        // Row 3 has two problems; both are reported
        assert_eq!(outcome.quarantined[1].row, 3);
        assert_eq!(outcome.quarantined[1].reasons.len(), 2);
        let reason_cell = outcome.unprocessed.rows[1].last().unwrap();
        assert!(reason_cell.contains("st2-marks") && reason_cell.contains("ete-marks"));
    }

    #[test]
    fn test_processed_layout_and_sums() {
        let table = input();
        let columns = resolve_columns(&Config::default(), &table).unwrap();
        let outcome = process_table(&table, &columns, &options(5));
        let processed = &outcome.processed;

        // 7 original + 13 + 13 + 16 split columns
        assert_eq!(processed.headers.len(), 7 + 13 + 13 + 16);
        assert_eq!(processed.headers[7], "st1-1");
        assert_eq!(processed.headers[20], "st2-1");
        assert_eq!(processed.headers[33], "ete-q1");
        assert_eq!(outcome.unprocessed.headers.last().unwrap(), REASON_COLUMN);

        let row = &processed.rows[0];
        assert_eq!(sum_prefix(processed, row, "st1"), (39.0, 3));
        assert_eq!(sum_prefix(processed, row, "st2"), (38.0, 3));
        assert_eq!(sum_prefix(processed, row, "ete"), (58.0, 3));

        let row = &processed.rows[1];
        assert_eq!(sum_prefix(processed, row, "st1"), (0.0, 3));
        assert_eq!(sum_prefix(processed, row, "ete"), (60.0, 3));
    }

    #[test]
    fn test_seeded_runs_reproduce() {
        let table = input();
        let columns = resolve_columns(&Config::default(), &table).unwrap();
        let a = process_table(&table, &columns, &options(42));
        let b = process_table(&table, &columns, &options(42));
        assert_eq!(a.processed, b.processed);
    }

    #[test]
    fn test_row_result_independent_of_other_rows() {
        let table = input();
        let columns = resolve_columns(&Config::default(), &table).unwrap();
        let full = process_table(&table, &columns, &options(8));

        // Dropping a later row must not change earlier results
        let mut shorter = table.clone();
        shorter.rows.truncate(1);
        let partial = process_table(&shorter, &columns, &options(8));
        assert_eq!(partial.processed.rows[0], full.processed.rows[0]);
    }

    #[test]
    fn test_legacy_sentinel_output() {
        let table = input();
        let columns = resolve_columns(&Config::default(), &table).unwrap();
        let mut opts = options(3);
        opts.sentinel = Sentinel::NotApplicable;
        let outcome = process_table(&table, &columns, &opts);
        let na = outcome.processed.rows[0].iter().filter(|c| *c == "N/A").count();
        assert_eq!(na, 9);
    }

    #[test]
    fn test_custom_step_column() {
        let mut config = Config::default();
        config.columns.truncate(1);
        config.columns[0].step = Some(0.5);
        let mut table = Table::new(vec!["st1-marks".to_string()]);
        table.push_row(vec!["20.5".to_string()]);
        table.push_row(vec!["20.25".to_string()]);

        let columns = resolve_columns(&config, &table).unwrap();
        let outcome = process_table(&table, &columns, &options(2));
        assert_eq!(outcome.processed.len(), 1);
        assert_eq!(outcome.quarantined[0].row, 2);
        assert!(outcome.quarantined[0].reasons[0].contains("step 0.5"));
    }

    fn lab_config() -> Config {
        let mut config = Config::default();
        config.columns = ["iv", "ev"]
            .iter()
            .map(|c| ColumnMapping {
                source: c.to_string(),
                prefix: c.to_string(),
                template: String::new(),
                divisions_from: Some("co".to_string()),
                max_total: None,
                step: None,
            })
            .collect();
        config
    }

    fn lab_input() -> Table {
        let mut t = Table::new(
            ["roll", "iv", "ev", "co"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        for row in [
            ["1", "9", "12", "3"],
            ["2", "10", "10", "5.0"],
            ["3", "8", "8", "0"],
            ["4", "8", "8", "two"],
        ] {
            t.push_row(row.iter().map(|s| s.to_string()).collect());
        }
        t
    }

    #[test]
    fn test_parse_divisions() {
        assert_eq!(parse_divisions(" 4 "), Ok(4));
        assert_eq!(parse_divisions("3.0"), Ok(3));
        for raw in ["", "0", "-2", "2.5", "abc", "101"] {
            assert!(parse_divisions(raw).is_err(), "{:?}", raw);
        }
    }

    #[test]
    fn test_divisions_from_row_column() {
        let table = lab_input();
        let columns = resolve_columns(&lab_config(), &table).unwrap();
        assert!(matches!(columns[0].shape, ColumnShape::PerRow { width: 5, .. }));

        let mut opts = options(4);
        opts.mode = Mode::Equal;
        let outcome = process_table(&table, &columns, &opts);
        let processed = &outcome.processed;

        // 4 original + 5 iv + 5 ev columns, sized by the widest valid row
        assert_eq!(processed.headers.len(), 4 + 5 + 5);
        assert_eq!(processed.headers[4], "iv-div_1");
        assert_eq!(processed.headers[9], "ev-div_1");
        assert_eq!(processed.len(), 2);

        // co = 3: three equal parts, the rest left blank
        assert_eq!(processed.rows[0][4..9], ["3", "3", "3", "", ""]);
        assert_eq!(processed.rows[0][9..14], ["4", "4", "4", "", ""]);
        assert_eq!(processed.rows[1][4..9], ["2", "2", "2", "2", "2"]);

        assert_eq!(outcome.quarantined.len(), 2);
        assert_eq!(outcome.quarantined[0].row, 3);
        assert!(outcome.quarantined[0].reasons[0].contains("co '0'"));
        assert_eq!(outcome.quarantined[1].row, 4);
        assert_eq!(outcome.quarantined[1].reasons.len(), 2);
    }

    #[test]
    fn test_divisions_from_missing_column() {
        let mut table = lab_input();
        table.headers[3] = "cos".to_string();
        let err = resolve_columns(&lab_config(), &table).unwrap_err();
        assert!(err.to_string().contains("'co'"));
    }

    #[test]
    fn test_check_split_column() {
        let table = input();
        assert!(check_split_column(&table, None).is_ok());
        assert!(check_split_column(&table, Some("course-code")).is_ok());
        let err = check_split_column(&table, Some("section")).unwrap_err();
        assert!(format!("{:#}", err).contains("'section' not found"));
    }
}
