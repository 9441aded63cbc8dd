use anyhow::{anyhow, Context, Result};
use atomic_write_file::AtomicWriteFile;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::batch::{BatchOutcome, Table};

const MAX_COLUMN_WIDTH: usize = 40;

/// File format for processed and unprocessed tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Xlsx,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
        }
    }

    /// Spreadsheet extensions map to XLSX, everything else to CSV.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(e) if is_workbook_extension(e) => OutputFormat::Xlsx,
            _ => OutputFormat::Csv,
        }
    }
}

/// Extensions read and written as spreadsheets.
pub fn is_workbook_extension(ext: &str) -> bool {
    ["xlsx", "xlsm", "xls", "ods"]
        .iter()
        .any(|w| w.eq_ignore_ascii_case(ext))
}

/// Output file name: `{kind}_{stem}[_{group}].{ext}`.
///
/// `group` is the `split_by` value; characters that are awkward in file
/// names become `_`.
pub fn output_file_name(kind: &str, stem: &str, group: Option<&str>, format: OutputFormat) -> String {
    match group {
        Some(g) => {
            let g: String = g
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            let g = if g.is_empty() { "blank".to_string() } else { g };
            format!("{}_{}_{}.{}", kind, stem, g, format.extension())
        }
        None => format!("{}_{}.{}", kind, stem, format.extension()),
    }
}

/// Write bytes atomically, creating the parent directory if needed.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut file = AtomicWriteFile::open(path)
        .with_context(|| format!("Failed to open atomic write file at {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.commit()
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(())
}

pub fn to_csv_bytes(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .context("Failed to write CSV header")?;
    for row in &table.rows {
        writer.write_record(row).context("Failed to write CSV row")?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV: {}", e.error()))
}

/// The cell as a number, only if writing it back prints the same text.
/// `007` and `1e3` stay strings so identifiers are copied unchanged.
fn as_plain_number(value: &str) -> Option<f64> {
    let n: f64 = value.parse().ok()?;
    (n.is_finite() && n.to_string() == value).then_some(n)
}

/// Render `table` as an XLSX workbook with a bold yellow header row.
/// With `highlight`, every data row is filled light red (used for the
/// unprocessed set).
pub fn to_xlsx_bytes(table: &Table, highlight: bool) -> Result<Vec<u8>> {
    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::Yellow)
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let mut cell_format = Format::new().set_border(FormatBorder::Thin);
    if highlight {
        cell_format = cell_format.set_background_color(Color::RGB(0xFFCCCC));
    }

    let mut worksheet = Worksheet::new();
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();

    for (c, header) in table.headers.iter().enumerate() {
        let col = u16::try_from(c).context("Too many columns for XLSX")?;
        worksheet
            .write_string_with_format(0, col, header, &header_format)
            .context("Failed to write XLSX header")?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let xlsx_row = u32::try_from(r + 1).context("Too many rows for XLSX")?;
        for (c, value) in row.iter().enumerate() {
            let col = u16::try_from(c).context("Too many columns for XLSX")?;
            let written = match as_plain_number(value) {
                Some(n) => worksheet.write_number_with_format(xlsx_row, col, n, &cell_format),
                None => worksheet.write_string_with_format(xlsx_row, col, value, &cell_format),
            };
            written.with_context(|| format!("Failed to write XLSX cell at row {}", r + 1))?;
            if let Some(w) = widths.get_mut(c) {
                *w = (*w).max(value.chars().count());
            }
        }
    }

    for (c, width) in widths.iter().enumerate() {
        let col = u16::try_from(c).context("Too many columns for XLSX")?;
        let width = (*width + 2).min(MAX_COLUMN_WIDTH);
        worksheet
            .set_column_width(col, width as f64)
            .context("Failed to set XLSX column width")?;
    }

    let mut workbook = Workbook::new();
    workbook.push_worksheet(worksheet);
    workbook
        .save_to_buffer()
        .context("Failed to render XLSX workbook")
}

/// Write `table` to `path` in `format`.
pub fn write_table(path: &Path, table: &Table, format: OutputFormat, highlight: bool) -> Result<()> {
    let bytes = match format {
        OutputFormat::Csv => to_csv_bytes(table)?,
        OutputFormat::Xlsx => to_xlsx_bytes(table, highlight)?,
    };
    write_bytes(path, &bytes)
}

/// Write the processed and unprocessed sets of one input into `out_dir`.
///
/// With `split_by`, processed rows go to one file per distinct value. Values
/// that sanitize to the same name get a `_2`, `_3`, ... suffix. When no row
/// was processed, an empty `processed_{stem}` file is still written.
pub fn write_outcome(
    out_dir: &Path,
    stem: &str,
    outcome: &BatchOutcome,
    format: OutputFormat,
    split_by: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let parts = match split_by {
        Some(column) => outcome.processed.partition_by(column)?,
        None => Vec::new(),
    };

    let mut files = Vec::new();
    if parts.is_empty() {
        let target = out_dir.join(output_file_name("processed", stem, None, format));
        write_table(&target, &outcome.processed, format, false)?;
        files.push(target);
    } else {
        let mut used = HashSet::new();
        for (value, part) in &parts {
            let mut name = output_file_name("processed", stem, Some(value), format);
            let mut n = 2;
            while !used.insert(name.clone()) {
                let suffixed = format!("{}_{}", value, n);
                name = output_file_name("processed", stem, Some(&suffixed), format);
                n += 1;
            }
            let target = out_dir.join(name);
            write_table(&target, part, format, false)?;
            files.push(target);
        }
    }

    let target = out_dir.join(output_file_name("unprocessed", stem, None, format));
    write_table(&target, &outcome.unprocessed, format, true)?;
    files.push(target);
    Ok(files)
}
