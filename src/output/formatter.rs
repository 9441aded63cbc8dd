use owo_colors::OwoColorize;
use std::io::IsTerminal;
use terminal_size::{terminal_size, Width};

use crate::batch::BatchOutcome;
use crate::distribution::{Distribution, Mark, Sentinel, Template};

/// Check if stdout is a TTY (for auto-detecting color support)
pub fn should_use_colors() -> bool {
    std::io::stdout().is_terminal()
}

/// Get terminal width, defaulting to None for pipes (unlimited)
fn get_terminal_width() -> Option<usize> {
    terminal_size().map(|(Width(w), _)| w as usize)
}

/// Truncate text to fit available width, accounting for Unicode
fn truncate(text: &str, max_width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_width {
        text.to_string()
    } else if max_width > 3 {
        format!("{}...", chars[..max_width - 3].iter().collect::<String>())
    } else {
        chars[..max_width].iter().collect()
    }
}

/// Format a number without a trailing ".0" (5 -> "5", 1.75 -> "1.75")
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Format one distribution as an aligned table: id, mark, max.
/// Not-attempted components show the sentinel, dimmed when colored.
pub fn format_distribution(dist: &Distribution, sentinel: Sentinel, use_colors: bool) -> String {
    let id_width = dist
        .entries()
        .iter()
        .map(|a| a.id.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max(2);

    let mut lines: Vec<String> = dist
        .entries()
        .iter()
        .map(|a| {
            let mark = format!("{:>6}", a.mark.render(sentinel));
            let max = format!("/ {}", format_number(a.max));
            let id = format!("{:>width$}", a.id.as_str(), width = id_width);
            match (use_colors, a.mark) {
                (false, _) => format!("{}  {}  {}", id, mark, max),
                (true, Mark::NotAttempted) => {
                    format!("{}  {}  {}", id.dimmed(), mark.dimmed(), max.dimmed())
                }
                (true, Mark::Score(_)) => format!("{}  {}  {}", id, mark.bold(), max.dimmed()),
            }
        })
        .collect();

    let footer = format!(
        "Total: {} (step {})",
        format_number(dist.sum()),
        dist.step()
    );
    lines.push(if use_colors {
        footer.green().to_string()
    } else {
        footer
    });
    lines.join("\n")
}

/// One-line summary of a batch run, followed by one line per quarantined row.
/// Reason text is truncated to the terminal width when stdout is a terminal.
pub fn format_batch_summary(name: &str, outcome: &BatchOutcome, use_colors: bool) -> String {
    let processed = outcome.processed.len();
    let unprocessed = outcome.unprocessed.len();

    let header = if use_colors {
        format!(
            "{}: {} processed, {} unprocessed",
            name.bold(),
            processed.green(),
            if unprocessed > 0 {
                unprocessed.red().to_string()
            } else {
                unprocessed.to_string()
            }
        )
    } else {
        format!(
            "{}: {} processed, {} unprocessed",
            name, processed, unprocessed
        )
    };

    let term_width = get_terminal_width();
    let mut lines = vec![header];
    for q in &outcome.quarantined {
        let prefix = format!("  row {}: ", q.row);
        let reason = q.reasons.join("; ");
        let reason = match term_width {
            Some(width) if width > prefix.len() + 10 => truncate(&reason, width - prefix.len()),
            Some(_) => truncate(&reason, 20),
            None => reason,
        };
        lines.push(if use_colors {
            format!("{}{}", prefix.dimmed(), reason.red())
        } else {
            format!("{}{}", prefix, reason)
        });
    }
    lines.join("\n")
}

/// One stderr line per quarantined row, with every reason in full.
pub fn quarantine_warnings(name: &str, outcome: &BatchOutcome) -> Vec<String> {
    outcome
        .quarantined
        .iter()
        .map(|q| format!("{}: row {} not processed: {}", name, q.row, q.reasons.join("; ")))
        .collect()
}

/// A named template for the `templates` listing.
pub struct TemplateEntry<'a> {
    pub name: &'a str,
    pub template: &'a Template,
    pub builtin: bool,
}

/// List templates with component count, NA-group count and the total they
/// can always hold.
pub fn format_template_list(entries: &[TemplateEntry], use_colors: bool) -> String {
    if entries.is_empty() {
        return "No templates available.".to_string();
    }

    let name_width = entries
        .iter()
        .map(|e| e.name.chars().count())
        .max()
        .unwrap_or(0);

    entries
        .iter()
        .map(|e| {
            let name = format!("{:<width$}", e.name, width = name_width);
            let detail = format!(
                "{:>3} components  {} NA-groups  holds up to {}",
                e.template.len(),
                e.template.na_groups().len(),
                format_number(e.template.guaranteed_capacity())
            );
            let origin = if e.builtin { "built-in" } else { "config" };
            if use_colors {
                format!("{}  {}  {}", name.bold(), detail, origin.dimmed())
            } else {
                format!("{}  {}  {}", name, detail, origin)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
