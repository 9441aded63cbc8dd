//! Removes "not attempted" slots from split marks.
//!
//! Rosters that receive the marks list only attempted questions, so each
//! NA-group of k questions shrinks to k-1 columns holding the attempted answers
//! in order. Columns are renumbered from 1.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;

use super::table::Table;
use crate::config::Config;
use crate::distribution::{Sentinel, Template};

#[derive(Debug, Clone)]
enum Slot {
    Keep(usize),
    Group { members: Vec<usize>, width: usize },
}

/// How one prefix's split columns collapse.
#[derive(Debug, Clone)]
pub struct CompactPlan {
    prefix: String,
    first_index: usize,
    consumed: Vec<usize>,
    headers: Vec<String>,
    slots: Vec<Slot>,
}

impl CompactPlan {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Build the plan for `prefix` under `template`.
    ///
    /// Returns `Ok(None)` when the table holds none of the prefix's columns
    /// and an error when it holds only some of them.
    pub fn new(table: &Table, prefix: &str, template: &Template) -> Result<Option<Self>> {
        let found: Vec<Option<usize>> = template
            .components()
            .iter()
            .map(|c| table.column_index(&format!("{}-{}", prefix, c.id)))
            .collect();

        if found.iter().all(Option::is_none) {
            return Ok(None);
        }
        if let Some(i) = found.iter().position(Option::is_none) {
            bail!(
                "Column '{}-{}' is missing",
                prefix,
                template.components()[i].id
            );
        }
        let indices: Vec<usize> = found.into_iter().flatten().collect();

        let groups = template.group_indices();
        let mut emitted = vec![false; groups.len()];
        let mut headers = Vec::new();
        let mut slots = Vec::new();

        for (i, component) in template.components().iter().enumerate() {
            let label_prefix = component.id.label_prefix();
            match template.group_of(i) {
                None => {
                    headers.push(format!("{}-{}{}", prefix, label_prefix, headers.len() + 1));
                    slots.push(Slot::Keep(indices[i]));
                }
                Some(g) if !emitted[g] => {
                    emitted[g] = true;
                    let width = groups[g].len() - 1;
                    for _ in 0..width {
                        headers.push(format!("{}-{}{}", prefix, label_prefix, headers.len() + 1));
                    }
                    slots.push(Slot::Group {
                        members: groups[g].iter().map(|&m| indices[m]).collect(),
                        width,
                    });
                }
                Some(_) => {}
            }
        }

        let first_index = indices
            .iter()
            .copied()
            .min()
            .context("Template has no components")?;

        Ok(Some(Self {
            prefix: prefix.to_string(),
            first_index,
            consumed: indices,
            headers,
            slots,
        }))
    }

    fn cells(&self, row: &[String]) -> Vec<String> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        let mut out = Vec::with_capacity(self.headers.len());
        for slot in &self.slots {
            match slot {
                Slot::Keep(i) => out.push(cell(*i)),
                Slot::Group { members, width } => {
                    let mut attempted: Vec<String> = members
                        .iter()
                        .map(|&m| cell(m))
                        .filter(|v| !v.trim().is_empty() && !Sentinel::is_not_attempted(v))
                        .take(*width)
                        .collect();
                    attempted.resize(*width, String::new());
                    out.extend(attempted);
                }
            }
        }
        out
    }
}

/// Plans for every configured column whose split columns appear in `table`.
pub fn plan_compaction(config: &Config, table: &Table) -> Result<Vec<CompactPlan>> {
    let mut plans = Vec::new();
    // Per-row divisions have no choice groups, so nothing to drop
    for mapping in config.columns.iter().filter(|m| m.divisions_from.is_none()) {
        let template = config
            .template(&mapping.template)
            .with_context(|| format!("Unknown template '{}'", mapping.template))?
            .with_context(|| format!("Invalid template '{}'", mapping.template))?;
        if let Some(plan) = CompactPlan::new(table, &mapping.prefix, &template)? {
            plans.push(plan);
        }
    }
    if plans.is_empty() {
        bail!("No split columns found for any configured prefix");
    }
    Ok(plans)
}

/// Apply `plans` to every row. Compacted columns take the place of the
/// prefix's first original column; everything else passes through.
pub fn compact_table(table: &Table, plans: &[CompactPlan]) -> Table {
    let consumed: HashSet<usize> = plans
        .iter()
        .flat_map(|p| p.consumed.iter().copied())
        .collect();

    let mut headers = Vec::new();
    for (j, header) in table.headers.iter().enumerate() {
        if let Some(plan) = plans.iter().find(|p| p.first_index == j) {
            headers.extend(plan.headers.iter().cloned());
        } else if !consumed.contains(&j) {
            headers.push(header.clone());
        }
    }

    let mut out = Table::new(headers);
    for row in &table.rows {
        let mut cells = Vec::new();
        for j in 0..table.headers.len() {
            if let Some(plan) = plans.iter().find(|p| p.first_index == j) {
                cells.extend(plan.cells(row));
            } else if !consumed.contains(&j) {
                cells.push(row.get(j).cloned().unwrap_or_default());
            }
        }
        out.push_row(cells);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::presets;

    fn st1_table(values: &[&str]) -> Table {
        let mut headers = vec!["id".to_string()];
        headers.extend((1..=13).map(|n| format!("st1-{}", n)));
        headers.push("name".to_string());
        let mut t = Table::new(headers);
        let mut row = vec!["23ME1001".to_string()];
        row.extend(values.iter().map(|v| v.to_string()));
        row.push("Test Student".to_string());
        t.push_row(row);
        t
    }

    #[test]
    fn test_compacts_st_13() {
        let table = st1_table(&[
            "5", "2", "U", "2", "2", "1", "2", "5", "N/A", "5", "5", "U", "10",
        ]);
        let template = presets::builtin(presets::ST_13).unwrap();
        let plan = CompactPlan::new(&table, "st1", &template).unwrap().unwrap();
        let out = compact_table(&table, &[plan]);

        let mut expected_headers = vec!["id".to_string()];
        expected_headers.extend((1..=10).map(|n| format!("st1-{}", n)));
        expected_headers.push("name".to_string());
        assert_eq!(out.headers, expected_headers);
        assert_eq!(
            out.rows[0],
            vec![
                "23ME1001", "5", "2", "2", "2", "1", "2", "5", "5", "5", "10", "Test Student"
            ]
        );
    }

    #[test]
    fn test_over_full_group_is_truncated_and_short_group_padded() {
        let table = st1_table(&[
            "5", "2", "2", "2", "2", "2", "2", "", "U", "5", "5", "U", "U",
        ]);
        let template = presets::builtin(presets::ST_13).unwrap();
        let plan = CompactPlan::new(&table, "st1", &template).unwrap().unwrap();
        let out = compact_table(&table, &[plan]);
        assert_eq!(&out.rows[0][2..7], &["2", "2", "2", "2", "2"]);
        assert_eq!(&out.rows[0][7..10], &["5", "5", ""]);
        assert_eq!(out.rows[0][10], "");
    }

    #[test]
    fn test_q_style_labels() {
        let template = presets::builtin(presets::ETE_16).unwrap();
        let mut headers: Vec<String> = (1..=16).map(|n| format!("ete-q{}", n)).collect();
        headers.insert(0, "id".to_string());
        let table = Table::new(headers);
        let plan = CompactPlan::new(&table, "ete", &template).unwrap().unwrap();
        assert_eq!(plan.headers().len(), 13);
        assert_eq!(plan.headers()[0], "ete-q1");
        assert_eq!(plan.headers()[12], "ete-q13");
    }

    #[test]
    fn test_absent_prefix_is_skipped() {
        let table = st1_table(&["0"; 13]);
        let template = presets::builtin(presets::ETE_16).unwrap();
        assert!(CompactPlan::new(&table, "ete", &template).unwrap().is_none());
    }

    #[test]
    fn test_partial_columns_error() {
        let mut table = st1_table(&["0"; 13]);
        table.headers[13] = "other".to_string();
        let template = presets::builtin(presets::ST_13).unwrap();
        let err = CompactPlan::new(&table, "st1", &template).unwrap_err();
        assert!(err.to_string().contains("st1-13"));
    }

    #[test]
    fn test_plan_compaction_from_config() {
        let table = st1_table(&["0"; 13]);
        let plans = plan_compaction(&Config::default(), &table).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].prefix(), "st1");

        let empty = Table::new(vec!["id".to_string()]);
        assert!(plan_compaction(&Config::default(), &empty).is_err());
    }
}
