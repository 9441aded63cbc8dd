use serde::{Deserialize, Serialize};
use std::fmt;

use super::step::Step;

/// Identifier of a single component (sub-question) in a structure.
///
/// Structures mix plain numbers (`1`, `2`, ...) and named slots (`q1`, `q2`),
/// so ids are stored as text. YAML accepts either an integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(from = "RawComponentId", into = "String")]
pub struct ComponentId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawComponentId {
    Number(u64),
    Text(String),
}

impl From<RawComponentId> for ComponentId {
    fn from(raw: RawComponentId) -> Self {
        match raw {
            RawComponentId::Number(n) => Self(n.to_string()),
            RawComponentId::Text(s) => Self(s.trim().to_string()),
        }
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.0
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

impl From<String> for ComponentId {
    fn from(s: String) -> Self {
        Self(s.trim().to_string())
    }
}

impl From<u32> for ComponentId {
    fn from(n: u32) -> Self {
        Self(n.to_string())
    }
}

impl ComponentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading non-digit part of the id: `"q"` for `q12`, `""` for `7`.
    pub fn label_prefix(&self) -> &str {
        let end = self
            .0
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the total is spread over the allowed components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Proportional to each component's maximum, then corrected to the exact total
    Equal,
    /// Random magnitudes per component, scaled and corrected to the exact total
    #[default]
    Random,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Equal => f.write_str("equal"),
            Mode::Random => f.write_str("random"),
        }
    }
}

/// Literal written into a cell for a component marked "not attempted".
///
/// `U` is canonical. `N/A` is the older rendering; it can still be selected
/// for output and is always recognised on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
pub enum Sentinel {
    #[default]
    #[serde(rename = "U")]
    #[value(name = "u")]
    U,
    #[serde(rename = "N/A")]
    #[value(name = "na")]
    NotApplicable,
}

impl Sentinel {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentinel::U => "U",
            Sentinel::NotApplicable => "N/A",
        }
    }

    /// True if a cell holds either sentinel spelling (case-insensitive).
    pub fn is_not_attempted(cell: &str) -> bool {
        let cell = cell.trim();
        cell.eq_ignore_ascii_case("u") || cell.eq_ignore_ascii_case("n/a")
    }
}

/// Value assigned to one component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mark {
    Score(f64),
    NotAttempted,
}

impl Mark {
    pub fn score(&self) -> Option<f64> {
        match self {
            Mark::Score(v) => Some(*v),
            Mark::NotAttempted => None,
        }
    }

    pub fn is_not_attempted(&self) -> bool {
        matches!(self, Mark::NotAttempted)
    }

    /// Cell text for this mark. Whole numbers print without a decimal point.
    pub fn render(&self, sentinel: Sentinel) -> String {
        match self {
            Mark::Score(v) => format!("{}", v),
            Mark::NotAttempted => sentinel.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub id: ComponentId,
    pub max: f64,
    pub mark: Mark,
}

/// Result of one `distribute` call, in structure order.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub(crate) total: f64,
    pub(crate) step: Step,
    pub(crate) entries: Vec<Allocation>,
}

impl Distribution {
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn entries(&self) -> &[Allocation] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<Mark> {
        self.entries
            .iter()
            .find(|a| a.id.as_str() == id)
            .map(|a| a.mark)
    }

    /// Sum of all numeric marks.
    pub fn sum(&self) -> f64 {
        self.entries.iter().filter_map(|a| a.mark.score()).sum()
    }

    pub fn not_attempted(&self) -> impl Iterator<Item = &ComponentId> {
        self.entries
            .iter()
            .filter(|a| a.mark.is_not_attempted())
            .map(|a| &a.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_from_yaml_number_and_text() {
        let ids: Vec<ComponentId> = serde_saphyr::from_str("[1, q2, \"3\"]").unwrap();
        assert_eq!(ids, vec!["1".into(), "q2".into(), "3".into()]);
    }

    #[test]
    fn test_label_prefix() {
        assert_eq!(ComponentId::from("q12").label_prefix(), "q");
        assert_eq!(ComponentId::from("7").label_prefix(), "");
        assert_eq!(ComponentId::from("div_3").label_prefix(), "div_");
    }

    #[test]
    fn test_sentinel_recognises_both_spellings() {
        assert!(Sentinel::is_not_attempted("U"));
        assert!(Sentinel::is_not_attempted(" n/a "));
        assert!(Sentinel::is_not_attempted("N/A"));
        assert!(!Sentinel::is_not_attempted("0"));
        assert!(!Sentinel::is_not_attempted(""));
    }

    #[test]
    fn test_sentinel_yaml_spelling() {
        let s: Sentinel = serde_saphyr::from_str("\"N/A\"").unwrap();
        assert_eq!(s, Sentinel::NotApplicable);
        let s: Sentinel = serde_saphyr::from_str("U").unwrap();
        assert_eq!(s, Sentinel::U);
    }

    #[test]
    fn test_mark_render() {
        assert_eq!(Mark::Score(5.0).render(Sentinel::U), "5");
        assert_eq!(Mark::Score(2.25).render(Sentinel::U), "2.25");
        assert_eq!(Mark::NotAttempted.render(Sentinel::U), "U");
        assert_eq!(Mark::NotAttempted.render(Sentinel::NotApplicable), "N/A");
    }
}
