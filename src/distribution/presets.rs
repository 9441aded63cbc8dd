//! Built-in structures for the exam formats in regular use.
//!
//! Sessional tests are out of 40 and end-term exams out of 60; every preset
//! below holds exactly that much once each NA-group has dropped a question.

use std::ops::RangeInclusive;

use super::template::{Template, TemplateError};
use super::types::ComponentId;

pub const ST_13: &str = "st-13";
pub const ETE_16: &str = "ete-16";
pub const DRAWING_ST: &str = "drawing-st";
pub const DRAWING_ETE: &str = "drawing-ete";

pub const BUILTIN_NAMES: [&str; 4] = [ST_13, ETE_16, DRAWING_ST, DRAWING_ETE];

fn numbered(prefix: &str, range: RangeInclusive<u32>, max: f64) -> Vec<(ComponentId, f64)> {
    range
        .map(|n| (ComponentId::from(format!("{}{}", prefix, n)), max))
        .collect()
}

fn ids(prefix: &str, range: RangeInclusive<u32>) -> Vec<ComponentId> {
    range
        .map(|n| ComponentId::from(format!("{}{}", prefix, n)))
        .collect()
}

/// Look up a built-in template by name.
pub fn builtin(name: &str) -> Option<Template> {
    let (components, groups) = match name {
        ST_13 => (
            [
                numbered("", 1..=1, 5.0),
                numbered("", 2..=7, 2.0),
                numbered("", 8..=11, 5.0),
                numbered("", 12..=13, 10.0),
            ]
            .concat(),
            vec![ids("", 2..=7), ids("", 8..=11), ids("", 12..=13)],
        ),
        ETE_16 => (
            [
                numbered("q", 1..=1, 5.0),
                numbered("q", 2..=7, 2.0),
                numbered("q", 8..=13, 5.0),
                numbered("q", 14..=16, 10.0),
            ]
            .concat(),
            vec![ids("q", 2..=7), ids("q", 8..=13), ids("q", 14..=16)],
        ),
        DRAWING_ST => (
            [
                numbered("", 1..=5, 2.0),
                numbered("", 6..=10, 5.0),
                numbered("", 11..=12, 10.0),
            ]
            .concat(),
            vec![ids("", 6..=10), ids("", 11..=12)],
        ),
        DRAWING_ETE => (
            [
                numbered("q", 1..=10, 2.0),
                numbered("q", 11..=15, 5.0),
                numbered("q", 16..=18, 10.0),
            ]
            .concat(),
            vec![ids("q", 11..=15), ids("q", 16..=18)],
        ),
        _ => return None,
    };
    Template::new(components, groups).ok()
}

/// `divisions` equal components `div_1..div_n`, each capped at `cap`.
pub fn uniform(divisions: usize, cap: f64) -> Result<Template, TemplateError> {
    Template::structure((1..=divisions).map(|n| (format!("div_{}", n), cap)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtins_build() {
        for name in BUILTIN_NAMES {
            assert!(builtin(name).is_some(), "{} failed to build", name);
        }
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn test_builtins_hold_exam_totals() {
        for (name, total) in [(ST_13, 40.0), (ETE_16, 60.0), (DRAWING_ST, 40.0), (DRAWING_ETE, 60.0)] {
            let t = builtin(name).unwrap();
            assert_eq!(t.guaranteed_capacity(), total, "{}", name);
        }
    }

    #[test]
    fn test_st_13_layout() {
        let t = builtin(ST_13).unwrap();
        assert_eq!(t.len(), 13);
        assert_eq!(t.na_groups().len(), 3);
        assert_eq!(t.components()[0].max, 5.0);
        assert_eq!(t.components()[12].id.as_str(), "13");
    }

    #[test]
    fn test_ete_16_uses_q_ids() {
        let t = builtin(ETE_16).unwrap();
        assert_eq!(t.len(), 16);
        assert!(t.components().iter().all(|c| c.id.as_str().starts_with('q')));
    }

    #[test]
    fn test_uniform() {
        let t = uniform(3, 2.5).unwrap();
        let ids: Vec<&str> = t.components().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["div_1", "div_2", "div_3"]);
        assert_eq!(t.capacity(), 7.5);
        assert!(uniform(0, 1.0).is_err());
    }
}
