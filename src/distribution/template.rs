use std::collections::HashSet;
use thiserror::Error;

use super::types::ComponentId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("structure has no components")]
    Empty,

    #[error("duplicate component '{0}'")]
    DuplicateComponent(ComponentId),

    #[error("component '{id}' has invalid max {max}: must be finite and non-negative")]
    InvalidMax { id: ComponentId, max: f64 },

    #[error("NA-group {group} is empty")]
    EmptyGroup { group: usize },

    #[error("NA-group {group} names unknown component '{id}'")]
    UnknownMember { group: usize, id: ComponentId },

    #[error("component '{id}' appears in more than one NA-group")]
    OverlappingGroups { id: ComponentId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: ComponentId,
    pub max: f64,
}

/// A validated structure plus its NA-groups.
///
/// Components keep their declared order; that order decides fill order when
/// the engine hands out leftover units.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    components: Vec<Component>,
    // Indices into `components`
    na_groups: Vec<Vec<usize>>,
}

impl Template {
    pub fn new<I, C, G, M>(components: I, na_groups: G) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (C, f64)>,
        C: Into<ComponentId>,
        G: IntoIterator<Item = M>,
        M: IntoIterator,
        M::Item: Into<ComponentId>,
    {
        let components: Vec<Component> = components
            .into_iter()
            .map(|(id, max)| Component { id: id.into(), max })
            .collect();

        if components.is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut seen = HashSet::new();
        for c in &components {
            if !seen.insert(c.id.clone()) {
                return Err(TemplateError::DuplicateComponent(c.id.clone()));
            }
            if !c.max.is_finite() || c.max < 0.0 {
                return Err(TemplateError::InvalidMax {
                    id: c.id.clone(),
                    max: c.max,
                });
            }
        }

        let mut grouped = HashSet::new();
        let mut groups = Vec::new();
        for (g, members) in na_groups.into_iter().enumerate() {
            let mut indices = Vec::new();
            for member in members {
                let id: ComponentId = member.into();
                let index = components
                    .iter()
                    .position(|c| c.id == id)
                    .ok_or_else(|| TemplateError::UnknownMember {
                        group: g,
                        id: id.clone(),
                    })?;
                if !grouped.insert(index) {
                    return Err(TemplateError::OverlappingGroups { id });
                }
                indices.push(index);
            }
            if indices.is_empty() {
                return Err(TemplateError::EmptyGroup { group: g });
            }
            groups.push(indices);
        }

        Ok(Self {
            components,
            na_groups: groups,
        })
    }

    /// Template without NA-groups.
    pub fn structure<I, C>(components: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (C, f64)>,
        C: Into<ComponentId>,
    {
        Self::new(components, Vec::<Vec<ComponentId>>::new())
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub(crate) fn group_indices(&self) -> &[Vec<usize>] {
        &self.na_groups
    }

    pub fn na_groups(&self) -> Vec<Vec<&ComponentId>> {
        self.na_groups
            .iter()
            .map(|g| g.iter().map(|&i| &self.components[i].id).collect())
            .collect()
    }

    /// NA-group containing the component at `index`, if any.
    pub fn group_of(&self, index: usize) -> Option<usize> {
        self.na_groups.iter().position(|g| g.contains(&index))
    }

    /// Sum of all maxima, ignoring NA-groups.
    pub fn capacity(&self) -> f64 {
        self.components.iter().map(|c| c.max).sum()
    }

    /// Largest total any NA selection can hold: each group drops its
    /// smallest member.
    pub fn max_reachable(&self) -> f64 {
        let dropped: f64 = self
            .na_groups
            .iter()
            .map(|g| {
                g.iter()
                    .map(|&i| self.components[i].max)
                    .fold(f64::INFINITY, f64::min)
            })
            .sum();
        self.capacity() - dropped
    }

    /// Total every NA selection can hold: each group drops its largest member.
    pub fn guaranteed_capacity(&self) -> f64 {
        let dropped: f64 = self
            .na_groups
            .iter()
            .map(|g| g.iter().map(|&i| self.components[i].max).fold(0.0, f64::max))
            .sum();
        self.capacity() - dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_template() {
        let t = Template::new(
            [("1", 5.0), ("2", 2.0), ("3", 2.0)],
            [vec!["2", "3"]],
        )
        .unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.capacity(), 9.0);
        assert_eq!(t.na_groups(), vec![vec![&ComponentId::from("2"), &ComponentId::from("3")]]);
        assert_eq!(t.group_of(0), None);
        assert_eq!(t.group_of(2), Some(0));
    }

    #[test]
    fn test_empty_structure() {
        let r = Template::structure(Vec::<(&str, f64)>::new());
        assert_eq!(r.unwrap_err(), TemplateError::Empty);
    }

    #[test]
    fn test_duplicate_component() {
        let r = Template::structure([("a", 1.0), ("a", 2.0)]);
        assert!(matches!(r, Err(TemplateError::DuplicateComponent(_))));
    }

    #[test]
    fn test_negative_max() {
        let r = Template::structure([("a", -1.0)]);
        assert!(matches!(r, Err(TemplateError::InvalidMax { .. })));
    }

    #[test]
    fn test_unknown_group_member() {
        let r = Template::new([("a", 1.0)], [vec!["b"]]);
        assert!(matches!(r, Err(TemplateError::UnknownMember { group: 0, .. })));
    }

    #[test]
    fn test_overlapping_groups() {
        let r = Template::new(
            [("a", 1.0), ("b", 1.0), ("c", 1.0)],
            [vec!["a", "b"], vec!["b", "c"]],
        );
        assert!(matches!(r, Err(TemplateError::OverlappingGroups { .. })));
    }

    #[test]
    fn test_empty_group() {
        let r = Template::new([("a", 1.0)], [Vec::<&str>::new()]);
        assert_eq!(r.unwrap_err(), TemplateError::EmptyGroup { group: 0 });
    }

    #[test]
    fn test_reachable_capacities() {
        let t = Template::new(
            [("1", 5.0), ("2", 2.0), ("3", 4.0)],
            [vec!["2", "3"]],
        )
        .unwrap();
        assert_eq!(t.max_reachable(), 9.0);
        assert_eq!(t.guaranteed_capacity(), 7.0);
    }
}
