//! Organizational tag hierarchy
//!
//! Turns the raw classification registry into per-laboratory allowed-tag
//! lists:
//! - `builder` - grouping, pseudo-unit collapsing, flattening
//! - `rules` - institute-specific department aliases, merges, synthetic units
//!
//! Every final list ends with the sentinel tag.

pub mod builder;
pub mod rules;

pub use builder::TagHierarchyBuilder;

use bibcur_common::config::full_unit;
use bibcur_common::{RawTable, UnitPath};
use std::collections::{BTreeMap, BTreeSet};

/// Working form: department → laboratory → tag set
pub(crate) type TagSets = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

/// Final allowed-tag structure: department → laboratory → ordered tag list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHierarchy {
    departments: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    sentinel_only: Vec<String>,
}

impl TagHierarchy {
    /// Sort each set, append the sentinel last
    pub(crate) fn from_sets(sets: TagSets, invalid_tag: &str) -> Self {
        let departments = sets
            .into_iter()
            .map(|(department, labs)| {
                let labs = labs
                    .into_iter()
                    .map(|(lab, tags)| {
                        let mut list: Vec<String> =
                            tags.into_iter().filter(|t| t != invalid_tag).collect();
                        list.push(invalid_tag.to_string());
                        (lab, list)
                    })
                    .collect();
                (department, labs)
            })
            .collect();

        Self {
            departments,
            sentinel_only: vec![invalid_tag.to_string()],
        }
    }

    /// The sentinel tag
    pub fn invalid_tag(&self) -> &str {
        &self.sentinel_only[0]
    }

    pub fn departments(&self) -> impl Iterator<Item = &str> {
        self.departments.keys().map(String::as_str)
    }

    pub fn laboratories(&self, department: &str) -> Option<&BTreeMap<String, Vec<String>>> {
        self.departments.get(department)
    }

    pub fn tags(&self, department: &str, laboratory: &str) -> Option<&[String]> {
        self.departments
            .get(department)
            .and_then(|labs| labs.get(laboratory))
            .map(Vec::as_slice)
    }

    /// Legal choices for a unit
    ///
    /// Falls back to the department-wide list for an unknown laboratory and
    /// to the sentinel alone for an unknown department. Never empty.
    pub fn choices(&self, unit: &UnitPath) -> &[String] {
        if let Some(labs) = self.departments.get(&unit.department) {
            if let Some(tags) = labs.get(&unit.laboratory) {
                return tags;
            }
            if let Some(tags) = labs.get(&full_unit(&unit.department)) {
                return tags;
            }
        }
        &self.sentinel_only
    }

    /// True when `value` is a legal choice for `unit`
    pub fn is_legal(&self, unit: &UnitPath, value: &str) -> bool {
        self.choices(unit).iter().any(|t| t == value)
    }

    /// Export as a Department / Laboratory / Tags table, tags joined by `separator`
    pub fn to_table(&self, separator: &str) -> RawTable {
        let mut table = RawTable::new(
            "tag_hierarchy",
            vec!["Department".to_string(), "Laboratory".to_string(), "Tags".to_string()],
        );
        for (department, labs) in &self.departments {
            for (lab, tags) in labs {
                table.push_row(vec![department.clone(), lab.clone(), tags.join(separator)]);
            }
        }
        table
    }
}
