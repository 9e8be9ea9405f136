//! Tag hierarchy builder
//!
//! Algorithm:
//! 1. Group rows by department; DIR-like departments collapse into the
//!    directorate unit.
//! 2. Within a department, a missing or DIR-like service collapses into
//!    `(full-<department>)`.
//! 3. Within a service, a missing or DIR-like laboratory collapses into
//!    `(full-<service>)`, or `(full-<department>)` when the service collapsed.
//! 4. Collapsed units hold the sorted union of everything merged into them.
//! 5. Drop the service level; add `(full-<department>)` as the union of all
//!    laboratories of the department.
//! 6. Apply the institute's department rules.
//! 7. Append the sentinel tag to every list.

use super::rules::apply_rules;
use super::{TagHierarchy, TagSets};
use bibcur_common::config::full_unit;
use bibcur_common::{Error, InstituteConfig, RawTable, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// department → service → laboratory → tags
type ServiceSets = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeSet<String>>>>;

/// Builds a [`TagHierarchy`] from the raw classification table
pub struct TagHierarchyBuilder<'a> {
    config: &'a InstituteConfig,
}

impl<'a> TagHierarchyBuilder<'a> {
    pub fn new(config: &'a InstituteConfig) -> Self {
        Self { config }
    }

    /// Build the hierarchy
    ///
    /// Fails with a configuration error before reading any row when a
    /// required column is absent, and on any tag containing the choice
    /// separator: such a tag could never be read back from an artifact cell.
    pub fn build(&self, table: &RawTable) -> Result<TagHierarchy> {
        let columns = &self.config.org_columns;
        let idx = table.require_columns(&[
            columns.department.as_str(),
            columns.tag.as_str(),
            columns.service.as_str(),
            columns.laboratory.as_str(),
        ])?;

        let mut directorate: BTreeSet<String> = BTreeSet::new();
        let mut services: ServiceSets = BTreeMap::new();
        let mut skipped = 0usize;
        let separator = self.config.choice_separator.trim();

        for row in 0..table.len() {
            let department = table.cell(row, idx[0]).trim();
            let tag = table.cell(row, idx[1]).trim();
            let service = table.cell(row, idx[2]).trim();
            let laboratory = table.cell(row, idx[3]).trim();

            if self.config.is_missing(department) || self.config.is_missing(tag) {
                skipped += 1;
                continue;
            }
            if !separator.is_empty() && tag.contains(separator) {
                return Err(Error::Config(format!(
                    "{}: row {} tag '{}' contains the choice separator '{}'",
                    table.name(),
                    row + 2,
                    tag,
                    separator
                )));
            }

            // Step 1
            if self.config.is_directorate_label(department) {
                directorate.insert(tag.to_string());
                continue;
            }

            // Steps 2-3
            let service_collapsed = self.collapses(service);
            let service_key = if service_collapsed {
                full_unit(department)
            } else {
                service.to_string()
            };
            let lab_key = if self.collapses(laboratory) {
                if service_collapsed {
                    full_unit(department)
                } else {
                    full_unit(service)
                }
            } else {
                laboratory.to_string()
            };

            services
                .entry(department.to_string())
                .or_default()
                .entry(service_key)
                .or_default()
                .entry(lab_key)
                .or_default()
                .insert(tag.to_string());
        }

        if skipped > 0 {
            debug!(skipped, "Classification rows without department or tag skipped");
        }

        // Step 5
        let mut sets = flatten(services);
        if !directorate.is_empty() {
            let unit = self.config.directorate_unit.clone();
            let mut labs = BTreeMap::new();
            labs.insert(full_unit(&unit), directorate);
            sets.insert(unit, labs);
        }

        // Step 6
        apply_rules(&mut sets, &self.config.department_rules)?;

        // Step 7
        let hierarchy = TagHierarchy::from_sets(sets, &self.config.invalid_tag);

        info!(
            rows = table.len(),
            skipped,
            departments = hierarchy.departments().count(),
            "Tag hierarchy built"
        );
        Ok(hierarchy)
    }

    fn collapses(&self, label: &str) -> bool {
        self.config.is_missing(label) || self.config.is_directorate_label(label)
    }
}

/// Drop the service level and add each department's full-unit union
fn flatten(services: ServiceSets) -> TagSets {
    let mut sets: TagSets = BTreeMap::new();
    for (department, by_service) in services {
        let labs = sets.entry(department.clone()).or_default();
        for (_, by_lab) in by_service {
            for (lab, tags) in by_lab {
                labs.entry(lab).or_default().extend(tags);
            }
        }
        let union: BTreeSet<String> = labs.values().flatten().cloned().collect();
        labs.insert(full_unit(&department), union);
    }
    sets
}
