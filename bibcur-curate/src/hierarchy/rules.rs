//! Institute-specific department rules
//!
//! Applied in configuration order after the hierarchy is flattened. A rule
//! naming a department absent from the classification table is a
//! configuration error.

use super::TagSets;
use bibcur_common::config::{full_unit, DepartmentRule};
use bibcur_common::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub(crate) fn apply_rules(sets: &mut TagSets, rules: &[DepartmentRule]) -> Result<()> {
    for rule in rules {
        match rule {
            DepartmentRule::Alias { department, target } => {
                let labs = aliased_labs(sets, target, department)?;
                sets.insert(department.clone(), labs);
            }
            DepartmentRule::Merge { source, into } => {
                let source_labs = take_department(sets, source)?;
                let target = sets.get_mut(into).ok_or_else(|| unknown(into, rule))?;

                let source_full = full_unit(source);
                let into_full = full_unit(into);
                for (lab, tags) in source_labs {
                    let lab = if lab == source_full { into_full.clone() } else { lab };
                    target.entry(lab).or_default().extend(tags);
                }
                refresh_full_unit(target, into);

                let labs = aliased_labs(sets, into, source)?;
                sets.insert(source.clone(), labs);
            }
            DepartmentRule::Synthetic { name, sources } => {
                let mut union = BTreeSet::new();
                for source in sources {
                    let labs = sets.get(source).ok_or_else(|| unknown(source, rule))?;
                    union.extend(labs.values().flatten().cloned());
                }
                let mut labs = BTreeMap::new();
                labs.insert(full_unit(name), union);
                sets.insert(name.clone(), labs);
            }
        }
        debug!(?rule, "Department rule applied");
    }
    Ok(())
}

/// Copy of `target`'s laboratories, its full unit renamed after `alias`
fn aliased_labs(
    sets: &TagSets,
    target: &str,
    alias: &str,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let labs = sets.get(target).ok_or_else(|| {
        Error::Config(format!(
            "department rule for '{}' refers to unknown department '{}'",
            alias, target
        ))
    })?;
    let target_full = full_unit(target);
    Ok(labs
        .iter()
        .map(|(lab, tags)| {
            let lab = if *lab == target_full { full_unit(alias) } else { lab.clone() };
            (lab, tags.clone())
        })
        .collect())
}

fn take_department(
    sets: &mut TagSets,
    department: &str,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    sets.remove(department).ok_or_else(|| {
        Error::Config(format!("department rule refers to unknown department '{}'", department))
    })
}

fn refresh_full_unit(labs: &mut BTreeMap<String, BTreeSet<String>>, department: &str) {
    let full = full_unit(department);
    let union: BTreeSet<String> = labs
        .iter()
        .filter(|(lab, _)| **lab != full)
        .flat_map(|(_, tags)| tags.iter().cloned())
        .collect();
    labs.entry(full).or_default().extend(union);
}

fn unknown(department: &str, rule: &DepartmentRule) -> Error {
    Error::Config(format!(
        "department rule {:?} refers to unknown department '{}'",
        rule, department
    ))
}
