//! Forward direction: partition to unit artifact

use super::columns::Column;
use crate::resolution::{Origin, Partition};
use bibcur_common::config::RecordTableColumns;
use bibcur_common::{Attribute, AttributionRow, Doi, InstituteConfig, RawTable};
use serde::Serialize;

pub const STATUS_UNDECIDED: &str = "undecided";

/// Decision cell of one artifact line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ValueCell {
    Resolved { value: String, origin: Origin },
    Undecided { choices: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactLine {
    pub row: AttributionRow,
    pub cell: ValueCell,
}

/// Ordered rows of one department, ready to be rendered for a human
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitArtifact {
    pub department: String,
    pub attribute: Attribute,
    pub lines: Vec<ArtifactLine>,
    #[serde(skip)]
    columns: RecordTableColumns,
    #[serde(skip)]
    separator: String,
    #[serde(skip)]
    unknown_doi: String,
    #[serde(skip)]
    homonym_marker: String,
}

/// Interleave resolved and undecided rows back into source order
///
/// Dropped homonym siblings do not appear.
pub fn assemble(partition: &Partition, attribute: Attribute, config: &InstituteConfig) -> UnitArtifact {
    let mut lines: Vec<ArtifactLine> =
        Vec::with_capacity(partition.resolved.len() + partition.undecided.len());
    lines.extend(partition.resolved.iter().map(|r| ArtifactLine {
        row: r.row.clone(),
        cell: ValueCell::Resolved {
            value: r.value.clone(),
            origin: r.origin,
        },
    }));
    lines.extend(partition.undecided.iter().map(|u| ArtifactLine {
        row: u.row.clone(),
        cell: ValueCell::Undecided {
            choices: u.choices.clone(),
        },
    }));
    lines.sort_by_key(|line| line.row.position);

    UnitArtifact {
        department: partition.department.clone(),
        attribute,
        lines,
        columns: config.record_columns.clone(),
        separator: config.choice_separator.clone(),
        unknown_doi: config.unknown_doi.clone(),
        homonym_marker: config.homonym_marker.clone(),
    }
}

impl UnitArtifact {
    /// Artifact name, also used as the file stem
    pub fn name(&self) -> String {
        format!("{}_{}", self.attribute, self.department)
    }

    pub fn undecided(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l.cell, ValueCell::Undecided { .. }))
            .count()
    }

    /// Materialize as a table; undecided cells list the choices
    pub fn to_table(&self) -> RawTable {
        let layout = Column::layout(self.attribute);
        let headers = layout
            .iter()
            .map(|c| c.header(&self.columns).to_string())
            .collect();
        let mut table = RawTable::new(self.name(), headers);
        for line in &self.lines {
            table.push_row(layout.iter().map(|&c| self.cell(line, c)).collect());
        }
        table
    }

    fn cell(&self, line: &ArtifactLine, column: Column) -> String {
        let row = &line.row;
        match column {
            Column::PubId => row.pub_id.clone(),
            Column::AuthorIdx => row.author_idx.to_string(),
            Column::FirstAuthor => row.first_author.clone(),
            Column::Doi => match &row.doi {
                Doi::Known(doi) => doi.clone(),
                Doi::Unknown => self.unknown_doi.clone(),
            },
            Column::Matricule => row.matricule.clone(),
            Column::Department => row.unit.department.clone(),
            Column::Laboratory => row.unit.laboratory.clone(),
            Column::Homonym => {
                if row.homonym {
                    self.homonym_marker.clone()
                } else {
                    String::new()
                }
            }
            Column::Otp | Column::Kept => match &line.cell {
                ValueCell::Resolved { value, .. } => value.clone(),
                ValueCell::Undecided { choices } => choices.join(&self.separator),
            },
            Column::Status => match &line.cell {
                ValueCell::Resolved { origin, .. } => origin.to_string(),
                ValueCell::Undecided { .. } => STATUS_UNDECIDED.to_string(),
            },
        }
    }
}
