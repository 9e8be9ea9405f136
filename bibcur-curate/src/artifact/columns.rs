//! Artifact columns
//!
//! Each artifact kind has a fixed column list. Headers come from the
//! institute's record-table column names so an edited artifact can be read
//! back with the same parser as the upstream record table.

use bibcur_common::config::RecordTableColumns;
use bibcur_common::Attribute;
use serde::Serialize;

/// One artifact column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    PubId,
    AuthorIdx,
    FirstAuthor,
    Doi,
    Matricule,
    Department,
    Laboratory,
    Homonym,
    Otp,
    Kept,
    Status,
}

pub const STATUS_HEADER: &str = "Status";

const OTP_COLUMNS: [Column; 9] = [
    Column::PubId,
    Column::AuthorIdx,
    Column::FirstAuthor,
    Column::Doi,
    Column::Matricule,
    Column::Department,
    Column::Laboratory,
    Column::Otp,
    Column::Status,
];

const HOMONYM_COLUMNS: [Column; 10] = [
    Column::PubId,
    Column::AuthorIdx,
    Column::FirstAuthor,
    Column::Doi,
    Column::Matricule,
    Column::Department,
    Column::Laboratory,
    Column::Homonym,
    Column::Kept,
    Column::Status,
];

impl Column {
    pub const ALL: [Column; 11] = [
        Column::PubId,
        Column::AuthorIdx,
        Column::FirstAuthor,
        Column::Doi,
        Column::Matricule,
        Column::Department,
        Column::Laboratory,
        Column::Homonym,
        Column::Otp,
        Column::Kept,
        Column::Status,
    ];

    /// Columns of an artifact, in order
    pub fn layout(attribute: Attribute) -> &'static [Column] {
        match attribute {
            Attribute::Otp => &OTP_COLUMNS,
            Attribute::Homonym => &HOMONYM_COLUMNS,
        }
    }

    /// Column holding the decision for `attribute`
    pub fn decision(attribute: Attribute) -> Column {
        match attribute {
            Attribute::Otp => Column::Otp,
            Attribute::Homonym => Column::Kept,
        }
    }

    pub fn header(self, columns: &RecordTableColumns) -> &str {
        match self {
            Column::PubId => &columns.pub_id,
            Column::AuthorIdx => &columns.author_idx,
            Column::FirstAuthor => &columns.first_author,
            Column::Doi => &columns.doi,
            Column::Matricule => &columns.matricule,
            Column::Department => &columns.department,
            Column::Laboratory => &columns.laboratory,
            Column::Homonym => &columns.homonym,
            Column::Otp => &columns.otp,
            Column::Kept => &columns.kept,
            Column::Status => STATUS_HEADER,
        }
    }

    pub fn from_header(header: &str, columns: &RecordTableColumns) -> Option<Column> {
        Self::ALL.into_iter().find(|c| c.header(columns) == header.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_round_trip() {
        let columns = RecordTableColumns::default();
        for column in Column::ALL {
            assert_eq!(Column::from_header(column.header(&columns), &columns), Some(column));
        }
        assert_eq!(Column::from_header("Nope", &columns), None);
    }

    #[test]
    fn test_each_layout_carries_only_its_own_decision_column() {
        for attribute in Attribute::ALL {
            let layout = Column::layout(attribute);
            assert!(layout.contains(&Column::decision(attribute)));
            assert_eq!(layout.last(), Some(&Column::Status));
        }
        assert!(!Column::layout(Attribute::Otp).contains(&Column::Kept));
        assert!(!Column::layout(Attribute::Homonym).contains(&Column::Otp));
    }
}
