//! Current-run record table parsing
//!
//! Turns the upstream per-unit record table into [`AttributionRow`]s. Required
//! columns are checked before any row is read.

use bibcur_common::{
    canonical_value, AttributionRow, Doi, Error, InstituteConfig, RawTable, Result, UnitPath,
};

/// Parse every row of the record table
///
/// The homonym and OTP columns are optional: a homonym-only table has no tag
/// column, and a table without a homonym column raises no flags.
pub fn parse_records(table: &RawTable, config: &InstituteConfig) -> Result<Vec<AttributionRow>> {
    let columns = &config.record_columns;
    let idx = table.require_columns(&[
        columns.pub_id.as_str(),
        columns.author_idx.as_str(),
        columns.first_author.as_str(),
        columns.doi.as_str(),
        columns.matricule.as_str(),
        columns.department.as_str(),
        columns.laboratory.as_str(),
    ])?;
    let homonym_idx = table.column_index(&columns.homonym);
    let otp_idx = table.column_index(&columns.otp);

    let mut rows = Vec::with_capacity(table.len());
    for position in 0..table.len() {
        let cell = move |i: usize| table.cell(position, i);

        let pub_id = canonical_value(cell(idx[0]));
        if pub_id.is_empty() {
            return Err(Error::InvalidInput(format!(
                "{}: row {} has no publication id",
                table.name(),
                position + 2
            )));
        }

        let author_text = canonical_value(cell(idx[1]));
        let author_idx = author_text.parse::<u32>().map_err(|e| {
            Error::InvalidInput(format!(
                "{}: row {} has author position '{}': {}",
                table.name(),
                position + 2,
                author_text,
                e
            ))
        })?;

        let homonym = homonym_idx
            .map(|i| cell(i).trim().eq_ignore_ascii_case(&config.homonym_marker))
            .unwrap_or(false);

        let otp = otp_idx.and_then(|i| single_value(cell(i), config));

        rows.push(AttributionRow {
            position,
            pub_id,
            author_idx,
            first_author: cell(idx[2]).trim().to_string(),
            doi: Doi::parse(cell(idx[3]), config),
            matricule: canonical_value(cell(idx[4])),
            unit: UnitPath::normalize(cell(idx[5]), cell(idx[6]), config),
            homonym,
            otp,
        });
    }

    tracing::debug!(table = table.name(), rows = rows.len(), "Parsed record table");
    Ok(rows)
}

/// A concrete single value, or `None` for blanks and choice placeholders
pub fn single_value(cell: &str, config: &InstituteConfig) -> Option<String> {
    let value = canonical_value(cell);
    if value.is_empty() || value.contains(config.choice_separator.trim()) {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: &[&str] = &[
        "Pub_id", "Idx_author", "First_author", "DOI", "Matricule", "Dpt", "Lab", "Homonym", "OTP",
    ];

    #[test]
    fn test_parse_normalizes_cells() {
        let config = InstituteConfig::default();
        let table = RawTable::from_rows(
            "records",
            HEADERS,
            &[
                &["2024_007", "2.0", "Dupont, J.", "unknown", "000123.0", "DEN", "", "", ""],
                &["2024_008", "0", "Martin, A.", "10.1/ABC", "42", "DIR", "LX", "HOMONYM", "A; B"],
                &["2024_009", "1", "Durand, P.", "10.1/z", "43", "DEN", "LMA", "", "B"],
            ],
        );

        let rows = parse_records(&table, &config).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].author_idx, 2);
        assert_eq!(rows[0].doi, Doi::Unknown);
        assert_eq!(rows[0].matricule, "000123");
        assert_eq!(rows[0].unit.laboratory, "(full-DEN)");
        assert!(!rows[0].homonym);
        assert_eq!(rows[0].otp, None);

        assert_eq!(rows[1].unit.department, "(DIRECTORATE)");
        assert!(rows[1].homonym);
        assert_eq!(rows[1].otp, None, "placeholder is not a value");

        assert_eq!(rows[2].otp.as_deref(), Some("B"));
        assert_eq!(rows[2].position, 2);
    }

    #[test]
    fn test_missing_required_column_fails_fast() {
        let config = InstituteConfig::default();
        let table = RawTable::from_rows("records", &["Pub_id", "DOI"], &[&["2024_001", "x"]]);
        let err = parse_records(&table, &config).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_bad_author_position_is_input_error() {
        let config = InstituteConfig::default();
        let table = RawTable::from_rows(
            "records",
            HEADERS,
            &[&["2024_001", "first", "X", "unknown", "1", "DEN", "", "", ""]],
        );
        let err = parse_records(&table, &config).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
