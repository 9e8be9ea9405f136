//! End-to-end carry-forward across two reprocessing runs
//!
//! Inputs and artifacts go through CSV files and the history through a
//! SQLite file, as the CLI does.

use bibcur_common::db::init_database;
use bibcur_common::{HashLookup, InstituteConfig, RawTable};
use bibcur_curate::artifact::Column;
use bibcur_curate::history::{load_history, save_history};
use bibcur_curate::workflow::artifact_file_stem;
use bibcur_curate::{CurationRun, RunInputs, TagHierarchyBuilder};
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, table: &RawTable) -> std::path::PathBuf {
    let path = dir.join(name);
    table.write_csv(&path).unwrap();
    path
}

fn org() -> RawTable {
    RawTable::from_rows(
        "org",
        &["Department", "OTP", "Service", "Laboratory"],
        &[
            &["DEN", "A", "SERMA", "LPEC"],
            &["DEN", "B", "SERMA", "LPEC"],
            &["DIR", "D", "", ""],
        ],
    )
}

const RECORD_HEADERS: &[&str] = &[
    "Pub_id", "Idx_author", "First_author", "DOI", "Matricule", "Dpt", "Lab", "Homonym", "OTP",
];

/// First extraction of the year
fn first_records() -> RawTable {
    RawTable::from_rows(
        "records",
        RECORD_HEADERS,
        &[
            &["2024_007", "0", "Dupont, J.", "unknown", "101", "DEN", "LPEC", "", ""],
            &["2024_008", "0", "Martin, A.", "10.1/ABC", "102", "DEN", "LPEC", "", ""],
            &["2024_009", "0", "Petit, L.", "unknown", "103", "DIR", "-", "", ""],
        ],
    )
}

/// Same corpus re-extracted: sequential ids shifted, hashes unchanged
fn second_records() -> RawTable {
    RawTable::from_rows(
        "records",
        RECORD_HEADERS,
        &[
            &["2024_001", "0", "Nouveau, N.", "unknown", "100", "DEN", "LPEC", "", ""],
            &["2024_008", "0", "Dupont, J.", "unknown", "101", "DEN", "LPEC", "", ""],
            &["2024_009", "0", "Martin, A.", "10.1/abc", "102", "DEN", "LPEC", "", ""],
            &["2024_010", "0", "Petit, L.", "unknown", "103", "DIR", "", "", ""],
        ],
    )
}

fn first_hashes() -> RawTable {
    RawTable::from_rows(
        "hashes",
        &["Pub_id", "Hash_id"],
        &[&["2024_007", "H1"], &["2024_009", "H3"]],
    )
}

fn second_hashes() -> RawTable {
    RawTable::from_rows(
        "hashes",
        &["Pub_id", "Hash_id"],
        &[&["2024_001", "H0"], &["2024_008", "H1"], &["2024_010", "H3"]],
    )
}

/// Replace every undecided OTP cell matching `pub_id` with `value`
fn decide(table: &RawTable, pub_id: &str, value: &str) -> RawTable {
    let pub_col = table.column_index("Pub_id").unwrap();
    let otp_col = table.column_index("OTP").unwrap();
    let mut edited = RawTable::new(table.name(), table.headers().to_vec());
    for row in table.rows() {
        let mut row = row.clone();
        if row[pub_col] == pub_id {
            row[otp_col] = value.to_string();
        }
        edited.push_row(row);
    }
    edited
}

#[tokio::test]
async fn test_decisions_survive_reprocessing() {
    let config = InstituteConfig::default();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("history.db");
    let run = CurationRun::new(&config);

    // Run 1: nothing recorded yet
    let pool = init_database(&db_path).await.unwrap();
    let history = load_history(&pool).await.unwrap();
    assert!(history.is_empty());

    let org_path = write(dir.path(), "org.csv", &org());
    let org = RawTable::read_csv(&org_path).unwrap();
    let records = RawTable::read_csv(&write(dir.path(), "records.csv", &first_records())).unwrap();
    let hashes = RawTable::read_csv(&write(dir.path(), "hashes.csv", &first_hashes())).unwrap();

    let prepared = run
        .prepare(
            &RunInputs {
                org: &org,
                records: &records,
                hashes: &hashes,
            },
            &history,
        )
        .unwrap();
    assert_eq!(prepared.undecided(), 3);

    // Human edits, saved and read back as CSV
    let mut edited = Vec::new();
    for artifact in &prepared.artifacts {
        let mut table = artifact.to_table();
        table = decide(&table, "2024_007", "B");
        table = decide(&table, "2024_008", "A");
        table = decide(&table, "2024_009", "D");
        let path = write(
            dir.path(),
            &format!("{}.csv", artifact_file_stem(artifact)),
            &table,
        );
        edited.push(RawTable::read_csv(&path).unwrap());
    }

    let mut history = history;
    let lookup = HashLookup::from_table(&hashes, &config).unwrap();
    let summary = run
        .collect(&edited, &lookup, &prepared.hierarchy, &mut history)
        .unwrap();
    assert_eq!(summary.extracted, 3);
    assert_eq!(save_history(&pool, &history).await.unwrap(), 3);
    drop(pool);

    // Run 2: fresh process, shifted ids
    let pool = init_database(&db_path).await.unwrap();
    let history = load_history(&pool).await.unwrap();
    assert_eq!(history.len(), 3);

    let records = second_records();
    let hashes = second_hashes();
    let prepared = run
        .prepare(
            &RunInputs {
                org: &org,
                records: &records,
                hashes: &hashes,
            },
            &history,
        )
        .unwrap();

    let den = prepared
        .artifacts
        .iter()
        .find(|a| a.department == "DEN")
        .unwrap()
        .to_table();
    let otp = den
        .column_index(Column::Otp.header(&config.record_columns))
        .unwrap();
    let status = den.column_index("Status").unwrap();

    // New publication: asked for
    assert_eq!(den.cell(0, otp), "A; B; invalid");
    // Hash H1 now under id 2024_008
    assert_eq!(den.cell(1, otp), "B");
    assert_eq!(den.cell(1, status), "carried:primary");
    // No hash, matched through the (case-folded) DOI
    assert_eq!(den.cell(2, otp), "A");
    assert_eq!(den.cell(2, status), "carried:doi");

    let directorate = prepared
        .artifacts
        .iter()
        .find(|a| a.department == "(DIRECTORATE)")
        .unwrap();
    assert_eq!(directorate.undecided(), 0);

    assert_eq!(prepared.undecided(), 1);
    let report = serde_json::to_value(prepared.summary()).unwrap();
    assert_eq!(report["undecided"], 1);
}

#[tokio::test]
async fn test_rejected_batch_leaves_stored_history_unchanged() {
    let config = InstituteConfig::default();
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("history.db")).await.unwrap();
    let mut history = load_history(&pool).await.unwrap();

    let hierarchy = TagHierarchyBuilder::new(&config).build(&org()).unwrap();
    let lookup = HashLookup::new();
    let not_an_artifact = RawTable::from_rows("notes", &["Pub_id", "Comment"], &[&["2024_001", "x"]]);

    let err = CurationRun::new(&config)
        .collect(&[not_an_artifact], &lookup, &hierarchy, &mut history)
        .unwrap_err();
    assert!(err.to_string().contains("collect"));
    assert!(history.is_empty());
    assert!(load_history(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_publication_spanning_two_departments_keeps_one_tag_per_department() {
    let config = InstituteConfig::default();
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("history.db")).await.unwrap();
    let run = CurationRun::new(&config);

    let org = RawTable::from_rows(
        "org",
        &["Department", "OTP", "Service", "Laboratory"],
        &[&["DEN", "A", "SERMA", "LPEC"], &["DES", "B", "SEMT", "LC2M"]],
    );
    let records = RawTable::from_rows(
        "records",
        RECORD_HEADERS,
        &[
            &["2024_001", "0", "Dupont, J.", "unknown", "101", "DEN", "LPEC", "", ""],
            &["2024_001", "1", "Dupont, J.", "unknown", "201", "DES", "LC2M", "", ""],
        ],
    );
    let hashes = RawTable::from_rows("hashes", &["Pub_id", "Hash_id"], &[&["2024_001", "H1"]]);
    let inputs = RunInputs {
        org: &org,
        records: &records,
        hashes: &hashes,
    };

    let mut history = load_history(&pool).await.unwrap();
    let prepared = run.prepare(&inputs, &history).unwrap();
    assert_eq!(prepared.undecided(), 2);

    let edited: Vec<RawTable> = prepared
        .artifacts
        .iter()
        .map(|artifact| {
            let tag = if artifact.department == "DEN" { "A" } else { "B" };
            decide(&artifact.to_table(), "2024_001", tag)
        })
        .collect();

    let lookup = HashLookup::from_table(&hashes, &config).unwrap();
    let summary = run
        .collect(&edited, &lookup, &prepared.hierarchy, &mut history)
        .unwrap();
    assert_eq!(summary.extracted, 2);
    assert!(summary.conflicts.is_empty());
    assert_eq!(save_history(&pool, &history).await.unwrap(), 2);

    let history = load_history(&pool).await.unwrap();
    let prepared = run.prepare(&inputs, &history).unwrap();
    assert_eq!(prepared.undecided(), 0);
    for artifact in &prepared.artifacts {
        let table = artifact.to_table();
        let otp = table.column_index("OTP").unwrap();
        let expected = if artifact.department == "DEN" { "A" } else { "B" };
        assert_eq!(table.cell(0, otp), expected);
        assert_eq!(table.cell(0, table.column_index("Status").unwrap()), "carried:primary");
    }
}
