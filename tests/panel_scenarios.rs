//! End-to-end panel builds over CSV files on disk

use clinical_panel::encoder::{read_panel_csv_path, PanelEncoder};
use clinical_panel::types::{TimeSemantics, TimeUnit};
use clinical_panel::{build_panel, CoverageReporter, PanelConfig, PanelError};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn load_config(dir: &Path, toml: &str) -> PanelConfig {
    write(dir, "panel.toml", toml);
    PanelConfig::from_file(&dir.join("panel.toml")).unwrap()
}

#[test]
fn eicu_offsets_fill_the_skeleton() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "patient.csv", "patientunitstayid,age\n1,70\n2,64\n");
    write(
        dir.path(),
        "albumin.csv",
        "patientunitstayid,labresultoffset,labresult\n1,9,3.5\n1,11,3.8\n2,13.5,4.0\n",
    );
    let config = load_config(
        dir.path(),
        r#"
[grid]
window_start_hours = 8
window_end_hours = 14

[cohort]
preset = "eicu"
roster = "patient.csv"

[[variables]]
name = "Albumin"
source = "albumin.csv"
"#,
    );

    let build = build_panel(&config).unwrap();
    let csv = PanelEncoder::to_csv_string(&build.panel).unwrap();

    assert_eq!(
        csv,
        "patient_id,bin,Albumin,Albumin_obs\n\
         1,10,3.5,1\n\
         1,12,3.8,1\n\
         1,14,,0\n\
         2,10,,0\n\
         2,12,,0\n\
         2,14,4,1\n"
    );
    let albumin = build.coverage.get("Albumin").unwrap();
    assert_eq!((albumin.covered, albumin.total), (2, 2));
    assert_eq!(albumin.percent, 100.0);
}

#[test]
fn non_utf8_cell_does_not_drop_the_variable() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "patient.csv", "patientunitstayid\n1\n2\n3\n");
    let mut creatinine =
        b"patientunitstayid,labresultoffset,labresult,labmeasurenamesystem\n1,600,1.0,mg/dL\n".to_vec();
    creatinine.extend_from_slice(b"2,600,88.0,\xb5mol/L\n3,660,1.2,mg/dL\n");
    fs::write(dir.path().join("creatinine.csv"), creatinine).unwrap();
    let config = load_config(
        dir.path(),
        r#"
[cohort]
roster = "patient.csv"

[[variables]]
name = "Creatinine"
source = "creatinine.csv"
"#,
    );

    let build = build_panel(&config).unwrap();
    let report = &build.variables[0];
    assert!(report.status.is_loaded());
    assert_eq!(report.stats.binned, 3);
    assert_eq!(report.stats.unreadable_record, 0);
    let creatinine = build.coverage.get("Creatinine").unwrap();
    assert_eq!((creatinine.covered, creatinine.total), (3, 3));
}

#[test]
fn minute_offsets_are_detected_from_the_median() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "patient.csv", "patientunitstayid\n7\n");
    write(
        dir.path(),
        "lactate.csv",
        "patientunitstayid,labresultoffset,labresult\n7,30,1.1\n7,45,1.2\n7,9000,2.5\n7,10020,2.7\n",
    );
    let config = load_config(
        dir.path(),
        r#"
[cohort]
roster = "patient.csv"

[[variables]]
name = "Lactate"
source = "lactate.csv"
"#,
    );

    let build = build_panel(&config).unwrap();
    let report = &build.variables[0];
    assert_eq!(
        report.semantics,
        Some(TimeSemantics::Offset {
            unit: TimeUnit::Minutes,
            median: 4522.5
        })
    );
    assert_eq!(report.stats.out_of_window, 2);
    assert_eq!(report.stats.binned, 2);

    let panel = &build.panel;
    let grid = panel.grid();
    let at_150 = grid.index_of_endpoint(150.0).unwrap();
    let at_168 = grid.index_of_endpoint(168.0).unwrap();
    assert_eq!(panel.cell("Lactate", 0, at_150).unwrap().value, Some(2.5));
    assert_eq!(panel.cell("Lactate", 0, at_168).unwrap().value, Some(2.7));
    assert_eq!(panel.column("Lactate").unwrap().observed_count(), 2);
}

#[test]
fn missing_source_file_degrades_to_empty_column() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "patient.csv", "patientunitstayid\n1\n2\n3\n");
    write(
        dir.path(),
        "sodium.csv",
        "patientunitstayid,labresultoffset,labresult\n2,600,140\n",
    );
    let config = load_config(
        dir.path(),
        r#"
[cohort]
roster = "patient.csv"

[[variables]]
name = "Hemoglobin"
source = "does_not_exist.csv"

[[variables]]
name = "Sodium"
source = "sodium.csv"
"#,
    );

    let build = build_panel(&config).unwrap();

    assert_eq!(build.panel.row_count(), 3 * 356);
    assert!(!build.variables[0].status.is_loaded());
    assert!(build.variables[1].status.is_loaded());
    assert_eq!(build.panel.variables(), vec!["Hemoglobin", "Sodium"]);
    assert_eq!(build.panel.column("Hemoglobin").unwrap().observed_count(), 0);

    let hemoglobin = build.coverage.get("Hemoglobin").unwrap();
    assert_eq!((hemoglobin.covered, hemoglobin.total), (0, 3));
    assert_eq!(build.coverage.get("Sodium").unwrap().covered, 1);
}

#[test]
fn written_panel_reproduces_coverage() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "patient.csv", "patientunitstayid\n1\n2\n3\n4\n");
    write(
        dir.path(),
        "creatinine.csv",
        "patientunitstayid,labresultoffset,labresult\n1,24,1.0\n1,-30,1.3\n3,200,0.9\n",
    );
    let config = load_config(
        dir.path(),
        r#"
parallel = true

[cohort]
roster = "patient.csv"

[[variables]]
name = "Creatinine"
source = "creatinine.csv"
"#,
    );

    let build = build_panel(&config).unwrap();
    let out = dir.path().join("panel.csv");
    PanelEncoder::write_csv_path(&build.panel, &out).unwrap();

    let decoded = read_panel_csv_path(&out).unwrap();
    assert_eq!(decoded.row_count(), 4 * 356);
    assert_eq!(decoded.patients(), build.panel.patients());
    assert_eq!(CoverageReporter::report(&decoded), build.coverage);
    assert_eq!(build.coverage.get("Creatinine").unwrap().percent, 50.0);
}

#[test]
fn mimic_timestamps_are_anchored_at_first_icu_intime() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "cohort.csv",
        "SUBJECT_ID,FIRST_ICU_INTIME\n100,2150-01-01 00:00:00\n200,2150-06-01 12:00:00\n300,\n",
    );
    write(
        dir.path(),
        "lactate.csv",
        "SUBJECT_ID,CHARTTIME,VALUENUM\n\
         100,2150-01-01 09:00:00,1.5\n\
         100,2149-12-31 14:00:00,1.9\n\
         200,2150-06-02 00:30:00,2.2\n\
         300,2150-01-01 09:00:00,3.0\n\
         400,2150-01-01 09:00:00,3.1\n",
    );
    let config = load_config(
        dir.path(),
        r#"
[grid]
window_start_hours = 8
window_end_hours = 14

[cohort]
preset = "mimic-iii"
roster = "cohort.csv"

[[variables]]
name = "Lactate"
source = "lactate.csv"
"#,
    );

    let build = build_panel(&config).unwrap();
    let report = &build.variables[0];
    assert_eq!(report.semantics, Some(TimeSemantics::Absolute));
    assert_eq!(report.stats.missing_t0, 1);
    assert_eq!(report.stats.unknown_patient, 1);
    assert_eq!(report.stats.out_of_window, 0);

    let panel = &build.panel;
    assert_eq!(panel.row_count(), 3 * 3);
    // 9h after t0 and 10h before it both land in bin 10; +9 is the larger signed value
    assert_eq!(panel.cell("Lactate", 0, 0).unwrap().value, Some(1.5));
    assert_eq!(panel.cell("Lactate", 1, 2).unwrap().value, Some(2.2));
    assert!(!panel.cell("Lactate", 2, 0).unwrap().observed);
}

#[test]
fn invalid_grid_is_rejected_before_reading_sources() {
    let dir = TempDir::new().unwrap();
    let config = load_config(
        dir.path(),
        r#"
[grid]
window_start_hours = 8
window_end_hours = 13

[cohort]
roster = "missing.csv"
"#,
    );
    assert!(matches!(build_panel(&config), Err(PanelError::Config(_))));
}

#[test]
fn unreadable_roster_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = load_config(
        dir.path(),
        r#"
[cohort]
roster = "missing.csv"
"#,
    );
    assert!(matches!(build_panel(&config), Err(PanelError::Io(_))));
}
