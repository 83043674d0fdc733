// End-to-end tests running the built `dosematch` binary.
//
// Each test copies the engine fixtures into a temp directory, writes a config
// next to them and checks exit codes, stdout and written files.
//
// Run with: cargo test -p dosematch-cli --test cli_tests -- --nocapture

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn dosematch() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dosematch"))
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../recon/tests/fixtures")
}

const CONFIG: &str = r#"
name = "IR lab fixture"

[referral]
file = "ids7.csv"
first_columns = ["Pasient", "Kjønn"]

[dose]
file = "dosetrack.csv"
sum_columns = ["DAP Total (Gy*cm2)", "CAK (mGy)", "Fluoro Time"]
first_columns = ["Study Date", "Modality Room"]

[classification]
rules_file = "rules.toml"

[output]
merged = "out/merged.csv"
report = "out/categories.txt"
codes = "out/codes.txt"
codes_group = "Modality Room"
"#;

/// Temp directory with the fixture sources and `lab.recon.toml`.
fn workspace(config: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    for file in ["ids7.csv", "dosetrack.csv", "rules.toml"] {
        std::fs::copy(fixtures_dir().join(file), dir.path().join(file)).unwrap();
    }
    std::fs::create_dir(dir.path().join("out")).unwrap();
    let config_path = dir.path().join("lab.recon.toml");
    std::fs::write(&config_path, config).unwrap();
    (dir, config_path)
}

fn run_with(args: &[&str], config: &Path) -> Output {
    dosematch()
        .args(args)
        .arg(config)
        .output()
        .expect("run dosematch")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ===========================================================================
// run
// ===========================================================================

#[test]
fn run_writes_configured_outputs() {
    let (dir, config) = workspace(CONFIG);
    let output = run_with(&["run"], &config);
    assert!(output.status.success(), "exit {:?}\nstderr: {}", output.status, stderr(&output));

    let report = std::fs::read_to_string(dir.path().join("out/categories.txt")).unwrap();
    assert_eq!(
        report,
        "(n = 2) Columna\n(n = 2) Myelografi\n(n = 1) Caput Embolisering\n(n = 1) HSG\n"
    );

    let merged = std::fs::read_to_string(dir.path().join("out/merged.csv")).unwrap();
    let header = merged.lines().next().unwrap();
    assert!(header.starts_with("mapped_category,Henvisnings-ID,Beskrivelse"), "header: {header}");
    assert_eq!(merged.lines().count(), 7);

    let codes = std::fs::read_to_string(dir.path().join("out/codes.txt")).unwrap();
    assert!(codes.starts_with("## Lab 3\n(n = 1) HSG\n"), "codes:\n{codes}");

    let err = stderr(&output);
    assert!(err.contains("duplicate bookings: 4 group(s), 1 rewritten, 3 unresolved"), "stderr: {err}");
}

#[test]
fn run_json_stdout_is_single_json_value() {
    let (_dir, config) = workspace(CONFIG);
    let output = run_with(&["run", "--json"], &config);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let val: serde_json::Value = serde_json::from_str(stdout.trim()).expect("stdout must be one JSON value");
    assert_eq!(val["meta"]["config_name"], "IR lab fixture");
    assert_eq!(val["summary"]["merged_procedures"], 6);
    assert_eq!(val["summary"]["rewritten_groups"], 1);
    assert_eq!(val["resolution"]["groups"].as_array().unwrap().len(), 4);
}

#[test]
fn run_output_file_gets_json() {
    let (dir, config) = workspace(CONFIG);
    let result = dir.path().join("result.json");
    let output = dosematch()
        .args(["run", "-q", "--output"])
        .arg(&result)
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(output.stdout.is_empty());

    let val: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&result).unwrap()).unwrap();
    assert_eq!(val["summary"]["legacy_migrated"], 1);
}

#[test]
fn strict_exits_3_on_conflicts() {
    let (_dir, config) = workspace(CONFIG);
    let output = run_with(&["run", "--strict"], &config);
    assert_eq!(output.status.code(), Some(3), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("3 conflict(s) reported"));
}

#[test]
fn interactive_choice_is_read_from_stdin() {
    let (_dir, config) = workspace(CONFIG);
    let mut child = dosematch()
        .args(["run", "--interactive", "--json"])
        .arg(&config)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    // First answer is not confirmed and is re-prompted
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"NRRH0000000009AA\nNRRH0000000008AA\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let err = stderr(&output);
    assert!(err.contains("'NRRH0000000009AA' is not a confirmed identifier"), "stderr: {err}");

    let val: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(val["summary"]["rewritten_groups"], 2);
    let kinds: Vec<&str> = val["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"invalid_choice"));
}

#[test]
fn missing_input_file_exits_5() {
    let (dir, config) = workspace(CONFIG);
    std::fs::remove_file(dir.path().join("dosetrack.csv")).unwrap();
    let output = run_with(&["run"], &config);
    assert_eq!(output.status.code(), Some(5));
    assert!(stderr(&output).contains("dosetrack.csv"));
}

#[test]
fn forbidden_column_exits_1() {
    let (dir, config) = workspace(CONFIG);
    let ids7 = dir.path().join("ids7.csv");
    let with_ssn: String = std::fs::read_to_string(&ids7)
        .unwrap()
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                format!("{line},Fødselsnummer\n")
            } else {
                format!("{line},01010112345\n")
            }
        })
        .collect();
    std::fs::write(&ids7, with_ssn).unwrap();

    let output = run_with(&["run"], &config);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Fødselsnummer"));
    assert!(err.contains("hint:"));
}

// ===========================================================================
// validate
// ===========================================================================

#[test]
fn validate_accepts_fixture_config() {
    let (_dir, config) = workspace(CONFIG);
    let output = run_with(&["validate"], &config);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("6 classification rule(s)"));
}

#[test]
fn validate_rejects_bad_config() {
    let (_dir, config) = workspace("name = \"broken\"\n[referral]\nfile = \"ids7.csv\"\n");
    let output = run_with(&["validate"], &config);
    assert_eq!(output.status.code(), Some(4), "stderr: {}", stderr(&output));
}

#[test]
fn validate_rejects_rule_without_inclusion_term() {
    let config = CONFIG.replace(
        "rules_file = \"rules.toml\"",
        "rules_file = \"rules.toml\"\n\n[[classification.rule]]\ncriteria = \"~Myelografi\"\ncategory = \"Other\"",
    );
    let (_dir, config) = workspace(&config);
    let output = run_with(&["validate"], &config);
    assert_eq!(output.status.code(), Some(4), "stderr: {}", stderr(&output));
}

// ===========================================================================
// classify
// ===========================================================================

#[test]
fn classify_reports_categories_of_any_table() {
    let (dir, config) = workspace(CONFIG);
    let table = dir.path().join("procedures.csv");
    std::fs::write(
        &table,
        "Beskrivelse;Lab\nHSG;Lab 3\nRG Columna lumbal;Lab 2\nMyelografi cervical, RG Columna;Lab 1\nUltralyd;Lab 2\n",
    )
    .unwrap();
    let classified = dir.path().join("classified.csv");

    let output = dosematch()
        .arg("classify")
        .arg(&config)
        .arg(&table)
        .arg("--output")
        .arg(&classified)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        stdout,
        "(n = 1) Columna\n(n = 1) HSG\n(n = 1) Myelografi\n(n = 1) Unmapped\n"
    );
    let written = std::fs::read_to_string(&classified).unwrap();
    assert!(written.starts_with("mapped_category,Beskrivelse,Lab\n"), "written:\n{written}");
}

#[test]
fn classify_refuses_to_overwrite_input() {
    let (dir, config) = workspace(CONFIG);
    let table = dir.path().join("ids7.csv");
    let output = dosematch()
        .arg("classify")
        .arg(&config)
        .arg(&table)
        .arg("--output")
        .arg(&table)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// audit
// ===========================================================================

#[test]
fn audit_lists_split_bookings_without_changes() {
    let (dir, config) = workspace(CONFIG);
    let before = std::fs::read_to_string(dir.path().join("ids7.csv")).unwrap();

    let output = run_with(&["audit", "--json"], &config);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(val["referral"]["identifiers"], 10);
    assert_eq!(val["referral"]["unconfirmed"], 4);
    assert_eq!(val["dose"]["identifiers"], 7);
    assert_eq!(val["dose"]["unconfirmed"], 1);
    assert_eq!(val["same_time"].as_array().unwrap().len(), 4);
    assert_eq!(val["same_time"][0]["ordered_at"], "2024-03-04 08:15:00");
    assert!(val["same_day"].as_array().unwrap().is_empty());

    let after = std::fs::read_to_string(dir.path().join("ids7.csv")).unwrap();
    assert_eq!(before, after);
}
