use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn chartsift_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("chartsift");
    path
}

const DIABETES_NOTE: &str = "Patient presents for routine follow-up of type 2 diabetes. \
Hemoglobin A1c improved to 7.2 from 8.1. Continue metformin 1000 mg twice daily. \
Counseled on diet and exercise; recheck labs in three months.";

const TEMPLATE_NOTE: &str = "Okay, here is a medical note template for a patient. \
Chief Complaint: [Insert chief complaint here]. \
History of Present Illness: [Describe symptoms]. \
Please list any specific symptoms below.";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // Create test bundles
    let bundles_dir = root.join("bundles");
    fs::create_dir_all(&bundles_dir).unwrap();

    let bundle = format!(
        r#"{{
  "resourceType": "Bundle",
  "id": "bundle-1",
  "entry": [
    {{"resource": {{"resourceType": "Patient", "id": "patient-1"}}}},
    {{"resource": {{
      "resourceType": "DocumentReference",
      "id": "docref-1",
      "date": "2022-07-01T09:30:00Z",
      "type": {{"text": "Progress note"}},
      "author": [{{"display": "Dr. Okafor"}}],
      "custodian": {{"display": "Lakeside Clinic"}},
      "content": [{{"attachment": {{"contentType": "text/plain", "data": "{diabetes}"}}}}]
    }}}},
    {{"resource": {{
      "resourceType": "DocumentReference",
      "id": "docref-2",
      "content": [{{"attachment": {{"contentType": "text/plain", "data": "{template}"}}}}]
    }}}},
    {{"resource": {{
      "resourceType": "DiagnosticReport",
      "id": "report-1",
      "issued": "2022-06-15T08:00:00Z",
      "code": {{"text": "CBC panel"}},
      "text": {{"div": "<div>Complete blood count shows mild anemia with hemoglobin of 10.8. Iron studies ordered and follow-up scheduled in two weeks.</div>"}}
    }}}},
    {{"resource": {{
      "resourceType": "Observation",
      "id": "obs-1",
      "performer": [{{"display": "Nurse Patel"}}],
      "note": [{{"text": "Blood pressure well controlled on current regimen. Patient reports good medication adherence and no dizziness or headaches."}}]
    }}}},
    {{"resource": {{"resourceType": "MedicationRequest", "id": "med-1"}}}}
  ]
}}"#,
        diabetes = BASE64.encode(DIABETES_NOTE),
        template = BASE64.encode(TEMPLATE_NOTE),
    );
    fs::write(bundles_dir.join("bundle-1.json"), bundle).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/chartsift.sqlite"

[embedding]
provider = "mock"
dims = 64

[chunking]
size = 1000
overlap = 200

[retrieval]
limit = 5
min_similarity = 0.3
"#,
        root.display()
    );

    let config_path = config_dir.join("chartsift.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_chartsift(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = chartsift_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run chartsift binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_chartsift(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_chartsift(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_chartsift(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_counts() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    let (stdout, stderr, success) =
        run_chartsift(&config_path, &["ingest", bundles.to_str().unwrap()]);
    assert!(
        success,
        "ingest failed: stdout={}, stderr={}",
        stdout, stderr
    );
    // Patient and MedicationRequest carry no note text; the template note is
    // rejected by the sanitizer.
    assert!(stdout.contains("Notes extracted:  4"), "got: {}", stdout);
    assert!(stdout.contains("Notes rejected:   1"), "got: {}", stdout);
    assert!(stdout.contains("Notes ingested:   3"), "got: {}", stdout);
    assert!(stdout.contains("Chunks written:   3"), "got: {}", stdout);
}

#[test]
fn test_ingest_idempotent_no_duplicates() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    let bundles = bundles.to_str().unwrap();

    let (stdout1, _, _) = run_chartsift(&config_path, &["ingest", bundles]);
    assert!(stdout1.contains("Chunks written:   3"));

    // Re-ingesting the same bundles upserts in place
    let (stdout2, _, _) = run_chartsift(&config_path, &["ingest", bundles]);
    assert!(stdout2.contains("Chunks written:   3"));

    let (stats, _, _) = run_chartsift(&config_path, &["stats"]);
    assert!(stats.contains("Total chunks:    3"), "got: {}", stats);
    assert!(stats.contains("Unique notes:    3"), "got: {}", stats);
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    let (stdout, _, success) =
        run_chartsift(&config_path, &["ingest", bundles.to_str().unwrap(), "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("Dry run"));
    assert!(stdout.contains("Notes ingested:   3"));

    let (stats, _, _) = run_chartsift(&config_path, &["stats"]);
    assert!(stats.contains("Total chunks:    0"), "got: {}", stats);
}

#[test]
fn test_ingest_limit() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    let (stdout, _, success) = run_chartsift(
        &config_path,
        &["ingest", bundles.to_str().unwrap(), "--limit", "1"],
    );
    assert!(success);
    assert!(stdout.contains("Notes ingested:   1"), "got: {}", stdout);
}

#[test]
fn test_ingest_skips_malformed_file() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    fs::write(bundles.join("broken.json"), "this is not a bundle").unwrap();

    let (stdout, _, success) = run_chartsift(&config_path, &["ingest", bundles.to_str().unwrap()]);
    assert!(success, "a malformed file must not fail the run");
    assert!(stdout.contains("File errors:      1"), "got: {}", stdout);
    assert!(stdout.contains("Notes ingested:   3"), "got: {}", stdout);
}

#[test]
fn test_context_returns_block() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    run_chartsift(&config_path, &["ingest", bundles.to_str().unwrap()]);

    let (stdout, stderr, success) = run_chartsift(
        &config_path,
        &["context", "diabetes management", "--patient", "patient-1"],
    );
    assert!(
        success,
        "context failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("=== RELEVANT CLINICAL NOTES ==="));
    assert!(stdout.contains("=== END CLINICAL NOTES ==="));
    assert!(stdout.contains("record(s)"), "got: {}", stdout);
    assert!(!stdout.contains("0 record(s)"), "got: {}", stdout);
}

#[test]
fn test_context_recency_fallback() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    run_chartsift(&config_path, &["ingest", bundles.to_str().unwrap()]);

    // Mock vectors cannot clear a near-perfect threshold, so the block must
    // be served by the recency fallback instead of coming back empty.
    let (stdout, _, success) = run_chartsift(
        &config_path,
        &[
            "context",
            "anything at all",
            "--patient",
            "patient-1",
            "--min-similarity",
            "0.9999",
        ],
    );
    assert!(success);
    assert!(stdout.contains("=== RELEVANT CLINICAL NOTES ==="));
}

#[test]
fn test_context_unknown_patient() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    run_chartsift(&config_path, &["ingest", bundles.to_str().unwrap()]);

    let (stdout, _, success) = run_chartsift(
        &config_path,
        &["context", "diabetes", "--patient", "nobody"],
    );
    assert!(success, "unknown patient should not be an error");
    assert!(stdout.contains("No relevant clinical notes were found"));
    assert!(stdout.contains("0 record(s)"), "got: {}", stdout);
}

#[test]
fn test_delete_note() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    run_chartsift(&config_path, &["ingest", bundles.to_str().unwrap()]);

    let (stdout, _, success) = run_chartsift(&config_path, &["delete", "docref-1"]);
    assert!(success);
    assert!(stdout.contains("Deleted 1 chunk(s) for note 'docref-1'."));

    let (stats, _, _) = run_chartsift(&config_path, &["stats"]);
    assert!(stats.contains("Total chunks:    2"), "got: {}", stats);

    let (stdout, _, success) = run_chartsift(&config_path, &["delete", "docref-1"]);
    assert!(success);
    assert!(stdout.contains("No chunks found for note 'docref-1'."));
}

#[test]
fn test_stats_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let (stdout, _, success) = run_chartsift(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Total chunks:    0"));
    assert!(stdout.contains("Unique subjects: 0"));
}

#[test]
fn test_stats_after_ingest() {
    let (tmp, config_path) = setup_test_env();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    run_chartsift(&config_path, &["ingest", bundles.to_str().unwrap()]);

    let (stdout, _, success) = run_chartsift(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Total chunks:    3"));
    assert!(stdout.contains("Unique subjects: 1"));
    assert!(stdout.contains("Unique notes:    3"));
    assert!(stdout.contains("Most recent:"));
}

#[test]
fn test_ingest_requires_embedding_provider() {
    let (tmp, config_path) = setup_test_env();

    // Rewrite the config with embeddings disabled
    let content = fs::read_to_string(&config_path).unwrap();
    let disabled = content.replace("provider = \"mock\"\ndims = 64", "provider = \"disabled\"");
    fs::write(&config_path, disabled).unwrap();

    run_chartsift(&config_path, &["init"]);
    let bundles = tmp.path().join("bundles");
    let (_, stderr, success) = run_chartsift(&config_path, &["ingest", bundles.to_str().unwrap()]);
    assert!(!success, "ingest without a provider should fail");
    assert!(stderr.contains("embedding provider"), "got: {}", stderr);
}

#[test]
fn test_bad_config_rejected() {
    let (_tmp, config_path) = setup_test_env();

    let content = fs::read_to_string(&config_path).unwrap();
    let bad = content.replace("overlap = 200", "overlap = 1000");
    fs::write(&config_path, bad).unwrap();

    let (_, stderr, success) = run_chartsift(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "got: {}", stderr);
}
