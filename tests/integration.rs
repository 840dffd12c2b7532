use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn niche_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("niche");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // A stand-in product photo; the static provider never reads real pixels
    fs::write(root.join("product.jpg"), b"\xff\xd8\xff\xe0 not a real jpeg").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/niche.sqlite"

[server]
bind = "127.0.0.1:7431"

[storage]
image_dir = "{}/data/uploads"

[classifier]
epsilon = 0.01
max_weight = 10.0
learning_rate = 0.05

[labels]
provider = "static"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("niche.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_niche(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = niche_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run niche binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn image_path(config_path: &Path) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("product.jpg")
        .display()
        .to_string()
}

fn extract_history_id(stdout: &str) -> i64 {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("history_id: "))
        .unwrap_or_else(|| panic!("no history_id in output: {}", stdout))
        .trim()
        .parse()
        .unwrap()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_niche(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_niche(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_niche(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_seed_and_list_niches() {
    let (_tmp, config_path) = setup_test_env();

    run_niche(&config_path, &["init"]);
    let (stdout, stderr, success) = run_niche(&config_path, &["seed"]);
    assert!(success, "seed failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Seeded 15 niches"));

    let (stdout, _, success) = run_niche(&config_path, &["niches"]);
    assert!(success);
    assert!(stdout.contains("Gaming"));
    assert!(stdout.contains("Fashion & Apparel"));
}

#[test]
fn test_classify_with_inline_labels() {
    let (_tmp, config_path) = setup_test_env();
    let image = image_path(&config_path);

    run_niche(&config_path, &["init"]);
    run_niche(&config_path, &["seed"]);

    // "shoe" is a seeded Fashion & Apparel keyword; "sneaker" is not seeded
    let (stdout, stderr, success) = run_niche(
        &config_path,
        &["classify", &image, "--labels", "sneaker:0.9,shoe:0.8"],
    );
    assert!(
        success,
        "classify failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("Fashion & Apparel"));
    assert!(stdout.contains("history_id: "));
}

#[test]
fn test_classify_uses_static_provider() {
    let (_tmp, config_path) = setup_test_env();
    let image = image_path(&config_path);

    run_niche(&config_path, &["init"]);
    run_niche(&config_path, &["seed"]);

    // Default static labels are yoga/mat/exercise/purple/fitness
    let (stdout, _, success) = run_niche(&config_path, &["classify", &image]);
    assert!(success);
    assert!(stdout.contains("Fitness & Wellness"));
}

#[test]
fn test_classify_unmatched_is_unclassified() {
    let (_tmp, config_path) = setup_test_env();
    let image = image_path(&config_path);

    run_niche(&config_path, &["init"]);
    run_niche(&config_path, &["seed"]);

    let (stdout, _, success) = run_niche(
        &config_path,
        &["classify", &image, "--labels", "xylophone:0.9"],
    );
    assert!(success);
    assert!(stdout.contains("unclassified"));
    assert!(stdout.contains("confidence: 0.00"));
}

#[test]
fn test_classify_dry_run_persists_nothing() {
    let (_tmp, config_path) = setup_test_env();
    let image = image_path(&config_path);

    run_niche(&config_path, &["init"]);
    run_niche(&config_path, &["seed"]);

    let (stdout, _, success) = run_niche(
        &config_path,
        &["classify", &image, "--labels", "shoe:0.8", "--dry-run"],
    );
    assert!(success);
    assert!(!stdout.contains("history_id"));

    let (stdout, _, _) = run_niche(&config_path, &["history"]);
    assert!(stdout.contains("No history."));
}

#[test]
fn test_feedback_resolves_once() {
    let (_tmp, config_path) = setup_test_env();
    let image = image_path(&config_path);

    run_niche(&config_path, &["init"]);
    run_niche(&config_path, &["seed"]);

    let (stdout, _, _) = run_niche(
        &config_path,
        &["classify", &image, "--labels", "shoe:0.8,hat:0.7"],
    );
    let history_id = extract_history_id(&stdout).to_string();

    let (stdout, stderr, success) = run_niche(
        &config_path,
        &["feedback", &history_id, "--outcome", "correct"],
    );
    assert!(
        success,
        "feedback failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("resolved as correct"));

    // Second submission conflicts
    let (_, stderr, success) = run_niche(
        &config_path,
        &["feedback", &history_id, "--outcome", "incorrect"],
    );
    assert!(!success, "second feedback unexpectedly succeeded");
    assert!(stderr.contains("already resolved"));
}

#[test]
fn test_feedback_with_correction() {
    let (_tmp, config_path) = setup_test_env();
    let image = image_path(&config_path);

    run_niche(&config_path, &["init"]);
    run_niche(&config_path, &["seed"]);

    let (stdout, _, _) = run_niche(
        &config_path,
        &["classify", &image, "--labels", "shoe:0.8"],
    );
    let history_id = extract_history_id(&stdout).to_string();

    // Correct it to a niche whose keywords don't match the snapshot; the
    // resolution still succeeds and that side is a no-op
    let (stdout, stderr, success) = run_niche(
        &config_path,
        &[
            "feedback",
            &history_id,
            "--outcome",
            "incorrect",
            "--niche",
            "9",
        ],
    );
    assert!(
        success,
        "feedback failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("resolved as incorrect"));

    let (stdout, _, _) = run_niche(&config_path, &["history"]);
    assert!(stdout.contains("[incorrect]"));
}

#[test]
fn test_feedback_unknown_history_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_niche(&config_path, &["init"]);
    run_niche(&config_path, &["seed"]);

    let (_, stderr, success) = run_niche(&config_path, &["feedback", "999", "--outcome", "correct"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_feedback_rejects_correct_with_correction() {
    let (_tmp, config_path) = setup_test_env();
    let image = image_path(&config_path);

    run_niche(&config_path, &["init"]);
    run_niche(&config_path, &["seed"]);

    let (stdout, _, _) = run_niche(
        &config_path,
        &["classify", &image, "--labels", "shoe:0.8"],
    );
    let history_id = extract_history_id(&stdout).to_string();

    let (_, stderr, success) = run_niche(
        &config_path,
        &[
            "feedback",
            &history_id,
            "--outcome",
            "correct",
            "--niche",
            "2",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("not allowed"));
}
