use assert_cmd::Command;
use predicates::prelude::*;

const CONFIG: &str = r#"
documents:
  backend: bup
  repository_path: /data/backups
  passphrase: hunter2
  sources:
    docs:
      dir: /home/u/Documents
      excluded: [tmp]
  remotes:
    - /mnt/mirror
"#;

fn loft(home: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("loft").unwrap();
    cmd.env("XDG_DATA_HOME", home.path().join("data"));
    cmd.env("XDG_CONFIG_HOME", home.path().join("config"));
    cmd
}

fn write_config(home: &tempfile::TempDir) -> std::path::PathBuf {
    let path = home.path().join("loft.yaml");
    std::fs::write(&path, CONFIG).unwrap();
    path
}

#[test]
fn help_lists_the_operations() {
    Command::cargo_bin("loft")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--backup"))
        .stdout(predicate::str::contains("--recover"))
        .stdout(predicate::str::contains("--last-synced"));
}

#[test]
fn refuses_to_run_without_an_operation() {
    let home = tempfile::tempdir().unwrap();
    loft(&home)
        .arg("documents")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to do"));
}

#[test]
fn engine_operations_require_repository_names() {
    let home = tempfile::tempdir().unwrap();
    loft(&home)
        .arg("--backup")
        .assert()
        .failure()
        .stderr(predicate::str::contains("repository names required"));
}

#[test]
fn mount_takes_exactly_one_repository() {
    let home = tempfile::tempdir().unwrap();
    loft(&home)
        .args(["--fuse", "/tmp/view", "documents", "photos"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exactly one repository"));
}

#[test]
fn missing_config_is_reported_with_its_path() {
    let home = tempfile::tempdir().unwrap();
    loft(&home)
        .args(["--list", "--config", "/nonexistent/loft.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/loft.yaml"));
}

#[test]
fn lists_repositories_from_the_config() {
    let home = tempfile::tempdir().unwrap();
    let config = write_config(&home);

    loft(&home)
        .env("LOFT_CONFIG", &config)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("documents (bup)"))
        .stdout(predicate::str::contains("/mnt/mirror"));
}

#[test]
fn backup_of_one_repository_never_prompts_for_others() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("loft.yaml");
    // A second repository without a passphrase must not block a
    // non-interactive backup of the first.
    std::fs::write(
        &config,
        format!(
            "{CONFIG}
photos:
  backend: restic
  repository_path: /data/backups
  sources:
    pics:
      dir: /home/u/Pictures
"
        ),
    )
    .unwrap();

    loft(&home)
        .env("LOFT_CONFIG", &config)
        .args(["--backup", "documents"])
        .write_stdin("")
        .assert()
        .stderr(predicate::str::contains("could not read passphrase").not());
}

#[test]
fn recover_cannot_be_given_twice() {
    let home = tempfile::tempdir().unwrap();
    loft(&home)
        .args([
            "documents",
            "--recover",
            "bdisk",
            "/tmp/out",
            "--recover",
            "gdrive",
            "/tmp/other",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used multiple times"));
}

#[test]
fn unknown_repository_names_fail_before_any_work() {
    let home = tempfile::tempdir().unwrap();
    let config = write_config(&home);

    loft(&home)
        .env("LOFT_CONFIG", &config)
        .args(["--backup", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no repository named nope"));
}
