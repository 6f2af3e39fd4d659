use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;

fn goinstr() -> Command {
    Command::cargo_bin("goinstr").unwrap()
}

fn stderr(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
}

#[test]
fn test_path_is_required() {
    let assert = goinstr().arg("instrument").assert().failure();
    assert!(stderr(&assert).contains("--path"));
}

#[test]
fn test_missing_directory_is_reported() {
    let temp = TempDir::new().unwrap();
    let assert = goinstr()
        .args(["instrument", "--path"])
        .arg(temp.path().join("nowhere"))
        .assert()
        .failure()
        .code(1);
    assert!(stderr(&assert).contains("does not exist or is not a directory"));
}

#[test]
fn test_application_without_main_fails() {
    let temp = TempDir::new().unwrap();
    temp.child("go.mod").write_str("module example.com/lib\n").unwrap();
    temp.child("lib.go")
        .write_str("package lib\n\nfunc Work() {}\n")
        .unwrap();
    let patch = temp.child("out.diff");

    let assert = goinstr()
        .args(["instrument", "--path"])
        .arg(temp.path())
        .arg("--diff")
        .arg(patch.path())
        .assert()
        .failure()
        .code(1);
    let err = stderr(&assert);
    let lines: Vec<_> = err.lines().filter(|l| l.contains("Error:")).collect();
    assert_eq!(lines.len(), 1, "{err}");
    assert!(lines[0].contains("no main function found"), "{err}");
    assert_eq!(std::fs::read_to_string(patch.path()).unwrap(), "");
}
