use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

const OLD: &str = "@article{a2020,\n  title = {First.},\n  year = {2020}\n}\n\n@misc{b2021,\n  title = {Second.},\n  year = {2021}\n}\n";
const NEW: &str = "@article{a2020,\n  title = {First, revised.},\n  year = {2020}\n}\n\n@misc{c2022,\n  title = {Third.},\n  year = {2022}\n}\n";

fn bibsync() -> Result<Command, Box<dyn std::error::Error>> {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("bibsync")?;
    cmd.env_remove("BIBSYNC_CONFIG").env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn diff_json_partitions_keys() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("old.bib"), OLD)?;
    fs::write(dir.path().join("new.bib"), NEW)?;

    let assert = bibsync()?
        .current_dir(dir.path())
        .args(["diff", "old.bib", "new.bib", "--json"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let value: Value = serde_json::from_str(&stdout)?;
    assert_eq!(value["added"], serde_json::json!(["c2022"]));
    assert_eq!(value["removed"], serde_json::json!(["b2021"]));
    assert!(value["updated"]["a2020"].is_object());
    assert_eq!(value["unchanged"], serde_json::json!([]));
    Ok(())
}

#[test]
fn diff_text_lists_changes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("old.bib"), OLD)?;
    fs::write(dir.path().join("new.bib"), NEW)?;

    bibsync()?
        .current_dir(dir.path())
        .args(["diff", "old.bib", "new.bib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("New citekeys added:\n  - c2022"))
        .stdout(predicate::str::contains("Updated sources:\n  - a2020"))
        .stdout(predicate::str::contains("Removed citekeys:\n  - b2021"));
    Ok(())
}

#[test]
fn diff_of_missing_file_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("new.bib"), NEW)?;

    bibsync()?
        .current_dir(dir.path())
        .args(["diff", "old.bib", "new.bib"])
        .assert()
        .code(2);
    Ok(())
}

#[test]
fn usage_lists_cited_keys() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let paper = dir.path().join("paper");
    fs::create_dir_all(paper.join("sections"))?;
    fs::write(paper.join("main.tex"), "\\cite{a,b} and \\textcite{c}\n")?;
    fs::write(
        paper.join("sections/intro.tex"),
        "\\citep[p.~3]{d} 50\\% done % \\cite{hidden}\n",
    )?;
    fs::write(paper.join("notes.md"), "\\cite{ignored}\n")?;

    let assert = bibsync()?
        .current_dir(dir.path())
        .args(["usage", "paper", "--json"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let value: Value = serde_json::from_str(&stdout)?;
    assert_eq!(value["files_scanned"], 2);
    assert_eq!(value["keys"], serde_json::json!(["a", "b", "c", "d"]));
    Ok(())
}

#[test]
fn usage_without_citations_says_so() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("main.tex"), "No references here.\n")?;

    bibsync()?
        .current_dir(dir.path())
        .args(["usage", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("No citations found in 1 file(s)."));
    Ok(())
}
