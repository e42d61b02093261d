use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn lists_samples() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("irx")?;
    cmd.arg("list");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("arith").and(predicate::str::contains("rescue")));
    Ok(())
}

#[test]
fn writes_and_runs_a_sample() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("out/arith.irxb");

    Command::cargo_bin("irx")?
        .args(["sample", "arith", "-o", path.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote arith"));
    assert!(fs::read(&path)?.starts_with(b"IRXB"));

    Command::cargo_bin("irx")?
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::diff("answer: 42\n10\nten\n=> [42, 40, 10]\n"));

    // bare FILE runs too
    Command::cargo_bin("irx")?
        .arg(path.to_str().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::ends_with("=> [42, 40, 10]\n"));
    Ok(())
}

#[test]
fn optimized_runs_match_and_report_stats() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("super.irxb");
    Command::cargo_bin("irx")?
        .args(["sample", "super", "-o", path.to_str().unwrap()])
        .assert()
        .success();

    Command::cargo_bin("irx")?
        .args(["run", path.to_str().unwrap(), "--opt", "--stats"])
        .assert()
        .success()
        .stdout(predicate::str::diff("derived/base 5\n50\n=> 50\n"))
        .stderr(predicate::str::contains("\"hits\":").and(predicate::str::contains("\"deopts\":0")));
    Ok(())
}

#[test]
fn disasm_and_flags_describe_the_module() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("blocks.irxb");
    Command::cargo_bin("irx")?
        .args(["sample", "blocks", "-o", path.to_str().unwrap()])
        .assert()
        .success();

    Command::cargo_bin("irx")?
        .args(["disasm", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("# source: sample:blocks").and(predicate::str::contains("method each_twice")));

    Command::cargo_bin("irx")?
        .args(["flags", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("CAN_RECEIVE_BREAKS"));

    let output = Command::cargo_bin("irx")?
        .args(["flags", "--json", path.to_str().unwrap()])
        .output()?;
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["kind"], "script");
    assert!(report["nested"].as_array().is_some_and(|n| !n.is_empty()));
    Ok(())
}

#[test]
fn rejects_bad_inputs() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;

    Command::cargo_bin("irx")?
        .args(["sample", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown sample 'nope'"));

    let junk = dir.path().join("junk.irxb");
    fs::write(&junk, b"not an irx module")?;
    Command::cargo_bin("irx")?
        .args(["run", junk.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid IRXB magic"));

    Command::cargo_bin("irx")?
        .args(["run", "../escape.irxb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Parent directory components"));
    Ok(())
}
