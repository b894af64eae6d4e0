//! End-to-end runs of the `sheetbase` binary.

use predicates::{prelude::PredicateBooleanExt, str::contains};
use tempfile::TempDir;

mod common;

use common::{TestResult, cli, write_xlsx};

#[test]
fn create_ingest_show_export() -> TestResult {
    let tmp = TempDir::new()?;
    let file = write_xlsx(
        tmp.path(),
        "survey.xlsx",
        &["name", "age"],
        &[&["Ana", "30"], &["Bo", ""]],
    );

    cli(tmp.path())
        .args(["create", "--name", "survey", "--column", "name", "--column", "age"])
        .assert()
        .success()
        .stdout(contains("Created table survey (id: 1)"));

    cli(tmp.path())
        .args(["ingest", "--id", "1", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("Ingested rows: 2"));

    cli(tmp.path())
        .args(["show", "--id", "1"])
        .assert()
        .success()
        .stdout(contains("Ana").and(contains("total_rows: 2")));

    cli(tmp.path())
        .args(["export", "--id", "1", "--format", "csv"])
        .assert()
        .success()
        .stdout("name,age\nAna,30\nBo,\n");

    let out = tmp.path().join("survey-export.xlsx");
    cli(tmp.path())
        .args(["export", "--id", "1", "--output"])
        .arg(&out)
        .assert()
        .success();
    assert!(std::fs::read(&out)?.starts_with(b"PK"));

    // Refuses to clobber without --force.
    cli(tmp.path())
        .args(["export", "--id", "1", "--output"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(contains("Refusing to overwrite"));
    Ok(())
}

#[test]
fn create_is_idempotent_unless_rejecting() -> TestResult {
    let tmp = TempDir::new()?;

    cli(tmp.path())
        .args(["create", "--name", "t", "--column", "a"])
        .assert()
        .success();

    cli(tmp.path())
        .args(["create", "--name", "t", "--column", "b"])
        .assert()
        .success()
        .stdout(contains("already exists"));

    cli(tmp.path())
        .args(["create", "--name", "t", "--column", "b", "--reject-duplicate"])
        .assert()
        .failure()
        .stderr(contains("error[duplicate_name]"));

    cli(tmp.path())
        .args(["create", "--name", "u", "--column", "id"])
        .assert()
        .failure()
        .stderr(contains("error[invalid_schema]"));
    Ok(())
}

#[test]
fn mismatched_upload_fails_with_kind() -> TestResult {
    let tmp = TempDir::new()?;
    let wrong = write_xlsx(tmp.path(), "wrong.xlsx", &["name", "city"], &[&["Di", "Oslo"]]);

    cli(tmp.path())
        .args(["create", "--name", "survey", "--column", "name", "--column", "age"])
        .assert()
        .success();

    cli(tmp.path())
        .args(["ingest", "--id", "1", "--file"])
        .arg(&wrong)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("error[schema_mismatch]"));

    let csv = tmp.path().join("data.csv");
    std::fs::write(&csv, "name,age\n")?;
    cli(tmp.path())
        .args(["ingest", "--id", "1", "--file"])
        .arg(&csv)
        .assert()
        .failure()
        .stderr(contains("error[unsupported_format]"));

    cli(tmp.path())
        .args(["ingest", "--id", "9", "--file"])
        .arg(&wrong)
        .assert()
        .failure()
        .stderr(contains("error[not_found]"));
    Ok(())
}

#[test]
fn ingest_many_reports_per_file() -> TestResult {
    let tmp = TempDir::new()?;
    let a = write_xlsx(tmp.path(), "a.xlsx", &["name"], &[&["Ana"], &["Bo"]]);
    let b = write_xlsx(tmp.path(), "b.xlsx", &["other"], &[&["x"]]);
    let c = write_xlsx(tmp.path(), "c.xlsx", &["name"], &[&["Cy"]]);

    cli(tmp.path())
        .args(["create", "--name", "people", "--column", "name"])
        .assert()
        .success();

    cli(tmp.path())
        .args(["ingest-many", "--id", "1", "--policy", "best-effort"])
        .arg("--file")
        .arg(&a)
        .arg("--file")
        .arg(&b)
        .arg("--file")
        .arg(&c)
        .assert()
        .success()
        .stdout(contains("ingested: 2").and(contains("failed: 1")).and(contains("rows: 3")));

    cli(tmp.path())
        .args(["ingest-many", "--id", "1", "--policy", "all-or-nothing"])
        .arg("--file")
        .arg(&a)
        .arg("--file")
        .arg(&b)
        .assert()
        .failure()
        .stderr(contains("b.xlsx"));

    cli(tmp.path())
        .args(["show", "--id", "1"])
        .assert()
        .success()
        .stdout(contains("total_rows: 3"));
    Ok(())
}

#[test]
fn insert_list_delete_and_correlate() -> TestResult {
    let tmp = TempDir::new()?;

    cli(tmp.path())
        .args(["create", "--name", "scores", "--column", "hours", "--column", "score"])
        .args(["--display-name", "Exam scores"])
        .assert()
        .success();

    cli(tmp.path())
        .args([
            "insert",
            "--id",
            "1",
            "--json",
            r#"[{"hours": 1, "score": 10}, {"hours": 2, "score": 20}, {"hours": 3, "score": 30}]"#,
        ])
        .assert()
        .success()
        .stdout(contains("Inserted rows: 3"));

    cli(tmp.path())
        .args(["correlate", "--id", "1", "--x", "hours", "--y", "score"])
        .assert()
        .success()
        .stdout(contains("= 1.000000"));

    cli(tmp.path())
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(contains(r#""display_name": "Exam scores""#));

    cli(tmp.path())
        .args(["delete", "--id", "1"])
        .assert()
        .success()
        .stdout(contains("Deleted table 1"));

    cli(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(contains("(no tables)"));

    cli(tmp.path())
        .args(["list", "--include-deleted"])
        .assert()
        .success()
        .stdout(contains("scores"));
    Ok(())
}

#[test]
fn create_from_xlsx_loads_rows() -> TestResult {
    let tmp = TempDir::new()?;
    let file = write_xlsx(
        tmp.path(),
        "inventory.xlsx",
        &["sku", "qty"],
        &[&["A-1", "4"], &["B-2", "7"]],
    );

    cli(tmp.path())
        .args(["create-from-xlsx", "--name", "inventory", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("Created table inventory").and(contains("Ingested rows: 2")));

    cli(tmp.path())
        .args(["export", "--id", "1", "--format", "jsonl", "--column", "qty"])
        .assert()
        .success()
        .stdout(contains(r#"{"qty":"4"}"#));
    Ok(())
}
