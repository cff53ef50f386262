use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn rfsr() -> Command {
    let mut cmd = Command::cargo_bin("rfsr").expect("binary is built");
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_search_reports_matches() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    fs::write(
        temp_dir.path().join("header.php"),
        "<?php\n// header\n<h1>Welcome to Old Site</h1>\n",
    )?;

    rfsr()
        .arg("--root")
        .arg(format!("theme={}", temp_dir.path().display()))
        .arg("search")
        .arg("old site")
        .assert()
        .success()
        .stdout(predicate::str::contains("theme:header.php"))
        .stdout(predicate::str::contains("Welcome to Old Site"))
        .stdout(predicate::str::contains("Found"));

    Ok(())
}

#[test]
fn test_search_json_output() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    fs::write(temp_dir.path().join("a.css"), "body { color: red; }\n")?;

    let output = rfsr()
        .arg("--root")
        .arg(temp_dir.path())
        .arg("--format")
        .arg("json")
        .arg("search")
        .arg("color")
        .output()?;
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["total_containers"], 1);
    assert_eq!(value["sources"][0]["results"][0]["container_id"]["path"], "a.css");
    Ok(())
}

#[test]
fn test_invalid_regex_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;

    rfsr()
        .arg("--root")
        .arg(temp_dir.path())
        .arg("search")
        .arg("(oops")
        .arg("--mode")
        .arg("regex")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid regular expression"));
    Ok(())
}

#[test]
fn test_dry_run_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let file = temp_dir.path().join("footer.html");
    fs::write(&file, "&copy; OldCorp\n")?;

    rfsr()
        .arg("--root")
        .arg(temp_dir.path())
        .arg("replace")
        .arg("OldCorp")
        .arg("NewCorp")
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 │ &copy; OldCorp"))
        .stdout(predicate::str::contains("1 │ &copy; NewCorp"))
        .stdout(predicate::str::contains("1 item(s) would change"))
        .stdout(predicate::str::contains("nothing was written"));

    assert_eq!(fs::read_to_string(&file)?, "&copy; OldCorp\n");
    Ok(())
}

#[test]
fn test_dry_run_warns_about_deletion() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let file = temp_dir.path().join("links.html");
    fs::write(&file, "<a href=\"http://old.example\">home</a>\n")?;

    rfsr()
        .arg("--root")
        .arg(temp_dir.path())
        .arg("--format")
        .arg("json")
        .arg("replace")
        .arg("http://old.example")
        .arg("")
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"deletes_text\""))
        .stdout(predicate::str::contains("\"sensitive_pattern\""))
        .stdout(predicate::str::contains("\"after\": \"<a href=\\\"\\\">home</a>\\n\""));

    assert_eq!(
        fs::read_to_string(&file)?,
        "<a href=\"http://old.example\">home</a>\n"
    );
    Ok(())
}

#[test]
fn test_replace_with_selection_and_backup() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let theme = temp_dir.path().join("theme");
    fs::create_dir(&theme)?;
    fs::write(theme.join("a.php"), "old value\n")?;
    fs::write(theme.join("b.php"), "old value\n")?;
    let backups = temp_dir.path().join("backups");

    rfsr()
        .arg("--root")
        .arg(format!("theme={}", theme.display()))
        .arg("replace")
        .arg("old")
        .arg("new")
        .arg("--select")
        .arg("theme:b.php")
        .arg("--backup-dir")
        .arg(&backups)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 changed"));

    assert_eq!(fs::read_to_string(theme.join("a.php"))?, "old value\n");
    assert_eq!(fs::read_to_string(theme.join("b.php"))?, "new value\n");
    assert!(backups.exists());
    Ok(())
}

#[test]
fn test_replace_in_records() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let store = temp_dir.path().join("records.json");
    fs::write(
        &store,
        r#"[
  {"id": 4, "type": "post", "status": "publish", "modified": 10,
   "fields": {"title": "Launch", "content": "Call 555-0100 today"}},
  {"id": 5, "type": "page", "status": "trash", "modified": 20,
   "fields": {"title": "Old", "content": "Call 555-0100"}}
]"#,
    )?;

    rfsr()
        .arg("--records")
        .arg(&store)
        .arg("--metrics")
        .arg("replace")
        .arg(r"\d{3}-\d{4}")
        .arg("[redacted]")
        .arg("--mode")
        .arg("regex")
        .arg("--scope")
        .arg("posts,pages")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 changed"))
        .stdout(predicate::str::contains(
            r#"rfsr_replace_items_total{status="changed"} 1"#,
        ));

    let persisted = fs::read_to_string(&store)?;
    assert!(persisted.contains("Call [redacted] today"));
    assert!(persisted.contains("\"Call 555-0100\""));
    Ok(())
}
