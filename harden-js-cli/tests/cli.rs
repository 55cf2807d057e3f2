use assert_cmd::Command;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn harden_js_cli() -> Command {
  assert_cmd::cargo::cargo_bin_cmd!("harden-js")
}

fn json_file(contents: &str) -> NamedTempFile {
  let mut file = NamedTempFile::new().unwrap();
  file.write_all(contents.as_bytes()).unwrap();
  file
}

#[test]
fn prints_the_completion_value() {
  let assert = harden_js_cli()
    .timeout(Duration::from_secs(10))
    .write_stdin("[1, 2].map(x => x + 1)")
    .assert()
    .success()
    .code(0);
  assert_eq!(String::from_utf8_lossy(&assert.get_output().stdout), "[2,3]\n");
}

#[test]
fn endowments_are_visible_and_date_is_tamed() {
  let endowments = json_file(r#"{"base": 40}"#);
  let assert = harden_js_cli()
    .timeout(Duration::from_secs(10))
    .arg("--endowments")
    .arg(endowments.path())
    .write_stdin("[base + 2, Number.isNaN(Date.now())].join()")
    .assert()
    .success();
  assert_eq!(String::from_utf8_lossy(&assert.get_output().stdout), "42,true\n");
}

#[test]
fn options_file_is_validated() {
  let options = json_file(r#"{"dateTaming": "sometimes"}"#);
  let assert = harden_js_cli()
    .timeout(Duration::from_secs(10))
    .arg("--options")
    .arg(options.path())
    .write_stdin("1")
    .assert()
    .failure()
    .code(2);
  let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
  assert!(stderr.contains("unrecognized dateTaming sometimes"), "{stderr}");
}

#[test]
fn uncaught_errors_are_rendered_to_stderr() {
  let assert = harden_js_cli()
    .timeout(Duration::from_secs(10))
    .arg("--name")
    .arg("guest")
    .write_stdin("throw new TypeError('nope')")
    .assert()
    .failure()
    .code(1);
  assert!(assert.get_output().stdout.is_empty());
  let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
  assert!(stderr.contains("(TypeError#1)"), "{stderr}");
  assert!(stderr.contains("nope"), "{stderr}");
}

#[test]
fn rejected_source_is_reported() {
  let assert = harden_js_cli()
    .timeout(Duration::from_secs(10))
    .write_stdin("const a = 1; a <!-- 2")
    .assert()
    .failure()
    .code(1);
  let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
  assert!(stderr.contains("SES_HTML_COMMENT_REJECTED"), "{stderr}");
}
