use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn pipesh(dir: &TempDir, args: &[&str], stdin: &str) -> Output {
    let config = dir.path().join("no-config.toml");
    let mut child = Command::new(env!("CARGO_BIN_EXE_pipesh"))
        .arg("--config")
        .arg(&config)
        .args(args)
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(stdin.as_bytes()).unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8(output.stderr.clone()).unwrap()
}

#[test]
fn one_shot_line_sets_exit_status() {
    let dir = TempDir::new().unwrap();
    let out = pipesh(&dir, &["-c", "echo A && false"], "");
    assert_eq!(stdout(&out), "A\n");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn conditional_chain() {
    let dir = TempDir::new().unwrap();
    let out = pipesh(&dir, &["-c", "false && echo no || echo yes"], "");
    assert_eq!(stdout(&out), "yes\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn script_from_stdin() {
    let dir = TempDir::new().unwrap();
    let script = "echo hi > out.txt\ncat out.txt\n\necho more >> out.txt\ncat out.txt | wc -l\n";
    let out = pipesh(&dir, &[], script);
    assert_eq!(stdout(&out).lines().map(str::trim).collect::<Vec<_>>(), ["hi", "2"]);
    assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hi\nmore\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn exit_with_code() {
    let dir = TempDir::new().unwrap();
    let out = pipesh(&dir, &[], "echo before\nexit 4\necho after\n");
    assert_eq!(stdout(&out), "before\n");
    assert_eq!(out.status.code(), Some(4));
}

#[test]
fn cd_persists_between_lines() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub").join("marker"), "found\n").unwrap();
    let out = pipesh(&dir, &[], "cd sub\ncat marker\ncd..\ncat sub/marker\n");
    assert_eq!(stdout(&out), "found\nfound\n");
}

#[test]
fn missing_program_reports_127() {
    let dir = TempDir::new().unwrap();
    let out = pipesh(&dir, &["-c", "pipesh-no-such-program"], "");
    assert_eq!(out.status.code(), Some(127));
    assert_eq!(stderr(&out), "pipesh: pipesh-no-such-program: command not found\n");
}

#[test]
fn parse_error_reports_2() {
    let dir = TempDir::new().unwrap();
    let out = pipesh(&dir, &["-c", "cat <"], "");
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).starts_with("pipesh: syntax error"));
}

#[test]
fn trace_shows_decisions() {
    let dir = TempDir::new().unwrap();
    let out = pipesh(&dir, &["--trace", "-c", "true || echo skipped"], "");
    assert_eq!(stdout(&out), "");
    assert!(stderr(&out).contains("trace: stage 1: Skip, status 0"));
}

#[test]
fn malformed_config_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "trace = maybe").unwrap();
    let out = Command::new(env!("CARGO_BIN_EXE_pipesh"))
        .arg("--config")
        .arg(&config)
        .args(["-c", "echo ok"])
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(stdout(&out), "ok\n");
    assert!(stderr(&out).starts_with("pipesh: malformed config"));
}
