#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pocforge_engine::{ScanError, ScanLine, ScanRequest, ScanRunner};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-nuclei.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn request(dir: &Path, exe: PathBuf) -> ScanRequest {
    let template = dir.join("CVE-2024-1234.yaml");
    fs::write(&template, "id: CVE-2024-1234\n").unwrap();
    ScanRequest {
        exe: exe.to_string_lossy().into_owned(),
        ..ScanRequest::new(template, "http://10.0.0.5")
    }
}

async fn run(request: &ScanRequest) -> (Result<(), ScanError>, Vec<ScanLine>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = ScanRunner::default().run(request, tx).await;
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    (result, lines)
}

#[tokio::test]
async fn output_streams_are_forwarded() {
    let temp = TempDir::new().unwrap();
    let exe = script(temp.path(), r#"echo "args: $*"; echo "warn" >&2"#);
    let mut request = request(temp.path(), exe);
    request.no_color = true;

    let (result, lines) = run(&request).await;
    result.unwrap();
    let template = temp.path().join("CVE-2024-1234.yaml");
    assert!(lines.contains(&ScanLine::Stdout(format!(
        "args: -t {} -u http://10.0.0.5 -no-color",
        template.display()
    ))));
    assert!(lines.contains(&ScanLine::Stderr("warn".to_string())));
}

#[tokio::test]
async fn non_zero_exit_is_a_failure() {
    let temp = TempDir::new().unwrap();
    let exe = script(temp.path(), "echo partial; exit 3");
    let (result, lines) = run(&request(temp.path(), exe)).await;
    assert!(matches!(
        result,
        Err(ScanError::ExecutionFailed { code: Some(3) })
    ));
    assert_eq!(lines, [ScanLine::Stdout("partial".to_string())]);
}

#[tokio::test]
async fn missing_template_is_reported_before_spawning() {
    let temp = TempDir::new().unwrap();
    let request = ScanRequest::new(temp.path().join("absent.yaml"), "http://10.0.0.5");
    let (result, _) = run(&request).await;
    assert!(matches!(result, Err(ScanError::MissingTemplate(_))));
}

#[tokio::test]
async fn unknown_scanner_cannot_spawn() {
    let temp = TempDir::new().unwrap();
    let mut request = request(temp.path(), temp.path().join("no-such-scanner"));
    request.verbose = true;
    let (result, _) = run(&request).await;
    assert!(matches!(result, Err(ScanError::Spawn { .. })));
}
