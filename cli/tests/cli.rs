use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::thread;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn ctxpack() -> Command {
    let mut cmd = Command::cargo_bin("ctxpack").unwrap();
    cmd.env_remove("GITHUB_TOKEN");
    for var in ["HTTP_PROXY", "HTTPS_PROXY", "ALL_PROXY"] {
        cmd.env_remove(var).env_remove(var.to_lowercase());
    }
    cmd.env("NO_PROXY", "*");
    cmd
}

fn zipball(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Answers `requests` connections; paths containing a key of `routes` get
/// that archive with 200, anything else gets 404.
fn serve_archives(
    requests: usize,
    routes: Vec<(&'static str, Vec<u8>)>,
) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..requests {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 8192];
            let n = stream.read(&mut buf).unwrap();
            let request_line = String::from_utf8_lossy(&buf[..n])
                .lines()
                .next()
                .unwrap_or_default()
                .to_string();
            let route = routes.iter().find(|(key, _)| request_line.contains(*key));
            let (status, body) = match route {
                Some((_, archive)) => ("200 OK", archive.clone()),
                None => ("404 Not Found", Vec::new()),
            };
            let mut response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            )
            .into_bytes();
            response.extend_from_slice(&body);
            stream.write_all(&response).unwrap();
            stream.flush().unwrap();
            seen.push(request_line);
        }
        seen
    });
    (format!("http://{}", addr), handle)
}

fn batch_config(dir: &std::path::Path, api_base: &str) {
    fs::write(
        dir.join("ctxpack.toml"),
        format!(
            "[remote]\napi_base = \"{api_base}\"\n\n\
             [[repositories]]\nowner = \"acme\"\nrepo = \"missing\"\n\n\
             [[repositories]]\nowner = \"acme\"\nrepo = \"widgets\"\n"
        ),
    )
    .unwrap();
}

#[test]
fn no_target_prints_usage_and_succeeds() {
    ctxpack()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn local_mode_packages_current_directory() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src/__pycache__")).unwrap();
    fs::write(temp.path().join("src/main.py"), "print(\"a ]]> b\")\n").unwrap();
    fs::write(temp.path().join("src/__pycache__/x.pyc"), "junk").unwrap();
    fs::write(temp.path().join("README.md"), "# readme\n").unwrap();

    ctxpack()
        .current_dir(temp.path())
        .args([".", "--no-config"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("<?xml"))
        .stdout(predicate::str::contains(r#"<file name="main.py" path="src/main.py"/>"#))
        .stdout(predicate::str::contains(r#"<file path="README.md"><![CDATA[# readme"#))
        .stdout(predicate::str::contains("]]]]><![CDATA[>"))
        .stdout(predicate::str::contains("__pycache__").not());
}

#[test]
fn project_name_comes_from_config() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("app.py"), "pass\n").unwrap();
    fs::write(
        temp.path().join("ctxpack.toml"),
        "[general]\nproject_name = \"Kramer\"\n\n[output]\nindent = 4\n",
    )
    .unwrap();

    ctxpack()
        .current_dir(temp.path())
        .arg(".")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"<project name="Kramer">"#))
        .stdout(predicate::str::contains("\n    <directory_tree>"));
}

#[test]
fn malformed_config_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("ctxpack.toml"), "[remote]\nextensions = 3\n").unwrap();

    ctxpack()
        .current_dir(temp.path())
        .arg(".")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn invalid_repository_url_fails() {
    let temp = TempDir::new().unwrap();
    ctxpack()
        .current_dir(temp.path())
        .args(["--no-config", "not-a-url"])
        .assert()
        .code(5)
        .stdout(predicate::str::is_empty());
}

#[test]
fn batch_without_repositories_fails() {
    let temp = TempDir::new().unwrap();
    ctxpack()
        .current_dir(temp.path())
        .args(["--no-config", "--batch"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("[[repositories]]"));
}

#[test]
fn unreachable_api_is_reported() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("ctxpack.toml"),
        "[remote]\napi_base = \"http://127.0.0.1:9\"\n",
    )
    .unwrap();

    ctxpack()
        .current_dir(temp.path())
        .env("NO_PROXY", "*")
        .arg("https://github.com/acme/widgets")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn batch_continues_past_a_failed_repository() {
    let archive = zipball(&[
        ("acme-widgets-1a2b/app.py", "print('widgets')"),
        ("acme-widgets-1a2b/README.md", "# skipped"),
    ]);
    let (base, server) = serve_archives(2, vec![("/repos/acme/widgets/", archive)]);
    let temp = TempDir::new().unwrap();
    batch_config(temp.path(), &base);

    ctxpack()
        .current_dir(temp.path())
        .arg("--batch")
        .assert()
        .success()
        .stdout(predicate::str::contains("Content of acme-widgets-1a2b/app.py:"))
        .stdout(predicate::str::contains("print('widgets')"))
        .stdout(predicate::str::contains("README.md").not())
        .stderr(predicate::str::contains("acme/missing@main"));

    let requests = server.join().unwrap();
    assert!(requests[0].starts_with("GET /repos/acme/missing/zipball/main "));
    assert!(requests[1].starts_with("GET /repos/acme/widgets/zipball/main "));
}

#[test]
fn batch_fails_when_every_repository_fails() {
    let (base, server) = serve_archives(2, Vec::new());
    let temp = TempDir::new().unwrap();
    batch_config(temp.path(), &base);

    ctxpack()
        .current_dir(temp.path())
        .arg("--batch")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("All 2 repositories failed"));

    assert_eq!(server.join().unwrap().len(), 2);
}
