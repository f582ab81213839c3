//! Integration tests for getproxy

mod cli_tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn getproxy() -> Command {
        let mut cmd = Command::cargo_bin("getproxy").unwrap();
        cmd.env_remove("GETPROXY_CONFIG").env_remove("GETPROXY_LISTEN");
        cmd
    }

    /// Config whose retriever is a shell script writing one source file
    fn write_config(dir: &Path, script: &str) -> std::path::PathBuf {
        let path = dir.join("config.toml");
        let config = format!(
            "[cache]\nworkspace = {:?}\n\n[retriever]\nprogram = \"sh\"\nargs = [\"-c\", {:?}]\n",
            dir.join("ws").display().to_string(),
            script
        );
        std::fs::write(&path, config).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        getproxy()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("caching package proxy"));
    }

    #[test]
    fn version_displays() {
        getproxy()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("getproxy"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        getproxy()
            .args(["--config", path.to_str().unwrap(), "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        getproxy()
            .args(["--config", temp.path().join("none.toml").to_str().unwrap(), "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[retriever]"))
            .stdout(predicate::str::contains("freshness_secs = 60"));
    }

    #[test]
    fn invalid_listen_spec_is_fatal() {
        let temp = TempDir::new().unwrap();
        getproxy()
            .args(["--config", temp.path().join("none.toml").to_str().unwrap()])
            .args(["serve", "--listen", "not-a-port", "--workspace"])
            .arg(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid listen address"));
    }

    #[test]
    fn missing_inherited_socket_is_fatal() {
        let temp = TempDir::new().unwrap();
        getproxy()
            .args(["--config", temp.path().join("none.toml").to_str().unwrap()])
            .args(["serve", "--listen", "envfd:web", "--workspace"])
            .arg(temp.path())
            .env_remove("RUNSIT_PORTFD_web")
            .assert()
            .failure()
            .stderr(predicate::str::contains("RUNSIT_PORTFD_web"));
    }

    #[test]
    fn missing_workspace_is_fatal() {
        let temp = TempDir::new().unwrap();
        getproxy()
            .args(["--config", temp.path().join("none.toml").to_str().unwrap()])
            .args(["fetch", "example.com/pkg", "-o"])
            .arg(temp.path().join("out.tar.gz"))
            .env_remove("GOPATH")
            .assert()
            .failure()
            .stderr(predicate::str::contains("GOPATH"));
    }

    #[cfg(unix)]
    #[test]
    fn fetch_writes_archive() {
        let temp = TempDir::new().unwrap();
        let config = write_config(
            temp.path(),
            "mkdir -p \"$GOPATH/src/$0\" && printf 'package demo\\n' > \"$GOPATH/src/$0/demo.go\"",
        );
        let output = temp.path().join("demo.tar.gz");

        getproxy()
            .args(["--config", config.to_str().unwrap()])
            .args(["fetch", "example.com/demo", "-o"])
            .arg(&output)
            .assert()
            .success()
            .stdout(predicate::str::contains("Archive written"));

        assert!(temp.path().join("ws/src/example.com/demo/demo.go").exists());
        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    #[cfg(unix)]
    #[test]
    fn fetch_reports_retriever_output() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "echo \"no such package $0\"; exit 1");

        getproxy()
            .args(["--config", config.to_str().unwrap()])
            .args(["fetch", "example.com/nope", "-o"])
            .arg(temp.path().join("nope.tar.gz"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("no such package example.com/nope"));
    }

    #[test]
    fn fetch_rejects_unclean_key() {
        let temp = TempDir::new().unwrap();
        getproxy()
            .args(["--config", temp.path().join("none.toml").to_str().unwrap()])
            .args(["fetch", "example.com/../etc", "-o"])
            .arg(temp.path().join("x.tar.gz"))
            .args(["--workspace"])
            .arg(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid path"));
    }
}
