use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Stand-in for apache2ctl answering the queries vhostctl makes
const FAKE_CTL: &str = r#"#!/bin/sh
case "$*" in
  "-v") echo "Server version: Apache/2.4.41 (Unix)" ;;
  "-t -D DUMP_RUN_CFG") echo "Define: DUMP_RUN_CFG" ;;
  "-t -D DUMP_INCLUDES") echo "Included configuration files:" ;;
  "-t -D DUMP_MODULES") printf "Loaded Modules:\n core_module (static)\n ssl_module (shared)\n" ;;
  "-t") echo "Syntax OK" ;;
  *) exit 0 ;;
esac
"#;

struct TestServer {
    _dir: TempDir,
    root: PathBuf,
    options: PathBuf,
}

impl TestServer {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        let root = base.join("apache2");

        fs::create_dir_all(root.join("sites-enabled")).unwrap();
        fs::write(
            root.join("apache2.conf"),
            "Include ports.conf\nIncludeOptional sites-enabled/*.conf\n",
        )
        .unwrap();
        fs::write(root.join("ports.conf"), "Listen 80\n").unwrap();
        fs::write(
            root.join("sites-enabled/example.com.conf"),
            "<VirtualHost *:80>\n    ServerName example.com\n    DocumentRoot /var/www/html\n</VirtualHost>\n",
        )
        .unwrap();

        let ctl = base.join("apache2ctl");
        write_script(&ctl, FAKE_CTL);
        let ensite = base.join("a2ensite");
        write_script(&ensite, "#!/bin/sh\nexit 0\n");

        let options = base.join("vhostctl.toml");
        fs::write(
            &options,
            format!(
                "server_root = \"{}\"\nctl = \"{}\"\nensite = \"{}\"\ndissite = \"{}\"\n",
                root.display(),
                ctl.display(),
                ensite.display(),
                ensite.display()
            ),
        )
        .unwrap();

        Self {
            _dir: dir,
            root,
            options,
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_vhostctl"))
            .arg("--config")
            .arg(&self.options)
            .args(args)
            .env("RUST_LOG", "warn")
            .output()
            .expect("Failed to run vhostctl")
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_vhosts_json() {
    let server = TestServer::new();
    let output = server.run(&["vhosts", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let vhosts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(vhosts.as_array().unwrap().len(), 1);
    assert_eq!(vhosts[0]["server_name"], "example.com");
    assert_eq!(vhosts[0]["doc_root"], "/var/www/html");
}

#[test]
fn test_listen_commits() {
    let server = TestServer::new();
    let output = server.run(&["listen", "--port", "8080"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let ports = fs::read_to_string(server.root.join("ports.conf")).unwrap();
    assert!(ports.contains("Listen 8080"));
    assert!(!server.root.join("ports.conf.back").exists());
}

#[test]
fn test_deploy() {
    let server = TestServer::new();
    let output = server.run(&[
        "deploy",
        "--domain",
        "example.com",
        "--key",
        "/etc/ssl/example.key",
        "--fullchain",
        "/etc/ssl/example.pem",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let ssl = fs::read_to_string(server.root.join("sites-enabled/example.com-ssl.conf")).unwrap();
    assert!(ssl.contains("SSLCertificateFile /etc/ssl/example.pem"));
    assert!(ssl.contains("SSLCertificateKeyFile /etc/ssl/example.key"));
}

#[test]
fn test_failed_deploy_rolls_back() {
    let server = TestServer::new();
    let output = server.run(&["deploy", "--domain", "example.com", "--key", "/etc/ssl/example.key"]);
    assert!(!output.status.success());
    assert!(!server.root.join("sites-enabled/example.com-ssl.conf").exists());
}

#[test]
fn test_unknown_domain() {
    let server = TestServer::new();
    let output = server.run(&["enable", "--domain", "nowhere.test"]);
    assert!(!output.status.success());
}
