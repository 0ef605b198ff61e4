//! Integration tests for the clientlib CLI

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::io::Read;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Library with one js and one css clientlib plus a config pointing at it
    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new(gzip_enabled: bool) -> Self {
            let dir = TempDir::new().unwrap();
            let library = dir.path().join("library");
            fs::create_dir_all(library.join("libs/app")).unwrap();
            fs::write(library.join("libs/app/a.js"), "var a = 1").unwrap();
            fs::write(library.join("libs/app/b.js"), "function b() {}").unwrap();
            fs::write(library.join("libs/site.css"), "body { margin: 0 }").unwrap();

            let config = format!(
                "[library]\nroot = {:?}\nurl_prefix = \"/static\"\n\n\
                 [cache]\ngzip_enabled = {}\ndir = {:?}\n",
                library.display().to_string(),
                gzip_enabled,
                dir.path().join("cache").display().to_string(),
            );
            fs::write(dir.path().join("config.toml"), config).unwrap();

            Self { dir }
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join("config.toml")
        }

        fn cache_dir(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        fn cmd(&self) -> Command {
            let mut cmd = clientlib();
            cmd.arg("--config").arg(self.config_path());
            cmd
        }
    }

    fn clientlib() -> Command {
        cargo_bin_cmd!("clientlib")
    }

    fn cached_files(dir: &Path) -> usize {
        fn walk(dir: &Path, count: &mut usize) {
            let Ok(entries) = fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, count);
                } else {
                    *count += 1;
                }
            }
        }
        let mut count = 0;
        walk(dir, &mut count);
        count
    }

    #[test]
    fn help_displays() {
        clientlib()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cached clientlibs"));
    }

    #[test]
    fn version_displays() {
        clientlib()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("clientlib"));
    }

    #[test]
    fn config_path() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let fixture = Fixture::new(true);
        fixture
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("gzip_enabled = true"));
    }

    #[test]
    fn config_init_respects_existing_file() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn config_init_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        clientlib()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("[threadpool]"));
    }

    #[test]
    fn invalid_config_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache\n").unwrap();
        clientlib()
            .arg("--config")
            .arg(&path)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn prepare_prints_cache_key() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["prepare", "libs/app", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::diff("/var/cache/clientlibs/libs/app.js\n"));

        // Content plus its metadata sidecar
        assert_eq!(cached_files(&fixture.cache_dir()), 2);
    }

    #[test]
    fn prepare_json_reports_hints() {
        let fixture = Fixture::new(false);
        let output = fixture
            .cmd()
            .args(["prepare", "libs/site", "--type", "css", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let hints: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(hints["key"], "/var/cache/clientlibs/libs/site.css");
        assert_eq!(hints["mime_type"], "text/css");
        assert_eq!(hints["size"], "body { margin: 0 }\n".len());
    }

    #[test]
    fn deliver_streams_bundle() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["deliver", "libs/app"])
            .assert()
            .success()
            .stdout(predicate::str::diff("var a = 1;\nfunction b() {}\n"));
    }

    #[test]
    fn deliver_without_build_is_empty() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["deliver", "libs/app", "--no-build"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn deliver_gzip_to_file() {
        let fixture = Fixture::new(true);
        let out = fixture.dir.path().join("app.js.gz");
        fixture
            .cmd()
            .args(["deliver", "libs/app", "--gzip", "--output"])
            .arg(&out)
            .assert()
            .success();

        let compressed = fs::read(&out).unwrap();
        let mut decoded = String::new();
        flate2::read::GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "var a = 1;\nfunction b() {}\n");
    }

    #[test]
    fn gzip_request_ignored_when_disabled() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["prepare", "libs/app", "--gzip", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::diff("/var/cache/clientlibs/libs/app.js\n"));
    }

    #[test]
    fn encoding_flag_selects_gzip_key() {
        let fixture = Fixture::new(true);
        fixture
            .cmd()
            .args(["prepare", "libs/app", "-e", "gzip", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::diff("/var/cache/clientlibs/libs/app.js.gzip\n"));
    }

    #[test]
    fn unknown_type_rejected() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["prepare", "libs/app", "--type", "png"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown clientlib type: png"));
    }

    #[test]
    fn corrupt_metadata_is_rebuilt() {
        let fixture = Fixture::new(false);
        fixture.cmd().args(["prepare", "libs/app"]).assert().success();

        let meta = fixture
            .cache_dir()
            .join("var/cache/clientlibs/libs/app.js.meta.json");
        fs::write(&meta, "{ nope").unwrap();

        fixture
            .cmd()
            .args(["deliver", "libs/app"])
            .assert()
            .success()
            .stdout(predicate::str::diff("var a = 1;\nfunction b() {}\n"));
    }

    #[test]
    fn reset_removes_entry() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["prepare", "libs/app"])
            .assert()
            .success();

        fixture
            .cmd()
            .args(["reset", "libs/app"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed"));
        assert_eq!(cached_files(&fixture.cache_dir()), 0);

        fixture
            .cmd()
            .args(["reset", "libs/app"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing cached"));
    }

    #[test]
    fn links_renders_tag() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["links", "libs/site", "-t", "css", "-a", "media=print"])
            .assert()
            .success()
            .stdout(predicate::str::contains("/static/libs/site.css"))
            .stdout(predicate::str::contains("media=\"print\""));
    }

    #[test]
    fn missing_clientlib_fails() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["prepare", "libs/missing"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Clientlib not found"));
    }

    #[test]
    fn link_clientlib_is_not_preparable() {
        let fixture = Fixture::new(false);
        fixture
            .cmd()
            .args(["prepare", "libs/site.css", "--type", "link"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no content processor"));
    }
}
