#![cfg(unix)]
//! Integration tests for the stowaway shim
//!
//! Each test copies the built shim under the wrapped tool's name into a
//! private shim directory and runs it against a fake fallback script, with a
//! scrubbed environment so host settings cannot leak in.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

const TOOL: &str = "pkgtool";
const INSTALL: [&str; 4] = ["add", "--force", "--exact", "targetpkg@latest"];
const PAYLOAD: &str = "export const provider = 'offline';\n";

fn shim_binary_path() -> String {
    if let Some(bin) = option_env!("CARGO_BIN_EXE_stowaway_shim_test_bin") {
        return bin.to_string();
    }
    std::env::var("CARGO_BIN_EXE_stowaway_shim_test_bin")
        .unwrap_or_else(|_| "../../target/debug/stowaway_shim_test_bin".to_string())
}

fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

struct ShimFixture {
    temp: TempDir,
    shim: PathBuf,
    shim_dir: PathBuf,
    bin_dir: PathBuf,
    home: PathBuf,
    payload: PathBuf,
}

impl ShimFixture {
    fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let shim_dir = temp.path().join("shims");
        let bin_dir = temp.path().join("bin");
        let home = temp.path().join("stowaway-home");
        fs::create_dir_all(&shim_dir)?;
        fs::create_dir_all(&bin_dir)?;

        // Fake real tool: echoes its arguments, optionally drops a marker,
        // exits with $FALLBACK_EXIT.
        let real = bin_dir.join(TOOL);
        fs::write(
            &real,
            "#!/bin/sh\necho \"fallback: $*\"\nif [ -n \"$FALLBACK_MARKER\" ]; then echo ran > \"$FALLBACK_MARKER\"; fi\nexit ${FALLBACK_EXIT:-0}\n",
        )?;
        make_executable(&real)?;

        let shim = shim_dir.join(TOOL);
        fs::copy(shim_binary_path(), &shim)?;
        make_executable(&shim)?;

        let payload = temp.path().join("provider-bundle.js");
        fs::write(&payload, PAYLOAD)?;

        Ok(Self {
            temp,
            shim,
            shim_dir,
            bin_dir,
            home,
            payload,
        })
    }

    fn marker(&self) -> PathBuf {
        self.temp.path().join("fallback-ran")
    }

    fn entry_dir(&self) -> PathBuf {
        self.home.join("cache").join("targetpkg")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.shim);
        cmd.env_clear()
            .env(
                "PATH",
                format!(
                    "{}:{}:/usr/bin:/bin",
                    self.shim_dir.display(),
                    self.bin_dir.display()
                ),
            )
            .env("HOME", self.temp.path())
            .env("STOWAWAY_HOME", &self.home)
            .env("STOWAWAY_PACKAGE", "targetpkg")
            .env("STOWAWAY_PAYLOAD", &self.payload)
            .env("FALLBACK_MARKER", self.marker());
        cmd
    }
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

#[test]
fn install_against_empty_cache_populates_entry() -> Result<()> {
    let fx = ShimFixture::new()?;

    fx.command()
        .args(INSTALL)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("offline mode"));

    assert!(!fx.marker().exists(), "fallback must not run on interception");

    let mut names: Vec<String> = fs::read_dir(fx.entry_dir())?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    names.sort();
    assert_eq!(names, vec!["index.js", "package.json"]);

    assert_eq!(fs::read_to_string(fx.entry_dir().join("index.js"))?, PAYLOAD);
    let descriptor: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(fx.entry_dir().join("package.json"))?)?;
    assert_eq!(descriptor["name"], "targetpkg");
    assert_eq!(descriptor["version"], "0.0.0-local");
    assert_eq!(descriptor["main"], "index.js");
    assert_eq!(descriptor["type"], "module");

    Ok(())
}

#[test]
fn repeated_install_performs_no_writes() -> Result<()> {
    let fx = ShimFixture::new()?;
    fx.command().args(INSTALL).assert().success();

    let payload_path = fx.entry_dir().join("index.js");
    let descriptor_path = fx.entry_dir().join("package.json");
    let before = (mtime(&payload_path), mtime(&descriptor_path));

    // A changed source must not leak into an existing entry
    std::thread::sleep(std::time::Duration::from_millis(20));
    fs::write(&fx.payload, "changed")?;

    for _ in 0..3 {
        fx.command()
            .args(INSTALL)
            .assert()
            .success()
            .stderr(predicate::str::contains("offline mode"));
    }

    assert_eq!((mtime(&payload_path), mtime(&descriptor_path)), before);
    assert_eq!(fs::read_to_string(&payload_path)?, PAYLOAD);
    assert_eq!(fs::read_dir(fx.entry_dir())?.count(), 2);
    assert!(!fx.marker().exists());
    Ok(())
}

#[test]
fn unmatched_invocation_is_pure_passthrough() -> Result<()> {
    let fx = ShimFixture::new()?;

    fx.command()
        .arg("list")
        .env("FALLBACK_EXIT", "3")
        .assert()
        .code(3)
        .stdout("fallback: list\n");

    assert!(fx.marker().exists());
    assert!(!fx.home.exists(), "passthrough must not create the cache");
    Ok(())
}

#[test]
fn near_miss_invocations_are_delegated() -> Result<()> {
    let fx = ShimFixture::new()?;

    for args in [
        vec!["add", "--force", "targetpkg@latest"],
        vec!["add", "--force", "--exact", "otherpkg@latest"],
        vec!["install", "--force", "--exact", "targetpkg@latest"],
    ] {
        fx.command()
            .args(&args)
            .assert()
            .success()
            .stdout(predicate::str::starts_with("fallback: "));
    }

    assert!(!fx.home.exists());
    Ok(())
}

#[test]
fn missing_payload_fails_without_partial_entry() -> Result<()> {
    let fx = ShimFixture::new()?;
    let missing = fx.temp.path().join("no-such-bundle.js");

    fx.command()
        .args(INSTALL)
        .env("STOWAWAY_PAYLOAD", &missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains(missing.display().to_string()));

    assert!(!fx.entry_dir().join("package.json").exists());
    assert!(!fx.marker().exists());
    Ok(())
}

#[test]
fn unwritable_cache_root_is_fatal() -> Result<()> {
    let fx = ShimFixture::new()?;
    let blocker = fx.temp.path().join("blocker");
    fs::write(&blocker, "not a directory")?;

    fx.command()
        .args(INSTALL)
        .env("STOWAWAY_CACHE_ROOT", blocker.join("cache"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to create cache directory"));

    assert!(!fx.marker().exists());
    Ok(())
}

#[test]
fn missing_fallback_target_fails() -> Result<()> {
    let fx = ShimFixture::new()?;
    let missing = fx.temp.path().join("not-installed");

    fx.command()
        .arg("list")
        .env("STOWAWAY_FALLBACK", &missing)
        .assert()
        .code(127)
        .stderr(predicate::str::contains("not-installed"));
    Ok(())
}

#[test]
fn fallback_not_on_path_fails() -> Result<()> {
    let fx = ShimFixture::new()?;
    fs::remove_file(fx.bin_dir.join(TOOL))?;

    fx.command()
        .arg("list")
        .env("PATH", format!("{}:{}", fx.shim_dir.display(), fx.bin_dir.display()))
        .assert()
        .code(127)
        .stderr(predicate::str::contains("fallback for 'pkgtool' not found"));
    Ok(())
}

#[test]
fn bypass_always_delegates() -> Result<()> {
    let fx = ShimFixture::new()?;

    fx.command()
        .args(INSTALL)
        .env("SHIM_BYPASS", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("fallback: add --force --exact targetpkg@latest"));

    assert!(fx.marker().exists());
    assert!(!fx.home.exists());
    Ok(())
}

#[test]
fn config_file_drives_positional_matching() -> Result<()> {
    let fx = ShimFixture::new()?;
    fs::create_dir_all(&fx.home)?;
    fs::write(
        fx.home.join("config.yaml"),
        format!(
            "intercept:\n  package: targetpkg\n  match_mode: positional\n  flag_positions: [1, 2]\npayload_source: {}\ndescriptor:\n  version: 9.9.9\n",
            fx.payload.display()
        ),
    )?;

    // Same flags in the wrong slots are not an install under positional mode
    fx.command()
        .args(["add", "--exact", "--force", "targetpkg@latest"])
        .env_remove("STOWAWAY_PACKAGE")
        .env_remove("STOWAWAY_PAYLOAD")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("fallback: "));
    assert!(!fx.entry_dir().exists());

    fx.command()
        .args(INSTALL)
        .env_remove("STOWAWAY_PACKAGE")
        .env_remove("STOWAWAY_PAYLOAD")
        .assert()
        .success()
        .stderr(predicate::str::contains("offline mode"));

    let descriptor: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(fx.entry_dir().join("package.json"))?)?;
    assert_eq!(descriptor["version"], "9.9.9");
    Ok(())
}

#[test]
fn invalid_config_is_reported() -> Result<()> {
    let fx = ShimFixture::new()?;
    fs::create_dir_all(&fx.home)?;
    fs::write(fx.home.join("config.yaml"), "intercept: [unterminated\n")?;

    fx.command()
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid YAML"));
    Ok(())
}

#[test]
fn trace_log_records_both_routes() -> Result<()> {
    let fx = ShimFixture::new()?;
    let log_file = fx.temp.path().join("trace.jsonl");

    fx.command()
        .args(INSTALL)
        .env("SHIM_TRACE_LOG", &log_file)
        .env("SHIM_SESSION_ID", "session-under-test")
        .assert()
        .success();
    fx.command()
        .args(["list", "--token", "hunter2"])
        .env("SHIM_TRACE_LOG", &log_file)
        .env("SHIM_SESSION_ID", "session-under-test")
        .assert()
        .success();

    let content = fs::read_to_string(&log_file)?;
    let entries: Vec<serde_json::Value> = content
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["route"], "intercepted");
    assert_eq!(entries[0]["populated"], true);
    assert_eq!(entries[1]["route"], "delegated");
    assert_eq!(entries[1]["exit_code"], 0);
    assert!(entries
        .iter()
        .all(|e| e["session_id"] == "session-under-test"));
    assert!(!content.contains("hunter2"));
    Ok(())
}

#[test]
fn payload_name_clashing_with_descriptor_is_rejected() -> Result<()> {
    let fx = ShimFixture::new()?;
    fs::create_dir_all(&fx.home)?;
    fs::write(fx.home.join("config.yaml"), "descriptor:\n  main: package.json\n")?;

    fx.command()
        .args(INSTALL)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("descriptor.main"));

    assert!(!fx.entry_dir().exists());
    assert!(!fx.marker().exists());
    Ok(())
}

#[test]
fn unexpandable_payload_path_is_a_config_error() -> Result<()> {
    let fx = ShimFixture::new()?;

    fx.command()
        .args(INSTALL)
        .env("STOWAWAY_PAYLOAD", "$STOWAWAY_UNSET_BUNDLE_DIR/provider.js")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to expand path"));

    assert!(!fx.entry_dir().exists());
    Ok(())
}
