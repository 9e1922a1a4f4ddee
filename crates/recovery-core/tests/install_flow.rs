//! Installing real signed packages through `InstallSession`.

mod common;

use std::path::Path;

use common::{Recorder, TRUSTED, UNTRUSTED, write_keys, write_package};
use recovery_core::firmware::{IMAGE_FILE, METADATA_FILE, PendingFirmware};
use recovery_core::installer::script::{ScriptEngine, ScriptEnv, ScriptError, ScriptHalt, ScriptProgram};
use recovery_core::{DirRoots, FirmwareStore, InstallSession, InstallStatus, RecoveryConfig, UnsupportedScriptEngine};
use recovery_schema::{UPDATE_BINARY_ENTRY, UPDATE_SCRIPT_ENTRY};
use tempfile::TempDir;

/// A sandboxed recovery filesystem with trusted keys installed.
struct TestContext {
    _dir: TempDir,
    config: RecoveryConfig,
    roots: DirRoots,
    firmware: FirmwareStore,
    reporter: Recorder,
}

impl TestContext {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = RecoveryConfig::under(dir.path());
        for root in config.roots.values() {
            std::fs::create_dir_all(root).unwrap();
        }
        write_keys(&config.keys, &[TRUSTED]);
        let roots = DirRoots::new(config.roots.clone());
        let firmware = FirmwareStore::new(dir.path().join("cache/recovery/firmware"));
        Self {
            _dir: dir,
            config,
            roots,
            firmware,
            reporter: Recorder::default(),
        }
    }

    fn sdcard(&self, name: &str) -> std::path::PathBuf {
        self.config.roots["SDCARD"].join(name)
    }

    fn install_with(&mut self, engine: &dyn ScriptEngine, root_path: &str) -> InstallStatus {
        let mut session = InstallSession {
            config: &self.config,
            roots: &self.roots,
            reporter: &self.reporter,
            script_engine: engine,
            firmware: &mut self.firmware,
        };
        session.install_package(root_path)
    }

    fn install(&mut self, root_path: &str) -> InstallStatus {
        self.install_with(&UnsupportedScriptEngine, root_path)
    }
}

/// Toy script language: every line is a command, `abort` fails.
struct LineEngine;

struct LineProgram(Vec<String>);

impl ScriptEngine for LineEngine {
    fn parse(&self, source: &str) -> Result<Box<dyn ScriptProgram>, ScriptError> {
        if source.contains("{{") {
            return Err(ScriptError::Syntax {
                line: 1,
                message: "unbalanced braces".into(),
            });
        }
        Ok(Box::new(LineProgram(source.lines().map(str::to_string).collect())))
    }
}

impl ScriptProgram for LineProgram {
    fn execute(&self, env: &mut ScriptEnv<'_>) -> Result<(), ScriptHalt> {
        for (i, line) in self.0.iter().enumerate() {
            match line.split_once(' ') {
                Some(("print", text)) => env.reporter.print(text),
                Some(("read", path)) => {
                    env.read_package_file(path).map_err(|_| ScriptHalt { line: i + 1 })?;
                }
                _ if line == "abort" => return Err(ScriptHalt { line: i + 1 }),
                _ => {}
            }
        }
        Ok(())
    }
}

#[test]
fn package_without_installer_is_corrupt() {
    let mut ctx = TestContext::new();
    write_package(&ctx.sdcard("update.zip"), &[], TRUSTED);
    assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Corrupt);
    let printed = ctx.reporter.printed();
    assert!(printed.starts_with("Preparing to install...\nOpening update package..."));
    assert!(printed.contains("Can't find update script"));
}

#[test]
fn foreign_signature_is_corrupt() {
    let mut ctx = TestContext::new();
    write_package(
        &ctx.sdcard("update.zip"),
        &[(UPDATE_SCRIPT_ENTRY, b"print hi\n")],
        UNTRUSTED,
    );
    assert_eq!(
        ctx.install_with(&LineEngine, "SDCARD:update.zip"),
        InstallStatus::Corrupt
    );
    assert!(!ctx.reporter.lines.lock().unwrap().iter().any(|l| l == "hi"));
}

#[test]
fn unsigned_archive_is_corrupt() {
    let mut ctx = TestContext::new();
    std::fs::write(
        ctx.sdcard("update.zip"),
        common::zip_bytes(&[(UPDATE_SCRIPT_ENTRY, b"print hi\n")]),
    )
    .unwrap();
    assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Corrupt);
}

#[test]
fn missing_package_is_corrupt() {
    let mut ctx = TestContext::new();
    assert_eq!(ctx.install("SDCARD:nothing.zip"), InstallStatus::Corrupt);
}

#[test]
fn script_halt_names_failing_line() {
    let mut ctx = TestContext::new();
    write_package(
        &ctx.sdcard("update.zip"),
        &[(UPDATE_SCRIPT_ENTRY, b"print one\nprint two\nabort\nprint four\n")],
        TRUSTED,
    );
    assert_eq!(
        ctx.install_with(&LineEngine, "SDCARD:update.zip"),
        InstallStatus::Error
    );
    let printed = ctx.reporter.printed();
    assert!(printed.contains("one\ntwo"));
    assert!(printed.contains("Failure at line 3:\nabort"));
    assert!(!printed.contains("four"));
}

#[test]
fn script_success_and_package_root() {
    let mut ctx = TestContext::new();
    write_package(
        &ctx.sdcard("update.zip"),
        &[
            (UPDATE_SCRIPT_ENTRY, b"read PACKAGE:system/build.prop\nprint ok\n"),
            ("system/build.prop", b"ro.build.id=1"),
        ],
        TRUSTED,
    );
    assert_eq!(
        ctx.install_with(&LineEngine, "SDCARD:update.zip"),
        InstallStatus::Success
    );
    assert!(ctx.reporter.printed().ends_with("ok"));
}

#[test]
fn script_problems_are_errors() {
    let mut ctx = TestContext::new();
    write_package(
        &ctx.sdcard("empty.zip"),
        &[(UPDATE_SCRIPT_ENTRY, b"")],
        TRUSTED,
    );
    assert_eq!(
        ctx.install_with(&LineEngine, "SDCARD:empty.zip"),
        InstallStatus::Error
    );

    write_package(
        &ctx.sdcard("syntax.zip"),
        &[(UPDATE_SCRIPT_ENTRY, b"{{\n")],
        TRUSTED,
    );
    assert_eq!(
        ctx.install_with(&LineEngine, "SDCARD:syntax.zip"),
        InstallStatus::Error
    );

    write_package(
        &ctx.sdcard("plain.zip"),
        &[(UPDATE_SCRIPT_ENTRY, b"print hi\n")],
        TRUSTED,
    );
    assert_eq!(ctx.install("SDCARD:plain.zip"), InstallStatus::Error);
}

#[cfg(target_os = "linux")]
mod update_binary {
    use super::*;

    fn shell(body: &str) -> Vec<u8> {
        format!("#!/bin/sh\nout=/proc/self/fd/$2\n{body}\n").into_bytes()
    }

    fn write_binary_package(ctx: &TestContext, body: &str, extra: &[(&str, &[u8])]) {
        let binary = shell(body);
        let mut entries: Vec<(&str, &[u8])> = vec![(UPDATE_BINARY_ENTRY, binary.as_slice())];
        entries.extend_from_slice(extra);
        write_package(&ctx.sdcard("update.zip"), &entries, TRUSTED);
    }

    #[test]
    fn clean_exit_is_success() {
        let mut ctx = TestContext::new();
        write_binary_package(
            &ctx,
            r#"[ "$1" = 2 ] || exit 7
[ -f "$3" ] || exit 8
echo "ui_print hello from $1" > $out
echo "progress 0.5 10" > $out
echo "set_progress 0.3" > $out
echo "bogus line" > $out
exit 0"#,
            &[],
        );
        assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Success);
        assert!(ctx.reporter.printed().contains("hello from 2"));
        let progress = ctx.reporter.progress.lock().unwrap().clone();
        assert_eq!(progress, vec![(0.25, 60), (0.375, 10)]);
        assert!(!ctx.firmware.is_pending());
    }

    #[test]
    fn output_larger_than_pipe_buffer_is_drained() {
        let mut ctx = TestContext::new();
        write_binary_package(
            &ctx,
            r#"i=0
while [ $i -lt 3000 ]; do
    echo "ui_print line $i of a chatty installer, padded well past forty bytes"
    i=$((i+1))
done > $out
echo "ui_print all done" > $out
exit 0"#,
            &[],
        );
        assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Success);
        let lines = ctx.reporter.lines.lock().unwrap();
        assert!(lines.iter().any(|l| l.starts_with("line 2999 ")));
        assert_eq!(lines.iter().filter(|l| l.starts_with("line ")).count(), 3000);
        assert!(lines.iter().any(|l| l == "all done"));
    }

    #[test]
    fn nonzero_exit_is_error() {
        let mut ctx = TestContext::new();
        write_binary_package(&ctx, "echo 'ui_print about to fail' > $out\nexit 3", &[]);
        assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Error);
        let printed = ctx.reporter.printed();
        assert!(printed.contains("about to fail"));
        assert!(printed.contains("Update binary failed"));
    }

    #[test]
    fn signal_death_is_error() {
        let mut ctx = TestContext::new();
        write_binary_package(&ctx, "kill -9 $$", &[]);
        assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Error);
    }

    #[test]
    fn binary_failure_does_not_fall_back_to_script() {
        let mut ctx = TestContext::new();
        write_binary_package(&ctx, "exit 1", &[(UPDATE_SCRIPT_ENTRY, b"print fallback\n")]);
        assert_eq!(
            ctx.install_with(&LineEngine, "SDCARD:update.zip"),
            InstallStatus::Error
        );
        assert!(!ctx.reporter.printed().contains("fallback"));
    }

    #[test]
    fn firmware_from_package_is_staged() {
        let mut ctx = TestContext::new();
        write_binary_package(
            &ctx,
            "echo 'firmware radio PACKAGE:radio.img' > $out\necho 'firmware hboot PACKAGE:radio.img' > $out",
            &[("radio.img", b"RADIO-IMAGE")],
        );
        assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Success);

        let pending = ctx.firmware.pending().unwrap().clone();
        assert_eq!(pending.kind, "radio");
        assert_eq!(pending.size, 11);

        let dir = ctx.firmware.dir();
        assert_eq!(std::fs::read(dir.join(IMAGE_FILE)).unwrap(), b"RADIO-IMAGE");
        let meta: PendingFirmware =
            serde_json::from_slice(&std::fs::read(dir.join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(meta, pending);
    }

    #[test]
    fn firmware_from_file_is_staged() {
        let mut ctx = TestContext::new();
        let image = ctx.config.tmp_dir.join("hboot.img");
        std::fs::write(&image, b"HBOOT").unwrap();
        write_binary_package(
            &ctx,
            &format!("echo 'firmware hboot {}' > $out", image.display()),
            &[],
        );
        assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Success);
        assert_eq!(ctx.firmware.pending().unwrap().kind, "hboot");
    }

    #[test]
    fn missing_firmware_entry_is_error() {
        let mut ctx = TestContext::new();
        write_binary_package(&ctx, "echo 'firmware radio PACKAGE:radio.img' > $out", &[]);
        assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Error);
        assert!(!ctx.firmware.is_pending());
    }

    #[test]
    fn unwritable_firmware_dir_is_error() {
        let mut ctx = TestContext::new();
        let blocker = ctx.config.tmp_dir.join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        ctx.firmware = FirmwareStore::new(blocker.join("firmware"));
        write_binary_package(
            &ctx,
            "echo 'firmware radio PACKAGE:radio.img' > $out",
            &[("radio.img", b"RADIO")],
        );
        assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Error);
        assert!(!ctx.firmware.is_pending());
    }

    #[test]
    fn firmware_is_ignored_when_binary_fails() {
        let mut ctx = TestContext::new();
        write_binary_package(
            &ctx,
            "echo 'firmware radio PACKAGE:radio.img' > $out\nexit 1",
            &[("radio.img", b"RADIO")],
        );
        assert_eq!(ctx.install("SDCARD:update.zip"), InstallStatus::Error);
        assert!(!ctx.firmware.is_pending());
        assert!(!Path::new(&ctx.firmware.dir().join(IMAGE_FILE)).exists());
    }
}
