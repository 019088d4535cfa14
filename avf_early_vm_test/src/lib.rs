//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Tests running an early VM on a device attached over `adb`.
//!
//! Each test case asks the device to boot the `rialto` test kernel through the early VM test
//! launcher, either as a protected or as a non-protected VM, and passes if the launcher exits
//! successfully within [`DEFAULT_COMMAND_TIMEOUT`]. The launcher itself lives on the device and
//! is not part of this crate.

use std::{
    io::Write,
    time::{Duration, Instant},
};

use anyhow::Context;
use avf_test_process::{Cmd, CommandRunner, ExecutionResult, ProcessRunner};
use strum::{Display, EnumIter, IntoEnumIterator};

mod config;
pub mod report;

pub use config::{ConfigError, TestConfig, ANDROID_SERIAL};
use report::{CaseReport, Reporter, Status, StatusResultValue};

pub const ADB: &str = "adb";
pub const LAUNCHER_PATH: &str = "/system_ext/bin/avf_early_vm_test_launcher";
pub const RIALTO_PATH: &str = "/system_ext/etc/avf/rialto_test.bin";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
pub const SUITE_NAME: &str = "AvfEarlyVmTest";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum BootMode {
    NonProtected,
    Protected,
}

impl BootMode {
    pub fn is_protected(self) -> bool {
        self == BootMode::Protected
    }

    /// Name of the test case that boots in this mode.
    pub fn test_name(self) -> &'static str {
        match self {
            BootMode::NonProtected => "testAvfEarlyVmNonProtected",
            BootMode::Protected => "testAvfEarlyVmProtected",
        }
    }
}

/// Returns the test cases whose name contains `filter` (all of them if there is no filter), in
/// declaration order.
pub fn select_cases(filter: Option<&str>) -> Vec<BootMode> {
    BootMode::iter()
        .filter(|mode| filter.map_or(true, |filter| mode.test_name().contains(filter)))
        .collect()
}

/// Builds the `adb` invocation that starts the launcher on the device with the given serial.
///
/// The order of the arguments matters to the launcher's own parser; `--protected` is only ever
/// appended last.
pub fn launcher_command(serial: &str, protected: bool) -> Cmd {
    let mut args = vec!["-s", serial, "shell", LAUNCHER_PATH, "--kernel", RIALTO_PATH];
    if protected {
        args.push("--protected");
    }
    Cmd::new(ADB, args)
}

#[derive(thiserror::Error, Debug)]
pub enum TestError {
    /// The launcher ran, but didn't exit successfully: either it failed on its own, or it was
    /// killed after running out of time.
    #[error("{command} failed: {}", .result.stderr)]
    Failed { command: Cmd, result: ExecutionResult },
    /// The launcher couldn't be run at all. Not a test failure; the run can't go on.
    #[error(transparent)]
    Runner(#[from] avf_test_process::Error),
}

impl TestError {
    /// Captured output of the failed command, if it got to run.
    pub fn logs(&self) -> String {
        match self {
            TestError::Failed { result, .. } => result.logs(),
            TestError::Runner(_) => String::new(),
        }
    }
}

/// Fixture shared by the test cases of one run.
pub struct EarlyVmTest<R = ProcessRunner> {
    config: TestConfig,
    runner: R,
    timeout: Duration,
}

impl EarlyVmTest {
    /// Reads the target device from `$ANDROID_SERIAL`, failing before anything is run if it isn't
    /// set.
    pub fn set_up() -> Result<Self, ConfigError> {
        Ok(Self::new(TestConfig::from_env()?, ProcessRunner))
    }
}

impl<R: CommandRunner> EarlyVmTest<R> {
    pub fn new(config: TestConfig, runner: R) -> Self {
        EarlyVmTest { config, runner, timeout: DEFAULT_COMMAND_TIMEOUT }
    }

    /// Like [`EarlyVmTest::set_up`], but reading the configuration through `lookup` and running
    /// commands through `runner`.
    pub fn set_up_with<F>(lookup: F, runner: R) -> Result<Self, ConfigError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        Ok(Self::new(TestConfig::from_lookup(lookup)?, runner))
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// The launcher invocation for this fixture's device.
    pub fn command(&self, protected: bool) -> Cmd {
        launcher_command(self.config.serial(), protected)
    }

    /// Runs the launcher once and returns whatever it left behind, without judging the result.
    pub async fn run_launcher(
        &self,
        protected: bool,
    ) -> Result<ExecutionResult, avf_test_process::Error> {
        self.runner.run(&self.command(protected), self.timeout).await
    }

    /// Runs the launcher once and checks that it exited successfully.
    pub async fn test_avf_early_vm(&self, protected: bool) -> Result<ExecutionResult, TestError> {
        let result = self.run_launcher(protected).await?;
        if !result.success() {
            return Err(TestError::Failed { command: self.command(protected), result });
        }
        Ok(result)
    }

    pub async fn test_avf_early_vm_non_protected(&self) -> Result<ExecutionResult, TestError> {
        self.test_avf_early_vm(false).await
    }

    pub async fn test_avf_early_vm_protected(&self) -> Result<ExecutionResult, TestError> {
        self.test_avf_early_vm(true).await
    }

    /// Runs `cases` one after the other, writing their outcome to `reporter`.
    ///
    /// Test failures are recorded in the report; only errors that prevent a case from running at
    /// all are returned.
    pub async fn run_cases<W: Write>(
        &self,
        cases: &[BootMode],
        fail_fast: bool,
        reporter: &mut Reporter<W>,
    ) -> anyhow::Result<()> {
        let mut status = Status::new(cases.len());
        for &mode in cases {
            let name = mode.test_name();
            reporter.start_case(name).context("couldn't write report")?;
            log::info!("[{}] running {}", status, name);

            let start = Instant::now();
            let report = match self.test_avf_early_vm(mode.is_protected()).await {
                Ok(result) => CaseReport::passed(name, result.logs(), start.elapsed()),
                Err(TestError::Runner(err)) => {
                    return Err(err).with_context(|| format!("couldn't run {name}"));
                }
                Err(failure) => {
                    CaseReport::failed(name, failure.to_string(), failure.logs(), start.elapsed())
                }
            };

            let value = report.value;
            status.update(value);
            log::info!("[{}] {} {} {:.0?}", status, name, value, report.elapsed);
            reporter.finish_case(report).context("couldn't write report")?;

            if value == StatusResultValue::Fail && fail_fast {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use avf_test_process::Error;
    use googletest::prelude::*;
    use mockall::mock;

    use super::*;

    // [`CommandRunner`] is an external trait, so it has to be mocked with `mock!` rather than
    // `#[automock]`.
    mock! {
        TestRunner {}
        #[async_trait]
        impl CommandRunner for TestRunner {
            async fn run(
                &self,
                cmd: &Cmd,
                timeout: Duration,
            ) -> std::result::Result<ExecutionResult, Error>;
        }
    }

    const SERIAL: &str = "0123456789ABCDEF";

    fn config() -> TestConfig {
        TestConfig::new(SERIAL).expect("couldn't build config")
    }

    fn exited(returncode: i32, stderr: &str) -> ExecutionResult {
        ExecutionResult { stdout: String::new(), stderr: stderr.to_string(), returncode }
    }

    fn runner_returning(returncode: i32, stderr: &'static str) -> MockTestRunner {
        let mut runner = MockTestRunner::new();
        runner.expect_run().times(1).returning(move |_, _| Ok(exited(returncode, stderr)));
        runner
    }

    #[googletest::gtest]
    fn non_protected_command() {
        let cmd = launcher_command(SERIAL, false);

        assert_eq!(
            cmd.argv(),
            vec![
                "adb",
                "-s",
                SERIAL,
                "shell",
                "/system_ext/bin/avf_early_vm_test_launcher",
                "--kernel",
                "/system_ext/etc/avf/rialto_test.bin",
            ]
        );
        expect_that!(cmd.args().iter().any(|arg| arg == "--protected"), eq(false));
    }

    #[googletest::gtest]
    fn protected_command() {
        let cmd = launcher_command(SERIAL, true);

        assert_eq!(
            cmd.argv(),
            vec![
                "adb",
                "-s",
                SERIAL,
                "shell",
                "/system_ext/bin/avf_early_vm_test_launcher",
                "--kernel",
                "/system_ext/etc/avf/rialto_test.bin",
                "--protected",
            ]
        );
        expect_that!(cmd.args().last().map(String::as_str), eq(Some("--protected")));
    }

    #[googletest::gtest]
    fn boot_modes() {
        expect_that!(BootMode::Protected.is_protected(), eq(true));
        expect_that!(BootMode::NonProtected.to_string(), eq("NonProtected"));
        assert_eq!(select_cases(None), vec![BootMode::NonProtected, BootMode::Protected]);
        assert_eq!(select_cases(Some("NonProtected")), vec![BootMode::NonProtected]);
        assert_eq!(select_cases(Some("VmProtected")), vec![BootMode::Protected]);
        assert_eq!(select_cases(Some("nothing")), vec![]);
    }

    #[googletest::gtest]
    fn missing_serial_fails_before_spawning() {
        let mut runner = MockTestRunner::new();
        runner.expect_run().never();

        let result = EarlyVmTest::set_up_with(|_| None, runner);

        assert!(matches!(result, Err(ConfigError::MissingSerial)));
    }

    #[googletest::gtest]
    fn empty_serial_fails_before_spawning() {
        let mut runner = MockTestRunner::new();
        runner.expect_run().never();

        let result = EarlyVmTest::set_up_with(|_| Some(String::new()), runner);

        assert!(matches!(result, Err(ConfigError::MissingSerial)));
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn runs_with_default_timeout() {
        let mut runner = MockTestRunner::new();
        runner
            .expect_run()
            .withf(|cmd, timeout| {
                cmd == &launcher_command(SERIAL, true) && *timeout == DEFAULT_COMMAND_TIMEOUT
            })
            .times(1)
            .returning(|_, _| Ok(exited(0, "")));
        let test = EarlyVmTest::set_up_with(|_| Some(SERIAL.to_string()), runner)
            .expect("couldn't set up test");

        expect_that!(test.config().serial(), eq(SERIAL));
        let result = test.run_launcher(true).await.expect("couldn't run launcher");
        expect_that!(result.returncode, eq(0));
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn passes_on_clean_exit() {
        let test = EarlyVmTest::new(config(), runner_returning(0, ""));

        assert!(test.test_avf_early_vm_non_protected().await.is_ok());
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn assertion_runs_the_launcher_command() {
        let mut runner = MockTestRunner::new();
        runner
            .expect_run()
            .withf(|cmd, timeout| {
                cmd == &launcher_command(SERIAL, false) && *timeout == DEFAULT_COMMAND_TIMEOUT
            })
            .times(1)
            .returning(|_, _| Ok(exited(0, "")));
        let test = EarlyVmTest::new(config(), runner);

        let result = test.test_avf_early_vm(false).await.expect("launcher should have passed");

        expect_that!(result.success(), eq(true));
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn failure_message_has_command_and_stderr() {
        let test = EarlyVmTest::new(config(), runner_returning(1, "boot failed"));

        let message = match test.test_avf_early_vm_protected().await {
            Err(failure @ TestError::Failed { .. }) => failure.to_string(),
            other => panic!("expected a test failure, got {other:?}"),
        };

        let expected = format!(
            r#"["adb", "-s", "{SERIAL}", "shell", "{LAUNCHER_PATH}", "--kernel", "{RIALTO_PATH}", "--protected"] failed: boot failed"#
        );
        expect_that!(message, contains_substring(test.command(true).to_string()));
        expect_that!(message, contains_substring("boot failed"));
        expect_that!(message.as_str(), eq(expected.as_str()));
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn killed_launcher_fails() {
        let mut runner = MockTestRunner::new();
        runner
            .expect_run()
            .withf(|_, timeout| *timeout == Duration::from_millis(10))
            .times(1)
            .returning(|_, _| Ok(exited(-9, "")));
        let test = EarlyVmTest::new(config(), runner).with_timeout(Duration::from_millis(10));

        match test.test_avf_early_vm(false).await {
            Err(TestError::Failed { result, .. }) => {
                expect_that!(result.returncode, eq(-9));
            }
            other => panic!("expected a test failure, got {other:?}"),
        }
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn runner_errors_are_not_test_failures() {
        let mut runner = MockTestRunner::new();
        runner.expect_run().times(1).returning(|cmd, _| {
            Err(Error::Spawn {
                command: cmd.description(),
                source: io::Error::new(io::ErrorKind::NotFound, "no adb"),
            })
        });
        let test = EarlyVmTest::new(config(), runner);

        let result = test.test_avf_early_vm(false).await;

        assert!(matches!(result, Err(TestError::Runner(Error::Spawn { .. }))));
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn repeated_runs_are_independent() {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let mut runner = MockTestRunner::new();
        let recorded = commands.clone();
        let mut returncodes = vec![0, 1].into_iter();
        runner.expect_run().times(2).returning(move |cmd, _| {
            recorded.lock().expect("couldn't acquire lock").push(cmd.clone());
            Ok(exited(returncodes.next().unwrap_or_default(), ""))
        });
        let test = EarlyVmTest::new(config(), runner);

        let first = test.test_avf_early_vm(true).await;
        let second = test.test_avf_early_vm(true).await;

        // The second run failing doesn't change the outcome of the first.
        assert!(first.is_ok());
        assert!(matches!(second, Err(TestError::Failed { .. })));
        let commands = commands.lock().expect("couldn't acquire lock");
        expect_that!(commands.len(), eq(2_usize));
        assert_eq!(commands[0], commands[1]);
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn run_cases_reports_every_case() {
        let mut runner = MockTestRunner::new();
        runner.expect_run().times(2).returning(|cmd, _| {
            let protected = cmd.args().iter().any(|arg| arg == "--protected");
            Ok(if protected { exited(1, "boot failed") } else { exited(0, "") })
        });
        let test = EarlyVmTest::new(config(), runner);
        let mut out = Vec::new();
        let mut reporter = Reporter::new(&mut out, false);

        test.run_cases(&select_cases(None), false, &mut reporter)
            .await
            .expect("couldn't run cases");
        expect_that!(reporter.reports().len(), eq(2_usize));
        let passed = reporter.finish(Duration::ZERO).expect("couldn't write report");
        let report = String::from_utf8(out).expect("report is not UTF-8");

        expect_that!(passed, eq(false));
        expect_that!(report, contains_substring("testAvfEarlyVmNonProtected ("));
        expect_that!(report, contains_substring("testAvfEarlyVmNonProtected) ... ok\n"));
        expect_that!(report, contains_substring("testAvfEarlyVmProtected) ... FAIL\n"));
        expect_that!(report, contains_substring("failed: boot failed"));
        expect_that!(report, contains_substring("FAILED (failures=1)"));
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn run_cases_stops_early_with_fail_fast() {
        let mut runner = MockTestRunner::new();
        runner.expect_run().times(1).returning(|_, _| Ok(exited(1, "boot failed")));
        let test = EarlyVmTest::new(config(), runner);
        let mut reporter = Reporter::new(Vec::new(), false);

        test.run_cases(&select_cases(None), true, &mut reporter)
            .await
            .expect("couldn't run cases");

        expect_that!(reporter.reports().len(), eq(1_usize));
        expect_that!(reporter.reports()[0].value, eq(StatusResultValue::Fail));
    }

    #[googletest::gtest]
    #[tokio::test]
    async fn run_cases_aborts_on_runner_error() {
        let mut runner = MockTestRunner::new();
        runner.expect_run().times(1).returning(|cmd, _| {
            Err(Error::Kill {
                command: cmd.description(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            })
        });
        let test = EarlyVmTest::new(config(), runner);
        let mut reporter = Reporter::new(Vec::new(), false);

        let result = test.run_cases(&select_cases(None), false, &mut reporter).await;

        assert!(result.is_err());
        expect_that!(reporter.reports().len(), eq(0_usize));
    }
}
