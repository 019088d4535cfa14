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

//! Line-oriented test report that external test result aggregators can parse.
//!
//! The layout follows the verbose output of Python's `unittest` runner, which the Android test
//! harness already knows how to consume:
//!
//! ```text
//! testAvfEarlyVmNonProtected (avf_early_vm_test.AvfEarlyVmTest.testAvfEarlyVmNonProtected) ... ok
//! testAvfEarlyVmProtected (avf_early_vm_test.AvfEarlyVmTest.testAvfEarlyVmProtected) ... FAIL
//!
//! ======================================================================
//! FAIL: testAvfEarlyVmProtected (avf_early_vm_test.AvfEarlyVmTest.testAvfEarlyVmProtected)
//! ----------------------------------------------------------------------
//! ["adb", "-s", ...] failed: ...
//!
//! ----------------------------------------------------------------------
//! Ran 2 tests in 12.345s
//!
//! FAILED (failures=1)
//! ```

use std::{io::Write, time::Duration};

use crate::SUITE_NAME;

const MODULE_NAME: &str = "avf_early_vm_test";

/// The outcome of an individual test case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusResultValue {
    Ok,
    Fail,
}

impl std::fmt::Display for StatusResultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            StatusResultValue::Ok => write!(f, "ok"),
            StatusResultValue::Fail => write!(f, "FAIL"),
        }
    }
}

/// Running tally of a suite, used to annotate log lines.
#[derive(Clone, Debug)]
pub struct Status {
    failures: usize,
    ok: usize,
    remaining: usize,
}

impl Status {
    pub fn new(remaining: usize) -> Self {
        Status { failures: 0, ok: 0, remaining }
    }

    pub fn update(&mut self, value: StatusResultValue) {
        self.remaining = self.remaining.saturating_sub(1);
        match value {
            StatusResultValue::Ok => self.ok += 1,
            StatusResultValue::Fail => self.failures += 1,
        }
    }
}

/// Formats the status as `✓:<ok-count>,✗:<failure-count>,⠇:<remaining-count>`.
impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "✓:{},✗:{},⠇:{}", self.ok, self.failures, self.remaining)
    }
}

#[derive(Clone, Debug)]
pub struct CaseReport {
    pub name: &'static str,
    pub value: StatusResultValue,
    /// Assertion message, only set for failures.
    pub message: Option<String>,
    /// Captured output of the command under test.
    pub logs: String,
    pub elapsed: Duration,
}

impl CaseReport {
    pub fn passed(name: &'static str, logs: String, elapsed: Duration) -> Self {
        CaseReport { name, value: StatusResultValue::Ok, message: None, logs, elapsed }
    }

    pub fn failed(name: &'static str, message: String, logs: String, elapsed: Duration) -> Self {
        CaseReport { name, value: StatusResultValue::Fail, message: Some(message), logs, elapsed }
    }
}

/// Writes the report for a sequence of test cases to `out`.
pub struct Reporter<W> {
    out: W,
    /// Print the captured output of passing cases too, not only of failing ones.
    logs: bool,
    reports: Vec<CaseReport>,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, logs: bool) -> Self {
        Reporter { out, logs, reports: Vec::new() }
    }

    /// Announces a case. The line is completed by [`Reporter::finish_case`].
    pub fn start_case(&mut self, name: &str) -> std::io::Result<()> {
        write!(self.out, "{} ({}) ... ", name, qualified_name(name))?;
        self.out.flush()
    }

    pub fn finish_case(&mut self, report: CaseReport) -> std::io::Result<()> {
        writeln!(self.out, "{}", report.value)?;
        self.reports.push(report);
        Ok(())
    }

    pub fn reports(&self) -> &[CaseReport] {
        &self.reports
    }

    /// Writes the failure details and the summary, and returns whether every case passed.
    pub fn finish(mut self, elapsed: Duration) -> std::io::Result<bool> {
        writeln!(self.out)?;
        for report in &self.reports {
            let failed = report.value == StatusResultValue::Fail;
            if !failed && !(self.logs && !report.logs.is_empty()) {
                continue;
            }
            let header = if failed { "FAIL" } else { "LOGS" };
            writeln!(self.out, "{}", "=".repeat(70))?;
            writeln!(self.out, "{}: {} ({})", header, report.name, qualified_name(report.name))?;
            writeln!(self.out, "{}", "-".repeat(70))?;
            if let Some(message) = &report.message {
                writeln!(self.out, "{}", message.trim_end())?;
            }
            if !report.logs.is_empty() {
                writeln!(self.out, "{}", report.logs.trim_end())?;
            }
            writeln!(self.out, "(took {:.3}s)", report.elapsed.as_secs_f64())?;
            writeln!(self.out)?;
        }

        let failures =
            self.reports.iter().filter(|r| r.value == StatusResultValue::Fail).count();
        let count = self.reports.len();
        writeln!(self.out, "{}", "-".repeat(70))?;
        writeln!(
            self.out,
            "Ran {} test{} in {:.3}s",
            count,
            if count == 1 { "" } else { "s" },
            elapsed.as_secs_f64()
        )?;
        writeln!(self.out)?;
        if failures == 0 {
            writeln!(self.out, "OK")?;
        } else {
            writeln!(self.out, "FAILED (failures={})", failures)?;
        }
        self.out.flush()?;
        Ok(failures == 0)
    }
}

fn qualified_name(name: &str) -> String {
    format!("{MODULE_NAME}.{SUITE_NAME}.{name}")
}
