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

//! Runs the early VM test cases against the device named by `$ANDROID_SERIAL` and writes a report
//! that the Android test harness can parse to stdout.

use std::{io::Write, process::ExitCode, time::Instant};

use anyhow::Context;
use avf_early_vm_test::{report::Reporter, select_cases, BootMode, EarlyVmTest};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Boots the rialto test kernel as an early VM on an attached device")]
struct Args {
    /// Only run the test cases whose name contains this string.
    #[arg(long)]
    filter: Option<String>,

    /// Print the names of the selected test cases and exit.
    #[arg(long)]
    list: bool,

    /// Stop after the first failing test case.
    #[arg(long)]
    fail_fast: bool,

    /// Include the output of passing test cases in the report.
    #[arg(long)]
    logs: bool,
}

/// Resolves the cases to run. With `--list`, writes their names to `out` instead and returns
/// `None`; nothing in here needs a device.
fn plan<W: Write>(args: &Args, out: &mut W) -> anyhow::Result<Option<Vec<BootMode>>> {
    let cases = select_cases(args.filter.as_deref());
    if cases.is_empty() {
        anyhow::bail!("no test case matches filter {:?}", args.filter.as_deref().unwrap_or_default());
    }

    if args.list {
        for case in cases {
            writeln!(out, "{}", case.test_name()).context("couldn't write test list")?;
        }
        return Ok(None);
    }
    Ok(Some(cases))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let Some(cases) = plan(&args, &mut std::io::stdout().lock())? else {
        return Ok(ExitCode::SUCCESS);
    };

    let test = EarlyVmTest::set_up().context("couldn't set up early VM test")?;
    log::info!("running {} test case(s) on device {}", cases.len(), test.config().serial());

    let start = Instant::now();
    let mut reporter = Reporter::new(std::io::stdout().lock(), args.logs);
    test.run_cases(&cases, args.fail_fast, &mut reporter).await?;
    let passed = reporter.finish(start.elapsed()).context("couldn't write report")?;

    Ok(if passed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
