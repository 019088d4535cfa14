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

//! Errors raised while driving a child process.
//!
//! A command that runs and exits with a non-zero code is not an error at this
//! level; these variants only cover cases where the runner itself could not do
//! its job.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("couldn't spawn command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("couldn't wait for command `{command}` to finish: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
    /// The forced kill after a timeout was refused. The child may still be
    /// running, so callers must not carry on as if it had been reaped.
    #[error("couldn't kill command `{command}` after timeout: {source}")]
    Kill {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("couldn't read {stream} of command `{command}`: {source}")]
    Read {
        command: String,
        stream: &'static str,
        #[source]
        source: io::Error,
    },
}
