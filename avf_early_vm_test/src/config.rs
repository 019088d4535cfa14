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

/// Environment variable naming the device that `adb` should talk to.
pub const ANDROID_SERIAL: &str = "ANDROID_SERIAL";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("$ANDROID_SERIAL is empty.")]
    MissingSerial,
}

/// Settings shared by every test case of a run. Read once during setup and never modified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestConfig {
    serial: String,
}

impl TestConfig {
    pub fn new(serial: impl Into<String>) -> Result<Self, ConfigError> {
        let serial = serial.into();
        if serial.is_empty() {
            return Err(ConfigError::MissingSerial);
        }
        Ok(TestConfig { serial })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, so that callers don't need to mutate the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        Self::new(lookup(ANDROID_SERIAL).unwrap_or_default())
    }

    /// Serial number of the target device, as passed to `adb -s`.
    pub fn serial(&self) -> &str {
        &self.serial
    }
}
