// Copyright (c) 2017 Chef Software Inc. and/or applicable contributors
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

use std::fmt;

use protocol::Value;

/// Status of a simulation service.
///
/// The integer codes are part of the wire contract; `status` queries answer
/// with them and proxies rebuild the enum on the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimStatus {
    Registered,
    Loaded,
    Initialized,
    Started,
    Running,
    Stopped,
    Finished,
    Failed,
}

impl SimStatus {
    pub fn code(&self) -> i64 {
        match *self {
            SimStatus::Registered => 0,
            SimStatus::Loaded => 1,
            SimStatus::Initialized => 2,
            SimStatus::Started => 3,
            SimStatus::Running => 4,
            SimStatus::Stopped => 5,
            SimStatus::Finished => 6,
            SimStatus::Failed => -1,
        }
    }

    pub fn from_code(code: i64) -> Option<SimStatus> {
        match code {
            0 => Some(SimStatus::Registered),
            1 => Some(SimStatus::Loaded),
            2 => Some(SimStatus::Initialized),
            3 => Some(SimStatus::Started),
            4 => Some(SimStatus::Running),
            5 => Some(SimStatus::Stopped),
            6 => Some(SimStatus::Finished),
            -1 => Some(SimStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            SimStatus::Registered => "REGISTERED",
            SimStatus::Loaded => "LOADED",
            SimStatus::Initialized => "INITIALIZED",
            SimStatus::Started => "STARTED",
            SimStatus::Running => "RUNNING",
            SimStatus::Stopped => "STOPPED",
            SimStatus::Finished => "FINISHED",
            SimStatus::Failed => "FAILED",
        }
    }
}

impl Default for SimStatus {
    fn default() -> SimStatus {
        SimStatus::Registered
    }
}

impl fmt::Display for SimStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<SimStatus> for Value {
    fn from(status: SimStatus) -> Value {
        Value::Int(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for status in [
            SimStatus::Registered,
            SimStatus::Loaded,
            SimStatus::Initialized,
            SimStatus::Started,
            SimStatus::Running,
            SimStatus::Stopped,
            SimStatus::Finished,
            SimStatus::Failed,
        ].iter()
        {
            assert_eq!(SimStatus::from_code(status.code()), Some(*status));
        }
        assert_eq!(SimStatus::from_code(42), None);
    }
}
