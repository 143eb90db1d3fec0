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

use std::process;

/// The standard unique name of a service host process: its PID in hex.
pub fn standard_process_name() -> String {
    format!("{:#x}", process::id())
}

/// Standard mangling of a name by the process it belongs to.
pub fn mangle(process_name: &str, name: &str) -> String {
    format!("{}_{}", process_name, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_names_are_hex_pids() {
        let name = standard_process_name();
        assert!(name.starts_with("0x"));
        assert!(i64::from_str_radix(&name[2..], 16).is_ok());
    }

    #[test]
    fn mangling_is_prefixing() {
        assert_eq!(mangle("0x1a", "get_pos"), "0x1a_get_pos");
    }
}
