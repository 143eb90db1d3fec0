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

//! The simulation lifecycle base.
//!
//! A simulation implements the [`Simulation`](trait.Simulation.html) hooks;
//! a [`SimService`](struct.SimService.html) owns one and drives its status
//! state machine. The container hosts a `SimService` behind the command
//! pipe, but nothing here knows about pipes — the state machine is plain
//! code and is tested as such.

extern crate simcell_protocol as protocol;

pub mod service;
pub mod status;

pub use service::{RunHook, ServiceState, SimService, Simulation};
pub use status::SimStatus;
