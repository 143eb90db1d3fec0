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

//! Wire protocol spoken between a service proxy and the process hosting its
//! simulation.
//!
//! Everything that crosses a process boundary is defined here: the value
//! model, the request/reply frames of the command pipe, the announcement
//! frames of the service-function pipe, and the pipe ends themselves. Pipe
//! ends are serializable so that one pipe can carry the end of another; the
//! bootstrap handshake and evaluator transport both depend on that.

extern crate ipc_channel;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;

pub mod endpoint;
pub mod error;
pub mod message;
pub mod pipe;
pub mod value;

pub use endpoint::{endpoint, EndpointWorker, Evaluator};
pub use error::{Error, Result};
pub use message::{Announcement, Bootstrap, ErrCode, NetErr, NetResult, Reply, Request,
                  TERMINATOR};
pub use pipe::{duplex, work_loop, DispatchEnd, WorkEnd};
pub use value::Value;

/// Environment variable a spawned service host reads to find the one-shot
/// bootstrap server of its parent.
pub const BOOTSTRAP_PIPE_ENV: &'static str = "SIMCELL_BOOTSTRAP_PIPE";
/// Environment variable naming the service kind a spawned host must build.
pub const SERVICE_KIND_ENV: &'static str = "SIMCELL_SERVICE_KIND";
/// Environment variable carrying the JSON-encoded constructor arguments for
/// the hosted simulation.
pub const SERVICE_ARGS_ENV: &'static str = "SIMCELL_SERVICE_ARGS";
