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

//! The simulation service runtime.
//!
//! A binary that hosts services registers its service kinds with the
//! [`manager`](manager/index.html) and then calls
//! [`container::init`](container/fn.init.html) at the top of `main`. In the
//! parent process that call is a no-op and
//! [`manager::process_factory`](manager/fn.process_factory.html) hands out
//! [`ServiceProxy`](proxy/struct.ServiceProxy.html) handles; in a spawned
//! copy of the binary it becomes the service host and never returns.

extern crate ipc_channel;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate serde_json;
extern crate simcell_protocol as protocol;
extern crate simcell_service as service;

pub mod container;
pub mod error;
pub mod manager;
pub mod proxy;
pub mod receiver;
pub mod registry;
pub mod util;

pub use error::{Error, Result};
pub use manager::{close, close_service, process_factory, register_function, register_service,
                  registered_services, running_processes};
pub use proxy::ServiceProxy;
pub use registry::service_function;
