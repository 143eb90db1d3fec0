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

use std::error;
use std::fmt;
use std::io;
use std::result;

use protocol::{self, NetErr};
use serde_json;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// A service function announcement could not be sent to the parent.
    AnnounceSend(String),
    /// Constructor arguments could not be encoded for the host environment.
    ArgsEncode(serde_json::Error),
    /// A spawned host could not reach its parent's bootstrap server.
    BootstrapConnect(io::Error),
    /// The factory could not open a bootstrap server.
    BootstrapPipe(io::Error),
    /// Waiting on a service host process failed.
    ChildWait(io::Error),
    /// A function with this name is already registered with the manager.
    DuplicateFunction(String),
    /// A service kind with this name is already registered with the manager.
    DuplicateService(String),
    /// The receiver already watches a service with this process name.
    DuplicateWatcher(String),
    /// The spawn handshake broke down.
    Handshake(String),
    /// A service function with this name is already published.
    NameCollision(String),
    /// Service function registration was attempted outside a hosted process.
    NotAService,
    /// The proxy has already been closed.
    ProxyClosed,
    /// A pipe-level failure underneath a proxy call.
    Protocol(protocol::Error),
    /// The hosted process answered a call with an error.
    Remote(NetErr),
    /// Spawning the service host process failed.
    Spawn(io::Error),
    /// The spawned host reported that it could not build the service.
    SpawnRejected(NetErr),
    /// Failed to spawn a watcher thread.
    ThreadSpawn(io::Error),
    /// The hosted process answered with a payload of the wrong shape.
    UnexpectedReply(String),
    /// No service function with this name is attached to the proxy.
    UnknownFunction(String),
    /// No service kind with this name is registered with the manager.
    UnknownService(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::AnnounceSend(ref err) => {
                write!(f, "unable to announce service function, {}", err)
            }
            Error::ArgsEncode(ref err) => {
                write!(f, "unable to encode service constructor arguments, {}", err)
            }
            Error::BootstrapConnect(ref err) => {
                write!(f, "unable to connect to bootstrap server, {}", err)
            }
            Error::BootstrapPipe(ref err) => {
                write!(f, "unable to open bootstrap server, {}", err)
            }
            Error::ChildWait(ref err) => write!(f, "unable to wait for service host, {}", err),
            Error::DuplicateFunction(ref name) => {
                write!(f, "function {} has already been registered", name)
            }
            Error::DuplicateService(ref name) => {
                write!(f, "service {} has already been registered", name)
            }
            Error::DuplicateWatcher(ref name) => {
                write!(f, "service {} is already being watched", name)
            }
            Error::Handshake(ref err) => write!(f, "spawn handshake failed, {}", err),
            Error::NameCollision(ref name) => write!(
                f,
                "function {} has already been published as a service function",
                name
            ),
            Error::NotAService => write!(
                f,
                "service functions can only be registered inside a hosted service process"
            ),
            Error::ProxyClosed => write!(f, "service proxy has been closed"),
            Error::Protocol(ref err) => write!(f, "{}", err),
            Error::Remote(ref err) => write!(f, "service call failed, {}", err),
            Error::Spawn(ref err) => write!(f, "unable to spawn service host, {}", err),
            Error::SpawnRejected(ref err) => {
                write!(f, "service host rejected the spawn, {}", err)
            }
            Error::ThreadSpawn(ref err) => write!(f, "unable to spawn watcher thread, {}", err),
            Error::UnexpectedReply(ref what) => {
                write!(f, "service answered with an unexpected payload, {}", what)
            }
            Error::UnknownFunction(ref name) => {
                write!(f, "no service function named {} is attached", name)
            }
            Error::UnknownService(ref name) => {
                write!(f, "service {} has not been registered", name)
            }
        }
    }
}

impl error::Error for Error {}
