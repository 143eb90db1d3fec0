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

use message::NetErr;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Failed to create an IPC channel pair.
    ChannelCreate(io::Error),
    /// The far end of a pipe went away while sending.
    PipeSend(String),
    /// The far end of a pipe went away or sent garbage while receiving.
    PipeRecv(String),
    /// The far end of a pipe is closed.
    PipeClosed,
    /// The far end answered a call with an error.
    Remote(NetErr),
    /// Failed to spawn an endpoint worker thread.
    ThreadSpawn(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ChannelCreate(ref err) => write!(f, "unable to create pipe, {}", err),
            Error::PipeSend(ref err) => write!(f, "unable to send on pipe, {}", err),
            Error::PipeRecv(ref err) => write!(f, "unable to receive on pipe, {}", err),
            Error::PipeClosed => write!(f, "pipe has been closed"),
            Error::Remote(ref err) => write!(f, "remote call failed, {}", err),
            Error::ThreadSpawn(ref err) => write!(f, "unable to spawn worker thread, {}", err),
        }
    }
}

impl error::Error for Error {}
