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

use std::collections::BTreeMap;
use std::fmt;

use ipc_channel::ipc::IpcReceiver;

use endpoint::Evaluator;
use pipe::DispatchEnd;
use value::Value;

/// Reserved command that closes a pipe. The worker acknowledges it with a
/// single reply frame and then both ends treat the pipe as closed.
pub const TERMINATOR: &'static str = "connection.terminator";

/// One marshalled call on a command or endpoint pipe.
///
/// `command` is the name of the method to dispatch; `None` means "call the
/// functor bound to this pipe itself", which is how endpoint pipes carry
/// their single function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: Option<String>,
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl Request {
    pub fn new(command: &str) -> Self {
        Request {
            command: Some(command.to_string()),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn with_args(command: &str, args: Vec<Value>) -> Self {
        Request {
            command: Some(command.to_string()),
            args: args,
            kwargs: BTreeMap::new(),
        }
    }

    /// A direct call of the functor bound to the pipe.
    pub fn invocation(args: Vec<Value>) -> Self {
        Request {
            command: None,
            args: args,
            kwargs: BTreeMap::new(),
        }
    }

    pub fn terminator() -> Self {
        Request::new(TERMINATOR)
    }

    pub fn is_terminator(&self) -> bool {
        self.command.as_ref().map(|c| c == TERMINATOR).unwrap_or(false)
    }

    pub fn arg(&self, idx: usize) -> Option<&Value> {
        self.args.get(idx)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }
}

/// Error codes a hosted process can answer a call with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrCode {
    /// The command does not name a method of the hosted simulation.
    UnknownCommand,
    /// Attribute access named something the simulation does not expose.
    NoSuchAttribute,
    /// A lifecycle call arrived while the service was in the wrong status.
    InvalidStatus,
    /// `set_inside_run` named a function the manager does not know.
    UnknownFunction,
    /// The service kind could not build its simulation.
    BuildFailed,
    /// Anything else that went wrong inside the hosted process.
    Internal,
}

/// An error surfaced in a reply frame. Per-call errors travel back to the
/// dispatcher this way; the worker loop itself stays alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetErr {
    pub code: ErrCode,
    pub msg: String,
}

impl NetErr {
    pub fn new(code: ErrCode, msg: &str) -> Self {
        NetErr {
            code: code,
            msg: msg.to_string(),
        }
    }

    pub fn unknown_command(command: &str) -> Self {
        NetErr::new(ErrCode::UnknownCommand, command)
    }

    pub fn no_such_attribute(name: &str) -> Self {
        NetErr::new(ErrCode::NoSuchAttribute, name)
    }

    pub fn invalid_status(op: &str, status: &str) -> Self {
        NetErr {
            code: ErrCode::InvalidStatus,
            msg: format!("{} called while {}", op, status),
        }
    }
}

impl fmt::Display for NetErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.msg)
    }
}

pub type NetResult<T> = Result<T, NetErr>;

/// The reply frame answering one `Request`.
pub type Reply = NetResult<Value>;

/// One service-function publication, sent from the hosted process to the
/// receiver in the spawning process.
#[derive(Debug, Serialize, Deserialize)]
pub struct Announcement {
    /// Name of the originating process; the receiver drops announcements
    /// whose name disagrees with the service it watches.
    pub process_name: String,
    pub function_name: String,
    pub evaluator: Evaluator,
}

/// First and only message of the spawn handshake, sent by a freshly started
/// service host over the one-shot bootstrap channel.
#[derive(Serialize, Deserialize)]
pub struct Bootstrap {
    pub process_name: String,
    /// Proxy end of the command pipe.
    pub command: DispatchEnd,
    /// Proxy end of the service-function pipe.
    pub announcements: IpcReceiver<Announcement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_is_recognized() {
        assert!(Request::terminator().is_terminator());
        assert!(!Request::new("step").is_terminator());
        assert!(!Request::invocation(vec![]).is_terminator());
    }

    #[test]
    fn argument_access() {
        let msg = Request::with_args("set_pos", vec![Value::Float(0.25)]);
        assert_eq!(msg.arg(0).and_then(|v| v.as_f64()), Some(0.25));
        assert!(msg.arg(1).is_none());
        assert!(msg.kwarg("terminate").is_none());
    }
}
