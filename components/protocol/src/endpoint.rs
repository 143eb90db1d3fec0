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

//! Remote function endpoints.
//!
//! An endpoint backs exactly one callable with a dedicated pipe: the worker
//! is a thread serving the function on one end, the evaluator is the stub
//! holding the other. The evaluator is the piece that travels — sent across
//! the service-function pipe it rebuilds on the client side and behaves like
//! a local callable.

use std::thread::{self, JoinHandle};

use error::{Error, Result};
use message::{NetResult, Request};
use pipe::{self, DispatchEnd};
use value::Value;

/// Calling stub for a function served in another process.
#[derive(Debug, Serialize, Deserialize)]
pub struct Evaluator {
    name: String,
    pipe: DispatchEnd,
}

impl Evaluator {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the remote function. Blocks for the reply frame.
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        match self.pipe.transmit(Request::invocation(args))? {
            Ok(value) => Ok(value),
            Err(err) => Err(Error::Remote(err)),
        }
    }

    /// `call` with dead-peer errors converted to a logged sentinel.
    pub fn safe_call(&self, args: Vec<Value>) -> Option<NetResult<Value>> {
        self.pipe.safe_transmit(Request::invocation(args))
    }

    /// Shut the serving worker down. Used by tests and teardown paths; a
    /// worker whose evaluator is simply dropped exits on the dead pipe.
    pub fn terminate(&self) {
        self.pipe.terminate();
    }
}

/// Handle on the thread serving one endpoint.
pub struct EndpointWorker {
    handle: JoinHandle<()>,
}

impl EndpointWorker {
    pub fn join(self) {
        self.handle.join().ok();
    }
}

/// Build an endpoint around `functor`: a fresh pipe, a named worker thread
/// serving the function on the work end, and the evaluator on the other.
pub fn endpoint<F>(name: &str, mut functor: F) -> Result<(Evaluator, EndpointWorker)>
where
    F: FnMut(&[Value]) -> NetResult<Value> + Send + 'static,
{
    let (dispatch, work) = pipe::duplex()?;
    let handle = thread::Builder::new()
        .name(format!("{}-sfn", name))
        .spawn(move || pipe::work_loop(&work, |msg| functor(&msg.args)))
        .map_err(Error::ThreadSpawn)?;
    let evaluator = Evaluator {
        name: name.to_string(),
        pipe: dispatch,
    };
    Ok((evaluator, EndpointWorker { handle: handle }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluator_reaches_its_worker() {
        let (evaluator, worker) = endpoint("add_one", |args| {
            let n = args.get(0).and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(Value::Int(n + 1))
        }).unwrap();

        assert_eq!(evaluator.name(), "add_one");
        assert_eq!(evaluator.call(vec![Value::Int(7)]).unwrap(), Value::Int(8));
        assert_eq!(evaluator.call(vec![Value::Int(-1)]).unwrap(), Value::Int(0));

        evaluator.terminate();
        worker.join();
    }

    #[test]
    fn dropping_the_evaluator_stops_the_worker() {
        let (evaluator, worker) = endpoint("noop", |_| Ok(Value::Null)).unwrap();
        drop(evaluator);
        // The worker sees a closed pipe and exits without panicking.
        worker.join();
    }
}
