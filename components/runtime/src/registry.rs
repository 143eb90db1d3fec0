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

//! Server-side service function registry.
//!
//! Lives inside the hosted process. The container installs the process name
//! and the sending half of the service-function pipe during bootstrap; from
//! then on the hosted simulation can publish callables to its proxy at any
//! point in its lifecycle. Each published function gets its own endpoint
//! pipe and worker thread; only the announcement crosses the
//! service-function pipe.

use std::collections::HashMap;
use std::sync::Mutex;

use ipc_channel::ipc::IpcSender;
use protocol::{self, Announcement, NetResult, Value};

use error::{Error, Result};
use util;

struct FunctionRegistry {
    process_name: Option<String>,
    pipe: Option<IpcSender<Announcement>>,
    workers: HashMap<String, protocol::EndpointWorker>,
}

lazy_static! {
    static ref REGISTRY: Mutex<FunctionRegistry> = Mutex::new(FunctionRegistry {
        process_name: None,
        pipe: None,
        workers: HashMap::new(),
    });
}

/// Install the service-function pipe. Called once by the container while it
/// bootstraps; before this, every `register` call is `NotAService`.
pub fn install(process_name: &str, pipe: IpcSender<Announcement>) {
    let mut registry = REGISTRY.lock().unwrap();
    registry.process_name = Some(process_name.to_string());
    registry.pipe = Some(pipe);
}

/// Publish `functor` to the proxy under `name`.
///
/// Builds an endpoint, keeps its worker, and announces the evaluator across
/// the service-function pipe. Names are unique per hosted process.
pub fn register<F>(name: &str, functor: F) -> Result<()>
where
    F: FnMut(&[Value]) -> NetResult<Value> + Send + 'static,
{
    let mut registry = REGISTRY.lock().unwrap();
    let process_name = match registry.process_name {
        Some(ref process_name) => process_name.clone(),
        None => return Err(Error::NotAService),
    };
    if registry.workers.contains_key(name) {
        return Err(Error::NameCollision(name.to_string()));
    }
    let (evaluator, worker) = protocol::endpoint(&util::mangle(&process_name, name), functor)
        .map_err(Error::Protocol)?;
    let announcement = Announcement {
        process_name: process_name,
        function_name: name.to_string(),
        evaluator: evaluator,
    };
    match registry.pipe {
        Some(ref pipe) => {
            pipe.send(announcement)
                .map_err(|err| Error::AnnounceSend(format!("{:?}", err)))?;
        }
        None => return Err(Error::NotAService),
    }
    registry.workers.insert(name.to_string(), worker);
    debug!("published service function {}", name);
    Ok(())
}

/// Service function registrator: makes ad-hoc additions to the client-side
/// interface of a service from anywhere inside its lifecycle methods.
///
/// Outside a hosted process this degrades to a logged warning, so the same
/// simulation code runs unhosted (in tests, say) without a live runtime.
/// Name collisions are still errors.
pub fn service_function<F>(name: &str, functor: F) -> Result<()>
where
    F: FnMut(&[Value]) -> NetResult<Value> + Send + 'static,
{
    match register(name, functor) {
        Err(Error::NotAService) => {
            warn!(
                "service functions can only be registered in a hosted service process ({})",
                name
            );
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use ipc_channel::ipc;

    use super::*;

    // One sequential test: the registry is process-global state, and the
    // uninstalled path has to be observed before anything installs it.
    #[test]
    fn registration_lifecycle() {
        // No pipe installed yet.
        match register("orphan", |_| Ok(Value::Null)) {
            Err(Error::NotAService) => (),
            other => panic!("expected NotAService, got {:?}", other.map(|_| ())),
        }
        // The convenience wrapper downgrades that to a warning.
        service_function("orphan", |_| Ok(Value::Null)).unwrap();

        let (tx, rx) = ipc::channel().unwrap();
        install("0xbeef", tx);

        register("echo", |args| {
            Ok(args.get(0).cloned().unwrap_or(Value::Null))
        }).unwrap();

        // The announcement carries a live evaluator.
        let announcement = rx.recv().unwrap();
        assert_eq!(announcement.process_name, "0xbeef");
        assert_eq!(announcement.function_name, "echo");
        let reply = announcement
            .evaluator
            .call(vec![Value::Str("hi".to_string())])
            .unwrap();
        assert_eq!(reply, Value::Str("hi".to_string()));

        // Duplicate names are rejected, through the wrapper too.
        match register("echo", |_| Ok(Value::Null)) {
            Err(Error::NameCollision(ref name)) => assert_eq!(name, "echo"),
            other => panic!("expected NameCollision, got {:?}", other.map(|_| ())),
        }
        match service_function("echo", |_| Ok(Value::Null)) {
            Err(Error::NameCollision(_)) => (),
            other => panic!("expected NameCollision, got {:?}", other.map(|_| ())),
        }
    }
}
