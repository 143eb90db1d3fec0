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

//! Client-side stand-in for a hosted simulation service.
//!
//! The typed lifecycle surface and the generic `call`/`get`/`set`
//! forwarders all marshal through the command pipe, one blocking round trip
//! per call. Service functions published by the hosted simulation appear in
//! the dynamic method table as the watcher attaches them and are dispatched
//! with [`invoke`](#method.invoke), each over its own endpoint pipe.
//!
//! A proxy may be handed to any thread (interior locks keep it `Sync`),
//! but the command pipe carries one call at a time.

use std::collections::BTreeMap;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use protocol::{self, DispatchEnd, Request, Value};
use service::SimStatus;

use error::{Error, Result};
use receiver::RemoteTable;

pub struct ServiceProxy {
    process_name: String,
    pipe: Mutex<DispatchEnd>,
    remotes: RemoteTable,
    child: Mutex<Option<Child>>,
    closed: AtomicBool,
}

impl ServiceProxy {
    pub(crate) fn new(process_name: String, pipe: DispatchEnd, child: Child) -> Self {
        ServiceProxy {
            process_name: process_name,
            pipe: Mutex::new(pipe),
            remotes: Arc::new(Mutex::new(Default::default())),
            child: Mutex::new(Some(child)),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn remote_table(&self) -> RemoteTable {
        self.remotes.clone()
    }

    /// Reserved unique identifier of the hosted process. Not forwarded.
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Load the hosted simulation. If an inside-run hook is set, this does
    /// not return until the hook has run the service to completion.
    pub fn run(&self) -> Result<String> {
        let value = self.transmit(Request::new("run"))?;
        self.expect_str(value)
    }

    pub fn init(&self) -> Result<bool> {
        let value = self.transmit(Request::new("init"))?;
        self.expect_bool(value)
    }

    pub fn start(&self) -> Result<bool> {
        let value = self.transmit(Request::new("start"))?;
        self.expect_bool(value)
    }

    pub fn step(&self) -> Result<bool> {
        let value = self.transmit(Request::new("step"))?;
        self.expect_bool(value)
    }

    pub fn finish(&self) -> Result<()> {
        self.transmit(Request::new("finish"))?;
        Ok(())
    }

    pub fn stop(&self, terminate: bool) -> Result<()> {
        self.transmit(Request::with_args("stop", vec![Value::Bool(terminate)]))?;
        Ok(())
    }

    pub fn steer(&self) -> Result<bool> {
        let value = self.transmit(Request::new("steer"))?;
        self.expect_bool(value)
    }

    pub fn status(&self) -> Result<SimStatus> {
        let value = self.transmit(Request::new("status"))?;
        value
            .as_i64()
            .and_then(SimStatus::from_code)
            .ok_or_else(|| Error::UnexpectedReply(format!("status {}", value)))
    }

    pub fn current_step(&self) -> Result<Option<i64>> {
        let value = self.transmit(Request::new("current_step"))?;
        match value {
            Value::Null => Ok(None),
            Value::Int(step) => Ok(Some(step)),
            other => Err(Error::UnexpectedReply(format!("current_step {}", other))),
        }
    }

    pub fn error_message(&self) -> Result<Option<String>> {
        let value = self.transmit(Request::new("error_message"))?;
        match value {
            Value::Null => Ok(None),
            Value::Str(msg) => Ok(Some(msg)),
            other => Err(Error::UnexpectedReply(format!("error_message {}", other))),
        }
    }

    pub fn sim_name(&self) -> Result<String> {
        let value = self.transmit(Request::new("sim_name"))?;
        self.expect_str(value)
    }

    pub fn set_sim_name(&self, sim_name: &str) -> Result<()> {
        self.transmit(Request::with_args(
            "set_sim_name",
            vec![Value::Str(sim_name.to_string())],
        ))?;
        Ok(())
    }

    pub fn profiler_report(&self) -> Result<String> {
        let value = self.get("profiler_report")?;
        self.expect_str(value)
    }

    /// Point the inside-run hook at a function registered with the manager.
    /// The name is resolved inside the hosted process.
    pub fn set_inside_run(&self, function_name: &str) -> Result<()> {
        self.transmit(Request::with_args(
            "set_inside_run",
            vec![Value::Str(function_name.to_string())],
        ))?;
        Ok(())
    }

    /// Forward an arbitrary method of the hosted simulation.
    pub fn call(&self, command: &str, args: Vec<Value>) -> Result<Value> {
        self.transmit(Request::with_args(command, args))
    }

    /// Forward a method with keyword arguments.
    pub fn call_with_kwargs(
        &self,
        command: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let mut msg = Request::with_args(command, args);
        msg.kwargs = kwargs;
        self.transmit(msg)
    }

    /// Read a forwarded property of the hosted simulation.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.transmit(Request::with_args("get", vec![Value::Str(name.to_string())]))
    }

    /// Write a forwarded property of the hosted simulation.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        self.transmit(Request::with_args(
            "set",
            vec![Value::Str(name.to_string()), value],
        ))?;
        Ok(())
    }

    /// Names of the service functions attached so far.
    pub fn functions(&self) -> Vec<String> {
        self.remotes.lock().unwrap().keys().cloned().collect()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.remotes.lock().unwrap().contains_key(name)
    }

    /// Call a dynamically attached service function.
    ///
    /// Whether a given function exists yet depends on how far the hosted
    /// simulation has come; announcements are not ordered against command
    /// pipe replies.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::ProxyClosed);
        }
        let remotes = self.remotes.lock().unwrap();
        match remotes.get(name) {
            Some(evaluator) => match evaluator.call(args) {
                Ok(value) => Ok(value),
                Err(protocol::Error::Remote(err)) => Err(Error::Remote(err)),
                Err(err) => Err(Error::Protocol(err)),
            },
            None => Err(Error::UnknownFunction(name.to_string())),
        }
    }

    /// Terminate the hosted process: one terminator, one acknowledgement,
    /// then reap the child. Idempotent, and runs on drop.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("closing service {}", self.process_name);
        {
            let pipe = self.pipe.lock().unwrap();
            pipe.terminate();
        }
        let child = self.child.lock().unwrap().take();
        if let Some(mut child) = child {
            child.wait().map_err(Error::ChildWait)?;
        }
        debug!("service closed, {}", self.process_name);
        Ok(())
    }

    fn transmit(&self, msg: Request) -> Result<Value> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::ProxyClosed);
        }
        let pipe = self.pipe.lock().unwrap();
        match pipe.transmit(msg) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(Error::Remote(err)),
            Err(err) => Err(Error::Protocol(err)),
        }
    }

    fn expect_bool(&self, value: Value) -> Result<bool> {
        value
            .as_bool()
            .ok_or_else(|| Error::UnexpectedReply(format!("expected bool, got {}", value)))
    }

    fn expect_str(&self, value: Value) -> Result<String> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(Error::UnexpectedReply(
                format!("expected string, got {}", other),
            )),
        }
    }
}

impl Drop for ServiceProxy {
    fn drop(&mut self) {
        self.close().ok();
    }
}
