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

//! The process container hosting one simulation service.
//!
//! The factory spawns a fresh copy of the current executable; that copy
//! becomes the container. It connects back over the one-shot server named
//! in its environment, builds the simulation from the registered service
//! kinds, hands the parent its pipe ends, and serves the command pipe until
//! terminated.

use std::env;
use std::process;

use ipc_channel::ipc::{self, IpcSender};
use protocol::{self, pipe, Bootstrap, ErrCode, NetErr, NetResult, Reply, Request, Value};
use serde_json;
use service::SimService;

use error::{Error, Result};
use manager;
use registry;
use util;

/// Make this process a service host if it was spawned as one.
///
/// Call at the top of `main`, after every `register_service` /
/// `register_function` call the binary makes. In an ordinary process this
/// returns immediately; in a process spawned by the factory it serves the
/// hosted simulation and exits without returning. A spawned binary that
/// never reaches this call leaves its factory waiting in the handshake.
pub fn init() {
    let pipe = match env::var(protocol::BOOTSTRAP_PIPE_ENV) {
        Ok(pipe) => pipe,
        Err(_) => return,
    };
    let code = match serve(&pipe) {
        Ok(()) => 0,
        Err(err) => {
            error!("service host failed, {}", err);
            1
        }
    };
    process::exit(code);
}

fn serve(pipe: &str) -> Result<()> {
    let bootstrap_tx: IpcSender<NetResult<Bootstrap>> =
        IpcSender::connect(pipe.to_string()).map_err(Error::BootstrapConnect)?;
    let mut service = match build() {
        Ok(service) => service,
        Err(err) => {
            // Report the reason before dying so the factory fails fast.
            bootstrap_tx.send(Err(err.clone())).ok();
            return Err(Error::SpawnRejected(err));
        }
    };

    let process_name = util::standard_process_name();
    let (command_dispatch, command_work) = pipe::duplex().map_err(Error::Protocol)?;
    let (announce_tx, announce_rx) = ipc::channel()
        .map_err(|err| Error::Handshake(format!("{:?}", err)))?;
    registry::install(&process_name, announce_tx);

    bootstrap_tx
        .send(Ok(Bootstrap {
            process_name: process_name.clone(),
            command: command_dispatch,
            announcements: announce_rx,
        }))
        .map_err(|err| Error::Handshake(format!("{:?}", err)))?;
    info!(
        "service host {} ready, hosting {}",
        process_name,
        service.state().sim_name()
    );

    pipe::work_loop(&command_work, |msg| dispatch(&mut service, msg));
    debug!("service host {} terminated", process_name);
    Ok(())
}

fn build() -> NetResult<SimService> {
    let kind = match env::var(protocol::SERVICE_KIND_ENV) {
        Ok(kind) => kind,
        Err(_) => {
            return Err(NetErr::new(
                ErrCode::BuildFailed,
                "service host started without a service kind",
            ))
        }
    };
    let args: Vec<Value> = match env::var(protocol::SERVICE_ARGS_ENV) {
        Ok(encoded) => serde_json::from_str(&encoded).map_err(|err| {
            NetErr::new(ErrCode::BuildFailed, &format!("bad arguments, {}", err))
        })?,
        Err(_) => Vec::new(),
    };
    match manager::builder(&kind) {
        Some(builder) => builder(&args),
        None => Err(NetErr::new(
            ErrCode::BuildFailed,
            &format!("service kind {} is not registered in this process", kind),
        )),
    }
}

/// Answer one command-pipe request against the hosted service.
///
/// Lifecycle and state commands are handled here; `get`/`set` go to the
/// simulation's attribute seams; anything else is forwarded to its `call`
/// seam by name.
fn dispatch(service: &mut SimService, msg: &Request) -> Reply {
    let command = match msg.command {
        Some(ref command) => command.as_str(),
        None => return Err(NetErr::unknown_command("<none>")),
    };
    match command {
        "run" => service.run().map(Value::from),
        "init" => service.init().map(Value::from),
        "start" => service.start().map(Value::from),
        "step" => service.step().map(Value::from),
        "finish" => service.finish().map(|_| Value::Null),
        "stop" => {
            let terminate = msg.kwarg("terminate")
                .or_else(|| msg.arg(0))
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            service.stop(terminate).map(|_| Value::Null)
        }
        "steer" => service.steer().map(Value::from),
        "status" => Ok(service.state().status().into()),
        "current_step" => Ok(service
            .state()
            .current_step()
            .map(Value::Int)
            .unwrap_or(Value::Null)),
        "error_message" => Ok(service
            .state()
            .error_message()
            .map(|msg| Value::Str(msg.to_string()))
            .unwrap_or(Value::Null)),
        "sim_name" => Ok(Value::Str(service.state().sim_name().to_string())),
        "set_sim_name" => match msg.arg(0).and_then(|v| v.as_str()) {
            Some(sim_name) => {
                service.set_sim_name(sim_name);
                Ok(Value::Null)
            }
            None => Err(NetErr::new(
                ErrCode::Internal,
                "set_sim_name expects a string",
            )),
        },
        "set_inside_run" => match msg.arg(0).and_then(|v| v.as_str()) {
            Some(function_name) => match manager::function(function_name) {
                Some(hook) => {
                    service.set_inside_run(hook);
                    Ok(Value::Null)
                }
                None => Err(NetErr::new(ErrCode::UnknownFunction, function_name)),
            },
            None => Err(NetErr::new(
                ErrCode::Internal,
                "set_inside_run expects a function name",
            )),
        },
        "get" => match msg.arg(0).and_then(|v| v.as_str()) {
            Some(name) => service.get_attr(name),
            None => Err(NetErr::new(ErrCode::Internal, "get expects a name")),
        },
        "set" => match (msg.arg(0).and_then(|v| v.as_str()), msg.arg(1)) {
            (Some(name), Some(value)) => {
                let name = name.to_string();
                let value = value.clone();
                service.set_attr(&name, value).map(|_| Value::Null)
            }
            _ => Err(NetErr::new(
                ErrCode::Internal,
                "set expects a name and a value",
            )),
        },
        other => service.call(other, &msg.args, &msg.kwargs),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use service::{ServiceState, Simulation, SimStatus};

    use super::*;

    struct Echo {
        payload: Value,
    }

    impl Simulation for Echo {
        fn run(&mut self, _state: &mut ServiceState) {}
        fn init(&mut self, _state: &mut ServiceState) -> bool {
            true
        }
        fn start(&mut self, state: &mut ServiceState) -> bool {
            state.beginning_step = 0;
            true
        }
        fn step(&mut self, _state: &mut ServiceState) -> bool {
            true
        }
        fn finish(&mut self, _state: &mut ServiceState) {}

        fn call(
            &mut self,
            function: &str,
            args: &[Value],
            _kwargs: &BTreeMap<String, Value>,
        ) -> NetResult<Value> {
            match function {
                "echo" => Ok(args.get(0).cloned().unwrap_or(Value::Null)),
                other => Err(NetErr::unknown_command(other)),
            }
        }

        fn get_attr(&self, name: &str) -> NetResult<Value> {
            match name {
                "payload" => Ok(self.payload.clone()),
                other => Err(NetErr::no_such_attribute(other)),
            }
        }

        fn set_attr(&mut self, name: &str, value: Value) -> NetResult<()> {
            match name {
                "payload" => {
                    self.payload = value;
                    Ok(())
                }
                other => Err(NetErr::no_such_attribute(other)),
            }
        }
    }

    fn hosted() -> SimService {
        SimService::new(
            "echo",
            Box::new(Echo {
                payload: Value::Null,
            }),
        )
    }

    #[test]
    fn lifecycle_commands_drive_the_state_machine() {
        let mut service = hosted();
        assert_eq!(
            dispatch(&mut service, &Request::new("run")),
            Ok(Value::Str("echo".to_string()))
        );
        assert_eq!(
            dispatch(&mut service, &Request::new("init")),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            dispatch(&mut service, &Request::new("start")),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            dispatch(&mut service, &Request::new("step")),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            dispatch(&mut service, &Request::new("status")),
            Ok(Value::Int(SimStatus::Running.code()))
        );
        assert_eq!(
            dispatch(&mut service, &Request::new("current_step")),
            Ok(Value::Int(1))
        );
        assert_eq!(
            dispatch(&mut service, &Request::new("finish")),
            Ok(Value::Null)
        );
    }

    #[test]
    fn per_call_errors_are_replies() {
        let mut service = hosted();
        let err = dispatch(&mut service, &Request::new("step")).unwrap_err();
        assert_eq!(err.code, ErrCode::InvalidStatus);
        let err = dispatch(&mut service, &Request::new("warp")).unwrap_err();
        assert_eq!(err.code, ErrCode::UnknownCommand);
    }

    #[test]
    fn stop_defaults_to_terminate() {
        let mut service = hosted();
        dispatch(&mut service, &Request::new("run")).unwrap();
        dispatch(&mut service, &Request::new("stop")).unwrap();
        assert_eq!(service.state().status(), SimStatus::Finished);

        let mut service = hosted();
        dispatch(&mut service, &Request::new("run")).unwrap();
        dispatch(
            &mut service,
            &Request::with_args("stop", vec![Value::Bool(false)]),
        ).unwrap();
        assert_eq!(service.state().status(), SimStatus::Stopped);
    }

    #[test]
    fn attribute_seams_are_reachable() {
        let mut service = hosted();
        dispatch(
            &mut service,
            &Request::with_args(
                "set",
                vec![Value::Str("payload".to_string()), Value::Int(9)],
            ),
        ).unwrap();
        assert_eq!(
            dispatch(
                &mut service,
                &Request::with_args("get", vec![Value::Str("payload".to_string())]),
            ),
            Ok(Value::Int(9))
        );
        assert_eq!(
            dispatch(
                &mut service,
                &Request::with_args("echo", vec![Value::Str("hi".to_string())]),
            ),
            Ok(Value::Str("hi".to_string()))
        );
        // The built-in profiler report resolves even when the simulation
        // defines no attributes of its own.
        assert_eq!(
            dispatch(
                &mut service,
                &Request::with_args("get", vec![Value::Str("profiler_report".to_string())]),
            ),
            Ok(Value::Str(String::new()))
        );
    }
}
