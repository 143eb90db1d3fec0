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

//! The service manager and process factory.
//!
//! Process-wide state: the registry binding service names to builders and
//! function names to run hooks, and the table of running service processes.
//! Registration is the same code on both sides of the process boundary:
//! the factory consults the registry before spawning, and the spawned host
//! consults its own copy to build the simulation.

use std::collections::HashMap;
use std::env;
use std::process::Command;
use std::sync::Mutex;

use ipc_channel::ipc::IpcOneShotServer;
use protocol::{self, Bootstrap, NetResult, Value};
use serde_json;
use service::{RunHook, SimService};

use error::{Error, Result};
use proxy::ServiceProxy;
use receiver;

/// Builds the simulation service a kind name stands for. Registered under
/// the service name in every process that may host or spawn the kind.
pub type ServiceBuilder = fn(&[Value]) -> NetResult<SimService>;

#[derive(Default)]
struct Registry {
    services: HashMap<String, ServiceBuilder>,
    functions: HashMap<String, RunHook>,
    started: bool,
}

/// Bookkeeping for one running service process. The proxy owns the pipes
/// and the child handle; this records what was spawned and from what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub service: String,
    pub process_name: String,
    pub pid: u32,
}

lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry::default());
    static ref PROCESSES: Mutex<HashMap<String, ProcessRecord>> =
        Mutex::new(HashMap::new());
}

/// Register a service kind. Rejects duplicate names.
pub fn register_service(name: &str, builder: ServiceBuilder) -> Result<()> {
    let mut registry = REGISTRY.lock().unwrap();
    if registry.services.contains_key(name) {
        return Err(Error::DuplicateService(name.to_string()));
    }
    registry.services.insert(name.to_string(), builder);
    debug!("registered service kind {}", name);
    Ok(())
}

/// Register a plain callable, resolvable by name inside hosted processes
/// (the transport behind `set_inside_run`). Rejects duplicate names.
pub fn register_function(name: &str, hook: RunHook) -> Result<()> {
    let mut registry = REGISTRY.lock().unwrap();
    if registry.functions.contains_key(name) {
        return Err(Error::DuplicateFunction(name.to_string()));
    }
    registry.functions.insert(name.to_string(), hook);
    debug!("registered function {}", name);
    Ok(())
}

pub fn is_registered(name: &str) -> bool {
    let registry = REGISTRY.lock().unwrap();
    registry.services.contains_key(name) || registry.functions.contains_key(name)
}

/// Start the manager. Idempotent; the factory calls it on demand.
pub fn start() {
    let mut registry = REGISTRY.lock().unwrap();
    if !registry.started {
        registry.started = true;
        info!("service manager started");
    }
}

pub fn started() -> bool {
    REGISTRY.lock().unwrap().started
}

/// Tear the manager down: forget every registration and record and stop
/// all watchers. Proxies stay usable until closed individually.
pub fn shutdown() {
    {
        let mut registry = REGISTRY.lock().unwrap();
        if !registry.started && registry.services.is_empty() && registry.functions.is_empty() {
            return;
        }
        registry.services.clear();
        registry.functions.clear();
        registry.started = false;
    }
    PROCESSES.lock().unwrap().clear();
    receiver::shutdown();
    info!("service manager shut down");
}

/// Process-wide shutdown. Safe to invoke any number of times.
pub fn close() {
    shutdown();
}

pub(crate) fn builder(name: &str) -> Option<ServiceBuilder> {
    REGISTRY.lock().unwrap().services.get(name).cloned()
}

pub(crate) fn function(name: &str) -> Option<RunHook> {
    REGISTRY.lock().unwrap().functions.get(name).cloned()
}

/// Names of all registered service kinds and functions.
pub fn registered_services() -> Vec<String> {
    let registry = REGISTRY.lock().unwrap();
    registry
        .services
        .keys()
        .chain(registry.functions.keys())
        .cloned()
        .collect()
}

/// Process names of all known running services.
pub fn running_processes() -> Vec<String> {
    PROCESSES.lock().unwrap().keys().cloned().collect()
}

/// Look a running service up by its unique process name.
pub fn get_proxy_record(process_name: &str) -> Option<ProcessRecord> {
    PROCESSES.lock().unwrap().get(process_name).cloned()
}

/// Spawn a service process for a registered kind and return its proxy.
///
/// The service host is a fresh copy of the current executable with the
/// bootstrap pipe, kind name and constructor arguments in its environment.
/// The host answers with its process name and pipe ends; the factory wires
/// the proxy, records the process and points the receiver at the
/// service-function pipe before handing the proxy out.
pub fn process_factory(service_name: &str, args: &[Value]) -> Result<ServiceProxy> {
    if builder(service_name).is_none() {
        return Err(Error::UnknownService(service_name.to_string()));
    }
    start();

    let (server, bootstrap_pipe) =
        IpcOneShotServer::<NetResult<Bootstrap>>::new().map_err(Error::BootstrapPipe)?;
    let encoded_args = serde_json::to_string(args).map_err(Error::ArgsEncode)?;
    let exe = env::current_exe().map_err(Error::Spawn)?;
    info!("launching service {}", service_name);
    let mut child = Command::new(exe)
        .env(protocol::BOOTSTRAP_PIPE_ENV, &bootstrap_pipe)
        .env(protocol::SERVICE_KIND_ENV, service_name)
        .env(protocol::SERVICE_ARGS_ENV, &encoded_args)
        .spawn()
        .map_err(Error::Spawn)?;

    let (_rx, handshake) = match server.accept() {
        Ok(accepted) => accepted,
        Err(err) => {
            child.wait().ok();
            return Err(Error::Handshake(format!("{:?}", err)));
        }
    };
    let bootstrap = match handshake {
        Ok(bootstrap) => bootstrap,
        Err(err) => {
            // The host reported why it could not come up; reap it.
            child.wait().ok();
            return Err(Error::SpawnRejected(err));
        }
    };

    let pid = child.id();
    let process_name = bootstrap.process_name.clone();
    let proxy = ServiceProxy::new(process_name.clone(), bootstrap.command, child);
    receiver::register_service(&process_name, bootstrap.announcements, proxy.remote_table())?;
    PROCESSES.lock().unwrap().insert(
        process_name.clone(),
        ProcessRecord {
            service: service_name.to_string(),
            process_name: process_name.clone(),
            pid: pid,
        },
    );
    info!("service launched, {} ({})", service_name, process_name);
    Ok(proxy)
}

/// Close a service completely: terminate its process, forget its record and
/// detach its watcher.
pub fn close_service(proxy: &ServiceProxy) -> Result<()> {
    proxy.close()?;
    PROCESSES.lock().unwrap().remove(proxy.process_name());
    receiver::disconnect_service(proxy.process_name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nil_builder(_args: &[Value]) -> NetResult<SimService> {
        unreachable!("never spawned in these tests");
    }

    fn nil_hook(_service: &mut SimService) {}

    #[test]
    fn duplicate_service_names_are_rejected() {
        register_service("mgr-dup", nil_builder).unwrap();
        match register_service("mgr-dup", nil_builder) {
            Err(Error::DuplicateService(ref name)) => assert_eq!(name, "mgr-dup"),
            other => panic!("expected DuplicateService, got {:?}", other),
        }
        // The first registration survives the failed second one.
        assert!(is_registered("mgr-dup"));
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        register_function("mgr-hook", nil_hook).unwrap();
        match register_function("mgr-hook", nil_hook) {
            Err(Error::DuplicateFunction(_)) => (),
            other => panic!("expected DuplicateFunction, got {:?}", other),
        }
        assert!(is_registered("mgr-hook"));
    }

    #[test]
    fn directory_views_cover_both_registries() {
        register_service("mgr-dir-svc", nil_builder).unwrap();
        register_function("mgr-dir-fn", nil_hook).unwrap();
        let names = registered_services();
        assert!(names.contains(&"mgr-dir-svc".to_string()));
        assert!(names.contains(&"mgr-dir-fn".to_string()));
    }

    #[test]
    fn factory_rejects_unknown_kinds() {
        match process_factory("mgr-nope", &[]) {
            Err(Error::UnknownService(_)) => (),
            other => panic!(
                "expected UnknownService, got {:?}",
                other.map(|p| p.process_name().to_string())
            ),
        }
    }

    #[test]
    fn start_is_idempotent() {
        start();
        start();
        assert!(started());
    }
}
