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

//! Client-side service function receiver.
//!
//! One watcher thread per running service polls the service-function pipe,
//! drains pending announcements and attaches their evaluators to the
//! proxy's method table. The watcher is the only writer of that table; it
//! never touches the command pipe. It exits when the pipe reports closed or
//! when the service is disconnected.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ipc_channel::ipc::{IpcError, IpcReceiver, TryRecvError};
use protocol::{Announcement, Evaluator};

use error::{Error, Result};

/// Method table shared between a proxy and its watcher. Evaluators land
/// here as they are announced; the proxy dispatches `invoke` through it.
pub type RemoteTable = Arc<Mutex<HashMap<String, Evaluator>>>;

/// How long one poll of the service-function pipe blocks.
const POLL_MS: u64 = 100;

struct Watcher {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

lazy_static! {
    static ref WATCHERS: Mutex<HashMap<String, Watcher>> = Mutex::new(HashMap::new());
}

/// Start watching the service-function pipe of a freshly spawned service.
///
/// Must happen before the service is put to work: the receiver has to be
/// ready for announcements made during any lifecycle call.
pub fn register_service(
    process_name: &str,
    pipe: IpcReceiver<Announcement>,
    table: RemoteTable,
) -> Result<()> {
    let mut watchers = WATCHERS.lock().unwrap();
    if watchers.contains_key(process_name) {
        return Err(Error::DuplicateWatcher(process_name.to_string()));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = stop.clone();
    let service = process_name.to_string();
    let handle = thread::Builder::new()
        .name(format!("{}-watch", process_name))
        .spawn(move || watch(&service, pipe, table, thread_stop))
        .map_err(Error::ThreadSpawn)?;
    watchers.insert(
        process_name.to_string(),
        Watcher {
            stop: stop,
            handle: handle,
        },
    );
    Ok(())
}

/// Detach from a service: stop its watcher and wait for it to exit.
/// A service whose pipe already died has no watcher left; that is fine.
pub fn disconnect_service(process_name: &str) {
    let watcher = WATCHERS.lock().unwrap().remove(process_name);
    if let Some(watcher) = watcher {
        watcher.stop.store(true, Ordering::Relaxed);
        watcher.handle.join().ok();
    }
}

/// Stop every watcher. Used by manager shutdown.
pub fn shutdown() {
    let watchers: Vec<(String, Watcher)> = {
        let mut map = WATCHERS.lock().unwrap();
        map.drain().collect()
    };
    for (name, watcher) in watchers {
        debug!("stopping watcher for {}", name);
        watcher.stop.store(true, Ordering::Relaxed);
        watcher.handle.join().ok();
    }
}

fn watch(
    service: &str,
    pipe: IpcReceiver<Announcement>,
    table: RemoteTable,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        match pipe.try_recv_timeout(Duration::from_millis(POLL_MS)) {
            Ok(announcement) => {
                attach(service, announcement, &table);
                // Drain whatever else is already pending.
                loop {
                    match pipe.try_recv() {
                        Ok(announcement) => attach(service, announcement, &table),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::IpcError(_)) => {
                            debug!("service function pipe closed, {}", service);
                            return;
                        }
                    }
                }
            }
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::IpcError(IpcError::Disconnected)) => {
                debug!("service function pipe closed, {}", service);
                return;
            }
            Err(TryRecvError::IpcError(err)) => {
                warn!("service function pipe failed, {}, {:?}", service, err);
                return;
            }
        }
    }
}

fn attach(service: &str, announcement: Announcement, table: &RemoteTable) {
    if announcement.process_name != service {
        warn!(
            "incorrect pipe usage {} -> {}, rejecting announcement of {}",
            announcement.process_name, service, announcement.function_name
        );
        return;
    }
    let mut table = table.lock().unwrap();
    match table.entry(announcement.function_name.clone()) {
        Entry::Vacant(entry) => {
            debug!(
                "attaching service function {} on {}",
                announcement.function_name, service
            );
            entry.insert(announcement.evaluator);
        }
        Entry::Occupied(_) => {
            warn!(
                "service function {} already attached on {}",
                announcement.function_name, service
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use ipc_channel::ipc::{self, IpcSender};
    use protocol::{self, Value};

    use super::*;

    fn announce(tx: &IpcSender<Announcement>, process_name: &str, function_name: &str) {
        let (evaluator, _worker) =
            protocol::endpoint(function_name, |_| Ok(Value::Str("pong".to_string()))).unwrap();
        tx.send(Announcement {
            process_name: process_name.to_string(),
            function_name: function_name.to_string(),
            evaluator: evaluator,
        }).unwrap();
    }

    fn wait_for<F>(what: &str, deadline_ms: u64, mut pred: F)
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while !pred() {
            if Instant::now() > deadline {
                panic!("timed out waiting for {}", what);
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn announcements_attach_and_misroutes_drop() {
        let (tx, rx) = ipc::channel().unwrap();
        let table: RemoteTable = Arc::new(Mutex::new(HashMap::new()));
        register_service("0x100", rx, table.clone()).unwrap();

        announce(&tx, "0x100", "ping");
        wait_for("ping to attach", 2_000, || {
            table.lock().unwrap().contains_key("ping")
        });
        assert_eq!(
            table.lock().unwrap()["ping"].call(vec![]).unwrap(),
            Value::Str("pong".to_string())
        );

        // An announcement from the wrong process never lands.
        announce(&tx, "0x999", "evil");
        announce(&tx, "0x100", "after");
        wait_for("after to attach", 2_000, || {
            table.lock().unwrap().contains_key("after")
        });
        assert!(!table.lock().unwrap().contains_key("evil"));

        disconnect_service("0x100");
    }

    #[test]
    fn watcher_exits_when_the_pipe_dies() {
        let (tx, rx) = ipc::channel().unwrap();
        let table: RemoteTable = Arc::new(Mutex::new(HashMap::new()));
        register_service("0x200", rx, table).unwrap();
        drop(tx);
        // Disconnect joins the watcher; a watcher stuck past the poll
        // timeout would hang this join.
        disconnect_service("0x200");
    }

    #[test]
    fn double_registration_is_rejected() {
        let (_tx_a, rx_a) = ipc::channel().unwrap();
        let (_tx_b, rx_b) = ipc::channel().unwrap();
        let table: RemoteTable = Arc::new(Mutex::new(HashMap::new()));
        register_service("0x300", rx_a, table.clone()).unwrap();
        match register_service("0x300", rx_b, table) {
            Err(Error::DuplicateWatcher(_)) => (),
            other => panic!("expected DuplicateWatcher, got {:?}", other),
        }
        disconnect_service("0x300");
    }
}
