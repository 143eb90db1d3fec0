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

//! Duplex request/reply pipes.
//!
//! A pipe is a pair of typed IPC channels: requests flow one way, replies
//! the other. The protocol is strictly one call in flight per pipe. Both
//! ends are serializable, so a `DispatchEnd` can itself travel over another
//! pipe; that is how the bootstrap handshake hands the command pipe to the
//! parent and how evaluators reach the client.

use std::fmt;

use ipc_channel::ipc::{self, IpcError, IpcReceiver, IpcSender};

use error::{Error, Result};
use message::{Reply, Request};
use value::Value;

/// The calling end of a pipe. One `transmit` is one blocking round trip.
#[derive(Serialize, Deserialize)]
pub struct DispatchEnd {
    tx: IpcSender<Request>,
    rx: IpcReceiver<Reply>,
}

/// The serving end of a pipe.
#[derive(Serialize, Deserialize)]
pub struct WorkEnd {
    rx: IpcReceiver<Request>,
    tx: IpcSender<Reply>,
}

/// Create a fresh pipe and return both ends.
pub fn duplex() -> Result<(DispatchEnd, WorkEnd)> {
    let (req_tx, req_rx) = ipc::channel().map_err(Error::ChannelCreate)?;
    let (reply_tx, reply_rx) = ipc::channel().map_err(Error::ChannelCreate)?;
    let dispatch = DispatchEnd {
        tx: req_tx,
        rx: reply_rx,
    };
    let work = WorkEnd {
        rx: req_rx,
        tx: reply_tx,
    };
    Ok((dispatch, work))
}

impl DispatchEnd {
    /// Send one request and block on its reply frame.
    pub fn transmit(&self, msg: Request) -> Result<Reply> {
        self.tx
            .send(msg)
            .map_err(|err| Error::PipeSend(format!("{:?}", err)))?;
        match self.rx.recv() {
            Ok(reply) => Ok(reply),
            Err(IpcError::Disconnected) => Err(Error::PipeClosed),
            Err(err) => Err(Error::PipeRecv(format!("{:?}", err))),
        }
    }

    /// `transmit` with dead-peer errors converted to a logged sentinel.
    pub fn safe_transmit(&self, msg: Request) -> Option<Reply> {
        match self.transmit(msg) {
            Ok(reply) => Some(reply),
            Err(Error::PipeClosed) => {
                debug!("pipe closed by peer");
                None
            }
            Err(err) => {
                warn!("pipe transmission failed, {}", err);
                None
            }
        }
    }

    /// Send the terminator and wait for its single acknowledgement. Safe to
    /// call on a pipe whose peer is already gone.
    pub fn terminate(&self) -> Option<Reply> {
        self.safe_transmit(Request::terminator())
    }
}

impl fmt::Debug for DispatchEnd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DispatchEnd")
    }
}

impl WorkEnd {
    pub fn recv(&self) -> Result<Request> {
        match self.rx.recv() {
            Ok(msg) => Ok(msg),
            Err(IpcError::Disconnected) => Err(Error::PipeClosed),
            Err(err) => Err(Error::PipeRecv(format!("{:?}", err))),
        }
    }

    pub fn send(&self, reply: Reply) -> Result<()> {
        self.tx
            .send(reply)
            .map_err(|err| Error::PipeSend(format!("{:?}", err)))
    }

    pub fn safe_recv(&self) -> Option<Request> {
        match self.recv() {
            Ok(msg) => Some(msg),
            Err(Error::PipeClosed) => {
                debug!("pipe closed by peer");
                None
            }
            Err(err) => {
                warn!("pipe receive failed, {}", err);
                None
            }
        }
    }

    pub fn safe_send(&self, reply: Reply) -> Option<()> {
        match self.send(reply) {
            Ok(()) => Some(()),
            Err(err) => {
                warn!("pipe send failed, {}", err);
                None
            }
        }
    }
}

impl fmt::Debug for WorkEnd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "WorkEnd")
    }
}

/// Serve one end of a pipe until the dispatcher terminates it or goes away.
///
/// Every received request is answered with exactly one reply frame. The
/// terminator is acknowledged and ends the loop; a dead peer ends it
/// silently. Per-request errors are replies, never loop exits.
pub fn work_loop<F>(end: &WorkEnd, mut functor: F)
where
    F: FnMut(&Request) -> Reply,
{
    loop {
        let msg = match end.safe_recv() {
            Some(msg) => msg,
            None => return,
        };
        if msg.is_terminator() {
            end.safe_send(Ok(Value::Null));
            return;
        }
        let reply = functor(&msg);
        if end.safe_send(reply).is_none() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use message::NetErr;

    #[test]
    fn round_trip_and_terminator_handshake() {
        let (dispatch, work) = duplex().unwrap();
        let worker = thread::spawn(move || {
            work_loop(&work, |msg| match msg.command.as_ref().map(|c| c.as_str()) {
                Some("double") => {
                    let n = msg.arg(0).and_then(|v| v.as_i64()).unwrap_or(0);
                    Ok(Value::Int(n * 2))
                }
                other => Err(NetErr::unknown_command(other.unwrap_or(""))),
            })
        });

        let reply = dispatch
            .transmit(Request::with_args("double", vec![Value::Int(21)]))
            .unwrap();
        assert_eq!(reply, Ok(Value::Int(42)));

        let reply = dispatch.transmit(Request::new("nope")).unwrap();
        assert!(reply.is_err());

        // One terminator, one acknowledgement, clean worker exit.
        let ack = dispatch.terminate().unwrap();
        assert_eq!(ack, Ok(Value::Null));
        worker.join().unwrap();
    }

    #[test]
    fn dead_peer_is_a_sentinel_not_a_panic() {
        let (dispatch, work) = duplex().unwrap();
        drop(work);
        assert!(dispatch.safe_transmit(Request::new("step")).is_none());
        assert!(dispatch.terminate().is_none());
    }

    #[test]
    fn worker_loop_collapses_when_dispatcher_goes_away() {
        let (dispatch, work) = duplex().unwrap();
        let worker = thread::spawn(move || work_loop(&work, |_| Ok(Value::Null)));
        drop(dispatch);
        // Exits without panicking once the receive reports a closed pipe.
        worker.join().unwrap();
    }
}
