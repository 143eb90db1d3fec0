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

use protocol::{NetErr, NetResult, Value};

use status::SimStatus;

/// Hook invoked at the tail of `run`, with the service itself.
///
/// This is the seam that lets a driver seize the whole lifecycle from
/// inside the hosted process: set a hook, call `run`, and the reply does
/// not come back until the hook has driven the service to completion.
pub type RunHook = fn(&mut SimService);

/// Bookkeeping every simulation service carries.
#[derive(Debug)]
pub struct ServiceState {
    sim_name: String,
    /// First step index. The simulation must set this in its `start` hook.
    pub beginning_step: i64,
    current_step: Option<i64>,
    error_message: Option<String>,
    status: SimStatus,
}

impl ServiceState {
    fn new(sim_name: &str) -> Self {
        ServiceState {
            sim_name: sim_name.to_string(),
            beginning_step: -1,
            current_step: None,
            error_message: None,
            status: SimStatus::default(),
        }
    }

    pub fn sim_name(&self) -> &str {
        &self.sim_name
    }

    pub fn set_sim_name(&mut self, sim_name: &str) {
        self.sim_name = sim_name.to_string();
    }

    pub fn status(&self) -> SimStatus {
        self.status
    }

    pub fn current_step(&self) -> Option<i64> {
        self.current_step
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_ref().map(|m| m.as_str())
    }

    /// Mark the service failed. Lifecycle calls no longer advance a failed
    /// service; the message is readable through the proxy.
    pub fn fail(&mut self, msg: &str) {
        self.status = SimStatus::Failed;
        self.error_message = Some(msg.to_string());
    }
}

/// Behavior of a hosted simulation.
///
/// The lifecycle hooks mirror the driving calls on [`SimService`]: each is
/// invoked by the like-named operation once its status precondition holds.
/// The boolean hooks report "done" — returning `false` means the operation
/// has not advanced yet and may be called again; it is not an error.
///
/// `call`, `get_attr` and `set_attr` are the forwarding seams behind the
/// marshalled method and property surface of the proxy; the defaults reject
/// everything by name.
pub trait Simulation: Send {
    /// Prepare the underlying simulation. All prep is complete after this.
    fn run(&mut self, state: &mut ServiceState);

    fn init(&mut self, state: &mut ServiceState) -> bool;

    /// Must set `state.beginning_step` when it returns `true`.
    fn start(&mut self, state: &mut ServiceState) -> bool;

    fn step(&mut self, state: &mut ServiceState) -> bool;

    fn finish(&mut self, state: &mut ServiceState);

    fn stop(&mut self, _state: &mut ServiceState, _terminate: bool) {}

    /// Signal for ad-hoc changes to simulation data. No status effect.
    fn steer(&mut self, _state: &mut ServiceState) -> bool {
        true
    }

    fn call(
        &mut self,
        function: &str,
        _args: &[Value],
        _kwargs: &BTreeMap<String, Value>,
    ) -> NetResult<Value> {
        Err(NetErr::unknown_command(function))
    }

    fn get_attr(&self, name: &str) -> NetResult<Value> {
        Err(NetErr::no_such_attribute(name))
    }

    fn set_attr(&mut self, name: &str, _value: Value) -> NetResult<()> {
        Err(NetErr::no_such_attribute(name))
    }

    /// On-demand profiling information about the simulation.
    fn profiler_report(&self) -> String {
        String::new()
    }
}

/// A simulation plus the state machine that drives it.
///
/// Operations check their status precondition and reject out-of-order calls
/// rather than silently re-running; in particular a service stopped without
/// terminating cannot resume stepping.
pub struct SimService {
    sim: Box<dyn Simulation>,
    state: ServiceState,
    inside_run: Option<RunHook>,
}

impl SimService {
    pub fn new(sim_name: &str, sim: Box<dyn Simulation>) -> Self {
        SimService {
            sim: sim,
            state: ServiceState::new(sim_name),
            inside_run: None,
        }
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub fn set_inside_run(&mut self, hook: RunHook) {
        self.inside_run = Some(hook);
    }

    /// Load the simulation, then hand control to the inside-run hook if one
    /// is set. Returns the simulation name.
    pub fn run(&mut self) -> NetResult<String> {
        self.expect("run", &[SimStatus::Registered])?;
        self.sim.run(&mut self.state);
        self.advance(SimStatus::Loaded);
        if let Some(hook) = self.inside_run {
            hook(self);
        }
        Ok(self.state.sim_name.clone())
    }

    pub fn init(&mut self) -> NetResult<bool> {
        self.expect("init", &[SimStatus::Loaded])?;
        let done = self.sim.init(&mut self.state);
        if done {
            self.advance(SimStatus::Initialized);
        }
        Ok(done)
    }

    pub fn start(&mut self) -> NetResult<bool> {
        self.expect("start", &[SimStatus::Initialized])?;
        let done = self.sim.start(&mut self.state);
        if done {
            self.state.current_step = Some(self.state.beginning_step);
            self.advance(SimStatus::Started);
        }
        Ok(done)
    }

    pub fn step(&mut self) -> NetResult<bool> {
        self.expect("step", &[SimStatus::Started, SimStatus::Running])?;
        let done = self.sim.step(&mut self.state);
        if done {
            self.state.current_step = self.state.current_step.map(|s| s + 1);
            self.advance(SimStatus::Running);
        }
        Ok(done)
    }

    pub fn finish(&mut self) -> NetResult<()> {
        self.expect(
            "finish",
            &[SimStatus::Started, SimStatus::Running, SimStatus::Stopped],
        )?;
        self.sim.finish(&mut self.state);
        self.advance(SimStatus::Finished);
        Ok(())
    }

    pub fn stop(&mut self, terminate: bool) -> NetResult<()> {
        self.expect(
            "stop",
            &[
                SimStatus::Loaded,
                SimStatus::Initialized,
                SimStatus::Started,
                SimStatus::Running,
                SimStatus::Stopped,
                SimStatus::Finished,
            ],
        )?;
        self.sim.stop(&mut self.state, terminate);
        if terminate {
            self.advance(SimStatus::Finished);
        } else {
            self.advance(SimStatus::Stopped);
        }
        Ok(())
    }

    pub fn steer(&mut self) -> NetResult<bool> {
        Ok(self.sim.steer(&mut self.state))
    }

    pub fn call(
        &mut self,
        function: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> NetResult<Value> {
        self.sim.call(function, args, kwargs)
    }

    pub fn get_attr(&self, name: &str) -> NetResult<Value> {
        match name {
            "profiler_report" => Ok(Value::Str(self.sim.profiler_report())),
            _ => self.sim.get_attr(name),
        }
    }

    pub fn set_attr(&mut self, name: &str, value: Value) -> NetResult<()> {
        self.sim.set_attr(name, value)
    }

    pub fn set_sim_name(&mut self, sim_name: &str) {
        self.state.set_sim_name(sim_name);
    }

    fn expect(&self, op: &str, allowed: &[SimStatus]) -> NetResult<()> {
        if allowed.contains(&self.state.status) {
            Ok(())
        } else {
            Err(NetErr::invalid_status(op, self.state.status.as_str()))
        }
    }

    // A hook that failed the service wins over the normal transition.
    fn advance(&mut self, status: SimStatus) {
        if self.state.status != SimStatus::Failed {
            self.state.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::ErrCode;

    /// Counts hook invocations; `init` and `start` succeed on the second
    /// attempt to exercise the "not yet advanced, call again" contract.
    struct Staged {
        init_calls: u32,
        start_calls: u32,
        steps: u32,
        finished: bool,
        stopped: Option<bool>,
    }

    impl Staged {
        fn new() -> Self {
            Staged {
                init_calls: 0,
                start_calls: 0,
                steps: 0,
                finished: false,
                stopped: None,
            }
        }
    }

    impl Simulation for Staged {
        fn run(&mut self, _state: &mut ServiceState) {}

        fn init(&mut self, _state: &mut ServiceState) -> bool {
            self.init_calls += 1;
            self.init_calls >= 2
        }

        fn start(&mut self, state: &mut ServiceState) -> bool {
            self.start_calls += 1;
            if self.start_calls >= 2 {
                state.beginning_step = 10;
                true
            } else {
                false
            }
        }

        fn step(&mut self, _state: &mut ServiceState) -> bool {
            self.steps += 1;
            true
        }

        fn finish(&mut self, _state: &mut ServiceState) {
            self.finished = true;
        }

        fn stop(&mut self, _state: &mut ServiceState, terminate: bool) {
            self.stopped = Some(terminate);
        }
    }

    fn service() -> SimService {
        SimService::new("staged", Box::new(Staged::new()))
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn status_sequence_is_monotonic() {
            let mut svc = service();
            assert_eq!(svc.state().status(), SimStatus::Registered);

            svc.run().unwrap();
            assert_eq!(svc.state().status(), SimStatus::Loaded);

            // Multi-call init: the first attempt reports "not yet".
            assert_eq!(svc.init().unwrap(), false);
            assert_eq!(svc.state().status(), SimStatus::Loaded);
            assert_eq!(svc.init().unwrap(), true);
            assert_eq!(svc.state().status(), SimStatus::Initialized);

            assert_eq!(svc.start().unwrap(), false);
            assert_eq!(svc.start().unwrap(), true);
            assert_eq!(svc.state().status(), SimStatus::Started);

            assert!(svc.step().unwrap());
            assert_eq!(svc.state().status(), SimStatus::Running);

            svc.finish().unwrap();
            assert_eq!(svc.state().status(), SimStatus::Finished);
        }

        #[test]
        fn step_counter_tracks_beginning_step() {
            let mut svc = service();
            svc.run().unwrap();
            assert_eq!(svc.state().current_step(), None);
            while !svc.init().unwrap() {}
            while !svc.start().unwrap() {}
            assert_eq!(svc.state().current_step(), Some(10));
            for k in 1..6 {
                svc.step().unwrap();
                assert_eq!(svc.state().current_step(), Some(10 + k));
            }
        }

        #[test]
        fn out_of_order_calls_are_rejected() {
            let mut svc = service();
            let err = svc.step().unwrap_err();
            assert_eq!(err.code, ErrCode::InvalidStatus);
            let err = svc.init().unwrap_err();
            assert_eq!(err.code, ErrCode::InvalidStatus);
            svc.run().unwrap();
            let err = svc.run().unwrap_err();
            assert_eq!(err.code, ErrCode::InvalidStatus);
        }
    }

    mod stopping {
        use super::*;

        fn started() -> SimService {
            let mut svc = service();
            svc.run().unwrap();
            while !svc.init().unwrap() {}
            while !svc.start().unwrap() {}
            svc
        }

        #[test]
        fn stop_dichotomy() {
            let mut svc = started();
            svc.stop(false).unwrap();
            assert_eq!(svc.state().status(), SimStatus::Stopped);
            // Idempotent.
            svc.stop(false).unwrap();
            assert_eq!(svc.state().status(), SimStatus::Stopped);

            let mut svc = started();
            svc.stop(true).unwrap();
            assert_eq!(svc.state().status(), SimStatus::Finished);
            svc.stop(true).unwrap();
            assert_eq!(svc.state().status(), SimStatus::Finished);
        }

        #[test]
        fn stopped_service_cannot_resume_stepping() {
            let mut svc = started();
            svc.stop(false).unwrap();
            let err = svc.step().unwrap_err();
            assert_eq!(err.code, ErrCode::InvalidStatus);
        }

        #[test]
        fn stop_before_load_is_rejected() {
            let mut svc = service();
            let err = svc.stop(true).unwrap_err();
            assert_eq!(err.code, ErrCode::InvalidStatus);
        }

        #[test]
        fn stopped_service_may_still_finish() {
            let mut svc = started();
            svc.stop(false).unwrap();
            svc.finish().unwrap();
            assert_eq!(svc.state().status(), SimStatus::Finished);
        }
    }

    mod failure {
        use super::*;

        struct Doomed;

        impl Simulation for Doomed {
            fn run(&mut self, state: &mut ServiceState) {
                state.fail("could not load input deck");
            }
            fn init(&mut self, _state: &mut ServiceState) -> bool {
                true
            }
            fn start(&mut self, _state: &mut ServiceState) -> bool {
                true
            }
            fn step(&mut self, _state: &mut ServiceState) -> bool {
                true
            }
            fn finish(&mut self, _state: &mut ServiceState) {}
        }

        #[test]
        fn failed_status_is_not_overwritten() {
            let mut svc = SimService::new("doomed", Box::new(Doomed));
            svc.run().unwrap();
            assert_eq!(svc.state().status(), SimStatus::Failed);
            assert_eq!(
                svc.state().error_message(),
                Some("could not load input deck")
            );
        }
    }

    mod inside_run {
        use super::*;

        fn drive_to_finish(svc: &mut SimService) {
            while !svc.init().unwrap() {}
            while !svc.start().unwrap() {}
            for _ in 0..3 {
                svc.step().unwrap();
            }
            svc.finish().unwrap();
        }

        #[test]
        fn hook_drives_the_whole_lifecycle() {
            let mut svc = service();
            svc.set_inside_run(drive_to_finish);
            svc.run().unwrap();
            assert_eq!(svc.state().status(), SimStatus::Finished);
            assert_eq!(svc.state().current_step(), Some(13));
        }
    }
}
