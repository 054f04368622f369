//! Shared fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tasknode::runtime::node::{DomainId, NodeId};
use tasknode::{Node, NodeAttributes};

pub fn node(cores: usize) -> Node {
    node_with(NodeAttributes::with_cores(cores))
}

pub fn node_with(attributes: NodeAttributes) -> Node {
    Node::initialize(DomainId(0), NodeId(0), attributes).expect("node initializes")
}

/// One-shot latch shared between a test and its action bodies.
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (open, condvar) = &*self.0;
        *open.lock() = true;
        condvar.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *self.0 .0.lock()
    }

    /// Block until opened; panics after ten seconds so a broken test
    /// cannot hang the suite.
    pub fn wait(&self) {
        assert!(self.wait_for(Duration::from_secs(10)), "gate never opened");
    }

    pub fn wait_for(
        &self,
        timeout: Duration,
    ) -> bool {
        let (open, condvar) = &*self.0;
        let deadline = Instant::now() + timeout;
        let mut guard = open.lock();
        while !*guard {
            if condvar.wait_until(&mut guard, deadline).timed_out() {
                return *guard;
            }
        }
        true
    }

    /// Open the gate from another thread after `delay`.
    pub fn open_after(
        &self,
        delay: Duration,
    ) -> thread::JoinHandle<()> {
        let gate = self.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            gate.open();
        })
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub fn eventually(
    timeout: Duration,
    check: impl Fn() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    check()
}
