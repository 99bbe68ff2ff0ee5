use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct GateState {
    remaining: usize,
    open: bool,
}

/// A one-shot phase gate: a countdown latch with a broadcast release.
///
/// Each worker calls [`arrive`](PhaseGate::arrive) once when it has drained its
/// stage inbox. The worker that brings the count to zero runs the supplied hook
/// and opens the gate; every worker then calls [`wait`](PhaseGate::wait), which
/// returns immediately once the gate is open.
///
/// [`open`](PhaseGate::open) releases the gate unconditionally (fast path and
/// cancellation). Opening is idempotent and a gate never closes again.
#[derive(Debug)]
pub struct PhaseGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl PhaseGate {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                remaining: workers,
                open: workers == 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Count this worker as done. The last arriving worker runs `on_last` before
    /// the gate opens; returns `true` for that worker.
    pub fn arrive<F: FnOnce()>(&self, on_last: F) -> bool {
        let last = {
            let mut state = self.state.lock();
            state.remaining = state.remaining.saturating_sub(1);
            state.remaining == 0 && !state.open
        };
        if last {
            on_last();
            self.open();
        }
        last
    }

    pub fn open(&self) {
        let mut state = self.state.lock();
        if !state.open {
            state.open = true;
            self.released.notify_all();
        }
    }

    /// Block until the gate is open.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !state.open {
            self.released.wait(&mut state);
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Workers that have not arrived yet.
    pub fn remaining(&self) -> usize {
        self.state.lock().remaining
    }
}
