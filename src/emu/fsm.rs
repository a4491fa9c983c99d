//! Control state machine.
//!
//! The FSM is a value type: [`ControlFsm::transition`] maps the current
//! state and this tick's inputs to the next state plus the outputs for this
//! tick, without touching any registers. The engine applies the outputs at
//! the tick boundary.
//!
//! # Full variant
//!
//! ```text
//!            start                      (always)
//!   ┌──────┐ ─────► ┌─────────┐ ─────► ┌────────┐
//!   │ IDLE │        │ COMPUTE │        │ FINISH │
//!   └──────┘ ◄───── └─────────┘        └────────┘
//!    ▲  │ reset          │ reset           │  │ reset
//!    │  ▼                ▼                 │  ▼
//!    │ ┌───────┐ ◄───────┘                 │ RESET
//!    └─┤ RESET │ ◄─────────────────────────┘ (via reset)
//!      └───────┘
//!   FINISH ──(always)──► IDLE,  RESET ──(always)──► IDLE
//! ```
//!
//! | State | READY | DONE | BUSY |
//! |---|---|---|---|
//! | IDLE | 1 | 0 | 0 |
//! | COMPUTE | 0 | 0 | 1 |
//! | FINISH | 0 | 1 | 0 |
//! | RESET | 0 | 0 | 0 |
//!
//! COMPUTE raises the capture pulse: the pipeline output of that tick is
//! committed to RESULT at the COMPUTE -> FINISH boundary, so RESULT is stable
//! by the time DONE reads 1. In IDLE a start pulse wins over a reset pulse;
//! in COMPUTE and FINISH a reset pulse aborts (dropping the capture); in
//! RESET both pulses are ignored.
//!
//! # Minimal variant
//!
//! Two states and a `processing` flag. IDLE moves to COMPUTE on start and
//! sets `processing`; COMPUTE captures the pipeline output, clears
//! `processing` and returns to IDLE in the same transition. STATUS derives
//! `DONE = READY = !processing`, `BUSY = processing`, so DONE reads 1 at
//! every tick except the single COMPUTE tick, including the tick right after
//! the host writes START and before the FSM has seen it.
//!
//! # Combinational variant
//!
//! Stays in IDLE, ignores pulses, and captures every tick.

use std::fmt;

use crate::device::registers_spec::status;
use crate::device::ControlKind;

/// FSM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlState {
    #[default]
    Idle,
    Compute,
    Finish,
    Reset,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlState::Idle => "IDLE",
            ControlState::Compute => "COMPUTE",
            ControlState::Finish => "FINISH",
            ControlState::Reset => "RESET",
        };
        f.write_str(name)
    }
}

/// Pulses observed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsmInputs {
    pub start: bool,
    pub reset: bool,
}

/// What the engine must do at the end of this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsmOutputs {
    /// Pipeline output is valid; commit it to RESULT at the boundary.
    pub capture: bool,
    /// STATUS value for the next tick.
    pub status: u32,
    pub start_accepted: bool,
    /// A start pulse arrived while the engine could not take it.
    pub start_ignored: bool,
    pub reset_taken: bool,
}

/// Control FSM state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFsm {
    kind: ControlKind,
    state: ControlState,
    processing: bool,
}

impl ControlFsm {
    /// Power-on state.
    pub fn new(kind: ControlKind) -> Self {
        Self { kind, state: ControlState::Idle, processing: false }
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Minimal variant's in-flight flag.
    pub fn processing(&self) -> bool {
        self.processing
    }

    /// STATUS bits derived from this state.
    pub fn status(&self) -> u32 {
        match self.kind {
            ControlKind::Full => match self.state {
                ControlState::Idle => status::READY,
                ControlState::Compute => status::BUSY,
                ControlState::Finish => status::DONE,
                ControlState::Reset => 0,
            },
            ControlKind::Minimal => {
                if self.processing {
                    status::BUSY
                } else {
                    status::READY | status::DONE
                }
            }
            ControlKind::Combinational => status::READY | status::DONE,
        }
    }

    fn with(self, state: ControlState, processing: bool) -> Self {
        Self { state, processing, ..self }
    }

    /// Next state and this tick's outputs.
    pub fn transition(&self, inputs: FsmInputs) -> (ControlFsm, FsmOutputs) {
        let mut out = FsmOutputs::default();

        let next = match self.kind {
            ControlKind::Full => match self.state {
                ControlState::Idle if inputs.start => {
                    out.start_accepted = true;
                    self.with(ControlState::Compute, false)
                }
                ControlState::Idle if inputs.reset => {
                    out.reset_taken = true;
                    self.with(ControlState::Reset, false)
                }
                ControlState::Idle => *self,
                ControlState::Compute | ControlState::Finish if inputs.reset => {
                    out.reset_taken = true;
                    out.start_ignored = inputs.start;
                    self.with(ControlState::Reset, false)
                }
                ControlState::Compute => {
                    out.capture = true;
                    out.start_ignored = inputs.start;
                    self.with(ControlState::Finish, false)
                }
                ControlState::Finish => {
                    out.start_ignored = inputs.start;
                    self.with(ControlState::Idle, false)
                }
                ControlState::Reset => {
                    out.start_ignored = inputs.start;
                    self.with(ControlState::Idle, false)
                }
            },

            ControlKind::Minimal => match self.state {
                ControlState::Compute if inputs.reset => {
                    out.reset_taken = true;
                    out.start_ignored = inputs.start;
                    self.with(ControlState::Idle, false)
                }
                ControlState::Compute => {
                    out.capture = true;
                    out.start_ignored = inputs.start;
                    self.with(ControlState::Idle, false)
                }
                _ if inputs.start => {
                    out.start_accepted = true;
                    self.with(ControlState::Compute, true)
                }
                _ => {
                    out.reset_taken = inputs.reset;
                    self.with(ControlState::Idle, false)
                }
            },

            ControlKind::Combinational => {
                out.capture = true;
                *self
            }
        };

        out.status = next.status();
        (next, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: FsmInputs = FsmInputs { start: false, reset: false };
    const START: FsmInputs = FsmInputs { start: true, reset: false };
    const RESET: FsmInputs = FsmInputs { start: false, reset: true };
    const BOTH: FsmInputs = FsmInputs { start: true, reset: true };

    fn full_in(state: ControlState) -> ControlFsm {
        ControlFsm::new(ControlKind::Full).with(state, false)
    }

    #[test]
    fn test_full_transition_table() {
        use ControlState::*;
        let table = [
            (Idle, NONE, Idle),
            (Idle, START, Compute),
            (Idle, RESET, Reset),
            (Idle, BOTH, Compute),
            (Compute, NONE, Finish),
            (Compute, START, Finish),
            (Compute, RESET, Reset),
            (Finish, NONE, Idle),
            (Finish, START, Idle),
            (Finish, RESET, Reset),
            (Reset, NONE, Idle),
            (Reset, START, Idle),
            (Reset, RESET, Idle),
        ];
        for (from, inputs, to) in table {
            let (next, _) = full_in(from).transition(inputs);
            assert_eq!(next.state(), to, "{} with {:?}", from, inputs);
        }
    }

    #[test]
    fn test_full_status_bits() {
        assert_eq!(full_in(ControlState::Idle).status(), status::READY);
        assert_eq!(full_in(ControlState::Compute).status(), status::BUSY);
        assert_eq!(full_in(ControlState::Finish).status(), status::DONE);
        assert_eq!(full_in(ControlState::Reset).status(), 0);
    }

    #[test]
    fn test_full_capture_only_in_compute() {
        for state in [ControlState::Idle, ControlState::Finish, ControlState::Reset] {
            assert!(!full_in(state).transition(NONE).1.capture);
        }
        assert!(full_in(ControlState::Compute).transition(NONE).1.capture);
        // A reset during COMPUTE drops the capture.
        assert!(!full_in(ControlState::Compute).transition(RESET).1.capture);
    }

    #[test]
    fn test_full_output_status_is_next_state() {
        let (next, out) = full_in(ControlState::Idle).transition(START);
        assert_eq!(out.status, next.status());
        assert_eq!(out.status, status::BUSY);
        assert!(out.start_accepted);
    }

    #[test]
    fn test_spurious_start_is_flagged() {
        let (_, out) = full_in(ControlState::Compute).transition(START);
        assert!(out.start_ignored);
        assert!(!out.start_accepted);
    }

    #[test]
    fn test_full_sequence_returns_to_idle() {
        let mut fsm = ControlFsm::new(ControlKind::Full);
        let mut seen = Vec::new();
        let mut inputs = START;
        for _ in 0..3 {
            let (next, out) = fsm.transition(inputs);
            seen.push(out.status);
            fsm = next;
            inputs = NONE;
        }
        assert_eq!(seen, vec![status::BUSY, status::DONE, status::READY]);
        assert_eq!(fsm.state(), ControlState::Idle);
    }

    #[test]
    fn test_minimal_sequence() {
        let fsm = ControlFsm::new(ControlKind::Minimal);
        assert_eq!(fsm.status(), status::READY | status::DONE);

        let (fsm, out) = fsm.transition(START);
        assert_eq!(fsm.state(), ControlState::Compute);
        assert!(fsm.processing());
        assert!(!out.capture);
        assert_eq!(out.status, status::BUSY);

        let (fsm, out) = fsm.transition(NONE);
        assert_eq!(fsm.state(), ControlState::Idle);
        assert!(!fsm.processing());
        assert!(out.capture);
        assert_eq!(out.status, status::READY | status::DONE);
    }

    #[test]
    fn test_minimal_reset_aborts_compute() {
        let (fsm, _) = ControlFsm::new(ControlKind::Minimal).transition(START);
        let (fsm, out) = fsm.transition(RESET);
        assert_eq!(fsm.state(), ControlState::Idle);
        assert!(!out.capture);
        assert!(out.reset_taken);

        // In IDLE a reset is a no-op beyond being recorded.
        let (fsm, out) = fsm.transition(RESET);
        assert_eq!(fsm.state(), ControlState::Idle);
        assert!(out.reset_taken);
    }

    #[test]
    fn test_combinational_always_captures() {
        let fsm = ControlFsm::new(ControlKind::Combinational);
        for inputs in [NONE, START, RESET, BOTH] {
            let (next, out) = fsm.transition(inputs);
            assert_eq!(next, fsm);
            assert!(out.capture);
            assert!(!out.start_accepted);
            assert_eq!(out.status, status::READY | status::DONE);
        }
    }
}
