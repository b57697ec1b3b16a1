//! Parameter Tuning
//!
//! A/B experiments over virtual cache parameters, started on phase shifts.

mod controller;

pub use controller::{
    CycleReport, SwitchConfig, SwitchController, SwitchState, Tunable, DEFAULT_ALTERNATES,
    DEFAULT_CYCLES_PER_TEST, DEFAULT_SWITCH_CYCLE_TICKS,
};
