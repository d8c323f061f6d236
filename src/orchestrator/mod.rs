//! Application-level orchestration.
//!
//! `extraction` maps a mode and control to one backend call and interprets the
//! response; `controller` runs backend work as tasks on behalf of the UI and the
//! headless runners.

mod controller;
pub mod extraction;

pub(crate) use controller::{run_controller, UiCommand};
