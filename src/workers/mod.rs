//! Background workers

pub mod side_effects;

pub use side_effects::{SideEffectDispatcher, SideEffectWorker};
