//! Domain ports (interfaces) for the Nightshift controller.

pub mod scanner;
pub mod trigger;

pub use scanner::{ObjectEvent, Scanner, WatchSource, WatchStream};
pub use trigger::{Trigger, TriggerRegistry};
