//! Domain models for the pill dispenser system.

mod activity;
mod device;
mod entity;
mod patient;
mod schedule;

pub use activity::*;
pub use device::*;
pub use entity::*;
pub use patient::*;
pub use schedule::*;
