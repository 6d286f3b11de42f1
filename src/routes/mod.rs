//! Route modules for the Quadrant server

pub mod health;
pub mod sync;
pub mod tasks;
