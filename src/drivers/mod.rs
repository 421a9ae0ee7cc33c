//! Input drivers, hardware initialisation, and peripheral helpers.

pub mod encoder;
pub mod hw_init;
pub mod hw_timer;
pub mod ina219;
pub mod keys;
pub mod tach;
pub mod task_pin;
