//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! mock adapters.  All tests run on the host (x86_64) with no real
//! hardware required.

mod app_service_tests;
mod fan_tests;
mod mock_hw;
mod power_tests;
mod update_tests;
