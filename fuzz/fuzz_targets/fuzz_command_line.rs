//! Fuzz target: `Command::parse` and `is_reset_line`
//!
//! cargo fuzz run fuzz_command_line

#![no_main]

use fanctl::update::Command;
use fanctl::update::command::is_reset_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let parsed = Command::parse(data);
    if is_reset_line(data) {
        assert_eq!(parsed, Some(Command::Reset));
    }
    if data.len() < 7 {
        assert_eq!(parsed, None);
    }
});
