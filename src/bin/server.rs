//! Memory bridge dashboard binary.
//! Run with: cargo run --bin memos-bridge

use std::process::ExitCode;

use memos_bridge::start_bridge;

fn main() -> ExitCode {
    start_bridge::run()
}
