//! Fuzz target for length-prefixed frame reading.
//!
//! A hostile length prefix must be rejected before any allocation.

#![no_main]

use gg_residency::ipc::{read_frame, MIN_MESSAGE_SIZE_LIMIT};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(_) => return,
    };
    let mut reader = data;
    runtime.block_on(async {
        while let Ok(Some(frame)) = read_frame(&mut reader, MIN_MESSAGE_SIZE_LIMIT).await {
            assert!(frame.len() <= MIN_MESSAGE_SIZE_LIMIT);
        }
    });
});
