//! Fuzz target for IPC JSON message decoding.
//!
//! Arbitrary bytes must decode to a message or an error, never a panic.

#![no_main]

use gg_residency::ipc::{decode_message, DEFAULT_MAX_MESSAGE_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(gg_residency::ipc::IpcMessage::SynthesizeRequest(request)) =
        decode_message(data, DEFAULT_MAX_MESSAGE_SIZE)
    {
        let _ = request.parameters.validate(&request.text);
    }
});
