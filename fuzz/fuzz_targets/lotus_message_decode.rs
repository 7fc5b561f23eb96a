#![no_main]

use libfuzzer_sys::fuzz_target;
use musig2_lotus_router::messages::LotusMessage;

fuzz_target!(|data: &[u8]| {
    // decode must never panic on untrusted relay content — it should always
    // return Ok or Err.
    if let Ok(msg) = LotusMessage::decode(data) {
        let _ = msg.encode();
    }
});
