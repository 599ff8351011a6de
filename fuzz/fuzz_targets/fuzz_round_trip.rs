#![no_main]

use flowsink_core::decode::{Framing, MessageDecoder};
use flowsink_core::ingest;
use libfuzzer_sys::fuzz_target;

/// Feeds arbitrary bytes through the length-framing decoder first, then
/// each reassembled message through header/set parsing, the way a live
/// TCP/TLS stream would.
fuzz_target!(|data: &[u8]| {
    let Some(framing) = Framing::detect(data) else {
        return;
    };
    let mut decoder = MessageDecoder::new(framing, 65535);
    if decoder.feed(data).is_err() {
        return;
    }
    while let Ok(Some(message)) = decoder.next_message() {
        let Ok((header, body)) = ingest::parse_header(&message) else {
            continue;
        };
        let _ = ingest::parse_sets(body, header.version);
    }
});
