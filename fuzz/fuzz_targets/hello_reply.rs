//! Fuzz the `hello` reply parser with arbitrary BSON documents.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mongo_protocol::HelloResult;

fuzz_target!(|data: &[u8]| {
    if let Ok(document) = bson::Document::from_reader(data) {
        let _ = HelloResult::parse(document);
    }
});
