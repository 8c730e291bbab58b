//! Fuzz the SCRAM client with arbitrary server-first messages.

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use mongo_auth::{FixedRandom, Password, SaslMechanism, ScramCache, ScramVersion};
use mongo_auth::scram::ScramMechanism;

const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
const MAX_ITERATIONS: u64 = 20_000;

fn iterations_too_high(message: &str) -> bool {
    message
        .split(',')
        .filter_map(|part| part.strip_prefix("i="))
        .any(|count| count.parse::<u64>().map_or(false, |n| n > MAX_ITERATIONS))
}

fuzz_target!(|data: &[u8]| {
    // Key derivation cost grows with the iteration count.
    if std::str::from_utf8(data).is_ok_and(iterations_too_high) {
        return;
    }

    let mut scram = ScramMechanism::new(
        ScramVersion::Sha256,
        "user",
        Password::new("pencil"),
        "admin",
        Arc::new(ScramCache::new()),
        Arc::new(FixedRandom::scram(CLIENT_NONCE)),
    );
    if scram.initialize().is_ok() {
        let _ = scram.transition(data);
    }
});
