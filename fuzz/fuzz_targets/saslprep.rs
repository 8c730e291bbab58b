//! Fuzz SASLprep normalization.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mongo_auth::saslprep::saslprep;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(prepared) = saslprep(input) {
            // Preparation is idempotent.
            assert_eq!(saslprep(&prepared).ok().as_deref(), Some(&*prepared));
        }
    }
});
