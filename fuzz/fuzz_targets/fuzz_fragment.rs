#![no_main]

use libfuzzer_sys::fuzz_target;
use sitefind::utils::{ByteReader, FragmentKind, open_fragment};

fuzz_target!(|data: &[u8]| {
    // Decoding untrusted fragments returns errors, never panics
    if let Ok(payload) = open_fragment(data, FragmentKind::Index) {
        let mut reader = ByteReader::new(payload);
        while reader.delta_list().is_ok() && !reader.is_empty() {}
    }
    let mut reader = ByteReader::new(data);
    let _ = reader.str();
    let _ = reader.delta_list();
});
