#![no_main]

use libfuzzer_sys::fuzz_target;
use sitefind::utils::{MAX_TOKEN_LENGTH, tokenize, unique_words};

fuzz_target!(|data: &str| {
    // Positions are dense and tokens never empty or oversized
    for (i, token) in tokenize(data).enumerate() {
        assert_eq!(token.position as usize, i);
        assert!(!token.word.is_empty());
        assert!(token.word.len() <= MAX_TOKEN_LENGTH);
    }
    let _ = unique_words(data);
});
