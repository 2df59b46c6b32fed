#![no_main]

use libfuzzer_sys::fuzz_target;
use sitefind::index::Normalizer;
use sitefind::{HtmlFile, IndexConfig};

fuzz_target!(|data: &str| {
    // Arbitrary markup must normalize without panicking
    let Ok(normalizer) = Normalizer::new(&IndexConfig::default()) else {
        return;
    };
    let _ = normalizer.html_file(&HtmlFile {
        path: "fuzz/index.html".to_string(),
        content: data.to_string(),
    });
});
