#![no_main]

use enough::Unstoppable;
use libfuzzer_sys::fuzz_target;
use zenchunk_parse::{FormatKind, ParseConfig};

fuzz_target!(|data: &[u8]| {
    let Some(kind) = FormatKind::detect(data) else {
        return;
    };
    let config = ParseConfig::default()
        .with_peak_memory_limit(1 << 20)
        .with_max_records(1_000)
        .with_max_ifds(16)
        .with_max_nesting_depth(8);
    let _ = zenchunk_parse::analyze_with_config(kind, data, &config, &Unstoppable);
});
