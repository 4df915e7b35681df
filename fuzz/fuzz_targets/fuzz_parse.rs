#![no_main]

// Every format must finish on arbitrary input without panicking, whatever the
// first bytes claim to be.

use libfuzzer_sys::fuzz_target;
use zenchunk_parse::FormatKind;

const KINDS: [FormatKind; 5] = [FormatKind::Aiff, FormatKind::Wave, FormatKind::Tiff, FormatKind::Jpeg, FormatKind::Jpeg2000];

fuzz_target!(|data: &[u8]| {
    for kind in KINDS {
        if let Ok(result) = zenchunk_parse::analyze(kind, data) {
            // Malformed input is never valid.
            if !result.well_formed().is_true() {
                assert!(!result.valid().is_true());
            }
        }
    }
    if let Some(kind) = FormatKind::detect(data) {
        let buffered = zenchunk_parse::analyze(kind, data);
        let streamed = zenchunk_parse::analyze_stream(kind, data);
        if let (Ok(buffered), Ok(streamed)) = (buffered, streamed) {
            assert_eq!(buffered.well_formed(), streamed.well_formed());
        }
    }
});
