#![no_main]
use libfuzzer_sys::fuzz_target;
use proofgate_exec::{classify, Status};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let (code, text) = data.split_at(4);
    let exit_code = i32::from_le_bytes([code[0], code[1], code[2], code[3]]);
    let output = String::from_utf8_lossy(text);
    let result = classify(&output, exit_code);
    assert_eq!(
        result.success,
        matches!(result.status, Status::Success | Status::Unknown)
    );
    if result.status == Status::Success {
        assert!(!result.flags.has_parse_error && !result.flags.has_wellformedness_error);
    }
});
