#![no_main]

use libfuzzer_sys::fuzz_target;
use rclflow::filter::QueryFilter;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Malformed expressions must be rejected, never panic
        if let Ok(filter) = QueryFilter::from_expr(input) {
            let _ = (filter.node(), filter.topic(), filter.period());
        }
    }
});
