#![no_main]

use libfuzzer_sys::fuzz_target;
use rclflow::event::EventLog;
use rclflow::session::TraceSession;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    // Any decodable log either builds a catalog or reports an ambiguous one
    if let Ok(log) = EventLog::parse_json_lines(input) {
        let _ = TraceSession::new(log);
    }
});
