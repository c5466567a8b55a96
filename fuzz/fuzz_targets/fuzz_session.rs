#![no_main]

use broadside_client::MatchSession;
use libfuzzer_sys::fuzz_target;

// Newline-separated frames folded into one session. A rejected frame must
// leave the stored state untouched.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut session = MatchSession::default();
    for frame in text.lines() {
        let before: Vec<_> = session
            .store()
            .match_ids()
            .filter_map(|id| session.current_state(id).cloned())
            .collect();
        if session.ingest(frame).is_err() {
            let after: Vec<_> = before
                .iter()
                .filter_map(|s| session.current_state(s.match_id()).cloned())
                .collect();
            assert_eq!(before, after);
            assert_eq!(before.len(), session.store().len());
        }
    }
});
