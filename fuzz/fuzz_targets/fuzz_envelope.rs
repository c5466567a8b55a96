#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    // Anything that decodes must encode to a frame that decodes back to it.
    if let Ok(msg) = broadside_client::decode(raw) {
        let encoded = broadside_client::encode(&msg).ok();
        let again = encoded.as_deref().map(broadside_client::decode);
        assert!(matches!(again, Some(Ok(ref m)) if *m == msg));
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = broadside_client::event::validate(&value);
    }
});
