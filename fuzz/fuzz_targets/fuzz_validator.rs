#![no_main]

use libfuzzer_sys::fuzz_target;
use message_channel::core::envelope::MessageEnvelope;
use message_channel::protocol::validator;

fuzz_target!(|data: &[u8]| {
    // The validation boundary must never panic on arbitrary envelopes
    let Ok(env) = serde_json::from_slice::<MessageEnvelope>(data) else {
        return;
    };

    let _ = validator::check_structure(&env);
    let _ = validator::check_size(&env, 1024 * 1024);
    let _ = validator::check_origin(env.origin.as_deref(), "https://app.example.com");
    if let Some(key) = env.peer_key.as_deref() {
        let _ = validator::check_peer_key(Some(key), "expected-key");
    }
});
