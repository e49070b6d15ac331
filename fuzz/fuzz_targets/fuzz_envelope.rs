#![no_main]

use libfuzzer_sys::fuzz_target;
use message_channel::core::envelope::MessageEnvelope;
use message_channel::core::serialization::MultiFormat;

fuzz_target!(|data: &[u8]| {
    // Fuzz envelope deserialization across every wire format
    if let Ok((env, format)) = MessageEnvelope::deserialize_with_header(data) {
        let _ = env.kind();
        let _ = env.payload_size();

        // If deserialization succeeds, test serialization roundtrip
        if let Ok(serialized) = env.serialize_with_header(format) {
            let _ = MessageEnvelope::deserialize_with_header(&serialized);
        }
    }
});
