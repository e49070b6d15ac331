use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use message_channel::core::envelope::{MessageEnvelope, ReplyCode};
use message_channel::core::serialization::{MultiFormat, SerializationFormat};
use serde_json::{json, Value};

fn bench_envelope_msgpack(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_msgpack");
    let envelopes = vec![
        MessageEnvelope::request(1, "ping", Value::Null),
        MessageEnvelope::response(1, ReplyCode::Ok, json!({"pong": true}), None),
        MessageEnvelope::broadcast("tick", json!({"seq": 42})),
        MessageEnvelope::request(2, "upload", json!({"blob": "a".repeat(1024)})),
    ];

    group.bench_function("serialize", |b| {
        b.iter_batched(
            || envelopes.clone(),
            |envs| {
                for env in envs {
                    let _ = env
                        .serialize_format(SerializationFormat::MessagePack)
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });

    let blob = MessageEnvelope::request(2, "upload", json!({"blob": "a".repeat(1024)}))
        .serialize_format(SerializationFormat::MessagePack)
        .unwrap();
    group.bench_function("deserialize", |b| {
        b.iter(|| {
            let _ =
                MessageEnvelope::deserialize_format(&blob, SerializationFormat::MessagePack)
                    .unwrap();
        })
    });

    group.finish();
}

fn bench_envelope_classify(c: &mut Criterion) {
    let envelopes = vec![
        MessageEnvelope::request(1, "ping", Value::Null),
        MessageEnvelope::response(1, ReplyCode::Ok, Value::Null, None),
        MessageEnvelope::broadcast("tick", Value::Null),
        MessageEnvelope::ready("key"),
    ];

    c.bench_function("envelope_classify", |b| {
        b.iter(|| {
            for env in &envelopes {
                let _ = env.kind();
            }
        })
    });
}

criterion_group!(benches, bench_envelope_msgpack, bench_envelope_classify);
criterion_main!(benches);
