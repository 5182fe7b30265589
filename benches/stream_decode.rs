use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chatbridge::adapter::for_provider;
use chatbridge::protocol::canonical::{
    CanonicalMessage, CanonicalRequest, CanonicalRole, ProviderKind, ResponseMeta, StreamState,
};
use chatbridge::protocol::kiro::eventstream::encode_event;
use chatbridge::protocol::openai_chat::encoder::encode_chunk;

const EVENTS: usize = 256;

fn meta() -> ResponseMeta {
    ResponseMeta::new("chatcmpl-bench", "bench-model", 1_700_000_000)
}

fn gemini_body() -> Vec<u8> {
    let mut body = String::new();
    for i in 0..EVENTS {
        body.push_str(&format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":\"token {i} \"}}]}}}}]}}\n\n"
        ));
    }
    body.push_str("data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\".\"}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":8,\"candidatesTokenCount\":257,\"totalTokenCount\":265}}\n\n");
    body.into_bytes()
}

fn anthropic_body() -> Vec<u8> {
    let mut body = String::from(
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg\",\"usage\":{\"input_tokens\":8,\"output_tokens\":1}}}\n\n\
         event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
    );
    for i in 0..EVENTS {
        body.push_str(&format!(
            "event: content_block_delta\ndata: {{\"type\":\"content_block_delta\",\"index\":0,\"delta\":{{\"type\":\"text_delta\",\"text\":\"token {i} \"}}}}\n\n"
        ));
    }
    body.push_str("event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":256}}\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    body.into_bytes()
}

fn kiro_body() -> Vec<u8> {
    let mut body = Vec::new();
    for i in 0..EVENTS {
        let payload = format!("{{\"content\":\"token {i} \"}}");
        body.extend_from_slice(&encode_event("assistantResponseEvent", payload.as_bytes()));
    }
    body
}

/// Feed `body` in `split`-byte slices and encode every chunk, the way the
/// pipeline does per upstream read.
fn decode_and_encode(kind: ProviderKind, body: &[u8], split: usize) -> usize {
    let mut decoder = for_provider(kind).stream_decoder(StreamState::new(&meta()));
    let mut chunks = Vec::new();
    let mut encoded = 0usize;
    for piece in body.chunks(split) {
        if decoder.feed(piece, &mut chunks).is_err() {
            return encoded;
        }
        for chunk in chunks.drain(..) {
            encoded += encode_chunk(&chunk, decoder.state()).map_or(0, |json| json.len());
        }
    }
    let _ = decoder.finish(&mut chunks);
    for chunk in chunks.drain(..) {
        encoded += encode_chunk(&chunk, decoder.state()).map_or(0, |json| json.len());
    }
    encoded
}

fn bench_stream_decode(c: &mut Criterion) {
    let gemini = gemini_body();
    let anthropic = anthropic_body();
    let kiro = kiro_body();

    c.bench_function("gemini_sse_decode_256_events_4k_reads", |b| {
        b.iter(|| decode_and_encode(ProviderKind::Gemini, black_box(&gemini), 4096));
    });
    c.bench_function("anthropic_sse_decode_256_events_4k_reads", |b| {
        b.iter(|| decode_and_encode(ProviderKind::Anthropic, black_box(&anthropic), 4096));
    });
    c.bench_function("kiro_eventstream_decode_256_events_4k_reads", |b| {
        b.iter(|| decode_and_encode(ProviderKind::Kiro, black_box(&kiro), 4096));
    });
    c.bench_function("kiro_eventstream_decode_256_events_7b_reads", |b| {
        b.iter(|| decode_and_encode(ProviderKind::Kiro, black_box(&kiro), 7));
    });
}

fn bench_request_build(c: &mut Criterion) {
    let mut messages = vec![CanonicalMessage::text(CanonicalRole::System, "be helpful")];
    for i in 0..32 {
        let role = if i % 2 == 0 {
            CanonicalRole::User
        } else {
            CanonicalRole::Assistant
        };
        messages.push(CanonicalMessage::text(role, format!("turn {i} with some text")));
    }
    let request = CanonicalRequest::new("bench-model", messages);

    for kind in [ProviderKind::Gemini, ProviderKind::Anthropic, ProviderKind::Kiro] {
        let adapter = for_provider(kind);
        c.bench_function(&format!("{kind}_build_32_turns"), |b| {
            let mut rng = fastrand::Rng::with_seed(1);
            b.iter(|| adapter.build(black_box(&request), &mut rng).map(|built| built.path.len()));
        });
    }
}

criterion_group!(benches, bench_stream_decode, bench_request_build);
criterion_main!(benches);
