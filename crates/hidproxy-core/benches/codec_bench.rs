//! Criterion benchmarks for the keydef codec and the macro text format.
//!
//! Run with:
//! ```bash
//! cargo bench --package hidproxy-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hidproxy_core::domain::{KeyboardReport, Keydef, MacroAction, MAX_ACTIONS};
use hidproxy_core::protocol::codec::{decode_keydef, encode_keydef};
use hidproxy_core::protocol::text::{parse_macros, serialize_macros};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_single_key() -> Keydef {
    Keydef::with_actions(
        0x3A,
        false,
        vec![MacroAction::Hid(KeyboardReport::key(0, 0x05))],
    )
    .expect("valid keydef")
}

fn make_full_typed() -> Keydef {
    let actions = (0..MAX_ACTIONS)
        .map(|i| {
            if i % 2 == 0 {
                MacroAction::Hid(KeyboardReport::key(0, 0x04 + (i % 26) as u8))
            } else {
                MacroAction::Hid(KeyboardReport::RELEASE_ALL)
            }
        })
        .collect();
    Keydef::with_actions(0x04, true, actions).expect("valid keydef")
}

fn make_mixed() -> Keydef {
    Keydef::with_actions(
        0x05,
        true,
        vec![
            MacroAction::Hid(KeyboardReport::key(0x01, 0x06)),
            MacroAction::mqtt("home/office/lights", "toggle").expect("short fields"),
            MacroAction::Delay { millis: 100 },
            MacroAction::Hid(KeyboardReport::RELEASE_ALL),
        ],
    )
    .expect("valid keydef")
}

fn macro_file() -> String {
    let mut text = String::new();
    for (i, name) in ["F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8"].iter().enumerate() {
        text.push_str(&format!(
            "[public] {name} {{ \"macro number {i}\" ENTER ^c [02:04] }}\n"
        ));
    }
    text
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_keydef_codec(c: &mut Criterion) {
    let defs: &[(&str, Keydef)] = &[
        ("single_key", make_single_key()),
        ("full_typed_64", make_full_typed()),
        ("mixed", make_mixed()),
    ];

    let mut group = c.benchmark_group("keydef_codec");
    for (name, def) in defs {
        group.bench_with_input(BenchmarkId::new("encode", name), def, |b, def| {
            b.iter(|| encode_keydef(black_box(def)))
        });
        let bytes = encode_keydef(def);
        group.bench_with_input(BenchmarkId::new("decode", name), &bytes, |b, bytes| {
            b.iter(|| decode_keydef(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

fn bench_text_format(c: &mut Criterion) {
    let text = macro_file();
    let defs = parse_macros(&text).expect("fixture parses");

    let mut group = c.benchmark_group("macro_text");
    group.bench_function("parse_8_defs", |b| {
        b.iter(|| parse_macros(black_box(&text)).expect("parse must succeed"))
    });
    group.bench_function("serialize_8_defs", |b| {
        b.iter(|| serialize_macros(black_box(&defs)))
    });
    group.finish();
}

criterion_group!(benches, bench_keydef_codec, bench_text_format);
criterion_main!(benches);
