use core_search::scan::Matcher;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

fn zero_padded(len: usize) -> Vec<u8> {
    let mut hay = vec![0u8; len];
    let tail = len - 4;
    hay[tail..].copy_from_slice(b"\xDE\xAD\x00\x00");
    hay
}

fn bench_word_skip(c: &mut Criterion) {
    let hay = zero_padded(1 << 20);
    let matcher = Matcher::new(b"\xDE\xAD\x00\x00");
    let mut group = c.benchmark_group("matcher");
    group.throughput(Throughput::Bytes(hay.len() as u64));
    group.bench_function("forward_zero_padding", |b| {
        b.iter(|| matcher.find_forward(black_box(&hay), 0))
    });
    group.bench_function("backward_zero_padding", |b| {
        b.iter(|| matcher.find_backward(black_box(&hay), 0))
    });
    group.bench_function("naive_forward", |b| {
        b.iter(|| {
            black_box(&hay)
                .windows(4)
                .position(|w| w == b"\xDE\xAD\x00\x00")
        })
    });
    group.finish();
}

criterion_group!(benches, bench_word_skip);
criterion_main!(benches);
