//! 热路径基准测试
//!
//! 状态字解析、出站缓冲刷新、按节点 ID 分发。

use canmotion_can::MockBus;
use canmotion_sdk::driver::{CanBusSharer, CanSender, HandlerRegistry, TxBuffer};
use canmotion_sdk::protocol::{CanFrame, parse_statusword};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

struct CountingNode {
    id: u8,
    frames: AtomicU64,
}

impl CanBusSharer for CountingNode {
    fn id(&self) -> u8 {
        self.id
    }

    fn register_sender(&self, _sender: Arc<dyn CanSender>) {}

    fn notify_message(&self, _frame: &CanFrame) -> bool {
        self.frames.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn initialize(&self) -> bool {
        true
    }

    fn finalize(&self) -> bool {
        true
    }
}

fn bench_parse_statusword(c: &mut Criterion) {
    let words: Vec<u16> = (0..1024).map(|_| rand::random::<u16>()).collect();

    c.bench_function("parse_statusword_1024", |b| {
        b.iter(|| {
            for &word in &words {
                black_box(parse_statusword(black_box(word)));
            }
        })
    });
}

fn bench_tx_flush(c: &mut Criterion) {
    let bus = MockBus::new();
    let buffer = TxBuffer::new(64);

    c.bench_function("tx_buffer_flush_32", |b| {
        b.iter_batched(
            || {
                bus.take_written();
                for i in 0..32u16 {
                    buffer.prepare(CanFrame::new(0x200 + (i % 8), &[0x0F, 0x00]));
                }
                bus.clone()
            },
            |mut handle| black_box(buffer.flush(&mut handle)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_registry_dispatch(c: &mut Criterion) {
    let mut registry = HandlerRegistry::new();
    for id in 1..=8u8 {
        let node = Arc::new(CountingNode {
            id,
            frames: AtomicU64::new(0),
        });
        let _ = registry.register(node);
    }
    let frames: Vec<CanFrame> = (0..256u16)
        .map(|i| CanFrame::new(0x180 + (i % 10), &[0x37, 0x02, 0, 0, 1]))
        .collect();

    c.bench_function("registry_dispatch_256", |b| {
        b.iter(|| {
            for frame in &frames {
                black_box(registry.dispatch(frame));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_parse_statusword,
    bench_tx_flush,
    bench_registry_dispatch
);
criterion_main!(benches);
