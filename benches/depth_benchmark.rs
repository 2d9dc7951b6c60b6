//! Benchmarks for depth summarization

use binance_testnet_tool::depth::{summarize, AssetPair, Side};
use binance_testnet_tool::parser::{OrderBookSnapshot, PriceLevel};
use binance_testnet_tool::quantize::{ceil_to_step, to_wire};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Snapshot with levels deliberately out of price order
fn create_snapshot(levels: usize) -> OrderBookSnapshot {
    let quantity = Decimal::from_str("0.015").unwrap();
    let bids: Vec<PriceLevel> = (0..levels)
        .map(|i| PriceLevel::new(Decimal::from(26000 - ((i * 7) % levels) as i64), quantity))
        .collect();
    let asks: Vec<PriceLevel> = (0..levels)
        .map(|i| PriceLevel::new(Decimal::from(26001 + ((i * 7) % levels) as i64), quantity))
        .collect();

    OrderBookSnapshot {
        last_update_id: 1000,
        bids,
        asks,
    }
}

fn benchmark_summarize(c: &mut Criterion) {
    let assets = AssetPair::new("BTC", "USDT");

    for levels in [100, 5000] {
        let snapshot = create_snapshot(levels);

        c.bench_function(&format!("summarize_asks_{}_levels", levels), |b| {
            b.iter(|| black_box(summarize(black_box(&snapshot.asks), Side::Ask, &assets)))
        });

        c.bench_function(&format!("summarize_bids_{}_levels", levels), |b| {
            b.iter(|| black_box(summarize(black_box(&snapshot.bids), Side::Bid, &assets)))
        });
    }
}

fn benchmark_quantize(c: &mut Criterion) {
    let value = Decimal::from_str("0.30500000000000002").unwrap();
    let step = Decimal::from_str("0.00001").unwrap();

    c.bench_function("ceil_to_step", |b| {
        b.iter(|| black_box(ceil_to_step(black_box(value), step)))
    });

    c.bench_function("to_wire", |b| b.iter(|| black_box(to_wire(black_box(value)))));
}

criterion_group!(benches, benchmark_summarize, benchmark_quantize);
criterion_main!(benches);
