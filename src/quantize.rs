//! Decimal helpers for values sent to the exchange
//!
//! Binance rejects long decimal expansions such as
//! `0.00200000000000000004163336342344337026588618755340576171875`, so every
//! price and quantity is quantized before it is serialized.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places used when sending prices and quantities
pub const WIRE_DECIMALS: u32 = 8;

/// Round to `decimals` places (banker's rounding) and pad with trailing zeros
pub fn quantize(value: Decimal, decimals: u32) -> Decimal {
    let mut quantized = value.round_dp(decimals);
    quantized.rescale(decimals);
    quantized
}

/// Text form sent on the wire
pub fn to_wire(value: Decimal) -> String {
    quantize(value, WIRE_DECIMALS).to_string()
}

/// Round down to a multiple of `step`, zero step leaves the value unchanged
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    ((value / step).round_dp_with_strategy(0, RoundingStrategy::ToNegativeInfinity) * step)
        .normalize()
}

/// Round up to a multiple of `step`, zero step leaves the value unchanged
pub fn ceil_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    ((value / step).round_dp_with_strategy(0, RoundingStrategy::ToPositiveInfinity) * step)
        .normalize()
}

/// Smallest increment representable on the wire
pub fn wire_unit() -> Decimal {
    Decimal::new(1, WIRE_DECIMALS)
}
