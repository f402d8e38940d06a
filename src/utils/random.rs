use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Uniform draw from `[low, high]`, rounded to `dp` decimal places
pub fn uniform_decimal<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64, dp: u32) -> Decimal {
    let value = if high > low {
        rng.gen_range(low..=high)
    } else {
        low
    };
    Decimal::from_f64(value).unwrap_or_default().round_dp(dp)
}

/// Bernoulli trial, probability clamped to `[0, 1]`
pub fn chance<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    if probability.is_nan() {
        return false;
    }
    rng.gen_bool(probability.clamp(0.0, 1.0))
}
