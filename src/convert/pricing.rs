use tracing::warn;

/// Scales `base` by `multiplier` and snaps the result to the `.99` just
/// below the next multiple of ten (33.43 × 4 = 133.72 → 139.99).
///
/// A zero, negative or non-finite base yields 0, as does a product too
/// large to represent.
pub fn transform_price(base: f64, multiplier: f64) -> f64 {
    if !base.is_finite() || base <= 0.0 {
        return 0.0;
    }
    // Snap to cents first so float noise (2.5 × 4 = 10.000000000000002)
    // does not push an exact multiple of ten into the next bracket.
    let scaled = round_cents(base * multiplier);
    if !scaled.is_finite() {
        warn!(target = "forge.convert", base, multiplier, "price_overflow");
        return 0.0;
    }
    if scaled <= 0.0 {
        return 0.0;
    }
    let tens = (scaled / 10.0).ceil();
    (tens * 1000.0 - 1.0) / 100.0
}

/// Renders a transformed price the way the listing sheet expects it.
pub fn format_price(price: f64) -> String {
    if price == 0.0 {
        "0".to_string()
    } else {
        format!("{price:.2}")
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
