//! Fixed-scale scalar quantization of embedding components.
//!
//! Components produced by the embedding model are normalized and lie in
//! `[-1.0, 1.0]`. Each one is multiplied by [`QUANTIZATION_SCALE`], rounded
//! to the nearest integer and clamped to `[-127, 127]`, giving a 1-byte
//! representation. The scale is global: nothing is stored next to the
//! quantized matrix, and ranking only depends on vector direction.

/// Multiplier mapping a unit component onto the signed byte range.
pub const QUANTIZATION_SCALE: f32 = 127.0;

/// Largest magnitude a quantized component can take.
///
/// `-128` is never produced so the range stays symmetric around zero.
pub const QUANTIZED_MAX: i8 = 127;

/// Quantizes a single component.
///
/// NaN maps to `0`; infinities and out-of-range values saturate.
#[inline]
#[must_use]
pub fn quantize_component(value: f32) -> i8 {
    let max = f32::from(QUANTIZED_MAX);
    // A NaN survives `clamp`, and the saturating `as` cast turns it into 0.
    (value * QUANTIZATION_SCALE).round().clamp(-max, max) as i8
}

/// Quantizes a flat sequence of components.
#[must_use]
pub fn quantize(values: &[f32]) -> Vec<i8> {
    values.iter().copied().map(quantize_component).collect()
}

/// Maps quantized components back onto `[-1.0, 1.0]`. Lossy.
#[must_use]
pub fn dequantize(values: &[i8]) -> Vec<f32> {
    values
        .iter()
        .map(|&q| f32::from(q) / QUANTIZATION_SCALE)
        .collect()
}
