/// Unsigned fixed-point quantizer for the RTC increment value.
///
/// A value `v` is represented as `round(v * 2^F)` in a register of
/// `total_bits` bits, `frc_bits` of which are fractional. Rounding is to
/// nearest, ties to even; out-of-range values saturate.
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    scale: f64,
    max_repr: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantized {
    pub value: f64,
    pub saturated: bool,
}

impl Quantizer {
    pub fn new(total_bits: u32, frc_bits: u32) -> Self {
        debug_assert!(frc_bits < total_bits && total_bits <= 63);
        Quantizer {
            scale: (1u64 << frc_bits) as f64,
            max_repr: (1u64 << total_bits) - 1,
        }
    }

    pub fn quantize(&self, v: f64) -> Quantized {
        let raw = (v * self.scale).round_ties_even();
        if raw < 0.0 {
            Quantized { value: 0.0, saturated: true }
        } else if raw > self.max_repr as f64 {
            Quantized { value: self.max_repr as f64 / self.scale, saturated: true }
        } else {
            Quantized { value: raw / self.scale, saturated: false }
        }
    }

    /// Resolution of the fractional part in the quantized unit.
    pub fn lsb(&self) -> f64 {
        1.0 / self.scale
    }
}
