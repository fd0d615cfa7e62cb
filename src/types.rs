use fixed::types::I32F32;

/// Millimetre length stored as fixed-point, rounded to 1/1000 mm.
///
/// Layout arithmetic stays deterministic across platforms: every value is
/// quantized to integer milli-millimetres, so repeated cursor advances never
/// accumulate float drift between runs.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Mm(I32F32);

impl Mm {
    pub const ZERO: Mm = Mm(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Mm {
        if !value.is_finite() {
            return Mm::ZERO;
        }
        let milli = (value as f64 * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Mm::from_milli_i64(milli)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_milli_i64(milli: i64) -> Mm {
        Mm::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Mm {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Mm(I32F32::from_bits(bits))
    }

    pub fn max(self, other: Mm) -> Mm {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Mm) -> Mm {
        if self <= other { self } else { other }
    }
}

impl std::ops::Add for Mm {
    type Output = Mm;
    fn add(self, rhs: Mm) -> Mm {
        Mm::from_milli_i128(self.to_milli_i64() as i128 + rhs.to_milli_i64() as i128)
    }
}

impl std::ops::AddAssign for Mm {
    fn add_assign(&mut self, rhs: Mm) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Mm {
    type Output = Mm;
    fn sub(self, rhs: Mm) -> Mm {
        Mm::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

impl std::ops::SubAssign for Mm {
    fn sub_assign(&mut self, rhs: Mm) {
        *self = *self - rhs;
    }
}

impl std::ops::Mul<i32> for Mm {
    type Output = Mm;
    fn mul(self, rhs: i32) -> Mm {
        let milli = self.to_milli_i64() as i128;
        Mm::from_milli_i128(milli.saturating_mul(rhs as i128))
    }
}

impl std::ops::Mul<f32> for Mm {
    type Output = Mm;
    fn mul(self, rhs: f32) -> Mm {
        if !rhs.is_finite() {
            return Mm::ZERO;
        }
        Mm::from_f32(self.to_f32() * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Mm,
    pub height: Mm,
}

impl Size {
    pub fn a4() -> Self {
        Self::from_mm(210.0, 297.0)
    }

    pub fn letter() -> Self {
        // 8.5in x 11in.
        Self::from_mm(215.9, 279.4)
    }

    pub fn from_mm(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width: Mm::from_f32(width_mm),
            height: Mm::from_f32(height_mm),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Mm,
    pub right: Mm,
    pub bottom: Mm,
    pub left: Mm,
}

impl Margins {
    pub fn all(value: f32) -> Self {
        let v = Mm::from_f32(value);
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    pub fn to_rgb8(self) -> (u8, u8, u8) {
        let quant = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        (quant(self.r), quant(self.g), quant(self.b))
    }
}

/// Report color palette.
pub mod palette {
    use super::Color;

    /// Report title and classification label.
    pub const HEADER: Color = Color::rgb8(0, 53, 128);
    /// Body headings and file names.
    pub const TEXT: Color = Color::rgb8(38, 38, 38);
    /// Metadata, footers, and long-form paragraphs.
    pub const MUTED: Color = Color::rgb8(107, 107, 107);
    /// Confidence at or above the affirmative threshold.
    pub const AFFIRMATIVE: Color = Color::rgb8(0, 128, 9);
    /// Confidence between the cautionary and affirmative thresholds.
    pub const CAUTIONARY: Color = Color::rgb8(255, 183, 0);
    /// Confidence below the cautionary threshold.
    pub const NEGATIVE: Color = Color::rgb8(204, 0, 0);
    /// Per-document separator rule.
    pub const SEPARATOR: Color = Color::rgb8(231, 231, 231);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_round_trips_through_milli() {
        let v = Mm::from_f32(120.0);
        assert_eq!(v.to_milli_i64(), 120_000);
        assert_eq!(Mm::from_milli_i64(120_000), v);
    }

    #[test]
    fn mm_addition_is_exact_in_milli() {
        let mut cursor = Mm::from_f32(20.0);
        for _ in 0..50 {
            cursor += Mm::from_f32(5.0);
        }
        assert_eq!(cursor.to_milli_i64(), 270_000);
    }

    #[test]
    fn non_finite_inputs_collapse_to_zero() {
        assert_eq!(Mm::from_f32(f32::NAN), Mm::ZERO);
        assert_eq!(Mm::from_f32(f32::INFINITY), Mm::ZERO);
    }

    #[test]
    fn color_quantization() {
        let (r, g, b) = palette::HEADER.to_rgb8();
        assert_eq!((r, g, b), (0, 53, 128));
    }
}
