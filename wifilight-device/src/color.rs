//! Color conversion utilities

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// An RGB color with an optional white channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgbw {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: Option<u8>,
}

impl Rgbw {
    pub const BLACK: Rgbw = Rgbw::rgb(0, 0, 0);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white: None,
        }
    }

    pub const fn rgbw(red: u8, green: u8, blue: u8, white: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white: Some(white),
        }
    }

    pub fn with_white(self, white: Option<u8>) -> Self {
        Self { white, ..self }
    }

    pub fn is_black(&self) -> bool {
        self.red == 0 && self.green == 0 && self.blue == 0 && self.white.unwrap_or(0) == 0
    }
}

/// Hue in degrees [0, 360), saturation and value in percent [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hsv {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

/// Round and clamp a channel value into 0..=255
pub fn clamp_channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert RGB to HSV; every component is floored
pub fn rgb_to_hsv(color: Rgbw) -> Hsv {
    let r = color.red as f64 / 255.0;
    let g = color.green as f64 / 255.0;
    let b = color.blue as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let d = max - min;
    let s = if max == 0.0 { 0.0 } else { d / max };

    let sector = if d == 0.0 {
        0.0
    } else if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    let h = sector / 6.0;

    Hsv {
        hue: ((h * 360.0).floor() as u16) % 360,
        saturation: (s * 100.0).floor() as u8,
        value: (max * 100.0).floor() as u8,
    }
}

/// Convert HSV to RGB, rounding and clamping each channel
pub fn hsv_to_rgb(hsv: Hsv) -> Rgbw {
    let h = (hsv.hue % 360) as f64 / 60.0;
    let s = hsv.saturation.min(100) as f64 / 100.0;
    let v = hsv.value.min(100) as f64 / 100.0;

    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    let (r, g, b) = match i as u8 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    Rgbw::rgb(
        clamp_channel(r * 255.0),
        clamp_channel(g * 255.0),
        clamp_channel(b * 255.0),
    )
}

/// Convert a color temperature in Kelvin to RGB
///
/// Supports temperatures between 1000K and 40000K, values outside are clamped.
pub fn kelvin_to_rgb(kelvin: u32) -> Rgbw {
    let temp = (kelvin as f64 / 100.0).clamp(10.0, 400.0);

    let (red, green, blue) = if temp < 66.0 {
        let g = temp - 2.0;
        let green = -155.254_855_627_091_8 - 0.445_969_504_695_791_3 * g + 104.492_161_993_938_9 * g.ln();
        let blue = if temp <= 20.0 {
            0.0
        } else {
            let b = temp - 10.0;
            -254.769_351_841_209 + 0.827_409_606_400_739_5 * b + 115.679_944_010_661_5 * b.ln()
        };
        (255.0, green, blue)
    } else {
        let r = temp - 55.0;
        let red = 351.976_905_668_056_9 + 0.114_206_453_784_165 * r - 40.253_663_093_321_27 * r.ln();
        let g = temp - 50.0;
        let green = 325.449_412_571_197_4 + 0.079_434_565_366_623_42 * g - 28.085_296_350_795_7 * g.ln();
        (red, green, 255.0)
    };

    Rgbw::rgb(clamp_channel(red), clamp_channel(green), clamp_channel(blue))
}

/// Map the 0..=5000 `ct` scale of the command interface onto 1000..=40000 K
pub fn ct_scale_to_kelvin(ct: u32) -> u32 {
    ct.min(5000) * (40_000 - 1000) / 5000 + 1000
}

/// Parse `#rrggbb`, `#rrggbbww` or either followed by `.f`, a fraction every
/// channel is multiplied by (`#ff0000.5` is half red). The `#` is optional.
pub fn parse_hex_color(input: &str) -> Result<Rgbw, ParseError> {
    let err = || ParseError::HexColor(input.to_string());
    let s = input.trim();
    let (digits, fraction) = match s.split_once('.') {
        Some((d, f)) => (d, Some(f)),
        None => (s, None),
    };
    let digits = digits.strip_prefix('#').unwrap_or(digits);
    if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
        return Err(err());
    }

    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| err());
    let mut color = Rgbw::rgb(channel(0)?, channel(2)?, channel(4)?);
    if digits.len() == 8 {
        color.white = Some(channel(6)?);
    }

    if let Some(f) = fraction {
        if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let m: f64 = format!("0.{}", f).parse().map_err(|_| err())?;
        let scale = |c: u8| clamp_channel(c as f64 * m);
        color = Rgbw {
            red: scale(color.red),
            green: scale(color.green),
            blue: scale(color.blue),
            white: color.white.map(scale),
        };
    }
    Ok(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_hsv() {
        assert_eq!(
            rgb_to_hsv(Rgbw::rgb(255, 0, 0)),
            Hsv { hue: 0, saturation: 100, value: 100 }
        );
        assert_eq!(rgb_to_hsv(Rgbw::rgb(0, 0, 255)).hue, 240);
        assert_eq!(rgb_to_hsv(Rgbw::rgb(255, 128, 0)).hue, 30);
        assert_eq!(rgb_to_hsv(Rgbw::BLACK), Hsv::default());
    }

    #[test]
    fn test_hsv_to_rgb() {
        let hsv = |hue, saturation, value| Hsv { hue, saturation, value };
        // Red
        assert_eq!(hsv_to_rgb(hsv(0, 100, 100)), Rgbw::rgb(255, 0, 0));
        // Green
        assert_eq!(hsv_to_rgb(hsv(120, 100, 100)), Rgbw::rgb(0, 255, 0));
        // Blue
        assert_eq!(hsv_to_rgb(hsv(240, 100, 100)), Rgbw::rgb(0, 0, 255));
        // White (no saturation)
        assert_eq!(hsv_to_rgb(hsv(0, 0, 100)), Rgbw::rgb(255, 255, 255));
        // Black (no value)
        assert_eq!(hsv_to_rgb(hsv(0, 100, 0)), Rgbw::BLACK);
    }

    #[test]
    fn test_hsv_round_trip_within_quantisation() {
        // Flooring to whole percent loses up to ~2.55 per channel in v and
        // more through s, so the bound is 6 rather than 1.
        for r in (0..=255u8).step_by(3) {
            for g in (0..=255u8).step_by(3) {
                for b in (0..=255u8).step_by(3) {
                    let c = Rgbw::rgb(r, g, b);
                    let back = hsv_to_rgb(rgb_to_hsv(c));
                    let err = [
                        (back.red as i16 - r as i16).abs(),
                        (back.green as i16 - g as i16).abs(),
                        (back.blue as i16 - b as i16).abs(),
                    ];
                    assert!(err.iter().all(|e| *e <= 6), "{:?} -> {:?}", c, back);
                }
            }
        }
    }

    #[test]
    fn test_kelvin_to_rgb() {
        assert_eq!(kelvin_to_rgb(1000), Rgbw::rgb(255, 58, 0));
        assert_eq!(kelvin_to_rgb(2700), Rgbw::rgb(255, 170, 87));
        assert_eq!(kelvin_to_rgb(40_000), Rgbw::rgb(156, 189, 255));
        // Out of range is clamped
        assert_eq!(kelvin_to_rgb(500), kelvin_to_rgb(1000));
        assert_eq!(kelvin_to_rgb(100_000), kelvin_to_rgb(40_000));
    }

    #[test]
    fn test_kelvin_neutral_white() {
        let c = kelvin_to_rgb(6600);
        for ch in [c.red, c.green, c.blue] {
            assert!(ch >= 245, "{:?}", c);
        }
    }

    #[test]
    fn test_ct_scale() {
        assert_eq!(ct_scale_to_kelvin(0), 1000);
        assert_eq!(ct_scale_to_kelvin(2500), 20_500);
        assert_eq!(ct_scale_to_kelvin(5000), 40_000);
        assert_eq!(ct_scale_to_kelvin(9000), 40_000);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ff8000").unwrap(), Rgbw::rgb(255, 128, 0));
        assert_eq!(parse_hex_color("0a0b0c0d").unwrap(), Rgbw::rgbw(10, 11, 12, 13));
        assert_eq!(parse_hex_color("#ff0000.5").unwrap(), Rgbw::rgb(128, 0, 0));
        assert_eq!(parse_hex_color("#00000000").unwrap(), Rgbw::rgbw(0, 0, 0, 0));
        assert!(parse_hex_color("#ff00").is_err());
        assert!(parse_hex_color("#gg0000").is_err());
        assert!(parse_hex_color("#ff0000.x").is_err());
    }
}
