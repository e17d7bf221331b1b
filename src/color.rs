// Color Module - Packed-RGB color model, rainbow wheel and color-mode resolution
//
// Colors travel through the engine as a packed 0x00RRGGBB u32. Channel
// reordering for specific strip wirings (GRB etc.) is the sink's job.

/// Pack an RGB triple into 0x00RRGGBB.
pub fn pack_color(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Unpack 0x00RRGGBB into an RGB triple.
pub fn unpack_color(color: u32) -> (u8, u8, u8) {
    (
        ((color >> 16) & 0xff) as u8,
        ((color >> 8) & 0xff) as u8,
        (color & 0xff) as u8,
    )
}

/// Format a packed color as "#rrggbb".
pub fn to_hex(color: u32) -> String {
    format!("#{:06x}", color & 0x00ff_ffff)
}

/// Scale a color so its brightest channel equals `brightness`, preserving hue.
/// All-zero input stays black.
pub fn scale_to_brightness(r: u8, g: u8, b: u8, brightness: u8) -> u32 {
    let max = r.max(g).max(b);
    if max == 0 {
        return 0;
    }
    let f = brightness as f64 / max as f64;
    pack_color(
        (r as f64 * f) as u8,
        (g as f64 * f) as u8,
        (b as f64 * f) as u8,
    )
}

/// Multiply all channels of a packed color by brightness/255.
pub fn adjust_brightness(color: u32, brightness: u8) -> u32 {
    let (r, g, b) = unpack_color(color);
    let f = brightness as f64 / 255.0;
    pack_color(
        ((r as f64 * f) as u32).min(255) as u8,
        ((g as f64 * f) as u32).min(255) as u8,
        ((b as f64 * f) as u32).min(255) as u8,
    )
}

/// Parse a "r,g,b" color spec, each channel clamped to 0..=255, scaled so the
/// brightest channel equals `brightness`. Returns None on malformed input.
pub fn parse_color_spec(spec: &str, brightness: u8) -> Option<u32> {
    let parts: Vec<&str> = spec.split(',').map(|s| s.trim()).collect();
    if parts.len() != 3 {
        return None;
    }
    let mut channels = [0u8; 3];
    for (i, part) in parts.iter().enumerate() {
        let value: i64 = part.parse().ok()?;
        channels[i] = value.clamp(0, 255) as u8;
    }
    Some(scale_to_brightness(
        channels[0],
        channels[1],
        channels[2],
        brightness,
    ))
}

/// Rainbow wheel: three-segment piecewise-linear hue ramp over 0..=255.
/// [0,85) red->green, [85,170) green->blue, [170,256) blue->red.
pub fn wheel(pos: u8, brightness: u8) -> u32 {
    let (r, g, b) = if pos < 85 {
        let p = pos as u16;
        ((255 - p * 3) as u8, (p * 3) as u8, 0)
    } else if pos < 170 {
        let p = (pos - 85) as u16;
        (0, (255 - p * 3) as u8, (p * 3) as u8)
    } else {
        let p = (pos - 170) as u16;
        ((p * 3) as u8, 0, (255u16.saturating_sub(p * 3)) as u8)
    };
    scale_to_brightness(r, g, b, brightness)
}

/// HSV to RGB. Hue in degrees [0,360), saturation and value in [0,1].
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let v_scaled = v * 255.0;
    if s <= 0.0 {
        let v = v_scaled as u8;
        return (v, v, v);
    }
    let h = if h >= 360.0 { 0.0 } else { h } / 60.0;
    let i = h as u32;
    let f = h - i as f64;
    let p = (v_scaled * (1.0 - s)) as u8;
    let q = (v_scaled * (1.0 - s * f)) as u8;
    let t = (v_scaled * (1.0 - s * (1.0 - f))) as u8;
    let v = v_scaled as u8;
    match i {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

/// Which resolved modes black out every other iteration. Cycling covers the
/// "fixed"/"rainbow" presets, literal covers explicit "r,g,b" colors; the
/// sweep-family animations blink only literal colors.
#[derive(Debug, Clone, Copy, Default)]
pub struct OddBlackPolicy {
    pub cycling: bool,
    pub literal: bool,
}

impl OddBlackPolicy {
    pub const NEVER: OddBlackPolicy = OddBlackPolicy {
        cycling: false,
        literal: false,
    };
    pub const LITERAL: OddBlackPolicy = OddBlackPolicy {
        cycling: false,
        literal: true,
    };
}

/// A resolved color mode: a pure function of (progress, max progress,
/// iteration) producing a packed color each frame.
#[derive(Debug, Clone, Copy)]
pub enum ColorMode {
    /// One wheel color per iteration, stepping 40 wheel positions each time.
    Fixed { brightness: u8, odd_black: bool },
    /// Progress plus an iteration offset mapped through the wheel.
    Rainbow { brightness: u8, odd_black: bool },
    /// A constant literal color.
    Literal { color: u32, odd_black: bool },
}

impl ColorMode {
    /// Resolve a color spec ("fixed", "rainbow", or "r,g,b") into a mode.
    /// Returns None for malformed specs; callers treat that as a setup
    /// validation error, never a runtime fault.
    pub fn resolve(spec: &str, brightness: u8, policy: OddBlackPolicy) -> Option<ColorMode> {
        match spec {
            "fixed" => Some(ColorMode::Fixed {
                brightness,
                odd_black: policy.cycling,
            }),
            "rainbow" => Some(ColorMode::Rainbow {
                brightness,
                odd_black: policy.cycling,
            }),
            _ => {
                // A literal spec must parse to a non-black color; black is
                // how parse failures surface, so it cannot be distinguished.
                if parse_color_spec(spec, 255)? == 0 {
                    return None;
                }
                Some(ColorMode::Literal {
                    color: parse_color_spec(spec, brightness)?,
                    odd_black: policy.literal,
                })
            }
        }
    }

    pub fn color_at(&self, progress: f64, max_progress: f64, iteration: u32) -> u32 {
        match *self {
            ColorMode::Fixed {
                brightness,
                odd_black,
            } => {
                if odd_black && iteration % 2 == 1 {
                    return 0;
                }
                wheel((((iteration as u64 + 1) * 40) % 255) as u8, brightness)
            }
            ColorMode::Rainbow {
                brightness,
                odd_black,
            } => {
                if odd_black && iteration % 2 == 1 {
                    return 0;
                }
                let pos = (progress / max_progress * 100.0 + iteration as f64 * 100.0) as i64;
                wheel(pos.rem_euclid(255) as u8, brightness)
            }
            ColorMode::Literal { color, odd_black } => {
                if odd_black && iteration % 2 == 1 {
                    0
                } else {
                    color
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        for r in (0..=255u16).step_by(3) {
            for g in (0..=255u16).step_by(3) {
                for b in (0..=255u16).step_by(3) {
                    let (r, g, b) = (r as u8, g as u8, b as u8);
                    assert_eq!(unpack_color(pack_color(r, g, b)), (r, g, b));
                }
            }
        }
        assert_eq!(unpack_color(pack_color(255, 255, 255)), (255, 255, 255));
        assert_eq!(unpack_color(pack_color(0, 0, 0)), (0, 0, 0));
    }

    #[test]
    fn test_scale_to_brightness() {
        // Brightest channel lands exactly on the requested brightness
        assert_eq!(scale_to_brightness(100, 0, 0, 200), pack_color(200, 0, 0));
        assert_eq!(scale_to_brightness(255, 255, 255, 40), pack_color(40, 40, 40));
        // Black stays black
        assert_eq!(scale_to_brightness(0, 0, 0, 255), 0);
    }

    #[test]
    fn test_parse_color_spec() {
        assert_eq!(parse_color_spec("255,0,0", 255), Some(pack_color(255, 0, 0)));
        assert_eq!(parse_color_spec("300,0,0", 255), Some(pack_color(255, 0, 0)));
        assert_eq!(parse_color_spec(" 0, 128, 0 ", 255), Some(pack_color(0, 255, 0)));
        assert_eq!(parse_color_spec("0,0,0", 255), Some(0));
        assert_eq!(parse_color_spec("red", 255), None);
        assert_eq!(parse_color_spec("1,2", 255), None);
        assert_eq!(parse_color_spec("1,2,3,4", 255), None);
    }

    #[test]
    fn test_wheel_wrap_continuity() {
        // 255 wraps onto the same hue as 0 within rounding tolerance
        let (r0, g0, b0) = unpack_color(wheel(0, 255));
        let (r1, g1, b1) = unpack_color(wheel(255, 255));
        assert!((r0 as i32 - r1 as i32).abs() <= 3);
        assert!((g0 as i32 - g1 as i32).abs() <= 3);
        assert!((b0 as i32 - b1 as i32).abs() <= 3);
    }

    #[test]
    fn test_wheel_segments() {
        assert_eq!(unpack_color(wheel(0, 255)), (255, 0, 0));
        assert_eq!(unpack_color(wheel(85, 255)), (0, 255, 0));
        assert_eq!(unpack_color(wheel(170, 255)), (0, 0, 255));
    }

    #[test]
    fn test_resolve_color_mode() {
        assert!(ColorMode::resolve("rainbow", 255, OddBlackPolicy::NEVER).is_some());
        assert!(ColorMode::resolve("fixed", 255, OddBlackPolicy::NEVER).is_some());
        assert!(ColorMode::resolve("12,34,56", 255, OddBlackPolicy::NEVER).is_some());
        assert!(ColorMode::resolve("not a color", 255, OddBlackPolicy::NEVER).is_none());
        // Black literals are indistinguishable from parse failures
        assert!(ColorMode::resolve("0,0,0", 255, OddBlackPolicy::NEVER).is_none());
    }

    #[test]
    fn test_literal_odd_black() {
        let mode = ColorMode::resolve("255,0,0", 255, OddBlackPolicy::LITERAL).unwrap();
        assert_ne!(mode.color_at(0.0, 1.0, 0), 0);
        assert_eq!(mode.color_at(0.0, 1.0, 1), 0);
        assert_ne!(mode.color_at(0.0, 1.0, 2), 0);

        // LITERAL policy leaves cycling modes alone
        let rainbow = ColorMode::resolve("rainbow", 255, OddBlackPolicy::LITERAL).unwrap();
        assert_ne!(rainbow.color_at(0.5, 1.0, 1), 0);
    }

    #[test]
    fn test_hsv_to_rgb() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), (0, 0, 255));
        assert_eq!(hsv_to_rgb(0.0, 0.0, 0.5), (127, 127, 127));
    }
}
