//! HSL to RGB conversion for RGB fans.

/// Hue in degrees `0..360`, saturation and lightness in percent `0..=100`.
pub fn hsl_to_rgb(hue: u16, saturation: u16, lightness: u16) -> (u8, u8, u8) {
    let h = f32::from(hue % 360) / 360.0;
    let s = f32::from(saturation.min(100)) / 100.0;
    let l = f32::from(lightness.min(100)) / 100.0;

    if s == 0.0 {
        let v = to_channel(l);
        return (v, v, v);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        to_channel(hue_to_channel(p, q, h + 1.0 / 3.0)),
        to_channel(hue_to_channel(p, q, h)),
        to_channel(hue_to_channel(p, q, h - 1.0 / 3.0)),
    )
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = if t < 0.0 {
        t + 1.0
    } else if t >= 1.0 {
        t - 1.0
    } else {
        t
    };
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

fn to_channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
