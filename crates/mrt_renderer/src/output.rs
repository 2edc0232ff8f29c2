//! Plain-text PPM (P3) encoding.

use std::io::{self, Write};

use mrt_math::Interval;

use crate::{Color, ImageBuffer};

/// Channel range before scaling to bytes; keeps 1.0 from mapping to 256.
const INTENSITY: Interval = Interval::new(0.0, 0.999);

/// Convert linear to gamma space (gamma 2).
pub fn linear_to_gamma(linear: f64) -> f64 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a linear color to 8-bit RGB.
pub fn color_to_rgb(color: Color, gamma: bool) -> [u8; 3] {
    color.to_array().map(|channel| {
        let channel = if gamma { linear_to_gamma(channel) } else { channel };
        // NaN clamps to NaN and casts to 0.
        (256.0 * INTENSITY.clamp(channel)) as u8
    })
}

/// Write `image` as a P3 stream: header, then one `r g b` line per pixel
/// in row-major order.
pub fn write_ppm<W: Write>(image: &ImageBuffer, writer: W, gamma: bool) -> io::Result<()> {
    let mut writer = io::BufWriter::new(writer);

    writeln!(writer, "P3")?;
    writeln!(writer, "{} {}", image.width, image.height)?;
    writeln!(writer, "255")?;

    for color in &image.pixels {
        let [r, g, b] = color_to_rgb(*color, gamma);
        writeln!(writer, "{r} {g} {b}")?;
    }

    writer.flush()
}

/// Encode `image` into memory.
pub fn encode_ppm(image: &ImageBuffer, gamma: bool) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    write_ppm(image, &mut bytes, gamma)?;
    Ok(bytes)
}
