// Binary PPM (P6) image dump.
//
// The examples read rendered images back through host-visible memory, whose
// rows are strided by the driver's row pitch. The writer walks rows by that
// pitch and drops the alpha channel, so the file is plain 24-bit RGB.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// RGBA pixels as mapped from a linear Vulkan image.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows. At least `width * 4`.
    pub row_pitch: usize,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn tightly_packed(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            row_pitch: width as usize * 4,
            data,
        }
    }
}

/// Write the pixels as a binary PPM stream.
pub fn write_ppm<W: Write>(out: &mut W, pixels: &PixelBuffer) -> io::Result<()> {
    let width = pixels.width as usize;
    let height = pixels.height as usize;

    if pixels.row_pitch < width * 4 || pixels.data.len() < pixels.row_pitch * height {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "pixel buffer smaller than its declared dimensions",
        ));
    }

    write!(out, "P6\n{}\n{}\n255\n", pixels.width, pixels.height)?;

    for y in 0..height {
        let row = &pixels.data[y * pixels.row_pitch..];
        for x in 0..width {
            out.write_all(&row[x * 4..x * 4 + 3])?;
        }
    }

    Ok(())
}

/// Write the pixels to a PPM file at `path`.
pub fn write_ppm_file<P: AsRef<Path>>(path: P, pixels: &PixelBuffer) -> io::Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    write_ppm(&mut out, pixels)?;
    out.flush()?;
    log::info!(
        "Wrote {}x{} image to {:?}",
        pixels.width,
        pixels.height,
        path
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_p6_with_dimensions_and_maxval() {
        let pixels = PixelBuffer::tightly_packed(2, 1, vec![0; 8]);
        let mut out = Vec::new();
        write_ppm(&mut out, &pixels).unwrap();
        assert!(out.starts_with(b"P6\n2\n1\n255\n"));
        assert_eq!(out.len(), b"P6\n2\n1\n255\n".len() + 2 * 3);
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let pixels = PixelBuffer::tightly_packed(1, 1, vec![10, 20, 30, 255]);
        let mut out = Vec::new();
        write_ppm(&mut out, &pixels).unwrap();
        assert_eq!(&out[out.len() - 3..], &[10, 20, 30]);
    }

    #[test]
    fn row_pitch_padding_is_skipped() {
        // One 1x2 image with 4 padding bytes after each row.
        let mut data = Vec::new();
        data.extend_from_slice(&[1, 2, 3, 4]);
        data.extend_from_slice(&[0xee; 4]);
        data.extend_from_slice(&[5, 6, 7, 8]);
        data.extend_from_slice(&[0xee; 4]);
        let pixels = PixelBuffer {
            width: 1,
            height: 2,
            row_pitch: 8,
            data,
        };

        let mut out = Vec::new();
        write_ppm(&mut out, &pixels).unwrap();
        let body = &out[b"P6\n1\n2\n255\n".len()..];
        assert_eq!(body, &[1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let pixels = PixelBuffer {
            width: 4,
            height: 4,
            row_pitch: 16,
            data: vec![0; 15],
        };
        let mut out = Vec::new();
        assert!(write_ppm(&mut out, &pixels).is_err());
        assert!(out.is_empty());
    }
}
