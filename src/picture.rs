//! Owned decoded pictures.
//!
//! [`Picture`] is the planar YUV frame handed to the host: three packed
//! planes (no padding, stride equals row width), the chroma subsampling
//! factors, and a [`FieldOrder`] tag for downstream consumers that care
//! about field dominance after RFF compositing.

use crate::error::D2vError;

/// Field dominance of a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldOrder {
    /// Frame picture, no field structure.
    #[default]
    Progressive,
    /// Top field displays first.
    TopFieldFirst,
    /// Bottom field displays first.
    BottomFieldFirst,
}

/// A decoded planar YUV picture with packed planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    /// Luma width in pixels.
    pub width: usize,
    /// Luma height in pixels.
    pub height: usize,
    /// log2 horizontal chroma subsampling (1 for 4:2:0 / 4:2:2).
    pub subsampling_w: u8,
    /// log2 vertical chroma subsampling (1 for 4:2:0, 0 for 4:2:2).
    pub subsampling_h: u8,
    /// Y, U, V planes, packed (stride == row width).
    pub planes: [Vec<u8>; 3],
    /// Field dominance tag.
    pub field_order: FieldOrder,
}

impl Picture {
    /// Allocate a zero-filled picture with the given geometry.
    pub fn new(width: usize, height: usize, subsampling_w: u8, subsampling_h: u8) -> Self {
        let chroma_w = width >> subsampling_w;
        let chroma_h = height >> subsampling_h;
        Self {
            width,
            height,
            subsampling_w,
            subsampling_h,
            planes: [
                vec![0; width * height],
                vec![0; chroma_w * chroma_h],
                vec![0; chroma_w * chroma_h],
            ],
            field_order: FieldOrder::Progressive,
        }
    }

    /// Width of plane `i` in bytes.
    pub fn plane_width(&self, i: usize) -> usize {
        if i == 0 {
            self.width
        } else {
            self.width >> self.subsampling_w
        }
    }

    /// Height of plane `i` in rows.
    pub fn plane_height(&self, i: usize) -> usize {
        if i == 0 {
            self.height
        } else {
            self.height >> self.subsampling_h
        }
    }

    /// One row of plane `i`.
    pub fn row(&self, plane: usize, row: usize) -> &[u8] {
        let w = self.plane_width(plane);
        &self.planes[plane][row * w..(row + 1) * w]
    }

    /// Mutable access to one row of plane `i`.
    pub fn row_mut(&mut self, plane: usize, row: usize) -> &mut [u8] {
        let w = self.plane_width(plane);
        &mut self.planes[plane][row * w..(row + 1) * w]
    }

    /// Map a raw FFmpeg pixel format id (an `AVFrame::format` value) to
    /// `(subsampling_w, subsampling_h)`.
    ///
    /// Only the planar YUV layouts MPEG-1/2 decoding produces are
    /// supported.
    pub(crate) fn subsampling_for(format: i32) -> Result<(u8, u8), D2vError> {
        use ffmpeg_sys_next::AVPixelFormat::*;
        match format {
            f if f == AV_PIX_FMT_YUV420P as i32 => Ok((1, 1)),
            f if f == AV_PIX_FMT_YUV422P as i32 => Ok((1, 0)),
            f if f == AV_PIX_FMT_YUV444P as i32 => Ok((0, 0)),
            other => Err(D2vError::Unsupported(format!(
                "pixel format {other} is not a planar MPEG layout",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_geometry_follows_subsampling() {
        let pic = Picture::new(16, 8, 1, 1);
        assert_eq!(pic.plane_width(0), 16);
        assert_eq!(pic.plane_height(0), 8);
        assert_eq!(pic.plane_width(1), 8);
        assert_eq!(pic.plane_height(2), 4);
        assert_eq!(pic.planes[0].len(), 128);
        assert_eq!(pic.planes[1].len(), 32);
    }

    #[test]
    fn rows_are_packed() {
        let mut pic = Picture::new(4, 2, 1, 1);
        pic.row_mut(0, 1).fill(9);
        assert_eq!(pic.planes[0], [0, 0, 0, 0, 9, 9, 9, 9]);
        assert_eq!(pic.row(0, 1), [9, 9, 9, 9]);
    }
}
