use crate::backend::FrameInfo;

/// A pixel color in BGR8 format.
///
/// Channel order matches the packed layout of [`Frame`] buffers.
#[derive(Copy, Clone, Debug, Default, PartialOrd, PartialEq, Eq, Ord, Hash)]
pub struct BGR8 {
    /// Blue channel (0-255)
    pub b: u8,
    /// Green channel (0-255)
    pub g: u8,
    /// Red channel (0-255)
    pub r: u8,
}

/// One captured desktop image.
///
/// Pixels are packed BGR, 3 bytes per pixel, rows top to bottom with no
/// padding between them. The buffer is owned: it shares nothing with the
/// session that produced it and may be kept indefinitely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    info: FrameInfo,
}

impl Frame {
    /// Color channels per pixel.
    pub const CHANNELS: usize = 3;

    /// Wraps a packed BGR buffer.
    ///
    /// Returns `None` when `data.len()` is not `width * height * 3`.
    pub fn from_bgr(data: Vec<u8>, width: u32, height: u32, info: FrameInfo) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(Self::CHANNELS)?;
        (data.len() == expected).then_some(Self {
            data,
            width,
            height,
            info,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes between the start of two consecutive rows.
    pub fn row_stride(&self) -> usize {
        self.width as usize * Self::CHANNELS
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Duplication metadata reported for this frame.
    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    /// The pixel at column `x`, row `y`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<BGR8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.row_stride() + x as usize * Self::CHANNELS;
        let px = &self.data[offset..offset + Self::CHANNELS];
        Some(BGR8 {
            b: px[0],
            g: px[1],
            r: px[2],
        })
    }

    /// Rows of packed BGR bytes, top to bottom.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
        // chunks_exact panics on a zero chunk size, which a zero-width frame would produce.
        self.data.chunks_exact(self.row_stride().max(1))
    }
}

/// Outcome of one [`grab_frame`](crate::CaptureSession::grab_frame) call.
///
/// A timeout is the normal answer while the screen is static, it is never
/// reported as an error and never as an empty [`Frame`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grab {
    /// A new desktop image.
    Frame(Frame),
    /// Nothing changed on the output within the wait bound.
    TimedOut,
}

impl Grab {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Grab::TimedOut)
    }

    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Grab::Frame(frame) => Some(frame),
            Grab::TimedOut => None,
        }
    }

    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Grab::Frame(frame) => Some(frame),
            Grab::TimedOut => None,
        }
    }
}
