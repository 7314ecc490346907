//! BGRA → BGR conversion over a mapped, possibly padded surface.
//!
//! Alpha is dropped and blue/green/red are copied bit for bit. Rows are read
//! `row_pitch` bytes apart and only the first `width * 4` bytes of each row are
//! looked at, so alignment padding never reaches the output.

use thiserror::Error;

/// Bytes per pixel in the mapped staging surface.
pub const SOURCE_BYTES_PER_PIXEL: usize = 4;
/// Bytes per pixel in the converted frame.
pub const OUTPUT_BYTES_PER_PIXEL: usize = 3;

/// The mapped memory cannot hold a `width` x `height` BGRA image.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("row pitch {row_pitch} is smaller than a {width}-pixel BGRA row")]
    PitchTooSmall { row_pitch: usize, width: usize },
    #[error("mapped surface holds {available} bytes, {required} required")]
    Truncated { required: usize, available: usize },
    #[error("frame dimensions {width}x{height} overflow the address space")]
    Overflow { width: usize, height: usize },
}

/// Converts a `width` x `height` BGRA image into a tightly packed BGR buffer.
///
/// `src` starts at the first pixel and rows start `row_pitch` bytes apart.
/// The last row only needs `width * 4` bytes, trailing padding is optional.
pub fn bgra_to_bgr(
    src: &[u8],
    row_pitch: usize,
    width: usize,
    height: usize,
) -> Result<Vec<u8>, LayoutError> {
    let overflow = LayoutError::Overflow { width, height };
    let src_row = width
        .checked_mul(SOURCE_BYTES_PER_PIXEL)
        .ok_or_else(|| overflow.clone())?;
    let dst_row = width
        .checked_mul(OUTPUT_BYTES_PER_PIXEL)
        .ok_or_else(|| overflow.clone())?;
    let dst_len = dst_row.checked_mul(height).ok_or_else(|| overflow.clone())?;

    if height == 0 || width == 0 {
        return Ok(Vec::new());
    }
    if row_pitch < src_row {
        return Err(LayoutError::PitchTooSmall { row_pitch, width });
    }
    let required = row_pitch
        .checked_mul(height - 1)
        .and_then(|rows| rows.checked_add(src_row))
        .ok_or(overflow)?;
    if src.len() < required {
        return Err(LayoutError::Truncated {
            required,
            available: src.len(),
        });
    }

    let mut dst = Vec::with_capacity(dst_len);
    for row in 0..height {
        let start = row * row_pitch;
        convert_row(&src[start..start + src_row], &mut dst);
    }
    debug_assert_eq!(dst.len(), dst_len);
    Ok(dst)
}

/// Appends one row of BGR pixels converted from `src` (a whole number of
/// BGRA pixels) to `dst`.
fn convert_row(src: &[u8], dst: &mut Vec<u8>) {
    #[cfg(target_arch = "x86_64")]
    {
        if src.len() >= 16 && is_x86_feature_detected!("ssse3") {
            return unsafe { convert_row_ssse3(src, dst) };
        }
    }

    convert_row_scalar(src, dst)
}

fn convert_row_scalar(src: &[u8], dst: &mut Vec<u8>) {
    for pixel in src.chunks_exact(SOURCE_BYTES_PER_PIXEL) {
        dst.extend_from_slice(&pixel[..OUTPUT_BYTES_PER_PIXEL]);
    }
}

/// Four pixels per iteration: a byte shuffle packs 16 BGRA bytes into 12 BGR
/// bytes, the tail goes through the scalar path.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "ssse3")]
unsafe fn convert_row_ssse3(src: &[u8], dst: &mut Vec<u8>) {
    use std::arch::x86_64::*;

    unsafe {
        let mask = _mm_setr_epi8(0, 1, 2, 4, 5, 6, 8, 9, 10, 12, 13, 14, -1, -1, -1, -1);
        let mut packed = [0u8; 16];
        let mut chunks = src.chunks_exact(16);
        for chunk in &mut chunks {
            let data = _mm_loadu_si128(chunk.as_ptr() as *const __m128i);
            let shuffled = _mm_shuffle_epi8(data, mask);
            _mm_storeu_si128(packed.as_mut_ptr() as *mut __m128i, shuffled);
            dst.extend_from_slice(&packed[..12]);
        }
        convert_row_scalar(chunks.remainder(), dst);
    }
}
