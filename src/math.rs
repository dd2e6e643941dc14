//! Per-pixel arithmetic primitives on 8-bit grayscale planes.
//!
//! All operations are linearly addressed over same-shape planes; lengths are
//! asserted up front so a mismatched buffer can never be partially written.
//! The scalar semantics are the normative contract; the SIMD paths for the
//! saturating operations are bit-identical (saturating u8 add/sub map
//! directly onto `PADDUSB`/`PSUBUSB` and `UQADD`/`UQSUB`).

/// `C[i] = max(0, A[i] - B[i])`: subtract keeping the gray range.
#[cfg(target_arch = "x86_64")]
pub fn subtract_saturating(a: &[u8], b: &[u8], out: &mut [u8]) {
    assert_eq!(a.len(), b.len(), "input length mismatch");
    assert_eq!(a.len(), out.len(), "output length mismatch");

    if a.len() < 16 || !is_x86_feature_detected!("sse2") {
        return subtract_saturating_scalar(a, b, out);
    }
    unsafe { subtract_saturating_sse(a, b, out) }
}

/// `C[i] = max(0, A[i] - B[i])`: subtract keeping the gray range.
#[cfg(target_arch = "aarch64")]
pub fn subtract_saturating(a: &[u8], b: &[u8], out: &mut [u8]) {
    use std::arch::aarch64::*;

    assert_eq!(a.len(), b.len(), "input length mismatch");
    assert_eq!(a.len(), out.len(), "output length mismatch");

    let chunks = a.len() / 16 * 16;
    unsafe {
        for i in (0..chunks).step_by(16) {
            let va = vld1q_u8(a.as_ptr().add(i));
            let vb = vld1q_u8(b.as_ptr().add(i));
            vst1q_u8(out.as_mut_ptr().add(i), vqsubq_u8(va, vb));
        }
    }
    subtract_saturating_scalar(&a[chunks..], &b[chunks..], &mut out[chunks..]);
}

/// Fallback for other architectures.
#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
pub fn subtract_saturating(a: &[u8], b: &[u8], out: &mut [u8]) {
    assert_eq!(a.len(), b.len(), "input length mismatch");
    assert_eq!(a.len(), out.len(), "output length mismatch");
    subtract_saturating_scalar(a, b, out);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn subtract_saturating_sse(a: &[u8], b: &[u8], out: &mut [u8]) {
    use std::arch::x86_64::*;

    let chunks = a.len() / 16 * 16;
    unsafe {
        for i in (0..chunks).step_by(16) {
            let va = _mm_loadu_si128(a.as_ptr().add(i) as *const __m128i);
            let vb = _mm_loadu_si128(b.as_ptr().add(i) as *const __m128i);
            _mm_storeu_si128(out.as_mut_ptr().add(i) as *mut __m128i, _mm_subs_epu8(va, vb));
        }
    }
    subtract_saturating_scalar(&a[chunks..], &b[chunks..], &mut out[chunks..]);
}

fn subtract_saturating_scalar(a: &[u8], b: &[u8], out: &mut [u8]) {
    for ((&a, &b), c) in a.iter().zip(b).zip(out) {
        *c = a.saturating_sub(b);
    }
}

/// `C[i] = i16(A[i]) - i16(B[i])`: signed difference.
pub fn subtract_signed(a: &[u8], b: &[u8], out: &mut [i16]) {
    assert_eq!(a.len(), b.len(), "input length mismatch");
    assert_eq!(a.len(), out.len(), "output length mismatch");

    for ((&a, &b), c) in a.iter().zip(b).zip(out) {
        *c = a as i16 - b as i16;
    }
}

/// `C[i] = min(255, A[i] + B[i])`: add keeping the gray range.
#[cfg(target_arch = "x86_64")]
pub fn add_saturating(a: &[u8], b: &[u8], out: &mut [u8]) {
    assert_eq!(a.len(), b.len(), "input length mismatch");
    assert_eq!(a.len(), out.len(), "output length mismatch");

    if a.len() < 16 || !is_x86_feature_detected!("sse2") {
        return add_saturating_scalar(a, b, out);
    }
    unsafe { add_saturating_sse(a, b, out) }
}

/// `C[i] = min(255, A[i] + B[i])`: add keeping the gray range.
#[cfg(target_arch = "aarch64")]
pub fn add_saturating(a: &[u8], b: &[u8], out: &mut [u8]) {
    use std::arch::aarch64::*;

    assert_eq!(a.len(), b.len(), "input length mismatch");
    assert_eq!(a.len(), out.len(), "output length mismatch");

    let chunks = a.len() / 16 * 16;
    unsafe {
        for i in (0..chunks).step_by(16) {
            let va = vld1q_u8(a.as_ptr().add(i));
            let vb = vld1q_u8(b.as_ptr().add(i));
            vst1q_u8(out.as_mut_ptr().add(i), vqaddq_u8(va, vb));
        }
    }
    add_saturating_scalar(&a[chunks..], &b[chunks..], &mut out[chunks..]);
}

/// Fallback for other architectures.
#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
pub fn add_saturating(a: &[u8], b: &[u8], out: &mut [u8]) {
    assert_eq!(a.len(), b.len(), "input length mismatch");
    assert_eq!(a.len(), out.len(), "output length mismatch");
    add_saturating_scalar(a, b, out);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn add_saturating_sse(a: &[u8], b: &[u8], out: &mut [u8]) {
    use std::arch::x86_64::*;

    let chunks = a.len() / 16 * 16;
    unsafe {
        for i in (0..chunks).step_by(16) {
            let va = _mm_loadu_si128(a.as_ptr().add(i) as *const __m128i);
            let vb = _mm_loadu_si128(b.as_ptr().add(i) as *const __m128i);
            _mm_storeu_si128(out.as_mut_ptr().add(i) as *mut __m128i, _mm_adds_epu8(va, vb));
        }
    }
    add_saturating_scalar(&a[chunks..], &b[chunks..], &mut out[chunks..]);
}

fn add_saturating_scalar(a: &[u8], b: &[u8], out: &mut [u8]) {
    for ((&a, &b), c) in a.iter().zip(b).zip(out) {
        *c = a.saturating_add(b);
    }
}

/// `C[i] = u16(A[i]) + u16(B[i])`: widening add, no clipping.
pub fn add_widening(a: &[u8], b: &[u8], out: &mut [u16]) {
    assert_eq!(a.len(), b.len(), "input length mismatch");
    assert_eq!(a.len(), out.len(), "output length mismatch");

    for ((&a, &b), c) in a.iter().zip(b).zip(out) {
        *c = a as u16 + b as u16;
    }
}

/// `C[i] = clip_u8(k * A[i])` with rounding toward zero.
pub fn multiply_scalar_saturating(a: &[u8], k: f32, out: &mut [u8]) {
    assert_eq!(a.len(), out.len(), "output length mismatch");

    for (&a, c) in a.iter().zip(out) {
        // `as u8` truncates toward zero and clamps to [0, 255].
        *c = (k * a as f32) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtract_saturating() {
        let a = [10u8, 5, 200];
        let b = [7u8, 9, 100];
        let mut c = [0u8; 3];
        subtract_saturating(&a, &b, &mut c);
        assert_eq!(c, [3, 0, 100]);
    }

    #[test]
    fn test_subtract_signed() {
        let a = [10u8, 5, 200];
        let b = [7u8, 9, 100];
        let mut c = [0i16; 3];
        subtract_signed(&a, &b, &mut c);
        assert_eq!(c, [3, -4, 100]);
    }

    #[test]
    fn test_subtract_stays_in_gray_range() {
        let a: Vec<u8> = (0..=255).collect();
        let b: Vec<u8> = (0..=255).rev().collect();
        let mut c = vec![0u8; 256];
        subtract_saturating(&a, &b, &mut c);
        for (i, (&a, (&b, &c))) in a.iter().zip(b.iter().zip(&c)).enumerate() {
            if b >= a {
                assert_eq!(c, 0, "index {i}");
            } else {
                assert_eq!(c, a - b, "index {i}");
            }
        }
    }

    #[test]
    fn test_subtract_simd_matches_scalar() {
        // Length chosen to exercise both the vector body and the remainder.
        let a: Vec<u8> = (0..403).map(|i| (i * 7 % 256) as u8).collect();
        let b: Vec<u8> = (0..403).map(|i| (i * 13 % 256) as u8).collect();

        let mut vectored = vec![0u8; a.len()];
        let mut scalar = vec![0u8; a.len()];
        subtract_saturating(&a, &b, &mut vectored);
        subtract_saturating_scalar(&a, &b, &mut scalar);
        assert_eq!(vectored, scalar);
    }

    #[test]
    fn test_add_saturating_clips_at_255() {
        let a = [200u8, 100, 0];
        let b = [100u8, 100, 255];
        let mut c = [0u8; 3];
        add_saturating(&a, &b, &mut c);
        assert_eq!(c, [255, 200, 255]);
    }

    #[test]
    fn test_add_simd_matches_scalar() {
        let a: Vec<u8> = (0..403).map(|i| (i * 11 % 256) as u8).collect();
        let b: Vec<u8> = (0..403).map(|i| (i * 29 % 256) as u8).collect();

        let mut vectored = vec![0u8; a.len()];
        let mut scalar = vec![0u8; a.len()];
        add_saturating(&a, &b, &mut vectored);
        add_saturating_scalar(&a, &b, &mut scalar);
        assert_eq!(vectored, scalar);
    }

    #[test]
    fn test_add_widening_does_not_clip() {
        let a = [255u8, 128];
        let b = [255u8, 128];
        let mut c = [0u16; 2];
        add_widening(&a, &b, &mut c);
        assert_eq!(c, [510, 256]);
    }

    #[test]
    fn test_multiply_scalar_truncates_toward_zero() {
        let a = [10u8, 255, 3];
        let mut c = [0u8; 3];
        multiply_scalar_saturating(&a, 0.8, &mut c);
        // 8.0, 204.0, 2.4 -> truncated
        assert_eq!(c, [8, 204, 2]);
    }

    #[test]
    fn test_multiply_scalar_clips() {
        let a = [200u8];
        let mut c = [0u8];
        multiply_scalar_saturating(&a, 2.0, &mut c);
        assert_eq!(c, [255]);
    }

    #[test]
    #[should_panic(expected = "input length mismatch")]
    fn test_shape_mismatch_rejected() {
        let mut c = [0u8; 2];
        subtract_saturating(&[1, 2], &[1], &mut c);
    }
}
