//! Frame payload masking (RFC 6455 Section 5.3).

/// XOR `data` with `mask`, starting `offset` bytes into the masked payload.
///
/// Payloads arrive in arbitrary chunks, so the mask position of the first
/// byte of `data` is `offset % 4`.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4], offset: usize) {
    let shift = offset % 4;
    let rotated = [
        mask[shift],
        mask[(shift + 1) % 4],
        mask[(shift + 2) % 4],
        mask[(shift + 3) % 4],
    ];
    let mask_u32 = u32::from_ne_bytes(rotated);

    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ mask_u32;
        chunk.copy_from_slice(&val.to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= rotated[i];
    }
}

/// Mask key generator for outgoing client frames.
///
/// Seeded from the OS RNG once, then stepped with a mixing function so that
/// each frame gets a fresh, unpredictable key.
#[derive(Debug)]
pub(crate) struct MaskGenerator {
    counter: u32,
}

impl MaskGenerator {
    pub(crate) fn new() -> Self {
        let mut buf = [0u8; 4];
        let counter = if getrandom::getrandom(&mut buf).is_ok() {
            u32::from_le_bytes(buf)
        } else {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u32)
                .unwrap_or(0x1234_5678)
        };
        Self { counter }
    }

    pub(crate) fn next_mask(&mut self) -> [u8; 4] {
        self.counter = self.counter.wrapping_add(0x9E37_79B9);
        let b = self.counter.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        c.wrapping_mul(0xC2B2_AE35).to_le_bytes()
    }
}
