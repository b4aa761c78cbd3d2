//! Client frame masking (RFC 6455 Section 5.3).

/// XOR `data` in place with the 4-byte `mask`.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Produces a fresh masking key per outgoing frame.
///
/// Seeded once from the OS RNG, then stepped with a mixing function so that
/// every frame gets a different, unpredictable key without a syscall.
#[derive(Debug)]
pub struct MaskGenerator {
    state: u32,
}

impl MaskGenerator {
    /// Seed a generator from `getrandom`, falling back to the clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: random_seed(),
        }
    }

    /// Next masking key.
    pub fn next_mask(&mut self) -> [u8; 4] {
        self.state = self.state.wrapping_add(0x9E37_79B9);
        let a = self.state;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }
}

impl Default for MaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn random_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x1234_5678)
    }
}
