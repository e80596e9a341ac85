//! Order-sensitive content hashing for cache keys
//!
//! Every written word is finalised with splitmix64 and folded into the running
//! state with the golden-ratio combine, so field order matters and `(a, b)`
//! does not hash like `(b, a)`. Output is stable across runs, which keeps the
//! hashes printed in cache logs comparable.

use std::hash::{Hash, Hasher};

const GOLDEN_RATIO: u64 = 0x9e37_79b9_7f4a_7c15;

/// splitmix64 finaliser
#[inline]
fn mix(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Fold `value` into `seed`
#[inline]
pub fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ (mix(value)
        .wrapping_add(GOLDEN_RATIO)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2))
}

/// Deterministic combining hasher
#[derive(Debug, Clone)]
pub struct ContentHasher {
    state: u64,
    pending: [u8; 8],
    pending_len: usize,
}

impl ContentHasher {
    /// Fresh hasher with a fixed seed
    pub fn new() -> Self {
        Self {
            state: GOLDEN_RATIO,
            pending: [0; 8],
            pending_len: 0,
        }
    }

    fn flush_pending(&mut self) {
        if self.pending_len > 0 {
            let word = u64::from_le_bytes(self.pending);
            // length is folded in so that trailing zero bytes are significant
            self.state = hash_combine(self.state, word ^ ((self.pending_len as u64) << 56));
            self.pending = [0; 8];
            self.pending_len = 0;
        }
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for ContentHasher {
    fn finish(&self) -> u64 {
        let mut copy = self.clone();
        copy.flush_pending();
        mix(copy.state)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.pending[self.pending_len] = byte;
            self.pending_len += 1;
            if self.pending_len == 8 {
                self.flush_pending();
            }
        }
    }

    fn write_u64(&mut self, value: u64) {
        self.flush_pending();
        self.state = hash_combine(self.state, value);
    }

    fn write_u32(&mut self, value: u32) {
        self.write_u64(u64::from(value));
    }

    fn write_u16(&mut self, value: u16) {
        self.write_u64(u64::from(value));
    }

    fn write_u8(&mut self, value: u8) {
        self.write_u64(u64::from(value));
    }

    fn write_usize(&mut self, value: usize) {
        self.write_u64(value as u64);
    }

    fn write_i32(&mut self, value: i32) {
        self.write_u64(u64::from(value as u32));
    }

    fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    fn write_isize(&mut self, value: isize) {
        self.write_u64(value as u64);
    }
}

/// Hash any `Hash` value with [`ContentHasher`]
pub fn content_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = ContentHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Bit pattern of an `f32`, with `-0.0` folded onto `0.0`
///
/// Descriptions that carry floats hash through this so `Hash` and `Eq` agree.
#[inline]
pub(crate) fn float_bits(value: f32) -> u32 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}
