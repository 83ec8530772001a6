//! Fixed-width byte buffers and the little pieces of algebra the scheme
//! is built from: XOR, little-endian u64 serialization, zeroizing secrets.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

/// XOR `src` into `dst` in place. Widths must match.
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    assert_eq!(dst.len(), src.len(), "xor width mismatch");
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

pub fn put_u64_le(dst: &mut [u8], v: u64) {
    dst[..8].copy_from_slice(&v.to_le_bytes());
}

pub fn read_u64_le(src: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&src[..8]);
    u64::from_le_bytes(arr)
}

/// Fill a buffer from the OS CSPRNG.
pub fn fill_random(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// A fixed-width secret buffer. Wiped on drop; `Debug` never prints the
/// contents. Every key and key derivative in the scheme lives in one of
/// these (or is explicitly zeroized) so that no secret outlives its use.
#[derive(Clone, Zeroize, zeroize::ZeroizeOnDrop)]
pub struct Secret<const N: usize>([u8; N]);

impl<const N: usize> Secret<N> {
    pub fn zeroed() -> Self {
        Self([0u8; N])
    }

    pub fn from_bytes(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Self(buf)
    }

    /// Overwrite with fresh randomness.
    pub fn randomize(&mut self) {
        OsRng.fill_bytes(&mut self.0);
    }

    /// Constant-time wipe (delegates to `zeroize`, which guarantees the
    /// stores are not elided).
    pub fn wipe(&mut self) {
        self.0.zeroize();
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Probe used by the key-wipe tests only.
    #[cfg(any(test, feature = "test-probe"))]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl<const N: usize> AsRef<[u8]> for Secret<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> std::fmt::Debug for Secret<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret<{N}>(..)")
    }
}
