//! Shared building blocks for the DSSE client (`dsse`) and server (`dssed`).
//!
//! Everything wire- or disk-visible is pinned here: primitive choices,
//! buffer widths, opcodes. The client and server crates only compose these.

pub mod bytes;
pub mod crypto;
pub mod error;
pub mod wire;

/// Security parameter: length of each of the four secret keys.
pub const LAMBDA: usize = 32;

/// Document identifier width (UUIDv4).
pub const UUID_LEN: usize = 16;
/// Operation tag width on the wire (little-endian u64).
pub const OP_LEN: usize = 8;
/// Poly1305 authentication tag.
pub const MAC_LEN: usize = 16;
/// XChaCha20 nonce.
pub const NONCE_LEN: usize = 24;
/// Keystore KDF salt.
pub const SALT_LEN: usize = 16;

/// Width of an `Se` slot address (Blake2b-512 output).
pub const ADDR_LEN: usize = 64;
/// `Eid = mac(16) ‖ nonce(24) ‖ ct(24)` over `uuid ‖ op`.
pub const EID_LEN: usize = MAC_LEN + NONCE_LEN + UUID_LEN + OP_LEN;
/// Chain next-pointer; zero marks the tail.
pub const RN_LEN: usize = 64;
/// `val = masked Eid ‖ Con(8) ‖ rn(64)`.
pub const VAL_LEN: usize = EID_LEN + 8 + RN_LEN;
/// One serialized `Se` row: `addr ‖ val`.
pub const SE_ROW_LEN: usize = ADDR_LEN + VAL_LEN;
/// One `ID2` row on the wire: `Eid ‖ epoch(8)`.
pub const ID2_ROW_LEN: usize = EID_LEN + 8;

/// Per-document ciphertext overhead: detached mac plus nonce. The length
/// field in a document frame counts `mac + nonce + ct`, on both sides.
pub const DOC_OVERHEAD: usize = MAC_LEN + NONCE_LEN;
