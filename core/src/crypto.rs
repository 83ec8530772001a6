//! Fixed-parameter instantiations of the scheme's primitives. These are
//! wire-visible choices (spelled out in the protocol) and must not change:
//! keyed Blake2b-256 as the PRF, Blake2b-512 as the hash, XChaCha20-Poly1305
//! with detached 16-byte tags as the AEAD, Argon2id for the keystore KDF.

use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::{Blake2b512, Blake2bMac, Digest};
use chacha20poly1305::aead::AeadInPlace;
use chacha20poly1305::{Key, KeyInit, Tag, XChaCha20Poly1305, XNonce};
use zeroize::Zeroize;

use crate::bytes::Secret;
use crate::{LAMBDA, MAC_LEN, NONCE_LEN, SALT_LEN};

/// Keystore KDF parameters (Argon2id): 400000 KiB, 3 passes, 1 lane.
const KDF_M_COST: u32 = 400_000;
const KDF_T_COST: u32 = 3;
const KDF_P_COST: u32 = 1;

/// AEAD authentication failure. Callers decide the severity: the keystore
/// maps it to `CorruptedKeys`, the search result loop logs and skips.
#[derive(Debug, thiserror::Error)]
#[error("AEAD authentication failed")]
pub struct AeadError;

/// Keyed PRF `F_k(m)`: Blake2b with a 32-byte key and 32-byte output.
/// `parts` are absorbed in order, equivalent to hashing their concatenation.
pub fn prf(key: &[u8; LAMBDA], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = <Blake2bMac<U32> as KeyInit>::new_from_slice(key)
        .expect("32-byte Blake2b key is always valid");
    for p in parts {
        Mac::update(&mut mac, p);
    }
    mac.finalize().into_bytes().into()
}

/// Unkeyed hash `H(m)`: Blake2b with 64-byte output.
pub fn hash64(parts: &[&[u8]]) -> [u8; 64] {
    let mut h = Blake2b512::new();
    for p in parts {
        Digest::update(&mut h, p);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&h.finalize());
    out
}

/// AEAD-encrypt `buf` in place, returning the detached 16-byte tag.
pub fn seal_in_place(
    key: &[u8; LAMBDA],
    nonce: &[u8; NONCE_LEN],
    ad: &[u8],
    buf: &mut [u8],
) -> [u8; MAC_LEN] {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(nonce), ad, buf)
        .expect("plaintext length within XChaCha20 bounds");
    tag.into()
}

/// AEAD-decrypt `buf` in place against the detached tag.
pub fn open_in_place(
    key: &[u8; LAMBDA],
    nonce: &[u8; NONCE_LEN],
    mac: &[u8; MAC_LEN],
    ad: &[u8],
    buf: &mut [u8],
) -> Result<(), AeadError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt_in_place_detached(XNonce::from_slice(nonce), ad, buf, Tag::from_slice(mac))
        .map_err(|_| AeadError)
}

/// Derive the keystore wrapping key from a password. The caller owns
/// wiping the password; the output wipes itself.
pub fn kdf(password: &[u8], salt: &[u8; SALT_LEN]) -> Secret<LAMBDA> {
    let params =
        Params::new(KDF_M_COST, KDF_T_COST, KDF_P_COST, Some(LAMBDA)).expect("fixed KDF params");
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = [0u8; LAMBDA];
    argon
        .hash_password_into(password, salt, &mut out)
        .expect("fixed-width salt and output");
    let key = Secret::from_bytes(out);
    out.zeroize();
    key
}
