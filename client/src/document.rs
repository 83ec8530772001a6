//! Document payload encryption under `Kd`.
//!
//! Frame layout: `uuid(16) ‖ len:u64 ‖ mac(16) ‖ nonce(24) ‖ ct`, where
//! `len` counts `mac + nonce + ct` and the 24-byte header `uuid ‖ len`
//! doubles as the AEAD associated data. The server stores the frame
//! verbatim; only this module can open it.

use dsse_core::bytes::{fill_random, read_u64_le, Secret};
use dsse_core::crypto;
use dsse_core::error::{Error, Result};
use dsse_core::{DOC_OVERHEAD, LAMBDA, MAC_LEN, NONCE_LEN, UUID_LEN};

const HEADER_LEN: usize = UUID_LEN + 8;

/// Encrypt one document into its wire/storage frame.
pub fn encrypt_document(kd: &Secret<LAMBDA>, uuid: &[u8; UUID_LEN], plaintext: Vec<u8>) -> Vec<u8> {
    let total_len = (plaintext.len() + DOC_OVERHEAD) as u64;

    let mut frame = Vec::with_capacity(HEADER_LEN + total_len as usize);
    frame.extend_from_slice(uuid);
    frame.extend_from_slice(&total_len.to_le_bytes());

    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce);

    let mut buf = plaintext;
    let ad: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().expect("header width");
    let mac = crypto::seal_in_place(kd.as_bytes(), &nonce, &ad, &mut buf);

    frame.extend_from_slice(&mac);
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&buf);
    frame
}

/// Open a stored document frame, returning `(uuid, plaintext)`.
pub fn decrypt_document(kd: &Secret<LAMBDA>, frame: &[u8]) -> Result<([u8; UUID_LEN], Vec<u8>)> {
    if frame.len() < HEADER_LEN + DOC_OVERHEAD {
        return Err(Error::CorruptedResponse("document frame too short"));
    }
    let uuid: [u8; UUID_LEN] = frame[..UUID_LEN].try_into().expect("split width");
    let total_len = read_u64_le(&frame[UUID_LEN..HEADER_LEN]);
    if total_len as usize != frame.len() - HEADER_LEN {
        return Err(Error::CorruptedResponse("document length mismatch"));
    }

    let mac: [u8; MAC_LEN] = frame[HEADER_LEN..HEADER_LEN + MAC_LEN]
        .try_into()
        .expect("split width");
    let nonce: [u8; NONCE_LEN] = frame[HEADER_LEN + MAC_LEN..HEADER_LEN + DOC_OVERHEAD]
        .try_into()
        .expect("split width");
    let mut buf = frame[HEADER_LEN + DOC_OVERHEAD..].to_vec();

    let ad = &frame[..HEADER_LEN];
    crypto::open_in_place(kd.as_bytes(), &nonce, &mac, ad, &mut buf)
        .map_err(|_| Error::CorruptedResponse("document authentication failed"))?;
    Ok((uuid, buf))
}
