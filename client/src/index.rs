//! Plaintext keyword index and its transformation into the encrypted,
//! uploadable form `Se`.
//!
//! Each keyword's postings become a chain of 200-byte rows. The slot
//! address of the head is `H(Key ‖ 0xFF)`; every entry carries a random
//! 64-byte next-pointer `rn`, and the successor slot is the current
//! address XORed with it. A zero `rn` marks the tail (XOR with zero would
//! self-loop). Only a holder of `Key = H(KTw ‖ Con)` can unmask an entry,
//! so the server cannot walk a chain without the trapdoor.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use zeroize::Zeroize;

use dsse_core::bytes::{fill_random, xor_into};
use dsse_core::crypto;
use dsse_core::{EID_LEN, NONCE_LEN, RN_LEN, SE_ROW_LEN, UUID_LEN};

use crate::keystore::Keystore;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new("[A-Za-z0-9]+").expect("static regex"));

/// Index entry operation. `Remove` entries cancel a uuid at search time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpTag {
    Add,
    Remove,
}

impl OpTag {
    pub fn as_u64(self) -> u64 {
        match self {
            OpTag::Add => 0,
            OpTag::Remove => 1,
        }
    }
}

/// Transient per-batch index: keyword bytes → postings.
pub type KeywordIndex = BTreeMap<Vec<u8>, Vec<([u8; UUID_LEN], OpTag)>>;

/// Tokenize a document and record an `Add` posting per distinct keyword.
pub fn index_document(index: &mut KeywordIndex, uuid: [u8; UUID_LEN], text: &[u8]) {
    for m in TOKEN.find_iter(text) {
        let postings = index.entry(m.as_bytes().to_vec()).or_default();
        if !postings.contains(&(uuid, OpTag::Add)) {
            postings.push((uuid, OpTag::Add));
        }
    }
}

/// `Process`: encrypt a keyword index under the current keys and counter,
/// producing the concatenated `addr(64) ‖ val(136)` rows for upload.
pub fn build_index(index: &KeywordIndex, ks: &Keystore) -> Vec<u8> {
    let con_le = ks.con.to_le_bytes();
    let mut out = Vec::with_capacity(index.values().map(Vec::len).sum::<usize>() * SE_ROW_LEN);

    for (word, postings) in index {
        let mut ktw = crypto::prf(ks.kf.as_bytes(), &[word]);
        let mut key = crypto::hash64(&[&ktw, &con_le]);
        let mut mask = crypto::hash64(&[&key, &[0x00]]);
        let mut addr = crypto::hash64(&[&key, &[0xFF]]);

        for (pos, (uuid, op)) in postings.iter().enumerate() {
            let is_last = pos + 1 == postings.len();
            let mut rn = [0u8; RN_LEN];
            if !is_last {
                // resample until nonzero: zero is the tail marker
                loop {
                    fill_random(&mut rn);
                    if rn.iter().any(|b| *b != 0) {
                        break;
                    }
                }
            }

            // per-entry subkey, recomputed and wiped each iteration to
            // minimize secret residence time
            let mut sk = crypto::prf(ks.kg.as_bytes(), &[word, &con_le]);
            let mut nonce = [0u8; NONCE_LEN];
            fill_random(&mut nonce);

            let mut data = [0u8; UUID_LEN + 8];
            data[..UUID_LEN].copy_from_slice(uuid);
            data[UUID_LEN..].copy_from_slice(&op.as_u64().to_le_bytes());
            let mac = crypto::seal_in_place(&sk, &nonce, b"", &mut data);
            sk.zeroize();

            // Eid = mac ‖ nonce ‖ ct, masked with H(Key ‖ 0x00)
            let mut eid = [0u8; EID_LEN];
            eid[..16].copy_from_slice(&mac);
            eid[16..40].copy_from_slice(&nonce);
            eid[40..].copy_from_slice(&data);
            xor_into(&mut eid, &mask);

            out.extend_from_slice(&addr);
            out.extend_from_slice(&eid);
            out.extend_from_slice(&con_le);
            out.extend_from_slice(&rn);

            xor_into(&mut addr, &rn);
        }

        ktw.zeroize();
        key.zeroize();
        mask.zeroize();
    }

    out
}
