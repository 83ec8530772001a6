//! Oblivious chain walk over the encrypted index.
//!
//! Given a trapdoor `(t, KTw)` and the client's counter snapshot, the
//! walk visits exactly the epochs consumed by uploads since the last
//! search of this keyword: the cached snapshot (or the initial counter)
//! down to, but not including, the client's current value. Visiting the
//! current value would derive the chain head of the *next* upload epoch
//! and break forward privacy, so the range is half-open.

use tracing::debug;

use dsse_core::bytes::xor_into;
use dsse_core::crypto;
use dsse_core::error::Result;
use dsse_core::{ADDR_LEN, EID_LEN, UUID_LEN};

use crate::storage::{SrEntry, UserStore};

pub struct SearchOutcome {
    /// Cached plaintext uuids from the result cache, if any.
    pub id1: Vec<[u8; UUID_LEN]>,
    /// Unmasked `Eid`s with the epoch they were found under.
    pub id2: Vec<([u8; EID_LEN], u64)>,
    /// Baseline the finalize step will record (the client's snapshot).
    pub new_con: u64,
}

impl SearchOutcome {
    /// `ID2` wire serialization: `Eid(64) ‖ epoch(8)` per row.
    pub fn id2_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.id2.len() * (EID_LEN + 8));
        for (eid, epoch) in &self.id2 {
            out.extend_from_slice(eid);
            out.extend_from_slice(&epoch.to_le_bytes());
        }
        out
    }

    pub fn id1_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.id1.len() * UUID_LEN);
        for uuid in &self.id1 {
            out.extend_from_slice(uuid);
        }
        out
    }
}

/// Round 1: seed `ID1` from the result cache, walk every unsearched
/// epoch's chain, erase visited entries, and persist the shrunken `Se`.
pub fn search_keyword(
    store: &UserStore,
    t: &[u8; 32],
    ktw: &[u8; 32],
    con_client: u64,
) -> Result<SearchOutcome> {
    let sr = store.load_sr()?;
    let mut se = store.load_se()?;

    let mut id1 = Vec::new();
    let mut lcon = u64::MAX;
    if let Some(cached) = sr.get(t) {
        id1 = cached.uuids.clone();
        lcon = cached.con;
    }

    let mut id2 = Vec::new();
    let mut i = lcon;
    while i > con_client {
        let epoch_le = i.to_le_bytes();
        let key = crypto::hash64(&[ktw, &epoch_le]);
        let mask = crypto::hash64(&[&key, &[0x00]]);
        let mut addr: [u8; ADDR_LEN] = crypto::hash64(&[&key, &[0xFF]]);

        // forward-privacy erasure: every visited slot is deleted
        while let Some(val) = se.remove(&addr) {
            let mut eid = [0u8; EID_LEN];
            eid.copy_from_slice(&val[..EID_LEN]);
            xor_into(&mut eid, &mask);
            id2.push((eid, i));

            let rn = &val[EID_LEN + 8..];
            if rn.iter().all(|b| *b == 0) {
                break;
            }
            xor_into(&mut addr, rn);
        }
        i -= 1;
    }

    store.rewrite_se(&se)?;
    debug!(
        cached = id1.len(),
        fresh = id2.len(),
        "search round 1 complete"
    );
    Ok(SearchOutcome {
        id1,
        id2,
        new_con: con_client,
    })
}

/// Round 2: replace the result cache row for this trapdoor with the
/// client's consolidated set and counter snapshot.
pub fn finalize(
    store: &UserStore,
    t: &[u8; 32],
    uuids: Vec<[u8; UUID_LEN]>,
    con: u64,
) -> Result<()> {
    let mut sr = store.load_sr()?;
    sr.insert(*t, SrEntry { con, uuids });
    store.rewrite_sr(&sr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SrMap;

    #[test]
    fn absent_keyword_walks_nothing_and_rewrites_se() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path(), "local").unwrap();

        let out = search_keyword(&store, &[1u8; 32], &[2u8; 32], u64::MAX - 4).unwrap();
        assert!(out.id1.is_empty());
        assert!(out.id2.is_empty());
        assert_eq!(out.new_con, u64::MAX - 4);
        // the post-search rewrite happens even when the walk found nothing
        assert!(dir.path().join("local/Se.enc").exists());
    }

    #[test]
    fn cached_snapshot_bounds_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path(), "local").unwrap();

        let t = [3u8; 32];
        let mut sr = SrMap::new();
        sr.insert(
            t,
            SrEntry {
                con: u64::MAX - 2,
                uuids: vec![[9u8; 16]],
            },
        );
        store.rewrite_sr(&sr).unwrap();

        // snapshot equals the cached baseline: zero epochs to walk
        let out = search_keyword(&store, &t, &[4u8; 32], u64::MAX - 2).unwrap();
        assert_eq!(out.id1, vec![[9u8; 16]]);
        assert!(out.id2.is_empty());
    }

    #[test]
    fn finalize_replaces_the_cache_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path(), "local").unwrap();

        let t = [5u8; 32];
        finalize(&store, &t, vec![[1u8; 16]], u64::MAX - 1).unwrap();
        finalize(&store, &t, vec![[1u8; 16], [2u8; 16]], u64::MAX - 3).unwrap();

        let sr = store.load_sr().unwrap();
        let entry = &sr[&t];
        assert_eq!(entry.con, u64::MAX - 3);
        assert_eq!(entry.uuids, vec![[1u8; 16], [2u8; 16]]);
    }
}
