//! Full-scheme tests: client-side index construction and result
//! consolidation driven directly against the server's storage and search
//! engines, with a fixed all-zero keyset so the scenarios are
//! reproducible.

use std::collections::HashSet;

use dsse_cli::document;
use dsse_cli::index::{self, KeywordIndex, OpTag};
use dsse_cli::keystore::Keystore;
use dsse_cli::protocol;
use dsse_core::bytes::Secret;
use dsse_core::crypto;
use dsse_core::UUID_LEN;
use dssed::search;
use dssed::storage::UserStore;

fn zero_keys() -> Keystore {
    Keystore {
        kd: Secret::zeroed(),
        kg: Secret::zeroed(),
        kt: Secret::zeroed(),
        kf: Secret::zeroed(),
        con: u64::MAX,
    }
}

fn uuid(n: u8) -> [u8; UUID_LEN] {
    let mut u = [0u8; UUID_LEN];
    u[UUID_LEN - 1] = n;
    u
}

/// Client `add`: tokenize the documents, upload the encrypted index, and
/// advance the epoch.
fn add_docs(store: &UserStore, ks: &mut Keystore, docs: &[([u8; UUID_LEN], &str)]) {
    let mut kt = KeywordIndex::new();
    for (id, text) in docs {
        index::index_document(&mut kt, *id, text.as_bytes());
    }
    let blob = index::build_index(&kt, ks);
    store.apply_add(&blob, &[]).unwrap();
    ks.con = ks.con.wrapping_sub(1);
}

/// An `add` upload with hand-picked op tags (the removal path).
fn inject(
    store: &UserStore,
    ks: &mut Keystore,
    word: &[u8],
    postings: Vec<([u8; UUID_LEN], OpTag)>,
) {
    let mut kt = KeywordIndex::new();
    kt.insert(word.to_vec(), postings);
    let blob = index::build_index(&kt, ks);
    store.apply_add(&blob, &[]).unwrap();
    ks.con = ks.con.wrapping_sub(1);
}

fn trapdoor(ks: &Keystore, word: &[u8]) -> ([u8; 32], [u8; 32]) {
    (
        crypto::prf(ks.kt.as_bytes(), &[word]),
        crypto::prf(ks.kf.as_bytes(), &[word]),
    )
}

/// The full two-round search: server round 1, client consolidation,
/// server finalize. Returns the sorted result set.
fn run_search(store: &UserStore, ks: &Keystore, word: &[u8]) -> Vec<[u8; UUID_LEN]> {
    let (t, ktw) = trapdoor(ks, word);
    let con = ks.con;
    let outcome = search::search_keyword(store, &t, &ktw, con).unwrap();

    let id1: HashSet<[u8; UUID_LEN]> = outcome.id1.iter().copied().collect();
    let merged = protocol::merge_search_results(&ks.kg, word, id1, &outcome.id2_bytes());

    let mut results: Vec<[u8; UUID_LEN]> = merged.into_iter().collect();
    results.sort_unstable();
    search::finalize(store, &t, results.clone(), con).unwrap();
    results
}

#[test]
fn fresh_add_then_search_with_epoch_progression() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();
    let (u1, u2) = (uuid(1), uuid(3));

    // first add/search over a fresh index
    add_docs(&store, &mut ks, &[(u1, "alpha")]);
    assert_eq!(ks.con, u64::MAX - 1);
    assert_eq!(run_search(&store, &ks, b"alpha"), vec![u1]);

    let (t, _) = trapdoor(&ks, b"alpha");
    let sr = store.load_sr().unwrap();
    assert_eq!(sr[&t].con, u64::MAX - 1);
    assert_eq!(sr[&t].uuids, vec![u1]);

    // a second add lands in a fresh epoch and is picked up by the next
    // search alongside the cached result
    add_docs(&store, &mut ks, &[(u2, "alpha")]);
    assert_eq!(ks.con, u64::MAX - 2);
    assert_eq!(run_search(&store, &ks, b"alpha"), vec![u1, u2]);
    let sr = store.load_sr().unwrap();
    assert_eq!(sr[&t].con, u64::MAX - 2);

    // an immediate re-search has no epochs to walk and is served from
    // the cache alone, which survives the rewrite
    let (_, ktw) = trapdoor(&ks, b"alpha");
    let cached = search::search_keyword(&store, &t, &ktw, ks.con).unwrap();
    assert!(cached.id2.is_empty());
    assert_eq!(
        cached.id1.iter().copied().collect::<HashSet<_>>(),
        HashSet::from([u1, u2])
    );
    assert_eq!(run_search(&store, &ks, b"alpha"), vec![u1, u2]);

    // an upload carrying a remove tag cancels the uuid at search time
    inject(&store, &mut ks, b"alpha", vec![(u1, OpTag::Remove)]);
    assert_eq!(run_search(&store, &ks, b"alpha"), vec![u2]);
}

#[test]
fn two_keywords_share_a_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();
    let u1 = uuid(2);

    add_docs(&store, &mut ks, &[(u1, "alpha beta")]);
    assert_eq!(run_search(&store, &ks, b"alpha"), vec![u1]);
    assert_eq!(run_search(&store, &ks, b"beta"), vec![u1]);
}

#[test]
fn add_and_remove_in_separate_uploads_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();
    let (u1, u2) = (uuid(1), uuid(2));

    add_docs(&store, &mut ks, &[(u1, "alpha"), (u2, "alpha")]);
    inject(&store, &mut ks, b"alpha", vec![(u1, OpTag::Remove)]);
    assert_eq!(run_search(&store, &ks, b"alpha"), vec![u2]);
}

#[test]
fn absent_keyword_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();

    add_docs(&store, &mut ks, &[(uuid(1), "alpha")]);
    assert!(run_search(&store, &ks, b"missing").is_empty());
}

#[test]
fn corrupted_entry_is_dropped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();
    let (u1, u2) = (uuid(1), uuid(2));

    add_docs(&store, &mut ks, &[(u1, "alpha"), (u2, "alpha")]);

    // flip one bit inside one entry's Eid region
    let mut se = store.load_se().unwrap();
    let addr = *se.keys().next().unwrap();
    se.get_mut(&addr).unwrap()[0] ^= 1;
    store.rewrite_se(&se).unwrap();

    let results = run_search(&store, &ks, b"alpha");
    assert_eq!(results.len(), 1);
    assert!(results[0] == u1 || results[0] == u2);
}

#[test]
fn search_erases_visited_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();

    add_docs(&store, &mut ks, &[(uuid(1), "alpha beta")]);
    assert_eq!(store.load_se().unwrap().len(), 2);

    run_search(&store, &ks, b"alpha");
    // only the beta chain is left on disk
    assert_eq!(store.load_se().unwrap().len(), 1);
}

#[test]
fn results_accumulate_across_many_epochs() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();

    let mut expected = Vec::new();
    for batch in 0..3u8 {
        let docs: Vec<_> = (0..5u8).map(|n| (uuid(batch * 5 + n + 1), "alpha")).collect();
        add_docs(&store, &mut ks, &docs);
        expected.extend(docs.iter().map(|(u, _)| *u));
    }

    expected.sort_unstable();
    assert_eq!(run_search(&store, &ks, b"alpha"), expected);

    // one more batch lands on top of the now-cached baseline
    let extra = uuid(16);
    add_docs(&store, &mut ks, &[(extra, "alpha")]);
    expected.push(extra);
    expected.sort_unstable();
    assert_eq!(run_search(&store, &ks, b"alpha"), expected);

    // every chain entry was consumed along the way
    assert!(store.load_se().unwrap().is_empty());
}

#[test]
fn long_chain_in_a_single_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();

    let docs: Vec<_> = (1..=40u8).map(|n| (uuid(n), "alpha")).collect();
    add_docs(&store, &mut ks, &docs);
    assert_eq!(store.load_se().unwrap().len(), 40);

    let mut expected: Vec<_> = docs.iter().map(|(u, _)| *u).collect();
    expected.sort_unstable();
    assert_eq!(run_search(&store, &ks, b"alpha"), expected);
}

#[test]
fn add_and_remove_in_the_same_batch_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();
    let u1 = uuid(1);

    inject(
        &store,
        &mut ks,
        b"alpha",
        vec![(u1, OpTag::Add), (u1, OpTag::Remove)],
    );
    assert!(run_search(&store, &ks, b"alpha").is_empty());
}

#[test]
fn removed_id_stays_gone_while_new_ids_appear() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let mut ks = zero_keys();
    let (u1, u2) = (uuid(1), uuid(2));

    add_docs(&store, &mut ks, &[(u1, "alpha")]);
    assert_eq!(run_search(&store, &ks, b"alpha"), vec![u1]);

    inject(&store, &mut ks, b"alpha", vec![(u1, OpTag::Remove)]);
    assert!(run_search(&store, &ks, b"alpha").is_empty());

    add_docs(&store, &mut ks, &[(u2, "alpha")]);
    assert_eq!(run_search(&store, &ks, b"alpha"), vec![u2]);
}

#[test]
fn stored_document_blob_decrypts() {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(dir.path(), "local").unwrap();
    let ks = zero_keys();
    let u1 = uuid(4);

    let frame = document::encrypt_document(&ks.kd, &u1, b"alpha payload".to_vec());
    store.apply_add(&[], &frame).unwrap();

    let path = dir
        .path()
        .join("local")
        .join(format!("{}.enc", hex::encode(u1)));
    let stored = std::fs::read(path).unwrap();
    let (id, plain) = document::decrypt_document(&ks.kd, &stored).unwrap();
    assert_eq!(id, u1);
    assert_eq!(plain, b"alpha payload");
}
