//! Protocol driver: `add`, `remove`, `search` as wire exchanges with the
//! server. Keys are wiped before any bytes hit the socket and reloaded
//! only when the response needs decrypting; the keystore itself wipes on
//! drop, so error paths cannot leak key material either.

use std::collections::HashSet;
use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{info, warn};
use zeroize::Zeroize;

use dsse_core::bytes::{read_u64_le, Secret};
use dsse_core::crypto;
use dsse_core::error::{Error, Result};
use dsse_core::{wire, EID_LEN, ID2_ROW_LEN, LAMBDA, UUID_LEN};

use crate::document;
use crate::index::{self, KeywordIndex};
use crate::keystore::Keystore;
use crate::secure;

pub struct ClientConfig {
    pub socket: String,
    pub keystore: PathBuf,
    pub password_file: Option<PathBuf>,
}

impl ClientConfig {
    fn password(&self) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        // confirmation only when a fresh keystore is about to be created
        let confirm = !self.keystore.exists();
        secure::obtain_password(self.password_file.as_deref(), confirm)
    }
}

async fn connect(spec: &str) -> Result<UnixStream> {
    let addr = wire::socket_addr(spec)?;
    let stream = std::os::unix::net::UnixStream::connect_addr(&addr)?;
    stream.set_nonblocking(true)?;
    Ok(UnixStream::from_std(stream)?)
}

/// Read the given files, index and encrypt them, and upload the batch.
/// The counter is decremented and the keystore persisted before anything
/// is sent, so a transport failure never reuses an epoch.
pub async fn add(cfg: &ClientConfig, paths: &[PathBuf]) -> Result<()> {
    let password = cfg.password()?;
    let (mut ks, _created) = Keystore::load_or_setup(&cfg.keystore, &password)?;

    let mut kt = KeywordIndex::new();
    let mut doc_blob = Vec::new();
    let mut count = 0usize;
    for path in paths {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            _ => {
                warn!(path = %path.display(), "skipping non-regular path");
                continue;
            }
        }
        let data = std::fs::read(path)?;
        let uuid = uuid::Uuid::new_v4().into_bytes();
        index::index_document(&mut kt, uuid, &data);
        doc_blob.extend_from_slice(&document::encrypt_document(&ks.kd, &uuid, data));
        info!(path = %path.display(), id = %hex::encode(uuid), "document prepared");
        count += 1;
    }

    let se_blob = index::build_index(&kt, &ks);

    // advance the epoch even for an empty batch, then drop key material
    ks.con = ks.con.wrapping_sub(1);
    ks.store(&cfg.keystore, &password)?;
    ks.wipe();
    drop(password);

    let mut stream = connect(&cfg.socket).await?;
    stream.write_u64_le(wire::OP_ADD).await?;
    wire::write_blob(&mut stream, &se_blob).await?;
    wire::write_blob(&mut stream, &doc_blob).await?;
    stream.flush().await?;
    stream.shutdown().await?;

    info!(documents = count, keywords = kt.len(), "add uploaded");
    Ok(())
}

/// Reserved: removal by document id is not part of the protocol yet
/// (opcode 1 exists on the wire but the server rejects it).
pub fn remove(_ids: &[String]) -> Result<()> {
    Err(Error::InvalidArgument(
        "remove is reserved and not implemented".into(),
    ))
}

/// Two-round search. Round 1 sends the trapdoor and counter snapshot;
/// the consolidated plaintext result set goes back in round 2 so the
/// server can rebuild its result cache.
pub async fn search(cfg: &ClientConfig, keyword: &str) -> Result<Vec<[u8; UUID_LEN]>> {
    let password = cfg.password()?;
    let (mut ks, _created) = Keystore::load_or_setup(&cfg.keystore, &password)?;

    let word = keyword.as_bytes();
    let t = crypto::prf(ks.kt.as_bytes(), &[word]);
    let ktw = crypto::prf(ks.kf.as_bytes(), &[word]);
    let con = ks.con;
    ks.wipe();

    let mut stream = connect(&cfg.socket).await?;
    stream.write_u64_le(wire::OP_SEARCH).await?;
    stream.write_all(&t).await?;
    stream.write_all(&ktw).await?;
    stream.write_u64_le(con).await?;
    stream.flush().await?;

    let n1 = stream.read_u64_le().await?;
    let n2 = stream.read_u64_le().await?;
    if n1 % UUID_LEN as u64 != 0 || n1 > wire::MAX_BLOB {
        return Err(Error::CorruptedResponse("ID1 length"));
    }
    if n2 % ID2_ROW_LEN as u64 != 0 || n2 > wire::MAX_BLOB {
        return Err(Error::CorruptedResponse("ID2 length"));
    }

    let mut id1_bytes = vec![0u8; n1 as usize];
    stream.read_exact(&mut id1_bytes).await?;
    let mut id2_bytes = vec![0u8; n2 as usize];
    stream.read_exact(&mut id2_bytes).await?;

    let id1: HashSet<[u8; UUID_LEN]> = id1_bytes
        .chunks_exact(UUID_LEN)
        .map(|c| c.try_into().expect("chunk width"))
        .collect();

    // decrypting ID2 needs Kg again
    let mut ks = Keystore::load(&cfg.keystore, &password)?;
    let merged = merge_search_results(&ks.kg, word, id1, &id2_bytes);
    ks.wipe();
    drop(password);

    let mut results: Vec<[u8; UUID_LEN]> = merged.into_iter().collect();
    results.sort_unstable();

    stream.write_u64_le(results.len() as u64).await?;
    for uuid in &results {
        stream.write_all(uuid).await?;
    }
    stream.write_u64_le(con).await?;
    stream.flush().await?;
    stream.shutdown().await?;

    info!(results = results.len(), "search complete");
    Ok(results)
}

/// Consolidate round-1 results: decrypt each `ID2` entry under its
/// per-epoch subkey, fold additions into the cached set, then apply
/// removals. Entries that fail authentication are dropped with a warning
/// and the search continues.
pub fn merge_search_results(
    kg: &Secret<LAMBDA>,
    keyword: &[u8],
    mut id1: HashSet<[u8; UUID_LEN]>,
    id2: &[u8],
) -> HashSet<[u8; UUID_LEN]> {
    let mut removals: HashSet<[u8; UUID_LEN]> = HashSet::new();

    for row in id2.chunks_exact(ID2_ROW_LEN) {
        let (eid, epoch_le) = row.split_at(EID_LEN);
        let mut sk = crypto::prf(kg.as_bytes(), &[keyword, epoch_le]);

        let mac: [u8; 16] = eid[..16].try_into().expect("split width");
        let nonce: [u8; 24] = eid[16..40].try_into().expect("split width");
        let mut data: [u8; 24] = eid[40..].try_into().expect("split width");
        let opened = crypto::open_in_place(&sk, &nonce, &mac, b"", &mut data);
        sk.zeroize();
        if opened.is_err() {
            warn!("dropping index entry that failed authentication");
            continue;
        }

        let uuid: [u8; UUID_LEN] = data[..UUID_LEN].try_into().expect("split width");
        if read_u64_le(&data[UUID_LEN..]) == 0 {
            id1.insert(uuid);
        } else {
            removals.insert(uuid);
        }
    }

    for r in &removals {
        id1.remove(r);
    }
    id1
}
