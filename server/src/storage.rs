//! Per-user on-disk state: the encrypted index `Se.enc` (fixed 200-byte
//! rows), the plaintext result cache `Sr.enc` (length-prefixed rows), and
//! one append-only file per document, named by the hex uuid.
//!
//! Incoming blobs are validated in full before any file is touched, and
//! rewrites go through a temp file + rename, so a failed operation never
//! leaves a partially-written `Se`/`Sr` behind.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use dsse_core::bytes::read_u64_le;
use dsse_core::error::{Error, Result};
use dsse_core::{wire, ADDR_LEN, DOC_OVERHEAD, SE_ROW_LEN, UUID_LEN, VAL_LEN};

pub type SeMap = HashMap<[u8; ADDR_LEN], [u8; VAL_LEN]>;
pub type SrMap = HashMap<[u8; 32], SrEntry>;

/// One result-cache row: the counter snapshot of the last search and the
/// uuid set it returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrEntry {
    pub con: u64,
    pub uuids: Vec<[u8; UUID_LEN]>,
}

/// Filename filter for user ids (path traversal).
pub fn valid_user_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && !id.contains('/')
        && !id.contains('\\')
        && !id.contains("..")
}

pub struct UserStore {
    dir: PathBuf,
}

impl UserStore {
    /// Open (creating on demand) the directory for one user under the
    /// storage root.
    pub fn open(root: &Path, user_id: &str) -> Result<Self> {
        if !valid_user_id(user_id) {
            return Err(Error::InvalidArgument(format!("bad user id {user_id:?}")));
        }
        let dir = root.join(user_id);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn se_path(&self) -> PathBuf {
        self.dir.join("Se.enc")
    }

    fn sr_path(&self) -> PathBuf {
        self.dir.join("Sr.enc")
    }

    fn read_or_empty(path: &Path) -> Result<Vec<u8>> {
        match fs::read(path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let tmp = path.with_extension("enc.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Apply one validated `add` upload: append the index rows, then store
    /// each document frame. Nothing is written if validation fails.
    pub fn apply_add(&self, se_blob: &[u8], doc_blob: &[u8]) -> Result<()> {
        if se_blob.len() % SE_ROW_LEN != 0 {
            return Err(Error::CorruptedResponse("Se blob not on a row boundary"));
        }
        let frames = split_document_frames(doc_blob)?;

        if !se_blob.is_empty() {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.se_path())?;
            f.write_all(se_blob)?;
        }

        for frame in &frames {
            let name = format!("{}.enc", hex::encode(&frame[..UUID_LEN]));
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(name))?;
            f.write_all(frame)?;
            info!(id = %hex::encode(&frame[..UUID_LEN]), "stored encrypted document");
        }

        info!(
            rows = se_blob.len() / SE_ROW_LEN,
            documents = frames.len(),
            "encrypted index updated"
        );
        Ok(())
    }

    pub fn load_se(&self) -> Result<SeMap> {
        let data = Self::read_or_empty(&self.se_path())?;
        if data.len() % SE_ROW_LEN != 0 {
            return Err(Error::CorruptedResponse("Se.enc not on a row boundary"));
        }
        let mut map = SeMap::with_capacity(data.len() / SE_ROW_LEN);
        for row in data.chunks_exact(SE_ROW_LEN) {
            let addr: [u8; ADDR_LEN] = row[..ADDR_LEN].try_into().expect("split width");
            let val: [u8; VAL_LEN] = row[ADDR_LEN..].try_into().expect("split width");
            map.insert(addr, val);
        }
        Ok(map)
    }

    /// Full rewrite of `Se.enc` (performed after every search, when
    /// visited entries have been erased).
    pub fn rewrite_se(&self, map: &SeMap) -> Result<()> {
        let mut data = Vec::with_capacity(map.len() * SE_ROW_LEN);
        for (addr, val) in map {
            data.extend_from_slice(addr);
            data.extend_from_slice(val);
        }
        Self::write_atomic(&self.se_path(), &data)
    }

    pub fn load_sr(&self) -> Result<SrMap> {
        let data = Self::read_or_empty(&self.sr_path())?;
        let mut map = SrMap::new();
        let mut i = 0usize;
        while i < data.len() {
            if data.len() - i < 32 + 8 {
                return Err(Error::CorruptedResponse("Sr.enc truncated row header"));
            }
            let t: [u8; 32] = data[i..i + 32].try_into().expect("split width");
            let len = read_u64_le(&data[i + 32..i + 40]) as usize;
            i += 40;
            if len < 8 || (len - 8) % UUID_LEN != 0 || data.len() - i < len {
                return Err(Error::CorruptedResponse("Sr.enc bad payload length"));
            }
            let con = read_u64_le(&data[i..i + 8]);
            let uuids = data[i + 8..i + len]
                .chunks_exact(UUID_LEN)
                .map(|c| c.try_into().expect("chunk width"))
                .collect();
            map.insert(t, SrEntry { con, uuids });
            i += len;
        }
        Ok(map)
    }

    pub fn rewrite_sr(&self, map: &SrMap) -> Result<()> {
        let mut data = Vec::new();
        for (t, entry) in map {
            data.extend_from_slice(t);
            let len = (8 + entry.uuids.len() * UUID_LEN) as u64;
            data.extend_from_slice(&len.to_le_bytes());
            data.extend_from_slice(&entry.con.to_le_bytes());
            for uuid in &entry.uuids {
                data.extend_from_slice(uuid);
            }
        }
        Self::write_atomic(&self.sr_path(), &data)
    }
}

/// Split a document blob into whole frames (`uuid ‖ len ‖ mac ‖ nonce ‖
/// ct`), bounds-checked; used to validate an upload before writing.
pub fn split_document_frames(blob: &[u8]) -> Result<Vec<&[u8]>> {
    let mut frames = Vec::new();
    let mut i = 0usize;
    while i < blob.len() {
        if blob.len() - i < UUID_LEN + 8 {
            return Err(Error::CorruptedResponse("document frame truncated header"));
        }
        let len = read_u64_le(&blob[i + UUID_LEN..i + UUID_LEN + 8]);
        if len < DOC_OVERHEAD as u64 || len > wire::MAX_BLOB {
            return Err(Error::CorruptedResponse("document frame bad length"));
        }
        let body = len as usize;
        let total = UUID_LEN + 8 + body;
        if blob.len() - i < total {
            return Err(Error::CorruptedResponse("document frame truncated body"));
        }
        frames.push(&blob[i..i + total]);
        i += total;
    }
    Ok(frames)
}
