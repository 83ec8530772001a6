//! Per-connection opcode dispatcher. One client is served at a time and a
//! search's finalize step only ever runs on the connection that issued
//! round 1, so `Se`/`Sr` never see interleaved mutation.
//!
//! The handler is generic over the stream so tests can drive it through
//! an in-memory duplex pipe instead of a socket.

use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use dsse_core::error::{Error, Result};
use dsse_core::{wire, SE_ROW_LEN, UUID_LEN};

use crate::search;
use crate::storage::UserStore;

pub struct Dispatcher {
    root: PathBuf,
    user: String,
}

impl Dispatcher {
    pub fn new(root: PathBuf, user: String) -> Self {
        Self { root, user }
    }

    /// Serve one connection to completion. Errors abort the connection
    /// without touching on-disk state mid-parse.
    pub async fn handle<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let opcode = stream.read_u64_le().await?;
        match opcode {
            wire::OP_ADD => self.handle_add(stream).await,
            wire::OP_SEARCH => self.handle_search(stream).await,
            wire::OP_REMOVE => {
                warn!("remove opcode is reserved");
                Err(Error::CorruptedResponse("reserved opcode"))
            }
            _ => Err(Error::CorruptedResponse("unknown opcode")),
        }
    }

    async fn handle_add<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(user = %self.user, "handling update request");
        let se_blob = wire::read_blob(stream, wire::MAX_BLOB).await?;
        let doc_blob = wire::read_blob(stream, wire::MAX_BLOB).await?;

        let store = UserStore::open(&self.root, &self.user)?;
        store.apply_add(&se_blob, &doc_blob)?;
        info!(
            user = %self.user,
            rows = se_blob.len() / SE_ROW_LEN,
            "update processed"
        );
        Ok(())
    }

    async fn handle_search<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(user = %self.user, "handling search request");
        let mut t = [0u8; 32];
        let mut ktw = [0u8; 32];
        stream.read_exact(&mut t).await?;
        stream.read_exact(&mut ktw).await?;
        let con = stream.read_u64_le().await?;

        let store = UserStore::open(&self.root, &self.user)?;
        let outcome = search::search_keyword(&store, &t, &ktw, con)?;

        let id1 = outcome.id1_bytes();
        let id2 = outcome.id2_bytes();
        stream.write_u64_le(id1.len() as u64).await?;
        stream.write_u64_le(id2.len() as u64).await?;
        stream.write_all(&id1).await?;
        stream.write_all(&id2).await?;
        stream.flush().await?;
        info!(
            user = %self.user,
            cached = outcome.id1.len(),
            fresh = outcome.id2.len(),
            "search round 1 sent, awaiting confirmation"
        );

        // round 2: the consolidated plaintext set becomes the new cache row
        let k = stream.read_u64_le().await?;
        if k > wire::MAX_BLOB / UUID_LEN as u64 {
            return Err(Error::CorruptedResponse("final ID1 count"));
        }
        let mut uuids = Vec::with_capacity(k as usize);
        for _ in 0..k {
            let mut uuid = [0u8; UUID_LEN];
            stream.read_exact(&mut uuid).await?;
            uuids.push(uuid);
        }
        let final_con = stream.read_u64_le().await?;

        search::finalize(&store, &t, uuids, final_con)?;
        info!(user = %self.user, results = k, "search finalized");
        Ok(())
    }
}
