//! Wire protocol scaffolding: opcodes, length-prefixed blob framing over a
//! reliable byte stream, and Unix socket address resolution. All integers
//! on the wire are little-endian.

use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

pub const OP_ADD: u64 = 0;
/// Reserved; rejected by the server.
pub const OP_REMOVE: u64 = 1;
pub const OP_SEARCH: u64 = 2;

/// Upper bound for any single length-prefixed blob, checked before
/// allocation on both sides.
pub const MAX_BLOB: u64 = 64 << 20;

/// Default rendezvous: abstract-namespace Unix socket (the leading `@`
/// stands in for the NUL byte).
pub const DEFAULT_SOCKET: &str = "@dsse_apocm";

/// Resolve a socket spec: `@name` selects the Linux abstract namespace,
/// anything else is a filesystem path.
pub fn socket_addr(spec: &str) -> std::io::Result<SocketAddr> {
    match spec.strip_prefix('@') {
        Some(name) => SocketAddr::from_abstract_name(name.as_bytes()),
        None => SocketAddr::from_pathname(spec),
    }
}

/// Read `len:u64 ‖ bytes(len)`, rejecting lengths above `cap`.
pub async fn read_blob<R: AsyncRead + Unpin>(r: &mut R, cap: u64) -> Result<Vec<u8>> {
    let len = r.read_u64_le().await?;
    if len > cap {
        return Err(Error::CorruptedResponse("blob length exceeds cap"));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write `len:u64 ‖ bytes`.
pub async fn write_blob<W: AsyncWrite + Unpin>(w: &mut W, blob: &[u8]) -> Result<()> {
    w.write_u64_le(blob.len() as u64).await?;
    w.write_all(blob).await?;
    Ok(())
}
