//! Network utilities

use crate::Result;
use socket2::SockRef;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

#[inline]
pub fn configure_tcp_stream(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    let sock = SockRef::from(stream);
    let _ = sock.set_keepalive(true);
}

/// Copy data between two streams bidirectionally.
///
/// Returns once both directions have reached EOF (or either side errors);
/// shutdown is propagated so the peers observe the close.
pub async fn copy_bidirectional<A, B>(a: &mut A, b: &mut B) -> Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (ab, ba) = tokio::io::copy_bidirectional(a, b).await?;
    Ok((ab, ba))
}
