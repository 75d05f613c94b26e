//! Length-prefixed framing, with an HTTP handoff on the same port.
//!
//! A freshly accepted stream's first 4 bytes are sniffed once
//! ([`sniff_first_frame`]): if they spell `"GET "` or `"POST"` the
//! connection is HTTP and the caller hands it to an embedded HTTP
//! listener, prepending the consumed 4 bytes so the HTTP parser still
//! sees a complete request line. Otherwise those 4 bytes are the
//! big-endian length of the first envelope frame, and every subsequent
//! frame on the connection is read with [`read_envelope`].

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::envelope::Envelope;
use crate::WireError;

/// Frames larger than this are a protocol violation (spec §4.2).
pub const MAX_FRAME_SIZE: u32 = 10_000_000;

/// The outcome of sniffing a freshly accepted connection's first 4 bytes.
pub enum Sniff {
    /// The stream opens with an HTTP request line; `prefix` is the 4
    /// already-consumed bytes the HTTP parser must see replayed first.
    Http { prefix: [u8; 4] },
    /// The stream opens with a degdb envelope frame, already fully read.
    Message(Envelope),
}

fn looks_like_http(prefix: &[u8; 4]) -> bool {
    prefix == b"GET " || prefix == b"POST"
}

/// Sniff and, if it's a degdb frame, fully decode the first frame of a
/// newly accepted connection.
pub async fn sniff_first_frame<R>(stream: &mut R) -> Result<Sniff, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await?;
    if looks_like_http(&prefix) {
        return Ok(Sniff::Http { prefix });
    }
    let len = u32::from_be_bytes(prefix);
    let envelope = read_payload(stream, len).await?;
    Ok(Sniff::Message(envelope))
}

/// Read one length-prefixed envelope frame from an established degdb
/// connection (i.e. after the initial sniff has confirmed it isn't HTTP).
pub async fn read_envelope<R>(stream: &mut R) -> Result<Envelope, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    read_payload(stream, len).await
}

async fn read_payload<R>(stream: &mut R, len: u32) -> Result<Envelope, WireError>
where
    R: AsyncRead + Unpin,
{
    if len == 0 || len > MAX_FRAME_SIZE {
        return Err(WireError::Oversize);
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Envelope::from_bytes(&buf)
}

/// Write one envelope as a length-prefixed frame. Callers must serialize
/// writes on a connection themselves (e.g. behind a mutex) since a
/// partial write here would corrupt the stream for concurrent senders.
pub async fn write_envelope<W>(stream: &mut W, envelope: &Envelope) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = envelope.to_bytes()?;
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(WireError::Oversize);
    }
    let mut packet = Vec::with_capacity(payload.len() + 4);
    packet.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    packet.extend_from_slice(&payload);
    stream.write_all(&packet).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageBody;
    use std::io::Cursor;

    #[tokio::test]
    async fn roundtrip_through_framing() {
        let env = Envelope::new(MessageBody::PeerRequest { limit: -1 });
        let mut buf = Vec::new();
        write_envelope(&mut buf, &env).await.expect("write");

        let mut cursor = Cursor::new(buf);
        let decoded = read_envelope(&mut cursor).await.expect("read");
        assert_eq!(decoded, env);
    }

    #[tokio::test]
    async fn sniffs_http_prefix_without_consuming_more() {
        let mut cursor = Cursor::new(b"GET /api/v1/info HTTP/1.1\r\n".to_vec());
        match sniff_first_frame(&mut cursor).await.expect("sniff") {
            Sniff::Http { prefix } => assert_eq!(&prefix, b"GET "),
            Sniff::Message(_) => panic!("expected HTTP sniff"),
        }
    }

    #[tokio::test]
    async fn sniffs_post_prefix() {
        let mut cursor = Cursor::new(b"POST /api/v1/insert HTTP/1.1\r\n".to_vec());
        match sniff_first_frame(&mut cursor).await.expect("sniff") {
            Sniff::Http { prefix } => assert_eq!(&prefix, b"POST"),
            Sniff::Message(_) => panic!("expected HTTP sniff"),
        }
    }

    #[tokio::test]
    async fn sniffs_degdb_frame() {
        let env = Envelope::new(MessageBody::PeerRequest { limit: -1 });
        let mut buf = Vec::new();
        write_envelope(&mut buf, &env).await.expect("write");

        let mut cursor = Cursor::new(buf);
        match sniff_first_frame(&mut cursor).await.expect("sniff") {
            Sniff::Message(decoded) => assert_eq!(decoded, env),
            Sniff::Http { .. } => panic!("expected message sniff"),
        }
    }

    #[tokio::test]
    async fn oversize_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let err = sniff_first_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, WireError::Oversize));
    }

    #[tokio::test]
    async fn zero_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let err = sniff_first_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, WireError::Oversize));
    }
}
