// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Length-prefixed frames. Every frame is exactly 8 bytes holding the payload
//! length (u64 big endian) followed by the proto encoded payload, which tells
//! the reader how much to read off the wire for the next object.

use bytes::Bytes;
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ErrorKind};

/// Largest payload accepted from the wire
pub const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

/// Helper method to read exactly `buf.len()` bytes from the stream.
///
/// Returns the number of bytes read before EOF, which is only short of
/// `buf.len()` if the stream ended
async fn read_n_bytes<R>(stream: &mut R, buf: &mut [u8]) -> tokio::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut c_len = 0;
    while c_len < buf.len() {
        let n = stream.read(&mut buf[c_len..]).await?;
        if n == 0 {
            // EOF
            break;
        }
        c_len += n;
    }
    Ok(c_len)
}

fn unexpected_eof(read: usize, len: usize) -> tokio::io::Error {
    tokio::io::Error::new(
        ErrorKind::UnexpectedEof,
        format!("EOF after {read} of {len} bytes"),
    )
}

/// Encode `msg` into a single frame
pub fn encode_frame<M: Message>(msg: &M) -> Vec<u8> {
    let len = msg.encoded_len();
    let mut buf: Vec<u8> = Vec::with_capacity(len + std::mem::size_of::<u64>());
    buf.extend_from_slice(&(len as u64).to_be_bytes());
    msg.encode_raw(&mut buf);
    buf
}

/// Write `msg` as one frame and flush it
pub async fn write_frame<W, M>(stream: &mut W, msg: &M) -> tokio::io::Result<()>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    let buf = encode_frame(msg);
    log::trace!("Writing payload (len={})", buf.len() - std::mem::size_of::<u64>());
    stream.write_all(&buf).await?;
    stream.flush().await
}

/// Read the next frame off the stream.
///
/// Returns [Ok(None)] if the stream ended cleanly between frames, and an
/// [ErrorKind::InvalidData] error for oversized or undecodable frames
pub async fn read_frame<R, M>(stream: &mut R) -> tokio::io::Result<Option<M>>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    let mut prefix = [0u8; std::mem::size_of::<u64>()];
    match read_n_bytes(stream, &mut prefix).await? {
        0 => {
            log::trace!("Stream closed");
            return Ok(None);
        }
        n if n < prefix.len() => return Err(unexpected_eof(n, prefix.len())),
        _ => {}
    }
    let length = u64::from_be_bytes(prefix);
    if length > MAX_FRAME_LEN {
        return Err(tokio::io::Error::new(
            ErrorKind::InvalidData,
            format!("frame of {length} bytes exceeds the {MAX_FRAME_LEN} byte limit"),
        ));
    }
    log::trace!("Payload length message ({length}) received");

    let mut buf = vec![0u8; length as usize];
    let n = read_n_bytes(stream, &mut buf).await?;
    if n < buf.len() {
        return Err(unexpected_eof(n, buf.len()));
    }
    M::decode(Bytes::from(buf)).map(Some).map_err(|decode_err| {
        tokio::io::Error::new(
            ErrorKind::InvalidData,
            format!("error decoding network message: '{decode_err}'"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{registry_request, MemberRef, RegistryRequest};

    fn request(id: u64) -> RegistryRequest {
        RegistryRequest {
            request_id: id,
            body: Some(registry_request::Body::WaitClosed(MemberRef {
                group: "codec".to_string(),
                member_id: id * 10,
            })),
        }
    }

    #[test]
    fn test_frame_prefix_is_payload_length() {
        let msg = request(7);
        let frame = encode_frame(&msg);
        let (prefix, payload) = frame.split_at(std::mem::size_of::<u64>());
        let mut len = [0u8; 8];
        len.copy_from_slice(prefix);
        assert_eq!(msg.encoded_len() as u64, u64::from_be_bytes(len));
        assert_eq!(msg.encode_to_vec(), payload);
    }

    #[tokio::test]
    async fn test_frames_read_back_in_order() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            for id in 0..5 {
                write_frame(&mut client, &request(id))
                    .await
                    .expect("Failed to write frame");
            }
        });

        for id in 0..5 {
            let frame: Option<RegistryRequest> =
                read_frame(&mut server).await.expect("Failed to read frame");
            assert_eq!(Some(request(id)), frame);
        }
        writer.await.expect("Writer panicked");

        // the writer hung up between frames
        let end: Option<RegistryRequest> = read_frame(&mut server)
            .await
            .expect("A clean close isn't an error");
        assert_eq!(None, end);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&(MAX_FRAME_LEN + 1).to_be_bytes())
            .await
            .expect("Failed to write length");

        let result: tokio::io::Result<Option<RegistryRequest>> = read_frame(&mut server).await;
        assert_eq!(
            ErrorKind::InvalidData,
            result.expect_err("Oversized frame accepted").kind()
        );
    }

    #[tokio::test]
    async fn test_truncated_frame_is_eof() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let frame = encode_frame(&request(1));
        client
            .write_all(&frame[..frame.len() - 1])
            .await
            .expect("Failed to write partial frame");
        drop(client);

        let result: tokio::io::Result<Option<RegistryRequest>> = read_frame(&mut server).await;
        assert_eq!(
            ErrorKind::UnexpectedEof,
            result.expect_err("Truncated frame accepted").kind()
        );
    }

    #[tokio::test]
    async fn test_truncated_length_prefix_is_eof() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let frame = encode_frame(&request(1));
        client
            .write_all(&frame[..3])
            .await
            .expect("Failed to write partial prefix");
        drop(client);

        let result: tokio::io::Result<Option<RegistryRequest>> = read_frame(&mut server).await;
        assert_eq!(
            ErrorKind::UnexpectedEof,
            result.expect_err("A cut off length prefix isn't a clean close").kind()
        );
    }
}
