// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Whole-packet reads and writes over byte streams.
//!
//! Readers buffer the full header before trusting the length field, so short
//! reads cannot desynchronize framing.

use std::io::{self, Read, Write};

use loom_bridge_proto::wire::{decode_message, encode_message, packet_len, Message, HEADER_BYTES};
use loom_host_port::TransportError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read one message. `Ok(None)` when the peer closed before sending a byte.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<(Message, u64)>, TransportError> {
    let mut header = [0u8; HEADER_BYTES];
    let mut read = 0usize;
    while read < header.len() {
        let n = reader.read(&mut header[read..]).await?;
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(truncated(read));
        }
        read += n;
    }
    let total = packet_len(&header)?;
    let mut packet = vec![0u8; total];
    packet[..HEADER_BYTES].copy_from_slice(&header);
    reader.read_exact(&mut packet[HEADER_BYTES..]).await?;
    let (msg, seq, _) = decode_message(&packet)?;
    Ok(Some((msg, seq)))
}

/// Encode and write one message.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message, seq: u64) -> Result<(), TransportError> {
    let packet = encode_message(msg, seq)?;
    writer.write_all(&packet).await?;
    writer.flush().await?;
    Ok(())
}

/// Buffered frame reader whose [`FrameReader::next_frame`] is cancel-safe.
///
/// Bytes read by a call that is later dropped stay in the buffer, so the
/// next call picks the frame up where the abandoned one stopped.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    acc: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `reader` with an empty buffer.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            acc: Vec::with_capacity(16 * 1024),
        }
    }

    /// The wrapped stream, e.g. to write requests on a duplex socket.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.acc.len()
    }

    /// Next whole message. `Ok(None)` when the peer closed on a frame boundary.
    pub async fn next_frame(&mut self) -> Result<Option<(Message, u64)>, TransportError> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Some(frame));
            }
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if self.acc.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::Io(format!(
                    "peer closed mid-frame with {} bytes buffered",
                    self.acc.len()
                )));
            }
            self.acc.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_frame(&mut self) -> Result<Option<(Message, u64)>, TransportError> {
        if self.acc.len() < HEADER_BYTES {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_BYTES];
        header.copy_from_slice(&self.acc[..HEADER_BYTES]);
        let total = packet_len(&header)?;
        if self.acc.len() < total {
            return Ok(None);
        }
        let (msg, seq, used) = decode_message(&self.acc[..total])?;
        self.acc.drain(..used);
        Ok(Some((msg, seq)))
    }
}

/// Blocking counterpart of [`read_frame`].
pub fn read_frame_blocking<R: Read>(reader: &mut R) -> Result<Option<(Message, u64)>, TransportError> {
    let mut header = [0u8; HEADER_BYTES];
    let mut read = 0usize;
    while read < header.len() {
        let n = match reader.read(&mut header[read..]) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(truncated(read));
        }
        read += n;
    }
    let total = packet_len(&header)?;
    let mut packet = vec![0u8; total];
    packet[..HEADER_BYTES].copy_from_slice(&header);
    reader.read_exact(&mut packet[HEADER_BYTES..])?;
    let (msg, seq, _) = decode_message(&packet)?;
    Ok(Some((msg, seq)))
}

/// Blocking counterpart of [`write_frame`].
pub fn write_frame_blocking<W: Write>(writer: &mut W, msg: &Message, seq: u64) -> Result<(), TransportError> {
    let packet = encode_message(msg, seq)?;
    writer.write_all(&packet)?;
    writer.flush()?;
    Ok(())
}

fn truncated(read: usize) -> TransportError {
    TransportError::Io(format!("truncated frame header: read {read} of {HEADER_BYTES} bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_bridge_proto::wire::FireEventPayload;
    use loom_bridge_proto::PluginEvent;
    use tokio::task;

    #[tokio::test]
    async fn partial_header_does_not_lose_bytes() {
        let (mut client, mut server) = tokio::net::UnixStream::pair().unwrap();
        let msg = Message::PluginEvent(PluginEvent::view_event(3, "onPress"));
        let encoded = encode_message(&msg, 42).unwrap();

        let reader = task::spawn(async move { read_frame(&mut client).await });
        server.write_all(&encoded[..5]).await.unwrap();
        task::yield_now().await;
        server.write_all(&encoded[5..]).await.unwrap();

        let got = reader.await.unwrap().unwrap();
        assert_eq!(got, Some((msg, 42)));
    }

    #[tokio::test]
    async fn frame_reader_survives_cancelled_reads() {
        let (client, mut server) = tokio::net::UnixStream::pair().unwrap();
        let first = Message::PluginEvent(PluginEvent::view_event(3, "onPress"));
        let encoded = encode_message(&first, 1).unwrap();
        let mut frames = FrameReader::new(client);

        server.write_all(&encoded[..20]).await.unwrap();
        let cancelled = tokio::time::timeout(std::time::Duration::from_millis(10), frames.next_frame()).await;
        assert!(cancelled.is_err());
        assert_eq!(frames.buffered(), 20);

        server.write_all(&encoded[20..]).await.unwrap();
        write_frame(&mut server, &Message::Stop, 2).await.unwrap();
        assert_eq!(frames.next_frame().await, Ok(Some((first, 1))));
        assert_eq!(frames.next_frame().await, Ok(Some((Message::Stop, 2))));

        drop(server);
        assert_eq!(frames.next_frame().await, Ok(None));
    }

    #[tokio::test]
    async fn frame_reader_reports_a_torn_frame() {
        let (client, mut server) = tokio::net::UnixStream::pair().unwrap();
        let encoded = encode_message(&Message::Stop, 1).unwrap();
        server.write_all(&encoded[..encoded.len() - 1]).await.unwrap();
        drop(server);
        let mut frames = FrameReader::new(client);
        assert!(matches!(frames.next_frame().await, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn clean_close_is_none_and_torn_header_is_an_error() {
        let (mut client, server) = tokio::net::UnixStream::pair().unwrap();
        drop(server);
        assert_eq!(read_frame(&mut client).await, Ok(None));

        let (mut client, mut server) = tokio::net::UnixStream::pair().unwrap();
        server.write_all(b"LOOM").await.unwrap();
        drop(server);
        assert!(matches!(read_frame(&mut client).await, Err(TransportError::Io(_))));
    }

    #[test]
    fn blocking_frames_interleave_with_back_to_back_writes() {
        let (mut a, mut b) = std::os::unix::net::UnixStream::pair().unwrap();
        let first = Message::FireEvent(FireEventPayload {
            widget_id: 9,
            event_name: "onChange".into(),
        });
        write_frame_blocking(&mut a, &first, 1).unwrap();
        write_frame_blocking(&mut a, &Message::Stop, 2).unwrap();

        assert_eq!(read_frame_blocking(&mut b).unwrap(), Some((first, 1)));
        assert_eq!(read_frame_blocking(&mut b).unwrap(), Some((Message::Stop, 2)));
    }

    #[test]
    fn garbage_header_is_rejected() {
        let mut bytes: &[u8] = b"JUNKJUNKJUNK";
        assert!(matches!(
            read_frame_blocking(&mut bytes),
            Err(TransportError::Codec(loom_bridge_proto::wire::WireError::BadMagic))
        ));
    }
}
