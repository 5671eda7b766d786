//! Newline-delimited JSON framing
//!
//! One `WireMessage` per line in both directions. The reader tolerates bad
//! lines (malformed JSON, oversized lines) by logging and skipping them; only
//! a failing transport ends the stream with an error.

use futures_util::SinkExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio_util::codec::{FramedWrite, LinesCodec};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::message::WireMessage;

/// Outcome of reading one raw line
enum Line {
    Complete,
    Oversized,
    Eof,
}

/// Inbound half: decodes one message per line
pub struct MessageReader<R> {
    inner: BufReader<R>,
    max_line_bytes: usize,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Wrap `inner`, rejecting lines longer than `max_line_bytes`
    pub fn new(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_line_bytes,
            line: Vec::new(),
        }
    }

    /// Read the next decodable message
    ///
    /// Returns `Ok(None)` on end of stream. Blank, malformed and oversized
    /// lines are skipped.
    pub async fn next_inbound(&mut self) -> Result<Option<WireMessage>, AppError> {
        loop {
            match self.read_line().await? {
                Line::Eof => return Ok(None),
                Line::Oversized => {
                    warn!(limit = self.max_line_bytes, "oversized line skipped");
                }
                Line::Complete => {
                    let trimmed = self.line.trim_ascii();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice::<WireMessage>(trimmed) {
                        Ok(msg) => return Ok(Some(msg)),
                        Err(err) => warn!(error = %err, "bad json, line skipped"),
                    }
                }
            }
        }
    }

    async fn read_line(&mut self) -> std::io::Result<Line> {
        self.line.clear();
        let limit = self.max_line_bytes as u64 + 1;
        let read = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut self.line)
            .await?;

        if read == 0 {
            return Ok(Line::Eof);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            return Ok(Line::Complete);
        }
        if self.line.len() as u64 >= limit {
            self.discard_rest_of_line().await?;
            return Ok(Line::Oversized);
        }
        // last line without a trailing newline
        Ok(Line::Complete)
    }

    async fn discard_rest_of_line(&mut self) -> std::io::Result<()> {
        loop {
            let buf = self.inner.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                self.inner.consume(pos + 1);
                return Ok(());
            }
            let len = buf.len();
            self.inner.consume(len);
        }
    }
}

/// Outbound half: encodes one message per line
pub struct MessageWriter<W> {
    frames: FramedWrite<W, LinesCodec>,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            frames: FramedWrite::new(inner, LinesCodec::new()),
        }
    }

    /// Encode and flush one message
    pub async fn send(&mut self, msg: &WireMessage) -> Result<(), AppError> {
        let line = serde_json::to_string(msg)?;
        self.frames.send(line).await?;
        Ok(())
    }

    /// Flush and shut down the underlying writer
    pub async fn close(&mut self) -> Result<(), AppError> {
        SinkExt::<String>::close(&mut self.frames).await?;
        debug!("writer closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_reads_messages_and_skips_bad_lines() {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut reader = MessageReader::new(server, 1024);

        client
            .write_all(
                b"{\"type\":\"ping\"}\n\n   \nnot json\n{\"room\":\"no type\"}\r\n{\"type\":\"join\",\"room\":\"lobby\"}\r\n",
            )
            .await
            .unwrap();
        drop(client);

        let first = reader.next_inbound().await.unwrap().unwrap();
        assert_eq!(first.kind, MessageKind::Ping);

        let second = reader.next_inbound().await.unwrap().unwrap();
        assert_eq!(second.kind, MessageKind::Join);
        assert_eq!(second.room_name(), Some("lobby"));

        assert!(reader.next_inbound().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skips_oversized_line_and_continues() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let mut reader = MessageReader::new(server, 64);

        let big = format!("{{\"type\":\"echo\",\"body\":\"{}\"}}\n", "x".repeat(500));
        client.write_all(big.as_bytes()).await.unwrap();
        client.write_all(b"{\"type\":\"pong\"}\n").await.unwrap();
        drop(client);

        let msg = reader.next_inbound().await.unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Pong);
        assert!(reader.next_inbound().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_final_line_without_newline() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = MessageReader::new(server, 1024);

        client.write_all(b"{\"type\":\"echo\"}").await.unwrap();
        drop(client);

        let msg = reader.next_inbound().await.unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Echo);
        assert!(reader.next_inbound().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timestamp_without_offset_still_delivers() {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut reader = MessageReader::new(server, 1024);

        client
            .write_all(
                b"{\"type\":\"room_msg\",\"room\":\"lobby\",\"username\":\"alice\",\"body\":\"hi\",\"timestamp\":\"2025-01-02T03:04:05\"}\n\
                  {\"type\":\"room_msg\",\"room\":\"lobby\",\"body\":\"later\",\"timestamp\":\"soon\"}\n",
            )
            .await
            .unwrap();
        drop(client);

        let first = reader.next_inbound().await.unwrap().expect("naive timestamp");
        assert_eq!(first.body.as_deref(), Some("hi"));
        assert_eq!(
            first.timestamp.map(|ts| ts.to_rfc3339()),
            Some("2025-01-02T03:04:05+00:00".to_string())
        );

        let second = reader.next_inbound().await.unwrap().expect("bad timestamp");
        assert_eq!(second.body.as_deref(), Some("later"));
        assert!(second.timestamp.is_none());

        assert!(reader.next_inbound().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writer_emits_one_line_per_message() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = MessageWriter::new(client);
        let mut reader = MessageReader::new(server, 4096);

        let sent = WireMessage::room_msg("lobby", "alice", "multi\nline");
        writer.send(&sent).await.unwrap();
        writer.send(&WireMessage::new(MessageKind::Pong)).await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(reader.next_inbound().await.unwrap(), Some(sent));
        assert_eq!(
            reader.next_inbound().await.unwrap().map(|m| m.kind),
            Some(MessageKind::Pong)
        );
        assert!(reader.next_inbound().await.unwrap().is_none());
    }
}
