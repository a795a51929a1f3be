//! Outbound message chunking.

use tokio_util::sync::CancellationToken;

use lcg_core::wire::{MAX_MESSAGE_SIZE, SEND_CHUNK_SIZE};
use lcg_core::MessageEncoder;

use crate::error::TransportError;
use crate::pool::BufferPool;
use crate::socket::FrameSink;

/// Encode `message` and stream it to `sink` as one logical message.
///
/// The encoder's reported maximum is checked against [`MAX_MESSAGE_SIZE`]
/// before anything is allocated or written, so an oversized message sends
/// zero bytes. The encode buffer goes back to `pool` on every path.
pub async fn send_message<S, E>(
    message: &E::Message,
    encoder: &E,
    sink: &mut S,
    pool: &BufferPool,
    cancel: &CancellationToken,
) -> Result<(), TransportError>
where
    S: FrameSink + ?Sized,
    E: MessageEncoder,
{
    let max_size = encoder.max_encoded_size(message);
    if max_size > MAX_MESSAGE_SIZE {
        return Err(TransportError::MessageTooLarge {
            size: max_size,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = pool.acquire(max_size);
    let written = encoder.encode(message, buf.as_mut_slice())?;
    send_bytes(&buf[..written], sink, cancel).await
}

/// Stream already-encoded bytes as consecutive frames of at most
/// [`SEND_CHUNK_SIZE`], marking only the last one as end of message.
///
/// Frames are awaited in order. An empty message goes out as a single empty
/// final frame. A cancelled send leaves the peer with a partial message;
/// drop the connection.
pub async fn send_bytes<S>(
    bytes: &[u8],
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<(), TransportError>
where
    S: FrameSink + ?Sized,
{
    if bytes.is_empty() {
        return send_frame(sink, &[], true, cancel).await;
    }

    let mut chunks = bytes.chunks(SEND_CHUNK_SIZE).peekable();
    while let Some(chunk) = chunks.next() {
        let last = chunks.peek().is_none();
        send_frame(sink, chunk, last, cancel).await?;
    }
    Ok(())
}

async fn send_frame<S>(
    sink: &mut S,
    chunk: &[u8],
    end_of_message: bool,
    cancel: &CancellationToken,
) -> Result<(), TransportError>
where
    S: FrameSink + ?Sized,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        sent = sink.send_frame(chunk, end_of_message) => Ok(sent?),
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;
    use bytes::Bytes;
    use lcg_core::{EncodeError, GatewayCodec, GatewayMessage, MessageDecoder};

    use super::*;

    #[derive(Default)]
    struct Recording {
        frames: Vec<(Vec<u8>, bool)>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl FrameSink for Recording {
        async fn send_frame(&mut self, data: &[u8], end_of_message: bool) -> io::Result<()> {
            if self.fail_after == Some(self.frames.len()) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.frames.push((data.to_vec(), end_of_message));
            Ok(())
        }

        async fn send_close(&mut self, _reason: &str) -> io::Result<()> {
            Ok(())
        }
    }

    /// Reports a huge maximum; encoding it must never be attempted.
    struct Inflated;

    impl MessageEncoder for Inflated {
        type Message = ();

        fn max_encoded_size(&self, _: &()) -> usize {
            MAX_MESSAGE_SIZE + 1
        }

        fn encode(&self, _: &(), _: &mut [u8]) -> Result<usize, EncodeError> {
            panic!("encode called for oversized message");
        }
    }

    /// Reports a loose upper bound but writes less.
    struct Loose;

    impl MessageEncoder for Loose {
        type Message = Vec<u8>;

        fn max_encoded_size(&self, message: &Vec<u8>) -> usize {
            message.len() * 2
        }

        fn encode(&self, message: &Vec<u8>, buf: &mut [u8]) -> Result<usize, EncodeError> {
            buf[..message.len()].copy_from_slice(message);
            Ok(message.len())
        }
    }

    #[tokio::test]
    async fn splits_into_bounded_chunks_with_single_fin() {
        let pool = BufferPool::new();
        let message = GatewayMessage::Data {
            channel: 1,
            payload: Bytes::from(vec![7u8; 3000]),
        };
        let mut sink = Recording::default();

        send_message(&message, &GatewayCodec, &mut sink, &pool, &CancellationToken::new())
            .await
            .unwrap();

        let sizes: Vec<usize> = sink.frames.iter().map(|(d, _)| d.len()).collect();
        assert_eq!(sizes, vec![1024, 1024, 959]);
        let fins: Vec<bool> = sink.frames.iter().map(|(_, f)| *f).collect();
        assert_eq!(fins, vec![false, false, true]);

        let joined: Vec<u8> = sink.frames.iter().flat_map(|(d, _)| d.clone()).collect();
        assert_eq!(GatewayCodec.decode(&joined).unwrap(), message);
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn exact_multiple_of_chunk_size() {
        let mut sink = Recording::default();
        send_bytes(&[1u8; 2048], &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sink.frames.len(), 2);
        assert!(!sink.frames[0].1);
        assert!(sink.frames[1].1);
    }

    #[tokio::test]
    async fn empty_message_is_one_empty_final_frame() {
        let mut sink = Recording::default();
        send_bytes(&[], &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sink.frames, vec![(Vec::new(), true)]);
    }

    #[tokio::test]
    async fn oversized_maximum_sends_nothing() {
        let pool = BufferPool::new();
        let mut sink = Recording::default();

        let err = send_message(&(), &Inflated, &mut sink, &pool, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLarge { .. }));
        assert!(sink.frames.is_empty());
        assert_eq!(pool.stats().acquired, 0);
    }

    #[tokio::test]
    async fn only_written_bytes_are_sent() {
        let pool = BufferPool::new();
        let mut sink = Recording::default();
        let message = vec![9u8; 1500];

        send_message(&message, &Loose, &mut sink, &pool, &CancellationToken::new())
            .await
            .unwrap();
        let total: usize = sink.frames.iter().map(|(d, _)| d.len()).sum();
        assert_eq!(total, 1500);
    }

    #[tokio::test]
    async fn send_failure_stops_and_releases() {
        let pool = BufferPool::new();
        let mut sink = Recording {
            fail_after: Some(1),
            ..Default::default()
        };
        let message = vec![0u8; 4000];

        let err = send_message(&message, &Loose, &mut sink, &pool, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert_eq!(sink.frames.len(), 1);
        let stats = pool.stats();
        assert_eq!(stats.acquired, stats.released);
    }

    #[tokio::test]
    async fn cancelled_before_send_writes_nothing() {
        let pool = BufferPool::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = Recording::default();

        let err = send_message(&GatewayMessage::Ping { nonce: 1 }, &GatewayCodec, &mut sink, &pool, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
        assert!(sink.frames.is_empty());
        assert_eq!(pool.stats().outstanding(), 0);
    }
}
