//! `tokio-util` codec for the same wire format.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_with_stats, encode_frame, DecodeStats, Frame};
use crate::error::FrameError;

/// Frame codec for `tokio_util::codec::Framed`.
///
/// Decoding resynchronizes exactly like [`FrameDecoder`](crate::FrameDecoder).
/// Bytes left over at end-of-stream are dropped rather than reported.
#[derive(Debug, Default)]
pub struct LinkCodec {
    stats: DecodeStats,
}

impl LinkCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }
}

impl Decoder for LinkCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(decode_with_stats(src, &mut self.stats))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame = self.decode(buf)?;
        if frame.is_none() {
            self.stats.discarded_bytes += buf.len() as u64;
            buf.clear();
        }
        Ok(frame)
    }
}

impl Encoder<Frame> for LinkCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item.command, item.sequence, &item.payload, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode() {
        let mut codec = LinkCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::new(0x01u8, 11, &b"ping"[..]), &mut buf)
            .unwrap();
        buf.extend_from_slice(&[0x00, 0x01]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.sequence, 11);
        assert_eq!(frame.payload.as_ref(), b"ping");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn eof_drops_trailing_bytes() {
        let mut codec = LinkCodec::new();
        let mut buf = BytesMut::from(&[0xAA, 0x55, 0x01][..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
        assert_eq!(codec.stats().discarded_bytes, 3);
    }

    #[tokio::test]
    async fn framed_read_resyncs_over_duplex() {
        use std::future::poll_fn;
        use std::pin::Pin;

        use futures_core::Stream;
        use tokio::io::AsyncWriteExt;
        use tokio_util::codec::FramedRead;

        let (mut tx, rx) = tokio::io::duplex(256);
        let mut wire = BytesMut::new();
        encode_frame(0x20, 5, &[1, 2, 3], &mut wire);
        tx.write_all(&[0x13, 0x37]).await.unwrap();
        tx.write_all(&wire).await.unwrap();
        drop(tx);

        let mut framed = FramedRead::new(rx, LinkCodec::new());
        let frame = poll_fn(|cx| Pin::new(&mut framed).poll_next(cx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, 0x20);
        assert_eq!(frame.sequence, 5);
        assert!(poll_fn(|cx| Pin::new(&mut framed).poll_next(cx))
            .await
            .is_none());
        assert_eq!(framed.decoder().stats().discarded_bytes, 2);
    }
}
