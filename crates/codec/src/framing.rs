//! Newline-delimited JSON framing over a byte stream.
//!
//! The runtime this crate feeds treats the transport as an opaque byte
//! pipe (`push_message_from_outside(bytes)` / `push_message_to_outside_cb`);
//! this module is the one piece that actually understands where one
//! message ends and the next begins. Each encoded `Message` is terminated
//! by a single `\n`; a `Framer` accumulates partial input across calls and
//! yields every complete line it can find.

use bytes::{Buf, BytesMut};

use crate::{Error, message::Message};

/// Stateful accumulator that turns a stream of arbitrary byte chunks into
/// complete `Message`s. One `Framer` per connection.
#[derive(Default)]
pub struct Framer {
    buffer: BytesMut,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-arrived bytes in and drain every complete frame they
    /// make available. A trailing partial line is held back for the next
    /// call.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_codec::framing::Framer;
    /// use arpc_codec::message::Message;
    ///
    /// let mut framer = Framer::new();
    /// let wire = encode_two();
    ///
    /// let messages = framer.push(&wire).unwrap();
    /// assert_eq!(messages.len(), 2);
    ///
    /// fn encode_two() -> Vec<u8> {
    ///     let mut out = Framer::encode(&Message::notification("arpc:NewCall", None)).unwrap();
    ///     out.extend(Framer::encode(&Message::notification("arpc:NewCall", None)).unwrap());
    ///     out
    /// }
    /// ```
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Message>, Error> {
        self.buffer.extend_from_slice(bytes);

        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);

            if line.is_empty() {
                continue;
            }

            messages.push(Message::decode(&line)?);
        }

        Ok(messages)
    }

    /// Encode a single message as a self-delimited frame ready to hand to
    /// the transport's write side.
    pub fn encode(message: &Message) -> Result<Vec<u8>, Error> {
        let mut bytes = message.encode()?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frames_across_pushes() {
        let mut framer = Framer::new();
        let full = Framer::encode(&Message::notification("arpc:NewCall", None)).unwrap();

        let (first, second) = full.split_at(full.len() / 2);
        assert!(framer.push(first).unwrap().is_empty());

        let messages = framer.push(second).unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn decodes_several_frames_from_one_push() {
        let mut framer = Framer::new();
        let mut wire = Framer::encode(&Message::notification("arpc:A", None)).unwrap();
        wire.extend(Framer::encode(&Message::notification("arpc:B", None)).unwrap());
        wire.extend(Framer::encode(&Message::notification("arpc:C", None)).unwrap());

        let messages = framer.push(&wire).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].method(), Some("arpc:B"));
    }

    #[test]
    fn rejects_malformed_json() {
        let mut framer = Framer::new();
        assert!(framer.push(b"not json\n").is_err());
    }
}
