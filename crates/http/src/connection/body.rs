use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::trace;

use crate::ensure;
use crate::protocol::{Message, ParseError, PayloadItem};

/// Reads payload items from `stream` until `Eof` and concatenates them.
///
/// Fails when the body grows beyond `max_size` or the stream ends early.
pub(crate) async fn collect_body<S, T>(stream: &mut S, max_size: u64) -> Result<Bytes, ParseError>
where
    S: Stream<Item = Result<Message<T>, ParseError>> + Unpin,
{
    let mut body = BytesMut::new();
    loop {
        match stream.next().await {
            Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                let size = (body.len() + bytes.len()) as u64;
                ensure!(size <= max_size, ParseError::too_large_body(size, max_size));
                if body.is_empty() {
                    // a single chunk body can be handed out without copying
                    body = BytesMut::from(bytes);
                } else {
                    body.extend_from_slice(&bytes);
                }
            }
            Some(Ok(Message::Payload(PayloadItem::Eof))) => {
                trace!(size = body.len(), "finished reading body");
                return Ok(body.freeze());
            }
            Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("receive a message head while reading body")),
            Some(Err(e)) => return Err(e),
            None => return Err(ParseError::UnexpectedEof),
        }
    }
}
