use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::{Method, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::trace;

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::connection::DEFAULT_MAX_BODY_BYTES;
use crate::connection::body::collect_body;
use crate::ensure;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

type RequestMessage = Message<(RequestHeader, PayloadSize), Bytes>;

/// A connection from the gateway to an upstream server.
///
/// Each connection carries exactly one exchange: [`send_request`](Self::send_request)
/// followed by [`read_response`](Self::read_response).
pub struct UpstreamConnection<R, W> {
    framed_read: FramedRead<R, ResponseDecoder>,
    framed_write: FramedWrite<W, RequestEncoder>,
    max_body_size: u64,
}

impl<R, W> UpstreamConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, ResponseDecoder::new(false), 8 * 1024),
            framed_write: FramedWrite::new(writer, RequestEncoder::new()),
            max_body_size: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Limits the size of response bodies this connection buffers.
    pub fn with_max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Writes a complete request and flushes it.
    pub async fn send_request(&mut self, request: Request<Bytes>) -> Result<(), HttpError> {
        *self.framed_read.decoder_mut() = ResponseDecoder::new(request.method() == Method::HEAD);

        let (parts, body) = request.into_parts();
        let payload_size = PayloadSize::for_body(&body);

        let header = RequestMessage::Header((RequestHeader::from(parts), payload_size));
        if payload_size.is_empty() {
            self.framed_write.send(header).await?;
            return Ok(());
        }

        self.framed_write.feed(header).await?;
        self.framed_write.feed(RequestMessage::Payload(PayloadItem::Chunk(body))).await?;
        self.framed_write.send(RequestMessage::Payload(PayloadItem::Eof)).await?;
        Ok(())
    }

    /// Reads the complete response to the request sent before.
    pub async fn read_response(&mut self) -> Result<Response<Bytes>, HttpError> {
        let (head, payload_size) = match self.framed_read.next().await {
            Some(Ok(Message::Header(head))) => head,
            Some(Ok(Message::Payload(_))) => return Err(ParseError::invalid_body("need header while receive body").into()),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ParseError::UnexpectedEof.into()),
        };
        trace!(status = %head.status(), ?payload_size, "received upstream response head");

        if let PayloadSize::Length(size) = payload_size {
            ensure!(size <= self.max_body_size, ParseError::too_large_body(size, self.max_body_size).into());
        }

        let body = collect_body(&mut self.framed_read, self.max_body_size).await?;
        Ok(head.map(|()| body))
    }

    /// Closes the write half, telling the upstream no more requests follow.
    pub async fn shutdown(&mut self) -> Result<(), HttpError> {
        SinkExt::<RequestMessage>::close(&mut self.framed_write).await?;
        Ok(())
    }
}
