use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::header::EXPECT;
use http::{Request, Response, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::connection::DEFAULT_MAX_BODY_BYTES;
use crate::connection::body::collect_body;
use crate::ensure;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, ResponseHead, SendError};

type ResponseMessage = Message<(ResponseHead, PayloadSize), Bytes>;

/// A client connection to the gateway.
///
/// The gateway answers one request at a time, so the connection exposes the steps of a
/// request/response exchange instead of running a handler loop: [`read_request`](Self::read_request),
/// [`send_response`](Self::send_response) and finally [`shutdown`](Self::shutdown).
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    max_body_size: u64,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            max_body_size: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Limits the size of request bodies this connection buffers.
    pub fn with_max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Reads the next complete request, body included.
    ///
    /// Returns `Ok(None)` when the client closed the connection between requests.
    pub async fn read_request(&mut self) -> Result<Option<Request<Bytes>>, HttpError> {
        let (header, payload_size) = match self.framed_read.next().await {
            Some(Ok(Message::Header(header))) => header,
            Some(Ok(Message::Payload(_))) => return Err(ParseError::invalid_body("need header while receive body").into()),
            Some(Err(e)) => return Err(e.into()),
            None => {
                debug!("client closed the connection");
                return Ok(None);
            }
        };

        if payload_size.is_empty() {
            // drain the Eof the decoder yields for an empty payload
            self.framed_read.next().await.transpose()?;
            return Ok(Some(header.body(Bytes::new())));
        }

        if let PayloadSize::Length(size) = payload_size {
            ensure!(size <= self.max_body_size, ParseError::too_large_body(size, self.max_body_size).into());
        }

        // the client waits for our go before sending the body
        if header.version() == Version::HTTP_11
            && header.headers().get(EXPECT).is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
        {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            info!("receive expect request header, sent continue response");
        }

        let body = collect_body(&mut self.framed_read, self.max_body_size).await?;
        Ok(Some(header.body(body)))
    }

    /// Writes a complete response and flushes it.
    pub async fn send_response(&mut self, response: Response<Bytes>) -> Result<(), HttpError> {
        let (parts, body) = response.into_parts();
        let payload_size = PayloadSize::for_body(&body);

        let header = ResponseMessage::Header((ResponseHead::from_parts(parts, ()), payload_size));
        if payload_size.is_empty() {
            self.framed_write.send(header).await?;
            return Ok(());
        }

        self.framed_write.feed(header).await?;
        self.framed_write.feed(ResponseMessage::Payload(PayloadItem::Chunk(body))).await?;
        self.framed_write.send(ResponseMessage::Payload(PayloadItem::Eof)).await?;
        Ok(())
    }

    /// Flushes pending output and closes the write half of the connection.
    pub async fn shutdown(&mut self) -> Result<(), HttpError> {
        SinkExt::<ResponseMessage>::close(&mut self.framed_write).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn request_then_response() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);
        let mut connection = HttpConnection::new(server_read, server_write);

        client_write.write_all(b"POST /api/login HTTP/1.1\r\nContent-Length: 4\r\n\r\nuser").await.unwrap();
        let request = connection.read_request().await.unwrap().unwrap();
        assert_eq!(request.uri().path(), "/api/login");
        assert_eq!(request.body(), &Bytes::from_static(b"user"));

        let response = Response::builder().status(StatusCode::OK).body(Bytes::from_static(b"welcome")).unwrap();
        connection.send_response(response).await.unwrap();
        connection.shutdown().await.unwrap();

        let mut written = String::new();
        client_read.read_to_string(&mut written).await.unwrap();
        assert!(written.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(written.ends_with("content-length: 7\r\n\r\nwelcome"));
    }

    #[tokio::test]
    async fn keep_alive_requests_in_sequence() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let mut connection = HttpConnection::new(server_read, server_write);

        client.write_all(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(connection.read_request().await.unwrap().unwrap().uri().path(), "/a");
        assert_eq!(connection.read_request().await.unwrap().unwrap().uri().path(), "/b");
        assert!(connection.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_declared_oversize_body() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (_client_read, mut client_write) = tokio::io::split(client);
        let mut connection = HttpConnection::new(server_read, server_write).with_max_body_size(8);

        client_write.write_all(b"PUT /s3/file HTTP/1.1\r\nContent-Length: 9\r\n\r\n").await.unwrap();
        assert!(connection.read_request().await.is_err());
    }
}
