//! Response body types.

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::Response;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;

/// A boxed body for buffered and streamed responses.
pub type ResponseBody = BoxBody<Bytes, std::io::Error>;

/// Type alias for the HTTP response.
pub type HttpResponse = Response<ResponseBody>;

/// A body holding `bytes` in memory.
pub fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed()
}

/// A body with no content.
pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// A body streaming at most `limit` bytes from `reader`.
pub fn stream<R>(reader: R, limit: u64) -> ResponseBody
where
    R: AsyncRead + Send + Sync + Unpin + 'static,
{
    let frames = ReaderStream::new(reader.take(limit)).map_ok(Frame::data);
    StreamBody::new(frames).boxed()
}
