//! Streaming request body fed from an in-memory pipe.

use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty};
use tokio::io::{AsyncRead, ReadBuf};

/// Request body type shared by both connection variants.
pub type RequestBody = BoxBody<Bytes, io::Error>;

/// Boxed error carried by response bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Response body type handed back by a [`RoundTrip`](crate::http::RoundTrip).
pub type ResponseBody = BoxBody<Bytes, BoxError>;

/// Largest frame produced per poll.
const FRAME_SIZE: usize = 16 * 1024;

/// A request body that streams whatever is written to the other end of a pipe.
///
/// The size hint is always unknown, so HTTP/1 transports send it chunked and
/// nothing is buffered ahead of the reader.
pub struct PipeBody<R> {
    reader: R,
    scratch: Box<[u8]>,
    done: bool,
}

impl<R> PipeBody<R>
where
    R: AsyncRead + Unpin + Send + Sync + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            scratch: vec![0u8; FRAME_SIZE].into_boxed_slice(),
            done: false,
        }
    }

    /// Box the body into [`RequestBody`].
    pub fn boxed(self) -> RequestBody {
        BodyExt::boxed(self)
    }
}

impl<R> Body for PipeBody<R>
where
    R: AsyncRead + Unpin,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let mut buf = ReadBuf::new(&mut this.scratch);
        match Pin::new(&mut this.reader).poll_read(cx, &mut buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Ok(())) if buf.filled().is_empty() => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Ok(())) => {
                let data = Bytes::copy_from_slice(buf.filled());
                Poll::Ready(Some(Ok(Frame::data(data))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

/// An empty request body (used by the download GET).
pub fn empty() -> RequestBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| -> io::Error { match never {} })
        .boxed()
}
