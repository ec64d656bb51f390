use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// The response body failed while being read.
#[derive(Debug, PartialEq, Eq)]
pub struct Error(pub String);

/// An adapter for streaming byte chunks.
///
/// A response body is owned by exactly one `Chunks`, which is in turn
/// owned by exactly one decoder.
pub enum Chunks {
    Response(Response),
    Buffered(VecDeque<Bytes>),
}

impl Chunks {
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    /// Creates chunks from bytes that are already in memory.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        Chunks::Buffered(chunks.into_iter().map(Into::into).collect())
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|err| Error(err.to_string()))
            }
            Chunks::Buffered(chunks) => Ok(chunks.pop_front()),
        }
    }
}
