/// A canned response served by [`TestBackend`](crate::TestBackend).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresetResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body pieces. Streamed one by one with chunked transfer encoding
    /// when `chunked` is set, so the client observes separate reads.
    pub chunks: Vec<String>,
    pub chunked: bool,
    /// Whether the connection breaks after the last piece instead of
    /// finishing the body.
    pub aborted: bool,
}

impl PresetResponse {
    /// Creates an empty response with the given status.
    #[inline]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: vec![],
            chunks: vec![],
            chunked: false,
            aborted: false,
        }
    }

    /// Creates an empty `200 OK` response with the given content type.
    #[inline]
    pub fn ok(content_type: &str) -> Self {
        Self::status(200).with_header("content-type", content_type)
    }

    /// Creates a `200 OK` response with a JSON body.
    #[inline]
    pub fn json(body: serde_json::Value) -> Self {
        Self::ok("application/json").with_body(body.to_string())
    }

    #[inline]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Sets a body sent in one piece with a `content-length`.
    #[inline]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.chunks = vec![body.into()];
        self.chunked = false;
        self
    }

    /// Sets a body sent piece by piece.
    #[inline]
    pub fn with_chunks<I>(mut self, chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self.chunked = true;
        self
    }

    /// Breaks the connection once the body pieces are sent.
    #[inline]
    pub fn with_abort(mut self) -> Self {
        self.chunked = true;
        self.aborted = true;
        self
    }
}
