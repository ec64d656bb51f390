mod chunks;
mod lines;
mod sse;

pub use chunks::{Chunks, Error as ChunksError};
pub use lines::{Error as LinesError, Line, Lines};
pub use sse::{Sse, SseEvent};
