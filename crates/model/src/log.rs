/// Logging options handed to each component at construction.
///
/// Warnings and errors are always emitted through `tracing`. With
/// `verbose` set, components additionally emit per-request and per-frame
/// `debug!` events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LogConfig {
    /// Whether frame-level diagnostics are emitted.
    pub verbose: bool,
}

impl LogConfig {
    /// Returns a config with frame-level diagnostics enabled.
    #[inline]
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}
