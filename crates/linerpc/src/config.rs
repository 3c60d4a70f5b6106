//! Per-connection settings.

use std::time::Duration;

use linerpc_protocol::DecodeOptions;

/// Default ceiling for a single wire line: 16 MiB.
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// Configuration for a connection.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use linerpc::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .with_call_timeout(Duration::from_secs(5))
///     .with_max_line_len(64 * 1024);
/// assert_eq!(config.call_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long a synchronous call waits for its response. `None` waits
    /// until the response arrives or the connection closes.
    pub call_timeout: Option<Duration>,

    /// Leniency applied when decoding incoming lines.
    pub decode: DecodeOptions,

    /// Longest line accepted from the peer, in bytes. Longer lines are
    /// dropped.
    pub max_line_len: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            call_timeout: None,
            decode: DecodeOptions::default(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl ConnectionConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_decode(mut self, decode: DecodeOptions) -> Self {
        self.decode = decode;
        self
    }

    pub fn with_max_line_len(mut self, limit: usize) -> Self {
        self.max_line_len = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_waits_forever_strictly() {
        let config = ConnectionConfig::default();
        assert_eq!(config.call_timeout, None);
        assert_eq!(config.decode, DecodeOptions::default());
        assert_eq!(config.max_line_len, DEFAULT_MAX_LINE_LEN);
    }

    #[test]
    fn test_setters_override_defaults() {
        let config = ConnectionConfig::default()
            .with_decode(DecodeOptions::lenient())
            .with_max_line_len(10);
        assert!(config.decode.allow_unquoted_strings);
        assert_eq!(config.max_line_len, 10);
    }
}
