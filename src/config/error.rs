use anyerror::AnyError;

/// Error variants related to configuration.
#[derive(Debug, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to parse configuration from command-line arguments.
    #[error("ParseError: {source} while parsing ({args:?})")]
    ParseError {
        /// The underlying parse error.
        source: AnyError,
        /// The arguments that failed to parse.
        args: Vec<String>,
    },

    /// The `batch_size` configuration must be greater than 0.
    #[error("batch_size must be > 0")]
    BatchSizeIs0,

    /// The `await_data_timeout` configuration must be greater than 0.
    #[error("await_data_timeout must be > 0")]
    AwaitDataTimeoutIs0,

    /// The retried find timeout is not smaller than the initial one.
    #[error("retried_find_timeout({retried}) must be < initial_find_timeout({initial})")]
    RetriedFindTimeout {
        /// The retried find timeout, in milliseconds.
        retried: u64,
        /// The initial find timeout, in milliseconds.
        initial: u64,
    },
}
