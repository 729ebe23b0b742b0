//! Oplog fetcher runtime configuration.

use std::time::Duration;

use anyerror::AnyError;
use clap::Parser;

use crate::config::error::ConfigError;

/// Tunable parameters for tailing a sync source.
///
/// Create a configuration, optionally customize fields, validate it, and
/// pass it to `OplogFetcher::new`:
///
/// ```
/// use oplogtail::Config;
///
/// let config = Config {
///     batch_size: 512,
///     ..Default::default()
/// };
/// let config = config.validate().unwrap();
/// ```
#[derive(Clone, Debug, Parser, PartialEq)]
pub struct Config {
    /// Upper bound on consecutive cursor restarts without a successful batch
    /// in between.
    #[clap(long, default_value = "3")]
    pub max_fetcher_restarts: u64,

    /// Maximum number of oplog entries the sync source returns per batch.
    #[clap(long, default_value = "2048")]
    pub batch_size: u64,

    /// How long the sync source may block waiting for new entries before
    /// returning an empty batch, in milliseconds.
    #[clap(long, default_value = "5000")]
    pub await_data_timeout: u64,

    /// Server-side time limit for the find that opens a fresh cursor, in
    /// milliseconds.
    #[clap(long, default_value = "60000")]
    pub initial_find_timeout: u64,

    /// Server-side time limit for the find that re-establishes a cursor
    /// after an error, in milliseconds. Kept well below
    /// `initial_find_timeout`: a reconnect already suggests an unhealthy
    /// link, so give up faster.
    #[clap(long, default_value = "2000")]
    pub retried_find_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        <Self as Parser>::parse_from(Vec::<&'static str>::new())
    }
}

impl Config {
    /// Time limit for the find that opens a cursor.
    ///
    /// The first open gets the long bound; a reconnect gets the short one.
    pub fn find_max_time(&self, retried: bool) -> Duration {
        if retried {
            Duration::from_millis(self.retried_find_timeout)
        } else {
            Duration::from_millis(self.initial_find_timeout)
        }
    }

    /// Upper bound on the server-side long-poll for each batch read.
    pub fn await_data_max_time(&self) -> Duration {
        Duration::from_millis(self.await_data_timeout)
    }

    /// Build a `Config` instance from a series of command line arguments.
    ///
    /// The first element in `args` must be the application name.
    pub fn build(args: &[&str]) -> Result<Config, ConfigError> {
        let config = <Self as Parser>::try_parse_from(args).map_err(|e| ConfigError::ParseError {
            source: AnyError::from(&e),
            args: args.iter().map(|x| x.to_string()).collect(),
        })?;
        config.validate()
    }

    /// Validate the state of this config.
    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSizeIs0);
        }

        if self.await_data_timeout == 0 {
            return Err(ConfigError::AwaitDataTimeoutIs0);
        }

        if self.retried_find_timeout >= self.initial_find_timeout {
            return Err(ConfigError::RetriedFindTimeout {
                retried: self.retried_find_timeout,
                initial: self.initial_find_timeout,
            });
        }

        Ok(self)
    }
}
