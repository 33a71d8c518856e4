#![allow(clippy::pub_enum_variant_names)]

use err_derive::Error;
use std::net::SocketAddr;

/// An error of the `kassenbuch` server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A protocol or validation error.
    #[error(display = "{}", 0)]
    Api(#[error(from)] kassenbuch_api::Error),

    /// An IO error.
    #[error(display = "{}", 0)]
    Io(#[error(from)] std::io::Error),

    /// The configuration file could not be parsed.
    #[error(display = "invalid configuration file: {}", 0)]
    Config(#[error(from)] toml::de::Error),

    /// The configuration violates an invariant.
    #[error(display = "invalid configuration: {}", 0)]
    InvalidConfig(String),

    /// The listening socket could not be bound.
    #[error(display = "could not bind {}: {}", addr, source)]
    Bind {
        /// The address the server tried to listen on.
        addr: SocketAddr,
        /// The underlying IO error.
        #[error(source)]
        source: std::io::Error,
    },

    /// The session worker pool could not be started.
    #[error(display = "could not start the worker pool: {}", 0)]
    ThreadPool(#[error(from)] rayon::ThreadPoolBuildError),
}
