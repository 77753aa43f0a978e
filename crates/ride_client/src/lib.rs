//! Async runtime side of the ride dispatch client.
//!
//! - [`location`]: accuracy-aware position acquisition with a cached fallback.
//! - [`transport`]: reconnecting connection to the matching service.
//! - [`dispatch`]: booking submit, assignment polling, accept/decline, completion.
//! - [`driver`]: driver simulator session built on the transport.

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod location;
pub mod logging;
pub mod transport;

pub use config::ClientConfig;
pub use error::ErrorKind;
