//! Active queries against TCP instruments.
//!
//! A query connects to the analyzer, runs the client exchange from
//! [`crate::protocol`], turns the returned result records into fields and stores
//! the new ones. Progress is tracked in a [`JobRegistry`] that callers poll.

pub mod address;
pub mod connector;
pub mod job;
pub mod service;

pub use address::{is_blocked_host, is_blocked_ip};
pub use connector::{AsyncStream, BoxedStream, Connector, TcpConnector};
pub use job::{JobKey, JobRegistry, JobState, QueryJob};
pub use service::{QueryService, QueryStatus};
