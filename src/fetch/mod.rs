//! Outbound HTTP for listing and article pages.

mod bounded;
mod transport;

pub use bounded::{BoundedFetcher, Fetched};
pub use transport::{HttpTransport, Transport};
