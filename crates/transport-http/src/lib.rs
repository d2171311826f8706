// HTTP transport for radio streams

pub mod client;
pub mod headers;
pub mod transport;

pub use client::{create_http_agent, HttpOptions};
pub use headers::Headers;
pub use transport::{HttpTransport, ReadStatus, Transport};
