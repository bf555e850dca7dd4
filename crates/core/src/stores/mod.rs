pub mod http;

pub use http::{HttpSearchTransport, HttpTransportConfig};
