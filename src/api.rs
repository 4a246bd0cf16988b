//! Remote backend access
//!
//! [`ChatBackend`] is the seam; [`HttpBackend`] is the production client.

mod http;
mod traits;

pub use http::HttpBackend;
pub use traits::{ChatBackend, Keyword, SendRequest};
