//! Built-in targets.

mod key_value;
mod noop;
mod remote_http;

pub use key_value::{KeyValueConfig, KeyValueTarget};
pub use noop::NoopTarget;
pub use remote_http::RemoteHttpTarget;
