//! Network implementations of the client's transport traits.

mod http;
mod ws;

pub use http::{split_lines, HttpActionTransport, HttpActorDirectory};
pub use ws::WsPushTransport;
