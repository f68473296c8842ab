pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod dns;
pub mod error;
pub mod reverse;
pub mod server;
pub mod zone;

pub use dispatcher::{Dispatch, QueryDispatcher};
pub use dns::DNSPacket;
