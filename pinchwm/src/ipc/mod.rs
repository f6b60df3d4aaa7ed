//! Length-prefixed s-expression IPC over a Unix socket.

pub mod dispatch;
pub mod server;

pub use server::{IpcClient, IpcServer, RateLimiter};
