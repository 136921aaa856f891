//! Network subsystem for the TCP audio stream

pub mod gateway;
pub mod reader;
pub mod retry;
pub mod tcp;

pub use gateway::{ReachabilityProbe, TcpEchoProbe};
pub use reader::{NetworkReader, ReaderExit, ReaderSettings};
pub use retry::{RetryDecision, RetryState, RetryTier};
pub use tcp::SocketInterrupt;
