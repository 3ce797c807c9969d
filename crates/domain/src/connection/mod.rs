mod connection_state;
mod protocol;

pub use connection_state::ConnectionState;
pub use protocol::{FrameResult, ProtocolAdapter};
