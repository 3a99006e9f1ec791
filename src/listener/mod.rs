//! Sensor packet listener.
//!
//! Receives protobuf-encoded packets from a publisher, decodes them and
//! hands them to registered observers on a background thread.

pub mod dispatch;
pub mod packet;
pub mod stats;
pub mod transport;

pub use dispatch::{Listener, ListenerError, ListenerState, Observer};
pub use packet::{decode, DecodeError, Packet, PacketData, PacketKind, RawPacket, WireType};
pub use stats::{ListenerStats, StatsSnapshot};
pub use transport::{
    frame_message, send_framed, ChannelTransport, TcpTransport, Transport, TransportError,
};
