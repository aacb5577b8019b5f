//! TCP streaming module for gati-odom

pub mod messages;
pub mod tcp_publisher;
pub mod tcp_receiver;
pub mod wire;

pub use messages::{EncoderEvent, TickCount, VelocityEstimate};
pub use tcp_publisher::TcpPublisher;
pub use tcp_receiver::TcpReceiver;
pub use wire::{Serializer, WireFormat};
