pub mod address;
pub mod factory;

pub use address::TargetAddress;
pub use factory::{
    Connector, FrameSink, FrameStream, HandshakeRequest, Transport, WebSocketConnector,
};
