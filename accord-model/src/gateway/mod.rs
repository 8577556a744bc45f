//! Types for interacting with the gateway.

pub mod connection_info;
pub mod event;
pub mod payload;

mod opcode;

pub use self::{
    connection_info::{ConnectionInfo, SessionStartLimit},
    event::GatewayEvent,
    opcode::OpCode,
};
