//! Serial link library for the Edukit rotary inverted-pendulum rig: frame
//! codec, command registry, transceiver, and a mock device for testing the
//! protocol without hardware.

pub mod frame;
pub mod loopback;
pub mod port;
pub mod protocol;
pub mod registry;
