pub mod master;
pub mod slave;

use std::thread;
use std::time::Duration;

pub use anyhow::Result;
use log::debug;
use thiserror::Error;

use crate::frame::{self, Value};
use crate::registry;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("no complete frame after {attempts} read attempts")]
    Timeout { attempts: usize },
    #[error("unexpected response size {0}")]
    ResponseSize(usize),
    #[error("response declares {declared} bytes, frame is {actual}")]
    SizeFieldMismatch { declared: i64, actual: usize },
    #[error("unexpected response kind for command {0}")]
    UnexpectedResponse(u8),
    #[error("device reported error code {0}")]
    DeviceError(u8),
}

/// The duplex byte stream the protocol runs over. Reads may come back short
/// or empty at any time; the retry loop owns all timing policy.
pub trait Transport: Send {
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Retry/backoff policy for one exchange, passed in at construction so tests
/// can run with a zero backoff and a small attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeConfig {
    pub max_attempts: usize,
    pub backoff: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            max_attempts: 50,
            backoff: Duration::from_millis(20),
        }
    }
}

/// Diagnostic counters for one end of the link. They never influence the
/// protocol outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Reads that returned zero bytes.
    pub null_frames: u64,
    /// Reads that returned a wrong-sized byte sequence, discarded whole.
    pub invalid_frames: u64,
    /// Correctly sized frames handed to the codec.
    pub frames: u64,
}

/// Read one frame of exactly `expected` bytes.
///
/// Empty reads back off and retry; wrong-sized reads are discarded without
/// reinterpretation, since resynchronizing mid-stream is unsafe and the only
/// safe recovery is to wait for a full frame to accumulate. Both consume one
/// attempt from the budget.
pub fn read_frame(
    link: &mut dyn Transport,
    expected: usize,
    config: &ExchangeConfig,
    stats: &mut LinkStats,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; expected];

    for _ in 0..config.max_attempts {
        let n = link.recv(&mut buf)?;

        if n == 0 {
            stats.null_frames += 1;
            thread::sleep(config.backoff);
            continue;
        }

        if n != expected {
            stats.invalid_frames += 1;
            debug!("discarding {} byte fragment {:02X?}", n, &buf[..n]);
            continue;
        }

        stats.frames += 1;
        debug!("recv {:02X?}", buf);
        return Ok(buf);
    }

    Err(ProtocolError::Timeout {
        attempts: config.max_attempts,
    }
    .into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub command_id: u8,
    pub device_id: u8,
    pub error_code: u8,
    pub result: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub command_id: u8,
    pub device_id: u8,
    pub error_code: u8,
    pub motor_state: u8,
    pub motor_pos: i32,
    pub encoder_pos: u32,
}

/// A response, tagged by kind immediately after the size check. The wire
/// carries no type byte, so the frame length is the discriminator; nothing
/// past this point branches on raw length again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    ShortAck(Ack),
    Status(StatusReport),
}

impl Response {
    pub fn from_wire(bytes: &[u8]) -> Result<Response> {
        let response = if bytes.len() == registry::SHORT_ACK.wire_size() {
            let v = frame::decode(&registry::SHORT_ACK, bytes)?;
            check_declared_size(&v, bytes.len())?;
            Response::ShortAck(Ack {
                command_id: v[0].int() as u8,
                device_id: v[1].int() as u8,
                error_code: v[2].int() as u8,
                result: v[4].boolean(),
            })
        } else if bytes.len() == registry::STATUS.wire_size() {
            let v = frame::decode(&registry::STATUS, bytes)?;
            check_declared_size(&v, bytes.len())?;
            Response::Status(StatusReport {
                command_id: v[0].int() as u8,
                device_id: v[1].int() as u8,
                error_code: v[2].int() as u8,
                motor_state: v[4].int() as u8,
                motor_pos: v[5].int() as i32,
                encoder_pos: v[6].int() as u32,
            })
        } else {
            return Err(ProtocolError::ResponseSize(bytes.len()).into());
        };

        Ok(response)
    }

    pub fn command_id(&self) -> u8 {
        match self {
            Response::ShortAck(ack) => ack.command_id,
            Response::Status(status) => status.command_id,
        }
    }

    pub fn device_id(&self) -> u8 {
        match self {
            Response::ShortAck(ack) => ack.device_id,
            Response::Status(status) => status.device_id,
        }
    }

    pub fn error_code(&self) -> u8 {
        match self {
            Response::ShortAck(ack) => ack.error_code,
            Response::Status(status) => status.error_code,
        }
    }
}

// Both response layouts self-declare their total length in byte 3.
fn check_declared_size(values: &[Value], actual: usize) -> Result<()> {
    let declared = values[3].int();
    if declared != actual as i64 {
        return Err(ProtocolError::SizeFieldMismatch { declared, actual }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_wire() {
        let bytes = [253u8, 1, 0, 13, 10, 0, 0, 0, 20, 0, 0, 0, 30];
        match Response::from_wire(&bytes).unwrap() {
            Response::Status(status) => {
                assert_eq!(status.command_id, 253);
                assert_eq!(status.device_id, 1);
                assert_eq!(status.error_code, 0);
                assert_eq!(status.motor_state, 10);
                assert_eq!(status.motor_pos, 20);
                assert_eq!(status.encoder_pos, 30);
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[test]
    fn ack_from_wire() {
        let bytes = [252u8, 1, 0, 7, 1, 0, 0];
        match Response::from_wire(&bytes).unwrap() {
            Response::ShortAck(ack) => {
                assert_eq!(ack.command_id, 252);
                assert!(ack.result);
            }
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[test]
    fn odd_size_rejected() {
        let err = Response::from_wire(&[0u8; 9]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::ResponseSize(9))
        ));
    }

    #[test]
    fn lying_size_field_rejected() {
        // 13 bytes on the wire, but byte 3 claims 7
        let bytes = [253u8, 1, 0, 7, 10, 0, 0, 0, 20, 0, 0, 0, 30];
        let err = Response::from_wire(&bytes).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::SizeFieldMismatch {
                declared: 7,
                actual: 13
            })
        ));
    }
}
