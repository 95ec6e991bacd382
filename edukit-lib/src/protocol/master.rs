use log::debug;

use super::{
    read_frame, Ack, ExchangeConfig, LinkStats, ProtocolError, Response, Result, StatusReport,
    Transport,
};
use crate::frame::{self, Value};
use crate::registry::{self, CommandId};

/// Drives one request/response exchange at a time over a byte link.
///
/// Each exchange encodes the command, writes it whole, and, when the registry
/// declares a response for the command, runs the bounded read loop until a
/// correctly sized frame arrives or the attempt budget is spent.
pub struct Transceiver<'a> {
    link: &'a mut dyn Transport,
    device_id: u8,
    config: ExchangeConfig,
    stats: LinkStats,
}

impl<'a> Transceiver<'a> {
    pub fn new(link: &'a mut dyn Transport, device_id: u8, config: ExchangeConfig) -> Self {
        Self {
            link,
            device_id,
            config,
            stats: LinkStats::default(),
        }
    }

    /// Send `command` with `params` (the layout's fields minus the two header
    /// bytes) and collect the registry-declared response, if any.
    pub fn exchange(&mut self, command: CommandId, params: &[Value]) -> Result<Option<Response>> {
        let spec = registry::lookup(command as u8)?;

        let mut values = Vec::with_capacity(spec.layout.fields.len());
        values.push(Value::Int(command as i64));
        values.push(Value::Int(self.device_id as i64));
        values.extend_from_slice(params);

        let bytes = frame::encode(spec.layout, &values)?;
        debug!("{}: send {:02X?}", spec.description, bytes);
        self.link.send(&bytes)?;

        let expected = match spec.response.wire_size() {
            Some(expected) => expected,
            None => return Ok(None),
        };

        for _ in 0..self.config.max_attempts {
            let raw = read_frame(self.link, expected, &self.config, &mut self.stats)?;
            let response = Response::from_wire(&raw)?;

            // A stale response left in the buffer by an earlier exchange
            // echoes the wrong command or device id; discard it like any
            // other invalid frame and keep reading.
            if response.command_id() != command as u8 || response.device_id() != self.device_id {
                self.stats.invalid_frames += 1;
                debug!(
                    "discarding response echoing command {} device {}",
                    response.command_id(),
                    response.device_id()
                );
                continue;
            }

            return match response.error_code() {
                0 => Ok(Some(response)),
                code => Err(ProtocolError::DeviceError(code).into()),
            };
        }

        Err(ProtocolError::Timeout {
            attempts: self.config.max_attempts,
        }
        .into())
    }

    /// Soft-stop the controller. Answered with a 7-byte acknowledgement.
    pub fn reset(&mut self) -> Result<Ack> {
        let params = [Value::Int(0); 8];
        match self.exchange(CommandId::Reset, &params)? {
            Some(Response::ShortAck(ack)) => Ok(ack),
            _ => Err(ProtocolError::UnexpectedResponse(CommandId::Reset as u8).into()),
        }
    }

    /// Query motor and encoder state. Answered with a 13-byte status frame.
    pub fn status(&mut self) -> Result<StatusReport> {
        let params = [Value::Int(0); 8];
        match self.exchange(CommandId::ReadStatus, &params)? {
            Some(Response::Status(status)) => Ok(status),
            _ => Err(ProtocolError::UnexpectedResponse(CommandId::ReadStatus as u8).into()),
        }
    }

    pub fn goto_location(&mut self, position: u32) -> Result<()> {
        let params = [
            Value::Int(position as i64),
            Value::Int(0),
            Value::Int(0),
            Value::Int(0),
            Value::Int(0),
        ];
        self.exchange(CommandId::GoToLocation, &params).map(|_| ())
    }

    pub fn set_acceleration(&mut self, accel: u32) -> Result<()> {
        let params = [
            Value::Int(accel as i64),
            Value::Int(0),
            Value::Int(0),
            Value::Int(0),
            Value::Int(0),
        ];
        self.exchange(CommandId::SetAcceleration, &params)
            .map(|_| ())
    }

    /// Stream one acceleration command to the rotor. The controller sends no
    /// response; success is the completed write.
    pub fn apply_acceleration(&mut self, accel: f32, max_speed: f32) -> Result<()> {
        let params = [Value::Float(accel), Value::Float(max_speed)];
        self.exchange(CommandId::ApplyAcceleration, &params)
            .map(|_| ())
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;

    /// Transport that replays a script of reads and records writes. An empty
    /// script entry models a read that timed out with nothing available.
    struct ScriptLink {
        reads: VecDeque<Vec<u8>>,
        sent: Vec<u8>,
    }

    impl ScriptLink {
        fn new(reads: Vec<Vec<u8>>) -> Self {
            Self {
                reads: reads.into(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for ScriptLink {
        fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.sent.extend_from_slice(bytes);
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let chunk = self.reads.pop_front().unwrap_or_default();
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            Ok(n)
        }
    }

    fn fast_config(max_attempts: usize) -> ExchangeConfig {
        ExchangeConfig {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    const STATUS_WIRE: [u8; 13] = [253, 1, 0, 13, 10, 0, 0, 0, 20, 0, 0, 0, 30];

    #[test]
    fn goto_writes_one_frame_and_returns() {
        let mut link = ScriptLink::new(vec![]);
        let mut tx = Transceiver::new(&mut link, 1, fast_config(3));
        tx.goto_location(5).unwrap();
        assert_eq!(tx.stats(), LinkStats::default());
        assert_eq!(link.sent, [17, 1, 0, 0, 0, 5, 0, 0, 0, 0]);
    }

    #[test]
    fn apply_acceleration_succeeds_without_reading() {
        let mut link = ScriptLink::new(vec![]);
        let mut tx = Transceiver::new(&mut link, 1, fast_config(3));
        tx.apply_acceleration(3.14, 6.28).unwrap();
        let mut expected = vec![254u8, 1];
        expected.extend_from_slice(&3.14f32.to_be_bytes());
        expected.extend_from_slice(&6.28f32.to_be_bytes());
        assert_eq!(link.sent, expected);
    }

    #[test]
    fn silent_link_times_out_after_the_attempt_budget() {
        let mut link = ScriptLink::new(vec![]);
        let mut tx = Transceiver::new(&mut link, 1, fast_config(5));
        let err = tx.status().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::Timeout { attempts: 5 })
        ));
        assert_eq!(tx.stats().null_frames, 5);
        assert_eq!(tx.stats().invalid_frames, 0);
    }

    #[test]
    fn garbage_fragments_are_discarded_until_a_full_frame_lands() {
        let mut link = ScriptLink::new(vec![
            vec![0xDE, 0xAD, 0xBE],
            vec![],
            vec![0x01, 0x02, 0x03, 0x04, 0x05],
            STATUS_WIRE.to_vec(),
        ]);
        let mut tx = Transceiver::new(&mut link, 1, fast_config(10));
        let status = tx.status().unwrap();
        assert_eq!(status.motor_state, 10);
        assert_eq!(status.motor_pos, 20);
        assert_eq!(status.encoder_pos, 30);
        assert_eq!(tx.stats().invalid_frames, 2);
        assert_eq!(tx.stats().null_frames, 1);
        assert_eq!(tx.stats().frames, 1);
    }

    #[test]
    fn stale_responses_with_a_wrong_echo_are_discarded() {
        let mut wrong_device = STATUS_WIRE;
        wrong_device[1] = 9;
        let mut wrong_command = STATUS_WIRE;
        wrong_command[0] = 17;
        let mut link = ScriptLink::new(vec![
            wrong_device.to_vec(),
            wrong_command.to_vec(),
            STATUS_WIRE.to_vec(),
        ]);
        let mut tx = Transceiver::new(&mut link, 1, fast_config(10));
        let status = tx.status().unwrap();
        assert_eq!(status.motor_pos, 20);
        assert_eq!(tx.stats().invalid_frames, 2);
        assert_eq!(tx.stats().frames, 3);
    }

    #[test]
    fn device_fault_surfaces_as_an_error() {
        let mut faulted = STATUS_WIRE;
        faulted[2] = 2; // CMDERR_INVALID_DEVICE
        let mut link = ScriptLink::new(vec![faulted.to_vec()]);
        let mut tx = Transceiver::new(&mut link, 1, fast_config(3));
        let err = tx.status().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::DeviceError(2))
        ));
    }

    #[test]
    fn reset_decodes_the_short_ack() {
        let mut link = ScriptLink::new(vec![vec![252, 1, 0, 7, 1, 0, 0]]);
        let mut tx = Transceiver::new(&mut link, 1, fast_config(3));
        let ack = tx.reset().unwrap();
        assert!(ack.result);
        assert_eq!(ack.command_id, 252);
        assert_eq!(link.sent, [252, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
