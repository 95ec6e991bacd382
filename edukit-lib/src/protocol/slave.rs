use log::{debug, warn};
use num_traits::FromPrimitive;

use super::{
    read_frame, ExchangeConfig, LinkStats, ProtocolError, Result, Transport,
};
use crate::frame::{self, Value};
use crate::registry::{self, CommandId, CommandSpec, ResponseKind, COMMAND_WIRE_SIZE};

/// Simulated controller state, stood up in place of the STM32 firmware.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RigState {
    pub motor_state: u8,
    pub motor_pos: i32,
    pub encoder_pos: u32,
    pub accel_limit: u32,
    pub accel: f32,
    pub max_speed: f32,
}

/// Software stand-in for the physical controller: decodes inbound command
/// frames, dispatches on the command id, and emits whatever response the
/// registry declares for it.
pub struct MockDevice<'a> {
    link: &'a mut dyn Transport,
    device_id: u8,
    config: ExchangeConfig,
    stats: LinkStats,
    state: RigState,
}

impl<'a> MockDevice<'a> {
    pub fn new(link: &'a mut dyn Transport, device_id: u8, config: ExchangeConfig) -> Self {
        Self::with_state(link, device_id, config, RigState::default())
    }

    pub fn with_state(
        link: &'a mut dyn Transport,
        device_id: u8,
        config: ExchangeConfig,
        state: RigState,
    ) -> Self {
        Self {
            link,
            device_id,
            config,
            stats: LinkStats::default(),
            state,
        }
    }

    /// Serve a single command frame. Returns the command handled, or `None`
    /// when a frame was dropped (unknown id or another device's address); a
    /// dropped frame never corrupts the response stream with a reply.
    pub fn serve_one(&mut self) -> Result<Option<CommandId>> {
        let raw = read_frame(self.link, COMMAND_WIRE_SIZE, &self.config, &mut self.stats)?;

        let command = match CommandId::from_u8(raw[0]) {
            Some(command) => command,
            None => {
                warn!("unknown command id {}, dropping frame", raw[0]);
                return Ok(None);
            }
        };

        let spec = registry::lookup(command as u8)?;
        let values = frame::decode(spec.layout, &raw)?;

        let device_id = values[1].int() as u8;
        if device_id != self.device_id {
            debug!("ignoring {} addressed to device {}", spec.description, device_id);
            return Ok(None);
        }

        match command {
            CommandId::GoToLocation => {
                self.state.motor_pos = values[2].int() as i32;
            }
            CommandId::SetAcceleration => {
                self.state.accel_limit = values[2].int() as u32;
            }
            CommandId::Reset => {
                self.state = RigState::default();
            }
            CommandId::ReadStatus => {}
            CommandId::ApplyAcceleration => {
                self.state.accel = values[2].float();
                self.state.max_speed = values[3].float();
            }
        }

        self.respond(spec)?;
        Ok(Some(command))
    }

    // Response presence is the registry's call, mirrored exactly by the
    // transceiver on the other end.
    fn respond(&mut self, spec: &CommandSpec) -> Result<()> {
        let (layout, values) = match spec.response {
            ResponseKind::None => return Ok(()),
            ResponseKind::ShortAck => (
                &registry::SHORT_ACK,
                vec![
                    Value::Int(spec.id as i64),
                    Value::Int(self.device_id as i64),
                    Value::Int(0),
                    Value::Int(7),
                    Value::Bool(true),
                    Value::Int(0),
                    Value::Int(0),
                ],
            ),
            ResponseKind::Status => (
                &registry::STATUS,
                vec![
                    Value::Int(spec.id as i64),
                    Value::Int(self.device_id as i64),
                    Value::Int(0),
                    Value::Int(13),
                    Value::Int(self.state.motor_state as i64),
                    Value::Int(self.state.motor_pos as i64),
                    Value::Int(self.state.encoder_pos as i64),
                ],
            ),
        };

        let bytes = frame::encode(layout, &values)?;
        debug!("{}: send {:02X?}", spec.description, bytes);
        self.link.send(&bytes)?;
        Ok(())
    }

    /// Serve commands until the link fails. An exhausted read budget just
    /// means the bus went quiet; the loop keeps listening.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.serve_one() {
                Ok(_) => {}
                Err(e)
                    if matches!(
                        e.downcast_ref::<ProtocolError>(),
                        Some(ProtocolError::Timeout { .. })
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn state(&self) -> RigState {
        self.state
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::loopback;
    use crate::protocol::master::Transceiver;

    fn fast_config() -> ExchangeConfig {
        ExchangeConfig {
            max_attempts: 4,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn goto_updates_the_simulated_position() {
        let (mut client, mut device) = loopback::pair();
        Transceiver::new(&mut client, 1, fast_config())
            .goto_location(1234)
            .unwrap();

        let mut mock = MockDevice::new(&mut device, 1, fast_config());
        assert_eq!(mock.serve_one().unwrap(), Some(CommandId::GoToLocation));
        assert_eq!(mock.state().motor_pos, 1234);
    }

    #[test]
    fn apply_acceleration_stores_both_floats_and_stays_silent() {
        let (mut client, mut device) = loopback::pair();
        Transceiver::new(&mut client, 1, fast_config())
            .apply_acceleration(3.14, 6.28)
            .unwrap();

        let mut mock = MockDevice::new(&mut device, 1, fast_config());
        assert_eq!(
            mock.serve_one().unwrap(),
            Some(CommandId::ApplyAcceleration)
        );
        assert_eq!(mock.state().accel, 3.14);
        assert_eq!(mock.state().max_speed, 6.28);

        // nothing must have been written back
        let mut buf = [0u8; 16];
        assert_eq!(client.recv(&mut buf).unwrap(), 0);
    }

    #[test]
    fn read_status_answers_with_the_current_state() {
        let (mut client, mut device) = loopback::pair();
        client
            .send(&[253, 1, 0, 0, 0, 0, 0, 0, 0, 0])
            .unwrap();

        let state = RigState {
            motor_state: 10,
            motor_pos: 20,
            encoder_pos: 30,
            ..RigState::default()
        };
        let mut mock = MockDevice::with_state(&mut device, 1, fast_config(), state);
        assert_eq!(mock.serve_one().unwrap(), Some(CommandId::ReadStatus));

        let mut buf = [0u8; 13];
        assert_eq!(client.recv(&mut buf).unwrap(), 13);
        assert_eq!(buf, [253, 1, 0, 13, 10, 0, 0, 0, 20, 0, 0, 0, 30]);
    }

    #[test]
    fn unknown_command_is_dropped_without_a_reply() {
        let (mut client, mut device) = loopback::pair();
        client.send(&[0x63; 10]).unwrap();

        let mut mock = MockDevice::new(&mut device, 1, fast_config());
        assert_eq!(mock.serve_one().unwrap(), None);

        let mut buf = [0u8; 16];
        assert_eq!(client.recv(&mut buf).unwrap(), 0);
    }

    #[test]
    fn frames_for_another_device_are_ignored() {
        let (mut client, mut device) = loopback::pair();
        client.send(&[253, 9, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();

        let mut mock = MockDevice::new(&mut device, 1, fast_config());
        assert_eq!(mock.serve_one().unwrap(), None);

        let mut buf = [0u8; 16];
        assert_eq!(client.recv(&mut buf).unwrap(), 0);
    }

    #[test]
    fn reset_clears_state_and_acks() {
        let (mut client, mut device) = loopback::pair();
        client.send(&[252, 1, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();

        let state = RigState {
            motor_pos: -5,
            encoder_pos: 99,
            ..RigState::default()
        };
        let mut mock = MockDevice::with_state(&mut device, 1, fast_config(), state);
        assert_eq!(mock.serve_one().unwrap(), Some(CommandId::Reset));
        assert_eq!(mock.state(), RigState::default());

        let mut buf = [0u8; 7];
        assert_eq!(client.recv(&mut buf).unwrap(), 7);
        assert_eq!(buf, [252, 1, 0, 7, 1, 0, 0]);
    }
}
