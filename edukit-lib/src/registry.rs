//! Command table for the Edukit pendulum controller.
//!
//! The registry is the single source of truth for each command's wire layout
//! and for whether the controller answers it, consulted identically by the
//! transceiver and the mock device.

use std::collections::HashMap;

use lazy_static::lazy_static;
use num_derive::{FromPrimitive, ToPrimitive};
use thiserror::Error;

use crate::frame::{Field, FieldKind, Layout, Value};

/// Every command frame is the same length on the wire: two header bytes plus
/// eight bytes of command-specific payload.
pub const COMMAND_WIRE_SIZE: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum CommandId {
    GoToLocation = 17,
    SetAcceleration = 22,
    Reset = 252,
    ReadStatus = 253,
    ApplyAcceleration = 254,
}

/// What the controller sends back, as declared by the registry. Responses
/// carry no type tag; their byte count is the only discriminator on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    None,
    ShortAck,
    Status,
}

impl ResponseKind {
    pub fn layout(self) -> Option<&'static Layout> {
        match self {
            ResponseKind::None => None,
            ResponseKind::ShortAck => Some(&SHORT_ACK),
            ResponseKind::Status => Some(&STATUS),
        }
    }

    pub fn wire_size(self) -> Option<usize> {
        self.layout().map(|l| l.wire_size())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub id: CommandId,
    pub description: &'static str,
    pub layout: &'static Layout,
    pub response: ResponseKind,
}

impl CommandSpec {
    const fn new(
        id: CommandId,
        description: &'static str,
        layout: &'static Layout,
        response: ResponseKind,
    ) -> Self {
        CommandSpec {
            id,
            description,
            layout,
            response,
        }
    }

    /// Number of caller-supplied values, i.e. the layout minus the
    /// command-id/device-id header.
    pub fn param_count(&self) -> usize {
        self.layout.fields.len() - 2
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown command id {0}")]
pub struct UnknownCommand(pub u8);

pub static GOTO_LOCATION: Layout = Layout::new(
    "goto-location",
    &[
        Field::new("command_id", FieldKind::U8, Value::Int(CommandId::GoToLocation as i64)),
        Field::new("device_id", FieldKind::U8, Value::Int(1)),
        Field::new("position", FieldKind::U32, Value::Int(0)),
        Field::new("pad0", FieldKind::I8, Value::Int(0)),
        Field::new("pad1", FieldKind::I8, Value::Int(0)),
        Field::new("pad2", FieldKind::I8, Value::Int(0)),
        Field::new("pad3", FieldKind::I8, Value::Int(0)),
    ],
);

pub static SET_ACCELERATION: Layout = Layout::new(
    "set-acceleration",
    &[
        Field::new("command_id", FieldKind::U8, Value::Int(CommandId::SetAcceleration as i64)),
        Field::new("device_id", FieldKind::U8, Value::Int(1)),
        Field::new("accel", FieldKind::U32, Value::Int(0)),
        Field::new("pad0", FieldKind::I8, Value::Int(0)),
        Field::new("pad1", FieldKind::I8, Value::Int(0)),
        Field::new("pad2", FieldKind::I8, Value::Int(0)),
        Field::new("pad3", FieldKind::I8, Value::Int(0)),
    ],
);

pub static RESET: Layout = Layout::new(
    "reset",
    &[
        Field::new("command_id", FieldKind::U8, Value::Int(CommandId::Reset as i64)),
        Field::new("device_id", FieldKind::U8, Value::Int(1)),
        Field::new("pad0", FieldKind::I8, Value::Int(0)),
        Field::new("pad1", FieldKind::I8, Value::Int(0)),
        Field::new("pad2", FieldKind::I8, Value::Int(0)),
        Field::new("pad3", FieldKind::I8, Value::Int(0)),
        Field::new("pad4", FieldKind::I8, Value::Int(0)),
        Field::new("pad5", FieldKind::I8, Value::Int(0)),
        Field::new("pad6", FieldKind::I8, Value::Int(0)),
        Field::new("pad7", FieldKind::I8, Value::Int(0)),
    ],
);

pub static READ_STATUS: Layout = Layout::new(
    "read-status",
    &[
        Field::new("command_id", FieldKind::U8, Value::Int(CommandId::ReadStatus as i64)),
        Field::new("device_id", FieldKind::U8, Value::Int(1)),
        Field::new("pad0", FieldKind::I8, Value::Int(0)),
        Field::new("pad1", FieldKind::I8, Value::Int(0)),
        Field::new("pad2", FieldKind::I8, Value::Int(0)),
        Field::new("pad3", FieldKind::I8, Value::Int(0)),
        Field::new("pad4", FieldKind::I8, Value::Int(0)),
        Field::new("pad5", FieldKind::I8, Value::Int(0)),
        Field::new("pad6", FieldKind::I8, Value::Int(0)),
        Field::new("pad7", FieldKind::I8, Value::Int(0)),
    ],
);

pub static APPLY_ACCELERATION: Layout = Layout::new(
    "apply-acceleration",
    &[
        Field::new("command_id", FieldKind::U8, Value::Int(CommandId::ApplyAcceleration as i64)),
        Field::new("device_id", FieldKind::U8, Value::Int(1)),
        Field::new("accel", FieldKind::F32, Value::Float(0.0)),
        Field::new("max_speed", FieldKind::F32, Value::Float(0.0)),
    ],
);

/// 7-byte acknowledgement: header, self-declared size, one boolean result.
pub static SHORT_ACK: Layout = Layout::new(
    "short-ack",
    &[
        Field::new("command_id", FieldKind::U8, Value::Int(0)),
        Field::new("device_id", FieldKind::U8, Value::Int(1)),
        Field::new("error_code", FieldKind::U8, Value::Int(0)),
        Field::new("response_size", FieldKind::U8, Value::Int(7)),
        Field::new("result", FieldKind::Bool, Value::Bool(false)),
        Field::new("pad0", FieldKind::U8, Value::Int(0)),
        Field::new("pad1", FieldKind::U8, Value::Int(0)),
    ],
);

/// 13-byte status report: header, self-declared size, motor and encoder state.
pub static STATUS: Layout = Layout::new(
    "status-response",
    &[
        Field::new("command_id", FieldKind::U8, Value::Int(CommandId::ReadStatus as i64)),
        Field::new("device_id", FieldKind::U8, Value::Int(1)),
        Field::new("error_code", FieldKind::U8, Value::Int(0)),
        Field::new("response_size", FieldKind::U8, Value::Int(13)),
        Field::new("motor_state", FieldKind::U8, Value::Int(0)),
        Field::new("motor_pos", FieldKind::I32, Value::Int(0)),
        Field::new("encoder_pos", FieldKind::U32, Value::Int(0)),
    ],
);

static COMMANDS: [CommandSpec; 5] = [
    CommandSpec::new(
        CommandId::GoToLocation,
        "GoTo Location",
        &GOTO_LOCATION,
        ResponseKind::None,
    ),
    CommandSpec::new(
        CommandId::SetAcceleration,
        "Set Acceleration",
        &SET_ACCELERATION,
        ResponseKind::None,
    ),
    CommandSpec::new(CommandId::Reset, "Reset", &RESET, ResponseKind::ShortAck),
    CommandSpec::new(
        CommandId::ReadStatus,
        "Read Status",
        &READ_STATUS,
        ResponseKind::Status,
    ),
    CommandSpec::new(
        CommandId::ApplyAcceleration,
        "Apply Acceleration",
        &APPLY_ACCELERATION,
        ResponseKind::None,
    ),
];

lazy_static! {
    static ref INDEX: HashMap<u8, &'static CommandSpec> =
        COMMANDS.iter().map(|spec| (spec.id as u8, spec)).collect();
}

pub fn lookup(command_id: u8) -> Result<&'static CommandSpec, UnknownCommand> {
    INDEX
        .get(&command_id)
        .copied()
        .ok_or(UnknownCommand(command_id))
}

pub fn commands() -> impl Iterator<Item = &'static CommandSpec> {
    COMMANDS.iter()
}
