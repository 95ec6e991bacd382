//! Layout-driven frame codec.
//!
//! Every frame on the pendulum link is a fixed-size big-endian record. A
//! [`Layout`] describes one record as data (ordered fields with a wire type
//! and a default), and [`encode`]/[`decode`] work for any layout, so adding a
//! command means adding a table entry, not a frame struct.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("layout '{layout}' has {expected} fields, {actual} values supplied")]
    Arity {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("layout '{layout}' is {expected} bytes on the wire, got {actual}")]
    Size {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("value {value} does not fit field '{field}'")]
    Overflow { field: &'static str, value: i64 },
    #[error("wrong value type for field '{field}'")]
    WrongType { field: &'static str },
}

/// Wire type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    I8,
    U32,
    I32,
    F32,
    Bool,
}

impl FieldKind {
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::I8 | FieldKind::Bool => 1,
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => 4,
        }
    }
}

/// A decoded (or to-be-encoded) field value. Integers are carried as `i64`
/// regardless of wire width; the width check happens at encode time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f32),
    Bool(bool),
}

impl Value {
    pub fn int(self) -> i64 {
        match self {
            Value::Int(v) => v,
            Value::Float(v) => v as i64,
            Value::Bool(v) => v as i64,
        }
    }

    pub fn float(self) -> f32 {
        match self {
            Value::Int(v) => v as f32,
            Value::Float(v) => v,
            Value::Bool(v) => v as u8 as f32,
        }
    }

    pub fn boolean(self) -> bool {
        match self {
            Value::Int(v) => v != 0,
            Value::Float(v) => v != 0.0,
            Value::Bool(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: Value,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind, default: Value) -> Self {
        Field {
            name,
            kind,
            default,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl Layout {
    pub const fn new(name: &'static str, fields: &'static [Field]) -> Self {
        Layout { name, fields }
    }

    pub fn wire_size(&self) -> usize {
        self.fields.iter().map(|f| f.kind.width()).sum()
    }

    pub fn defaults(&self) -> Vec<Value> {
        self.fields.iter().map(|f| f.default).collect()
    }
}

/// Encode `values` against `layout` into big-endian bytes.
///
/// The value count is checked against the field count before any packing, and
/// integers that do not fit their declared width fail instead of wrapping.
pub fn encode(layout: &Layout, values: &[Value]) -> Result<Vec<u8>, CodecError> {
    if values.len() != layout.fields.len() {
        return Err(CodecError::Arity {
            layout: layout.name,
            expected: layout.fields.len(),
            actual: values.len(),
        });
    }

    let mut out = Vec::with_capacity(layout.wire_size());

    for (field, value) in layout.fields.iter().zip(values) {
        match (field.kind, value) {
            (FieldKind::U8, Value::Int(v)) => {
                let v = u8::try_from(*v).map_err(|_| CodecError::Overflow {
                    field: field.name,
                    value: *v,
                })?;
                out.push(v);
            }
            (FieldKind::I8, Value::Int(v)) => {
                let v = i8::try_from(*v).map_err(|_| CodecError::Overflow {
                    field: field.name,
                    value: *v,
                })?;
                out.push(v as u8);
            }
            (FieldKind::U32, Value::Int(v)) => {
                let v = u32::try_from(*v).map_err(|_| CodecError::Overflow {
                    field: field.name,
                    value: *v,
                })?;
                out.extend_from_slice(&v.to_be_bytes());
            }
            (FieldKind::I32, Value::Int(v)) => {
                let v = i32::try_from(*v).map_err(|_| CodecError::Overflow {
                    field: field.name,
                    value: *v,
                })?;
                out.extend_from_slice(&v.to_be_bytes());
            }
            (FieldKind::F32, Value::Float(v)) => {
                out.extend_from_slice(&v.to_be_bytes());
            }
            (FieldKind::Bool, Value::Bool(v)) => {
                out.push(*v as u8);
            }
            _ => {
                return Err(CodecError::WrongType { field: field.name });
            }
        }
    }

    Ok(out)
}

/// Decode `bytes` against `layout`. The buffer length must equal the layout's
/// wire size exactly; there is no partial decode.
pub fn decode(layout: &Layout, bytes: &[u8]) -> Result<Vec<Value>, CodecError> {
    if bytes.len() != layout.wire_size() {
        return Err(CodecError::Size {
            layout: layout.name,
            expected: layout.wire_size(),
            actual: bytes.len(),
        });
    }

    let mut values = Vec::with_capacity(layout.fields.len());
    let mut off = 0usize;

    for field in layout.fields {
        let width = field.kind.width();
        let chunk = &bytes[off..off + width];
        values.push(match field.kind {
            FieldKind::U8 => Value::Int(chunk[0] as i64),
            FieldKind::I8 => Value::Int(chunk[0] as i8 as i64),
            FieldKind::U32 => {
                Value::Int(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as i64)
            }
            FieldKind::I32 => {
                Value::Int(i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as i64)
            }
            FieldKind::F32 => {
                Value::Float(f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            }
            FieldKind::Bool => Value::Bool(chunk[0] != 0),
        });
        off += width;
    }

    Ok(values)
}
