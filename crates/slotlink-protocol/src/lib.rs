//! Wire protocol codec for Carrera(R) DIGITAL 124/132 control units.
//!
//! The control unit speaks a small ASCII-framed binary protocol: every message
//! is wrapped in a start and an end delimiter, carries a leading command byte,
//! a command-specific run of 4-bit fields encoded one nibble per byte, and a
//! trailing checksum. This crate is the pure translation layer and does no
//! I/O:
//!
//! - [`wire`]: protocol constants, checksum, nibble primitives
//! - [`Frame`]: one validated, delimiter-stripped message
//! - [`PayloadWriter`] / [`PayloadReader`]: field-level pack and unpack
//! - [`Decoder`]: streaming frame extraction with resynchronization

mod codec;
mod error;
mod frame;
mod payload;
pub mod wire;

pub use codec::{decode_frame, encode_frame, Decoder};
pub use error::{ProtocolError, Result};
pub use frame::Frame;
pub use payload::{PayloadReader, PayloadWriter};
