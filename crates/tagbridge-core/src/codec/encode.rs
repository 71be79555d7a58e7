//! Host values to guest argument words.

use tracing::trace;

use crate::memory::{Arena, GuestPtr, POINTER_WIDTH};
use tagbridge_common::BridgeError;

/// A host-side argument for an exported call.
///
/// Scalars pass by value. Pointer-shaped variants allocate guest memory,
/// write themselves into it, and pass the resulting offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedValue<'a> {
    /// 1 or 0.
    Bool(bool),
    /// Signed 32-bit integer, bit pattern preserved.
    Int(i32),
    /// Unsigned byte, zero-extended.
    UInt8(u8),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// NUL-terminated UTF-8 string.
    String(&'a str),
    /// Raw bytes, no terminator. The length travels as a separate argument.
    ByteBuffer(&'a [u8]),
    /// Table of string pointers terminated by a zero slot.
    StringArray(&'a [String]),
}

impl EncodedValue<'_> {
    /// Encode into `arena`, returning the argument word.
    ///
    /// # Errors
    ///
    /// [`BridgeError::AllocationFailed`] as soon as the guest allocator
    /// returns the null sentinel; nothing further is written.
    pub fn encode<A: Arena + ?Sized>(&self, arena: &mut A) -> Result<u32, BridgeError> {
        match *self {
            EncodedValue::Bool(b) => Ok(u32::from(b)),
            #[allow(clippy::cast_sign_loss)]
            EncodedValue::Int(i) => Ok(i as u32),
            EncodedValue::UInt8(u) => Ok(u32::from(u)),
            EncodedValue::UInt32(u) => Ok(u),
            EncodedValue::String(s) => encode_string(arena, s).map(GuestPtr::get),
            EncodedValue::ByteBuffer(bytes) => encode_bytes(arena, bytes).map(GuestPtr::get),
            EncodedValue::StringArray(items) => {
                encode_string_array(arena, items).map(GuestPtr::get)
            }
        }
    }

    /// Variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            EncodedValue::Bool(_) => "bool",
            EncodedValue::Int(_) => "int",
            EncodedValue::UInt8(_) => "uint8",
            EncodedValue::UInt32(_) => "uint32",
            EncodedValue::String(_) => "string",
            EncodedValue::ByteBuffer(_) => "bytes",
            EncodedValue::StringArray(_) => "string array",
        }
    }
}

fn byte_len(len: usize) -> Result<u32, BridgeError> {
    u32::try_from(len).map_err(|_| BridgeError::AllocationFailed { size: u32::MAX })
}

/// Allocate exactly `len + 1` bytes and write the string plus its NUL.
pub fn encode_string<A: Arena + ?Sized>(arena: &mut A, s: &str) -> Result<GuestPtr, BridgeError> {
    let size = byte_len(s.len())?
        .checked_add(1)
        .ok_or(BridgeError::AllocationFailed { size: u32::MAX })?;
    let ptr = arena.alloc(size)?;

    arena.write(ptr, s.as_bytes())?;
    let nul = arena.offset(ptr, size - 1)?;
    arena.write(nul, &[0])?;

    trace!(ptr = %ptr, len = s.len(), "Encoded string");
    Ok(ptr)
}

/// Allocate exactly `bytes.len()` bytes and copy the buffer in.
///
/// An empty buffer requests one byte so the allocator is never asked for a
/// zero-sized block, whose result it is free to report as null.
pub fn encode_bytes<A: Arena + ?Sized>(
    arena: &mut A,
    bytes: &[u8],
) -> Result<GuestPtr, BridgeError> {
    let size = byte_len(bytes.len())?.max(1);
    let ptr = arena.alloc(size)?;
    arena.write(ptr, bytes)?;

    trace!(ptr = %ptr, len = bytes.len(), "Encoded byte buffer");
    Ok(ptr)
}

/// Allocate a `(n + 1)`-slot pointer table, encode every element as a
/// string, and terminate the table with a zero slot.
pub fn encode_string_array<A: Arena + ?Sized>(
    arena: &mut A,
    items: &[String],
) -> Result<GuestPtr, BridgeError> {
    let slots = byte_len(items.len())?
        .checked_add(1)
        .and_then(|n| n.checked_mul(POINTER_WIDTH))
        .ok_or(BridgeError::AllocationFailed { size: u32::MAX })?;
    let table = arena.alloc(slots)?;

    let mut slot = table;
    for item in items {
        let ptr = encode_string(arena, item)?;
        arena.write_u32(slot, ptr.get())?;
        slot = arena.offset(slot, POINTER_WIDTH)?;
    }
    arena.write_u32(slot, 0)?;

    trace!(ptr = %table, len = items.len(), "Encoded string array");
    Ok(table)
}
