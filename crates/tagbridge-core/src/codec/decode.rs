//! Guest result words to host values.
//!
//! Every pointer-shaped result is copied out of linear memory before the
//! instance goes away; nothing returned here borrows guest memory.

use tracing::warn;

use crate::memory::{Arena, GuestPtr, POINTER_WIDTH};
use tagbridge_common::BridgeError;

/// Shape of an export's single result word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// The export returns nothing.
    Unit,
    /// Word is 1 for true.
    Bool,
    /// Word bit-cast to `i32`.
    Int,
    /// Word as-is.
    UInt32,
    /// Offset of a NUL-terminated string.
    String,
    /// Offset of a zero-terminated table of string offsets.
    StringArray,
    /// Offset of a `{length, data}` pair.
    ByteBuffer,
    /// Offset of `fields` scalars followed by a trailing string-array offset.
    FixedStruct {
        /// Number of leading 4-byte scalars.
        fields: usize,
    },
}

impl ResultKind {
    /// Whether the export is expected to produce a result word.
    pub fn returns_value(self) -> bool {
        !matches!(self, ResultKind::Unit)
    }

    /// Whether zero is the null sentinel rather than a value.
    pub fn is_pointer(self) -> bool {
        matches!(
            self,
            ResultKind::String
                | ResultKind::StringArray
                | ResultKind::ByteBuffer
                | ResultKind::FixedStruct { .. }
        )
    }

    /// Kind name, for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ResultKind::Unit => "unit",
            ResultKind::Bool => "bool",
            ResultKind::Int => "int",
            ResultKind::UInt32 => "uint32",
            ResultKind::String => "string",
            ResultKind::StringArray => "string array",
            ResultKind::ByteBuffer => "bytes",
            ResultKind::FixedStruct { .. } => "struct",
        }
    }

    /// Decode `word` out of `arena`.
    ///
    /// `initial_window` is the first string scan window in bytes. For
    /// [`ResultKind::Unit`] the word is ignored.
    ///
    /// # Errors
    ///
    /// [`BridgeError::MemoryFault`] if any offset reached through `word`
    /// does not resolve inside linear memory.
    pub fn decode<A: Arena + ?Sized>(
        self,
        arena: &A,
        word: u32,
        initial_window: u32,
    ) -> Result<DecodedResult, BridgeError> {
        match self {
            ResultKind::Unit => Ok(DecodedResult::Unit),
            ResultKind::Bool => Ok(DecodedResult::Bool(word == 1)),
            #[allow(clippy::cast_possible_wrap)]
            ResultKind::Int => Ok(DecodedResult::Int(word as i32)),
            ResultKind::UInt32 => Ok(DecodedResult::UInt32(word)),
            ResultKind::String => or_null(word, |ptr| {
                read_c_string(arena, ptr, initial_window).map(DecodedResult::String)
            }),
            ResultKind::StringArray => or_null(word, |ptr| {
                read_string_array(arena, ptr, initial_window).map(DecodedResult::StringArray)
            }),
            ResultKind::ByteBuffer => or_null(word, |ptr| {
                read_byte_buffer(arena, ptr).map(DecodedResult::ByteBuffer)
            }),
            ResultKind::FixedStruct { fields } => or_null(word, |ptr| {
                read_fixed_struct(arena, ptr, fields, initial_window).map(DecodedResult::FixedStruct)
            }),
        }
    }
}

fn or_null(
    word: u32,
    decode: impl FnOnce(GuestPtr) -> Result<DecodedResult, BridgeError>,
) -> Result<DecodedResult, BridgeError> {
    match GuestPtr::new(word) {
        Some(ptr) => decode(ptr),
        None => Ok(DecodedResult::Null),
    }
}

/// Scalars plus trailing strings read from a fixed-layout struct.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FixedStruct {
    /// Leading 4-byte fields, in order.
    pub fields: Vec<u32>,
    /// Decoded trailing string array; empty when the trailer offset is zero.
    pub trailing: Vec<String>,
}

/// A decoded result word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedResult {
    /// The export returned nothing.
    Unit,
    /// A pointer-shaped result was the zero sentinel.
    Null,
    Bool(bool),
    Int(i32),
    UInt32(u32),
    String(String),
    StringArray(Vec<String>),
    ByteBuffer(Vec<u8>),
    FixedStruct(FixedStruct),
}

impl DecodedResult {
    /// Kind name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedResult::Unit => "unit",
            DecodedResult::Null => "null",
            DecodedResult::Bool(_) => "bool",
            DecodedResult::Int(_) => "int",
            DecodedResult::UInt32(_) => "uint32",
            DecodedResult::String(_) => "string",
            DecodedResult::StringArray(_) => "string array",
            DecodedResult::ByteBuffer(_) => "bytes",
            DecodedResult::FixedStruct(_) => "struct",
        }
    }

    fn mismatch(&self, expected: &'static str) -> BridgeError {
        BridgeError::ResultKindMismatch {
            expected,
            found: self.kind(),
        }
    }

    pub fn into_bool(self) -> Result<bool, BridgeError> {
        match self {
            DecodedResult::Bool(b) => Ok(b),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn into_int(self) -> Result<i32, BridgeError> {
        match self {
            DecodedResult::Int(i) => Ok(i),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn into_uint32(self) -> Result<u32, BridgeError> {
        match self {
            DecodedResult::UInt32(u) => Ok(u),
            other => Err(other.mismatch("uint32")),
        }
    }

    /// `None` for the null sentinel.
    pub fn into_string(self) -> Result<Option<String>, BridgeError> {
        match self {
            DecodedResult::String(s) => Ok(Some(s)),
            DecodedResult::Null => Ok(None),
            other => Err(other.mismatch("string")),
        }
    }

    /// `None` for the null sentinel; `Some(vec![])` for an empty table.
    pub fn into_string_array(self) -> Result<Option<Vec<String>>, BridgeError> {
        match self {
            DecodedResult::StringArray(items) => Ok(Some(items)),
            DecodedResult::Null => Ok(None),
            other => Err(other.mismatch("string array")),
        }
    }

    /// `None` for the null sentinel; `Some(vec![])` for a zero-length buffer.
    pub fn into_bytes(self) -> Result<Option<Vec<u8>>, BridgeError> {
        match self {
            DecodedResult::ByteBuffer(bytes) => Ok(Some(bytes)),
            DecodedResult::Null => Ok(None),
            other => Err(other.mismatch("bytes")),
        }
    }

    /// `None` for the null sentinel.
    pub fn into_fixed_struct(self) -> Result<Option<FixedStruct>, BridgeError> {
        match self {
            DecodedResult::FixedStruct(s) => Ok(Some(s)),
            DecodedResult::Null => Ok(None),
            other => Err(other.mismatch("struct")),
        }
    }
}

/// Read a NUL-terminated string starting at `ptr`.
///
/// Scans in windows: the first is `initial_window` bytes and each next one
/// starts right after the previous and is twice as large. Windows stop at the
/// end of memory.
pub fn read_c_string<A: Arena + ?Sized>(
    arena: &A,
    ptr: GuestPtr,
    initial_window: u32,
) -> Result<String, BridgeError> {
    let mut bytes = Vec::new();
    let mut cursor = ptr;
    let mut window = initial_window.max(1);

    loop {
        let chunk = arena.read_window(cursor, window)?;
        if let Some(nul) = chunk.iter().position(|&b| b == 0) {
            bytes.extend_from_slice(&chunk[..nul]);
            break;
        }
        bytes.extend_from_slice(chunk);

        if chunk.len() < window as usize {
            // Clamped window: memory ended before a terminator.
            return Err(BridgeError::memory_fault(
                u64::from(ptr.get()),
                bytes.len() as u64 + 1,
                arena.data().len(),
            ));
        }
        cursor = arena.offset(cursor, window)?;
        window = window.saturating_mul(2);
    }

    Ok(String::from_utf8(bytes).unwrap_or_else(|e| {
        warn!(ptr = %ptr, error = %e.utf8_error(), "Guest string is not valid UTF-8, decoding lossily");
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    }))
}

/// Read a zero-terminated table of string offsets starting at `ptr`.
pub fn read_string_array<A: Arena + ?Sized>(
    arena: &A,
    ptr: GuestPtr,
    initial_window: u32,
) -> Result<Vec<String>, BridgeError> {
    let mut items = Vec::new();
    let mut slot = ptr;

    while let Some(item) = GuestPtr::new(arena.read_u32(slot)?) {
        items.push(read_c_string(arena, item, initial_window)?);
        slot = arena.offset(slot, POINTER_WIDTH)?;
    }

    Ok(items)
}

/// Read a `{length, data}` buffer descriptor at `ptr` and copy the data out.
pub fn read_byte_buffer<A: Arena + ?Sized>(arena: &A, ptr: GuestPtr) -> Result<Vec<u8>, BridgeError> {
    let len = arena.read_u32(ptr)?;
    if len == 0 {
        return Ok(Vec::new());
    }

    let raw = arena.read_u32(arena.offset(ptr, POINTER_WIDTH)?)?;
    let data = GuestPtr::new(raw)
        .ok_or_else(|| BridgeError::memory_fault(0, u64::from(len), arena.data().len()))?;

    Ok(arena.read(data, len)?.to_vec())
}

/// Read `fields` scalars at `ptr` followed by a trailing string-array offset.
pub fn read_fixed_struct<A: Arena + ?Sized>(
    arena: &A,
    ptr: GuestPtr,
    fields: usize,
    initial_window: u32,
) -> Result<FixedStruct, BridgeError> {
    let mut values = Vec::with_capacity(fields);
    let mut slot = ptr;
    for _ in 0..fields {
        values.push(arena.read_u32(slot)?);
        slot = arena.offset(slot, POINTER_WIDTH)?;
    }

    let trailing = match GuestPtr::new(arena.read_u32(slot)?) {
        Some(table) => read_string_array(arena, table, initial_window)?,
        None => Vec::new(),
    };

    Ok(FixedStruct {
        fields: values,
        trailing,
    })
}
