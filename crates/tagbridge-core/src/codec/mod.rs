//! Value codec for the guest ABI.
//!
//! Every value crossing the boundary is one 32-bit word. Scalars travel in
//! the word itself; everything else lives in guest memory and the word is its
//! offset, with zero reserved as the null sentinel.

pub mod decode;
pub mod encode;

pub use decode::{DecodedResult, FixedStruct, ResultKind};
pub use encode::EncodedValue;
