//! Binary image loading for webwii
//!
//! Reads user supplied files into byte buffers, works out which profile a
//! file belongs to from its name, and checks the buffer against that
//! profile's structural contract.

pub mod buffer;
pub mod classify;
pub mod profile;
pub mod reader;
pub mod source;
pub mod validate;

// Re-export main types
pub use buffer::ByteBuffer;
pub use classify::{classify, Classification};
pub use profile::{FileProfile, SizePolicy};
pub use reader::{read_to_buffer, ReadEvent, ReadStream};
pub use source::{ByteSource, FileSource, MemorySource};
pub use validate::{validate, ValidationVerdict, Validator};
