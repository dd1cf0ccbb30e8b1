//! Immutable byte buffers handed between pipeline stages

/// An immutable, fixed-length run of bytes
///
/// Not `Clone`. Each pipeline handoff (reader, staging, sink) moves it.
#[derive(PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl ByteBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Length in bytes
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Big-endian u32 at `offset`, if the buffer is long enough
    pub fn read_u32_be(&self, offset: usize) -> Option<u32> {
        let bytes = self.data.get(offset..offset.checked_add(4)?)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Little-endian u32 at `offset`, if the buffer is long enough
    pub fn read_u32_le(&self, offset: usize) -> Option<u32> {
        let bytes = self.data.get(offset..offset.checked_add(4)?)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
