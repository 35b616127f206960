use crate::domain::{PacketError, PacketResult};

/// Bounds-checked little-endian field reads at fixed offsets.
///
/// Every read names the packet kind so an out-of-range offset surfaces as a
/// `MalformedPacket` error describing which layout was violated.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    packet: &'static str,
    bytes: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(packet: &'static str, bytes: &'a [u8]) -> Self {
        Self { packet, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Fail unless the payload holds at least `len` bytes
    pub fn require(&self, len: usize) -> PacketResult<()> {
        self.bytes(0, len).map(|_| ())
    }

    pub fn bytes(&self, offset: usize, width: usize) -> PacketResult<&'a [u8]> {
        offset
            .checked_add(width)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(PacketError::MalformedPacket {
                packet: self.packet,
                offset,
                width,
                len: self.bytes.len(),
            })
    }

    fn array<const N: usize>(&self, offset: usize) -> PacketResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(offset, N)?);
        Ok(out)
    }

    pub fn u8(&self, offset: usize) -> PacketResult<u8> {
        Ok(self.array::<1>(offset)?[0])
    }

    pub fn i8(&self, offset: usize) -> PacketResult<i8> {
        Ok(i8::from_le_bytes(self.array(offset)?))
    }

    pub fn u16(&self, offset: usize) -> PacketResult<u16> {
        Ok(u16::from_le_bytes(self.array(offset)?))
    }

    pub fn i16(&self, offset: usize) -> PacketResult<i16> {
        Ok(i16::from_le_bytes(self.array(offset)?))
    }

    /// Fixed-length null-terminated text field
    pub fn cstr(&self, offset: usize, width: usize) -> PacketResult<String> {
        Ok(cstr_to_str(self.bytes(offset, width)?))
    }
}

/// Decode bytes up to the first NUL, or the whole run when there is none.
///
/// Bytes after the terminator are never looked at. Invalid UTF-8 is replaced
/// rather than rejected since these fields are informational.
pub fn cstr_to_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
