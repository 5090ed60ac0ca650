//! Byte-level reading and writing for the binary resource format.
//!
//! Integers are LEB128 varints (signed ones zigzag-mapped first), floats are
//! little-endian IEEE 754, strings and byte strings carry a varint length,
//! and every header or object record is wrapped in a varint-length frame.

use uuid::Uuid;

use crate::error::DecodeError;
use crate::limits::{MAX_RECORD_SIZE, MAX_VARINT_BYTES};

/// Cursor over an in-memory encoding. Every read is bounds checked and
/// reports the field it was reading on failure.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline]
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(DecodeError::UnexpectedEof { context })?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or(DecodeError::UnexpectedEof { context })?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(DecodeError::UnexpectedEof { context })?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, context)?);
        Ok(out)
    }

    pub fn read_uuid(&mut self, context: &'static str) -> Result<Uuid, DecodeError> {
        Ok(Uuid::from_bytes(self.read_array(context)?))
    }

    /// Reads a bool; only 0x00 and 0x01 are valid.
    pub fn read_bool(&mut self, context: &'static str) -> Result<bool, DecodeError> {
        match self.read_byte(context)? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::InvalidBool { value }),
        }
    }

    /// Reads an unsigned LEB128 varint of at most [`MAX_VARINT_BYTES`] bytes.
    #[inline]
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for index in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte(context)?;
            let payload = u64::from(byte & 0x7F);
            // The last byte may only carry bit 63.
            if index == MAX_VARINT_BYTES - 1 && payload > 1 {
                return Err(DecodeError::VarintOverflow);
            }
            value |= payload << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintTooLong)
    }

    pub fn read_signed_varint(&mut self, context: &'static str) -> Result<i64, DecodeError> {
        self.read_varint(context).map(zigzag_decode)
    }

    /// Reads a varint count and checks it against `max` before anything is
    /// allocated for it.
    pub fn read_count(&mut self, max: usize, field: &'static str) -> Result<usize, DecodeError> {
        let raw = self.read_varint(field)?;
        let count = usize::try_from(raw).unwrap_or(usize::MAX);
        if count > max {
            return Err(DecodeError::LengthExceedsLimit {
                field,
                len: count,
                max,
            });
        }
        Ok(count)
    }

    fn read_prefixed(&mut self, max: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.read_count(max, field)?;
        self.read_bytes(len, field)
    }

    pub fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError> {
        let bytes = self.read_prefixed(max_len, field)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { field })
    }

    pub fn read_bytes_prefixed(&mut self, max_len: usize, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        self.read_prefixed(max_len, field).map(<[u8]>::to_vec)
    }

    /// Reads a little-endian f64. The bit pattern is kept, NaN included.
    pub fn read_f64(&mut self, context: &'static str) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.read_array(context)?))
    }

    /// Reads one frame, bounded by [`MAX_RECORD_SIZE`], and returns its body.
    pub fn read_frame(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        self.read_prefixed(MAX_RECORD_SIZE, field)
    }
}

/// Growable output buffer with the writing counterparts of [`Reader`].
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_uuid(&mut self, uuid: &Uuid) {
        self.write_bytes(uuid.as_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_byte(u8::from(value));
    }

    #[inline]
    pub fn write_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    pub fn write_signed_varint(&mut self, value: i64) {
        self.write_varint(zigzag_encode(value));
    }

    pub fn write_bytes_prefixed(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_bytes_prefixed(s.as_bytes());
    }

    /// Wraps an encoded header or record in a frame.
    pub fn write_frame(&mut self, body: &[u8]) {
        self.write_bytes_prefixed(body);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }
}

/// Maps signed to unsigned so that small magnitudes stay short:
/// 0, -1, 1, -2, 2 become 0, 1, 2, 3, 4.
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_wire_bytes() {
        let cases: [(u64, &[u8]); 5] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (300, &[0xAC, 0x02]),
            (16_384, &[0x80, 0x80, 0x01]),
        ];
        for (value, wire) in cases {
            let mut writer = Writer::new();
            writer.write_varint(value);
            assert_eq!(writer.as_bytes(), wire, "value {value}");
            assert_eq!(Reader::new(wire).read_varint("count").unwrap(), value);
        }

        let mut writer = Writer::new();
        writer.write_varint(u64::MAX);
        assert_eq!(writer.len(), MAX_VARINT_BYTES);
        assert_eq!(writer.as_bytes()[MAX_VARINT_BYTES - 1], 0x01);
        assert_eq!(
            Reader::new(writer.as_bytes()).read_varint("count").unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn test_signed_values_stay_short() {
        let mut writer = Writer::new();
        writer.write_signed_varint(-1);
        writer.write_signed_varint(1);
        writer.write_signed_varint(-64);
        assert_eq!(writer.as_bytes(), &[0x01, 0x02, 0x7F]);

        let mut writer = Writer::new();
        writer.write_signed_varint(i64::MIN);
        writer.write_signed_varint(i64::MAX);
        let mut reader = Reader::new(writer.as_bytes());
        assert_eq!(reader.read_signed_varint("int").unwrap(), i64::MIN);
        assert_eq!(reader.read_signed_varint("int").unwrap(), i64::MAX);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_record_fields_in_sequence() {
        let uuid = Uuid::from_bytes([9; 16]);
        let mut writer = Writer::new();
        writer.write_uuid(&uuid);
        writer.write_varint(3);
        writer.write_bool(true);
        writer.write_string("caf\u{e9}");
        writer.write_bytes_prefixed(&[]);
        writer.write_f64(-0.0);
        writer.write_f64(f64::NAN);

        let mut reader = Reader::new(writer.as_bytes());
        assert_eq!(reader.read_uuid("object uuid").unwrap(), uuid);
        assert_eq!(reader.read_count(10, "class index").unwrap(), 3);
        assert!(reader.read_bool("flag").unwrap());
        assert_eq!(reader.read_string(16, "name").unwrap(), "caf\u{e9}");
        assert_eq!(reader.read_bytes_prefixed(16, "blob").unwrap(), Vec::<u8>::new());
        assert_eq!(reader.read_f64("weight").unwrap().to_bits(), (-0.0f64).to_bits());
        assert_eq!(reader.read_f64("weight").unwrap().to_bits(), f64::NAN.to_bits());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_frames_delimit_records() {
        let mut writer = Writer::new();
        writer.write_frame(b"header");
        writer.write_frame(b"");
        writer.write_frame(b"record");
        let bytes = writer.into_bytes();

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_frame("header").unwrap(), b"header");
        assert_eq!(reader.read_frame("object record").unwrap(), b"");
        assert_eq!(reader.position(), 8);
        assert_eq!(reader.read_frame("object record").unwrap(), b"record");
        assert!(reader.is_empty());

        let mut truncated = Reader::new(&bytes[..bytes.len() - 1]);
        truncated.read_frame("header").unwrap();
        truncated.read_frame("object record").unwrap();
        assert_eq!(
            truncated.read_frame("object record"),
            Err(DecodeError::UnexpectedEof {
                context: "object record"
            })
        );
    }

    #[test]
    fn test_declared_lengths_are_bounded() {
        let mut writer = Writer::new();
        writer.write_varint(MAX_RECORD_SIZE as u64 + 1);
        assert_eq!(
            Reader::new(writer.as_bytes()).read_frame("object record"),
            Err(DecodeError::LengthExceedsLimit {
                field: "object record",
                len: MAX_RECORD_SIZE + 1,
                max: MAX_RECORD_SIZE,
            })
        );

        let mut writer = Writer::new();
        writer.write_varint(11);
        assert_eq!(
            Reader::new(writer.as_bytes()).read_count(10, "list length"),
            Err(DecodeError::LengthExceedsLimit {
                field: "list length",
                len: 11,
                max: 10,
            })
        );

        // A long string is rejected from its prefix alone.
        let mut writer = Writer::new();
        writer.write_varint(1_000);
        assert!(matches!(
            Reader::new(writer.as_bytes()).read_string(100, "class name"),
            Err(DecodeError::LengthExceedsLimit { max: 100, .. })
        ));
    }

    #[test]
    fn test_malformed_input() {
        let mut writer = Writer::new();
        writer.write_bytes_prefixed(&[0xFF, 0xFE]);
        assert_eq!(
            Reader::new(writer.as_bytes()).read_string(16, "feature name"),
            Err(DecodeError::InvalidUtf8 {
                field: "feature name"
            })
        );

        assert_eq!(
            Reader::new(&[0x02]).read_bool("unique"),
            Err(DecodeError::InvalidBool { value: 2 })
        );

        let mut overflow = [0xFFu8; MAX_VARINT_BYTES];
        overflow[MAX_VARINT_BYTES - 1] = 0x02;
        assert_eq!(
            Reader::new(&overflow).read_varint("count"),
            Err(DecodeError::VarintOverflow)
        );
        assert_eq!(
            Reader::new(&[0x80; MAX_VARINT_BYTES + 1]).read_varint("count"),
            Err(DecodeError::VarintTooLong)
        );
        assert!(matches!(
            Reader::new(&[0u8; 5]).read_uuid("object uuid"),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }
}
