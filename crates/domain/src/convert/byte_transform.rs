use thiserror::Error;

use super::DataFormat;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("payload of {actual} bytes does not hold {count} elements of width {width}")]
    LengthMismatch {
        width: usize,
        count: usize,
        actual: usize,
    },

    #[error("non-ASCII byte 0x{byte:02X} at position {position}")]
    NotAscii { byte: u8, position: usize },
}

/// Converts register payloads to typed arrays and back.
///
/// 16-bit values are always little-endian words; 4- and 8-byte values go
/// through the configured [`DataFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteTransform {
    format: DataFormat,
}

fn split<const N: usize>(bytes: &[u8], count: usize) -> Result<Vec<[u8; N]>, ConvertError> {
    if bytes.len() != count * N {
        return Err(ConvertError::LengthMismatch {
            width: N,
            count,
            actual: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut element = [0u8; N];
            element.copy_from_slice(chunk);
            element
        })
        .collect())
}

impl ByteTransform {
    pub fn new(format: DataFormat) -> Self {
        Self { format }
    }

    pub fn data_format(&self) -> DataFormat {
        self.format
    }

    /// Coil convention: each element is a u16 word, true iff it equals 1
    pub fn decode_bool(&self, bytes: &[u8], count: usize) -> Result<Vec<bool>, ConvertError> {
        Ok(self
            .decode_u16(bytes, count)?
            .into_iter()
            .map(|word| word == 1)
            .collect())
    }

    pub fn decode_i16(&self, bytes: &[u8], count: usize) -> Result<Vec<i16>, ConvertError> {
        Ok(split::<2>(bytes, count)?
            .into_iter()
            .map(i16::from_le_bytes)
            .collect())
    }

    pub fn decode_u16(&self, bytes: &[u8], count: usize) -> Result<Vec<u16>, ConvertError> {
        Ok(split::<2>(bytes, count)?
            .into_iter()
            .map(u16::from_le_bytes)
            .collect())
    }

    pub fn decode_i32(&self, bytes: &[u8], count: usize) -> Result<Vec<i32>, ConvertError> {
        Ok(split::<4>(bytes, count)?
            .into_iter()
            .map(|wire| i32::from_be_bytes(self.format.to_big_endian4(wire)))
            .collect())
    }

    pub fn decode_u32(&self, bytes: &[u8], count: usize) -> Result<Vec<u32>, ConvertError> {
        Ok(split::<4>(bytes, count)?
            .into_iter()
            .map(|wire| u32::from_be_bytes(self.format.to_big_endian4(wire)))
            .collect())
    }

    pub fn decode_f32(&self, bytes: &[u8], count: usize) -> Result<Vec<f32>, ConvertError> {
        Ok(split::<4>(bytes, count)?
            .into_iter()
            .map(|wire| f32::from_be_bytes(self.format.to_big_endian4(wire)))
            .collect())
    }

    pub fn decode_f64(&self, bytes: &[u8], count: usize) -> Result<Vec<f64>, ConvertError> {
        Ok(split::<8>(bytes, count)?
            .into_iter()
            .map(|wire| f64::from_be_bytes(self.format.to_big_endian8(wire)))
            .collect())
    }

    /// Decodes an ASCII string. The device stores strings back to front, so
    /// the buffer is reversed first; NUL padding is trimmed.
    pub fn decode_string(&self, bytes: &[u8]) -> Result<String, ConvertError> {
        let mut text = String::with_capacity(bytes.len());
        for (position, &byte) in bytes.iter().rev().enumerate() {
            if !byte.is_ascii() {
                return Err(ConvertError::NotAscii { byte, position });
            }
            text.push(char::from(byte));
        }
        Ok(text.trim_matches('\0').to_string())
    }

    pub fn encode_bool(&self, values: &[bool]) -> Vec<u8> {
        let words: Vec<u16> = values.iter().map(|&v| u16::from(v)).collect();
        self.encode_u16(&words)
    }

    pub fn encode_i16(&self, values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn encode_u16(&self, values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn encode_i32(&self, values: &[i32]) -> Vec<u8> {
        values
            .iter()
            .flat_map(|v| self.format.from_big_endian4(v.to_be_bytes()))
            .collect()
    }

    pub fn encode_u32(&self, values: &[u32]) -> Vec<u8> {
        values
            .iter()
            .flat_map(|v| self.format.from_big_endian4(v.to_be_bytes()))
            .collect()
    }

    pub fn encode_f32(&self, values: &[f32]) -> Vec<u8> {
        values
            .iter()
            .flat_map(|v| self.format.from_big_endian4(v.to_be_bytes()))
            .collect()
    }

    pub fn encode_f64(&self, values: &[f64]) -> Vec<u8> {
        values
            .iter()
            .flat_map(|v| self.format.from_big_endian8(v.to_be_bytes()))
            .collect()
    }

    pub fn encode_string(&self, value: &str) -> Result<Vec<u8>, ConvertError> {
        if let Some((position, byte)) = value.bytes().enumerate().find(|(_, b)| !b.is_ascii()) {
            return Err(ConvertError::NotAscii { byte, position });
        }
        Ok(value.bytes().rev().collect())
    }
}
