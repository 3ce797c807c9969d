//! MC protocol (3E binary frame) adapter for Mitsubishi-style PLCs.
//!
//! Request layout:
//!
//! ```text
//! 50 00 | net 00 | pc FF | io FF 03 | st 00 | len u16 | timer 0A 00 |
//! cmd u16 | sub 00 00 | addr%255 addr/255 00 | dev A8 | count u16 | data
//! ```
//!
//! Responses carry a 9-byte header whose length field (offset 7) covers the
//! 2-byte end code plus the payload.

use bytes::{BufMut, BytesMut};
use domain::{DataFormat, DeviceError, FrameResult, ProtocolAdapter};

pub const REQUEST_SUBHEADER: [u8; 2] = [0x50, 0x00];
pub const RESPONSE_SUBHEADER: [u8; 2] = [0xD0, 0x00];
pub const RESPONSE_HEADER_LEN: usize = 9;
pub const END_CODE_LEN: usize = 2;

pub const CMD_BATCH_READ: u16 = 0x0401;
pub const CMD_BATCH_WRITE: u16 = 0x1401;

/// Data register (D)
const DEVICE_CODE_D: u8 = 0xA8;
const MONITORING_TIMER: u16 = 0x000A;
const LENGTH_OFFSET: usize = 7;
/// Highest address the two-byte `%255` / `/255` split can carry
pub const MAX_ADDRESS: u32 = 255 * 255 + 254;

pub struct MelsecMcAdapter {
    buffer: BytesMut,
    format: DataFormat,
}

impl MelsecMcAdapter {
    pub fn new(format: DataFormat) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            format,
        }
    }

    fn build_frame(
        &self,
        command: u16,
        address: u32,
        count: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        if address > MAX_ADDRESS {
            return Err(DeviceError::InvalidRequest(format!(
                "MC address {} out of range (max {})",
                address, MAX_ADDRESS
            )));
        }
        // timer + command + subcommand + address + device code + count
        let request_len = 2 + 2 + 2 + 3 + 1 + 2 + data.len();
        let request_len = u16::try_from(request_len).map_err(|_| {
            DeviceError::InvalidRequest(format!("MC request too long ({} bytes)", request_len))
        })?;

        let mut frame = BytesMut::with_capacity(RESPONSE_HEADER_LEN + request_len as usize);
        frame.put_slice(&REQUEST_SUBHEADER);
        frame.put_u8(0x00); // network
        frame.put_u8(0xFF); // PC
        frame.put_u16_le(0x03FF); // request destination module I/O
        frame.put_u8(0x00); // station
        frame.put_u16_le(request_len);
        frame.put_u16_le(MONITORING_TIMER);
        frame.put_u16_le(command);
        frame.put_u16_le(0x0000);
        frame.put_u8((address % 255) as u8);
        frame.put_u8((address / 255) as u8);
        frame.put_u8(0x00);
        frame.put_u8(DEVICE_CODE_D);
        frame.put_u16_le(count);
        frame.put_slice(data);
        Ok(frame.to_vec())
    }
}

impl Default for MelsecMcAdapter {
    fn default() -> Self {
        Self::new(DataFormat::default())
    }
}

impl ProtocolAdapter for MelsecMcAdapter {
    fn name(&self) -> &'static str {
        "MelsecMc"
    }

    fn build_read_command(&self, address: u32, length: u16) -> Result<Vec<u8>, DeviceError> {
        if length == 0 {
            return Err(DeviceError::InvalidRequest(
                "read length must be at least one word".into(),
            ));
        }
        self.build_frame(CMD_BATCH_READ, address, length, &[])
    }

    fn build_write_command(&self, address: u32, values: &[u8]) -> Result<Vec<u8>, DeviceError> {
        if values.is_empty() || values.len() % 2 != 0 {
            return Err(DeviceError::InvalidRequest(format!(
                "MC write needs whole words, got {} bytes",
                values.len()
            )));
        }
        let words = u16::try_from(values.len() / 2).map_err(|_| {
            DeviceError::InvalidRequest(format!("MC write too long ({} bytes)", values.len()))
        })?;
        self.build_frame(CMD_BATCH_WRITE, address, words, values)
    }

    fn on_bytes_received(&mut self, bytes: &[u8]) -> Vec<FrameResult> {
        self.buffer.extend_from_slice(bytes);

        if self.buffer.len() < RESPONSE_SUBHEADER.len() {
            return Vec::new();
        }
        if self.buffer[..2] != RESPONSE_SUBHEADER {
            let error = DeviceError::Protocol(format!(
                "Unexpected MC subheader {:02X} {:02X}",
                self.buffer[0], self.buffer[1]
            ));
            self.buffer.clear();
            return vec![Err(error)];
        }
        if self.buffer.len() < RESPONSE_HEADER_LEN {
            return Vec::new();
        }

        let declared =
            u16::from_le_bytes([self.buffer[LENGTH_OFFSET], self.buffer[LENGTH_OFFSET + 1]])
                as usize;
        if declared < END_CODE_LEN {
            self.buffer.clear();
            return vec![Err(DeviceError::Protocol(format!(
                "MC response length {} shorter than end code",
                declared
            )))];
        }

        let total = RESPONSE_HEADER_LEN + declared;
        if self.buffer.len() < total {
            return Vec::new();
        }

        let frame = self.buffer.split_to(total);
        if !self.buffer.is_empty() {
            tracing::debug!(
                bytes = self.buffer.len(),
                "Discarding bytes trailing MC response"
            );
            self.buffer.clear();
        }

        let end_code = u16::from_le_bytes([
            frame[RESPONSE_HEADER_LEN],
            frame[RESPONSE_HEADER_LEN + 1],
        ]);
        if end_code != 0 {
            return vec![Err(DeviceError::Protocol(format!(
                "MC end code 0x{:04X}",
                end_code
            )))];
        }

        vec![Ok(frame[RESPONSE_HEADER_LEN + END_CODE_LEN..].to_vec())]
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }

    fn data_format(&self) -> DataFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(end_code: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00];
        frame.extend_from_slice(&((payload.len() + 2) as u16).to_le_bytes());
        frame.extend_from_slice(&end_code.to_le_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_read_command_layout() {
        let adapter = MelsecMcAdapter::default();
        let frame = adapter.build_read_command(10, 2).unwrap();

        assert_eq!(frame.len(), 21);
        assert_eq!(&frame[..7], &[0x50, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00]);
        assert_eq!(u16::from_le_bytes([frame[7], frame[8]]), 12);
        assert_eq!(&frame[9..11], &[0x0A, 0x00]);
        assert_eq!(&frame[11..13], &[0x01, 0x04]);
        assert_eq!(frame[15], (10 % 255) as u8);
        assert_eq!(frame[16], (10 / 255) as u8);
        assert_eq!(frame[17], 0x00);
        assert_eq!(frame[18], 0xA8);
        assert_eq!(&frame[19..21], &[0x02, 0x00]);
    }

    #[test]
    fn test_address_split_above_255() {
        let adapter = MelsecMcAdapter::default();
        let frame = adapter.build_read_command(600, 1).unwrap();
        assert_eq!(frame[15], 90);
        assert_eq!(frame[16], 2);

        assert!(matches!(
            adapter.build_read_command(MAX_ADDRESS + 1, 1),
            Err(DeviceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_write_command_carries_data() {
        let adapter = MelsecMcAdapter::default();
        let frame = adapter
            .build_write_command(100, &[0x34, 0x12, 0x78, 0x56])
            .unwrap();

        assert_eq!(frame.len(), 25);
        assert_eq!(u16::from_le_bytes([frame[7], frame[8]]), 16);
        assert_eq!(&frame[11..13], &[0x01, 0x14]);
        assert_eq!(&frame[19..21], &[0x02, 0x00]);
        assert_eq!(&frame[21..], &[0x34, 0x12, 0x78, 0x56]);

        assert!(adapter.build_write_command(100, &[0x01]).is_err());
        assert!(adapter.build_write_command(100, &[]).is_err());
    }

    #[test]
    fn test_complete_response_in_one_chunk() {
        let mut adapter = MelsecMcAdapter::default();
        let frames = adapter.on_bytes_received(&response(0, &[0x34, 0x12, 0x78, 0x56]));
        assert_eq!(frames, vec![Ok(vec![0x34, 0x12, 0x78, 0x56])]);
    }

    #[test]
    fn test_response_one_byte_at_a_time() {
        let mut adapter = MelsecMcAdapter::default();
        let bytes = response(0, &[0x01, 0x00, 0x02, 0x00]);
        let mut completed = Vec::new();
        for byte in &bytes {
            completed.extend(adapter.on_bytes_received(std::slice::from_ref(byte)));
        }
        assert_eq!(completed, vec![Ok(vec![0x01, 0x00, 0x02, 0x00])]);
    }

    #[test]
    fn test_end_code_is_protocol_error() {
        let mut adapter = MelsecMcAdapter::default();
        let frames = adapter.on_bytes_received(&response(0xC059, &[]));
        assert!(matches!(&frames[..], [Err(DeviceError::Protocol(msg))] if msg.contains("C059")));
    }

    #[test]
    fn test_bad_subheader_clears_accumulator() {
        let mut adapter = MelsecMcAdapter::default();
        let frames = adapter.on_bytes_received(&[0x12, 0x34, 0x56]);
        assert!(matches!(&frames[..], [Err(DeviceError::Protocol(_))]));

        let frames = adapter.on_bytes_received(&response(0, &[0xAA, 0xBB]));
        assert_eq!(frames, vec![Ok(vec![0xAA, 0xBB])]);
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let mut adapter = MelsecMcAdapter::default();
        let bytes = response(0, &[0x01, 0x00]);
        assert!(adapter.on_bytes_received(&bytes[..5]).is_empty());
        adapter.reset();
        assert_eq!(adapter.on_bytes_received(&bytes), vec![Ok(vec![0x01, 0x00])]);
    }
}
