//! Mewtocol-style ASCII adapter (Panasonic PLCs, data registers only).
//!
//! Requests: `<01#RDD{start:05}{end:05}**\r` and
//! `<01#WDD{start:05}{end:05}{HEX}**\r`. Responses: `<01$RD{HEX}**\r`,
//! `<01$WD**\r`, or `<01!{code}**\r` on error.

use domain::{DataFormat, DeviceError, FrameResult, ProtocolAdapter};

use super::AsciiFrameScanner;

pub const READ_PREFIX: &str = "<01#RDD";
pub const WRITE_PREFIX: &str = "<01#WDD";
pub const SUFFIX: &str = "**\r";
/// Largest address a five-digit field can carry
pub const MAX_ADDRESS: u32 = 99_999;

pub struct MewtocolAdapter {
    scanner: AsciiFrameScanner,
    format: DataFormat,
}

impl MewtocolAdapter {
    pub fn new(format: DataFormat) -> Self {
        Self {
            scanner: AsciiFrameScanner::new(),
            format,
        }
    }
}

impl Default for MewtocolAdapter {
    fn default() -> Self {
        Self::new(DataFormat::default())
    }
}

/// Inclusive word range `start..=start+words-1`, bounded to five digits
pub fn word_range(start: u32, words: usize) -> Result<(u32, u32), DeviceError> {
    if words == 0 {
        return Err(DeviceError::InvalidRequest(
            "request must cover at least one word".into(),
        ));
    }
    let end = u32::try_from(words - 1)
        .ok()
        .and_then(|extra| start.checked_add(extra))
        .filter(|&end| end <= MAX_ADDRESS)
        .ok_or_else(|| {
            DeviceError::InvalidRequest(format!(
                "address range {}+{} exceeds {}",
                start, words, MAX_ADDRESS
            ))
        })?;
    Ok((start, end))
}

/// Classify one frame (as returned by [`AsciiFrameScanner`])
pub fn classify(frame: &str) -> FrameResult {
    if let Some(pos) = frame.find('!') {
        let code = frame.get(pos + 1..pos + 3).unwrap_or("??");
        return Err(DeviceError::Protocol(format!(
            "Device reported error {}",
            code
        )));
    }
    if frame.contains("WD") {
        return Ok(Vec::new());
    }
    if let Some(pos) = frame.find("RD") {
        let start = pos + 2;
        let end = frame.len().saturating_sub(2);
        let hex = frame.get(start..end.max(start)).unwrap_or("");
        return hex::decode(hex).map_err(|e| {
            DeviceError::Protocol(format!("Bad hex payload in {:?}: {}", frame, e))
        });
    }
    Err(DeviceError::Protocol(format!(
        "Unrecognized frame {:?}",
        frame
    )))
}

impl ProtocolAdapter for MewtocolAdapter {
    fn name(&self) -> &'static str {
        "Mewtocol"
    }

    fn build_read_command(&self, address: u32, length: u16) -> Result<Vec<u8>, DeviceError> {
        let (start, end) = word_range(address, length as usize)?;
        Ok(format!("{}{:05}{:05}{}", READ_PREFIX, start, end, SUFFIX).into_bytes())
    }

    fn build_write_command(&self, address: u32, values: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let mut payload = values.to_vec();
        if payload.len() % 2 != 0 {
            payload.push(0);
        }
        let (start, end) = word_range(address, payload.len() / 2)?;
        Ok(format!(
            "{}{:05}{:05}{}{}",
            WRITE_PREFIX,
            start,
            end,
            hex::encode_upper(&payload),
            SUFFIX
        )
        .into_bytes())
    }

    fn on_bytes_received(&mut self, bytes: &[u8]) -> Vec<FrameResult> {
        self.scanner
            .push(bytes)
            .iter()
            .map(|frame| classify(frame))
            .collect()
    }

    fn reset(&mut self) {
        self.scanner.clear();
    }

    fn data_format(&self) -> DataFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_command() {
        let adapter = MewtocolAdapter::default();
        assert_eq!(
            adapter.build_read_command(100, 5).unwrap(),
            b"<01#RDD0010000104**\r".to_vec()
        );
        assert_eq!(
            adapter.build_read_command(0, 1).unwrap(),
            b"<01#RDD0000000000**\r".to_vec()
        );
    }

    #[test]
    fn test_write_command_pads_odd_payload() {
        let adapter = MewtocolAdapter::default();
        assert_eq!(
            adapter.build_write_command(20, &[0x0A, 0x00, 0xFF]).unwrap(),
            b"<01#WDD00020000210A00FF00**\r".to_vec()
        );
    }

    #[test]
    fn test_address_limits() {
        let adapter = MewtocolAdapter::default();
        assert!(adapter.build_read_command(99_999, 1).is_ok());
        assert!(matches!(
            adapter.build_read_command(99_999, 2),
            Err(DeviceError::InvalidRequest(_))
        ));
        assert!(adapter.build_read_command(5, 0).is_err());
        assert!(adapter.build_write_command(5, &[]).is_err());
    }

    #[test]
    fn test_classify_frames() {
        assert_eq!(classify("<01$RD0A00FF00**"), Ok(vec![0x0A, 0x00, 0xFF, 0x00]));
        assert_eq!(classify("<01$WD**"), Ok(vec![]));
        assert!(matches!(
            classify("<01!61**"),
            Err(DeviceError::Protocol(msg)) if msg.contains("61")
        ));
        assert!(matches!(classify("<01$RDZZ**"), Err(DeviceError::Protocol(_))));
        assert!(matches!(classify("<01$XX**"), Err(DeviceError::Protocol(_))));
    }

    #[test]
    fn test_response_one_byte_at_a_time() {
        let mut adapter = MewtocolAdapter::default();
        let mut completed = Vec::new();
        for byte in b"<01$RD01000200**\r" {
            completed.extend(adapter.on_bytes_received(std::slice::from_ref(byte)));
        }
        assert_eq!(completed, vec![Ok(vec![0x01, 0x00, 0x02, 0x00])]);

        let mut whole = MewtocolAdapter::default();
        assert_eq!(whole.on_bytes_received(b"<01$RD01000200**\r"), completed);
    }

    #[test]
    fn test_concatenated_responses() {
        let mut adapter = MewtocolAdapter::default();
        let frames = adapter.on_bytes_received(b"<01$WD**\r<01$RD3412**\r");
        assert_eq!(frames, vec![Ok(vec![]), Ok(vec![0x34, 0x12])]);
    }
}
