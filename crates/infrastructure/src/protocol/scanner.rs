use domain::device::ScannerSettings;
use domain::{DataFormat, DeviceError, FrameResult, ProtocolAdapter};

const MAX_PENDING: usize = 4096;

/// Barcode scanner framing: a trigger command out, a serial number wrapped in
/// start/end markers back. Addresses and lengths are ignored.
pub struct ScannerAdapter {
    trigger: Vec<u8>,
    start_marker: Vec<u8>,
    end_marker: Vec<u8>,
    pending: Vec<u8>,
}

impl ScannerAdapter {
    pub fn new(settings: &ScannerSettings) -> Result<Self, DeviceError> {
        if settings.start_marker.is_empty() || settings.end_marker.is_empty() {
            return Err(DeviceError::InvalidConfiguration(
                "scanner markers must not be empty".into(),
            ));
        }
        Ok(Self {
            trigger: settings.trigger_command.as_bytes().to_vec(),
            start_marker: settings.start_marker.as_bytes().to_vec(),
            end_marker: settings.end_marker.as_bytes().to_vec(),
            pending: Vec::new(),
        })
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl ProtocolAdapter for ScannerAdapter {
    fn name(&self) -> &'static str {
        "Scanner"
    }

    /// The trigger command
    fn build_read_command(&self, _address: u32, _length: u16) -> Result<Vec<u8>, DeviceError> {
        Ok(self.trigger.clone())
    }

    fn build_write_command(&self, _address: u32, _values: &[u8]) -> Result<Vec<u8>, DeviceError> {
        Err(DeviceError::InvalidRequest(
            "scanners do not accept writes".into(),
        ))
    }

    fn on_bytes_received(&mut self, bytes: &[u8]) -> Vec<FrameResult> {
        self.pending.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            let Some(start) = find(&self.pending, &self.start_marker) else {
                // Keep a tail that may be the beginning of a split marker.
                let keep = self.start_marker.len() - 1;
                let cut = self.pending.len().saturating_sub(keep);
                self.pending.drain(..cut);
                break;
            };
            let body = start + self.start_marker.len();
            let Some(len) = find(&self.pending[body..], &self.end_marker) else {
                self.pending.drain(..start);
                break;
            };
            let serial = self.pending[body..body + len].to_vec();
            self.pending.drain(..body + len + self.end_marker.len());
            frames.push(Ok(serial));
        }

        if self.pending.len() > MAX_PENDING {
            tracing::warn!(bytes = self.pending.len(), "Unterminated scan discarded");
            self.pending.clear();
        }
        frames
    }

    fn reset(&mut self) {
        self.pending.clear();
    }

    fn data_format(&self) -> DataFormat {
        DataFormat::default()
    }
}
