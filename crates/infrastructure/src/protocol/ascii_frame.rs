/// Start of an ASCII frame
pub const FRAME_START: u8 = b'<';
/// End of an ASCII frame
pub const FRAME_END: u8 = b'\r';

const MAX_PENDING: usize = 4096;

/// Accumulates characters and yields complete `<...\r` frames.
///
/// Frames split across chunks are held until their terminator arrives;
/// several frames in one chunk are returned in order. Noise before a `<`
/// is dropped. Returned frames start at `<` and exclude the `\r`.
#[derive(Debug, Default)]
pub struct AsciiFrameScanner {
    pending: Vec<u8>,
}

impl AsciiFrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            let Some(start) = self.pending.iter().position(|&b| b == FRAME_START) else {
                self.pending.clear();
                break;
            };
            let Some(len) = self.pending[start..].iter().position(|&b| b == FRAME_END) else {
                self.pending.drain(..start);
                break;
            };
            let end = start + len;
            frames.push(String::from_utf8_lossy(&self.pending[start..end]).into_owned());
            self.pending.drain(..=end);
        }

        if self.pending.len() > MAX_PENDING {
            tracing::warn!(
                bytes = self.pending.len(),
                "Unterminated ASCII frame exceeds limit, discarding"
            );
            self.pending.clear();
        }

        frames
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
