use crate::convert::DataFormat;
use crate::error::DeviceError;

/// Outcome of one completed inbound frame: the extracted payload (empty for
/// acknowledgements) or the error the device reported.
pub type FrameResult = Result<Vec<u8>, DeviceError>;

/// Protocol strategy plugged into a device
///
/// Builds request frames and reassembles responses from a fragmenting byte
/// stream. Implementations keep a frame accumulator that survives across
/// receive callbacks until a frame completes.
pub trait ProtocolAdapter: Send {
    /// Protocol identifier, e.g. "Mewtocol"
    fn name(&self) -> &'static str;

    /// Build a read request for `length` 16-bit registers starting at `address`
    fn build_read_command(&self, address: u32, length: u16) -> Result<Vec<u8>, DeviceError>;

    /// Build a write request carrying the raw register bytes in `values`
    fn build_write_command(&self, address: u32, values: &[u8]) -> Result<Vec<u8>, DeviceError>;

    /// Feed received bytes. Returns every frame completed by this chunk, in
    /// arrival order. Partial frames stay buffered.
    fn on_bytes_received(&mut self, bytes: &[u8]) -> Vec<FrameResult>;

    /// Drop any partially accumulated frame
    fn reset(&mut self);

    /// Word/byte layout used for 4- and 8-byte values on this protocol
    fn data_format(&self) -> DataFormat;
}
