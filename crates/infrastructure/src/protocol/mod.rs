mod ascii_frame;
pub mod melsec_mc;
pub mod mewtocol;
mod scanner;

pub use ascii_frame::AsciiFrameScanner;
pub use melsec_mc::MelsecMcAdapter;
pub use mewtocol::MewtocolAdapter;
pub use scanner::ScannerAdapter;
