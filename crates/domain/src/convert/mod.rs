mod byte_transform;
mod data_format;

pub use byte_transform::{ByteTransform, ConvertError};
pub use data_format::DataFormat;
