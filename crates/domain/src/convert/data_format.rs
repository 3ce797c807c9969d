use serde::{Deserialize, Serialize};

/// Byte/word permutation used by a vendor for 4- and 8-byte values.
///
/// Letters name the wire order of a big-endian value `A B C D` (A most
/// significant). `ABCD` is plain big-endian, `DCBA` plain little-endian,
/// `BADC` swaps the bytes inside each 16-bit word and `CDAB` swaps the
/// words while keeping big-endian bytes inside each word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataFormat {
    ABCD,
    BADC,
    CDAB,
    #[default]
    DCBA,
}

// Wire index feeding each big-endian byte position.
const ORDER4: [[usize; 4]; 4] = [
    [0, 1, 2, 3], // ABCD
    [1, 0, 3, 2], // BADC
    [2, 3, 0, 1], // CDAB
    [3, 2, 1, 0], // DCBA
];

const ORDER8: [[usize; 8]; 4] = [
    [0, 1, 2, 3, 4, 5, 6, 7],
    [1, 0, 3, 2, 5, 4, 7, 6],
    [6, 7, 4, 5, 2, 3, 0, 1],
    [7, 6, 5, 4, 3, 2, 1, 0],
];

impl DataFormat {
    pub const ALL: [DataFormat; 4] = [Self::ABCD, Self::BADC, Self::CDAB, Self::DCBA];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ABCD => "ABCD",
            Self::BADC => "BADC",
            Self::CDAB => "CDAB",
            Self::DCBA => "DCBA",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::ABCD => 0,
            Self::BADC => 1,
            Self::CDAB => 2,
            Self::DCBA => 3,
        }
    }

    /// Reorder 4 wire bytes into big-endian order
    pub fn to_big_endian4(&self, wire: [u8; 4]) -> [u8; 4] {
        let order = &ORDER4[self.index()];
        let mut out = [0u8; 4];
        for (slot, &source) in out.iter_mut().zip(order.iter()) {
            *slot = wire[source];
        }
        out
    }

    /// Reorder a big-endian 4-byte value into wire order
    pub fn from_big_endian4(&self, value: [u8; 4]) -> [u8; 4] {
        let order = &ORDER4[self.index()];
        let mut out = [0u8; 4];
        for (position, &target) in order.iter().enumerate() {
            out[target] = value[position];
        }
        out
    }

    /// Reorder 8 wire bytes into big-endian order
    pub fn to_big_endian8(&self, wire: [u8; 8]) -> [u8; 8] {
        let order = &ORDER8[self.index()];
        let mut out = [0u8; 8];
        for (slot, &source) in out.iter_mut().zip(order.iter()) {
            *slot = wire[source];
        }
        out
    }

    /// Reorder a big-endian 8-byte value into wire order
    pub fn from_big_endian8(&self, value: [u8; 8]) -> [u8; 8] {
        let order = &ORDER8[self.index()];
        let mut out = [0u8; 8];
        for (position, &target) in order.iter().enumerate() {
            out[target] = value[position];
        }
        out
    }
}

impl std::str::FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ABCD" => Ok(Self::ABCD),
            "BADC" => Ok(Self::BADC),
            "CDAB" => Ok(Self::CDAB),
            "DCBA" => Ok(Self::DCBA),
            other => Err(format!("Unknown data format: {}", other)),
        }
    }
}
