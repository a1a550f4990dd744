use std::fmt;

/// Per-vertex attribute kinds a layer can carry.
///
/// The declaration order is the canonical order used by key building and
/// buffer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamType {
    Vertices,
    Normals,
    TexCoords,
    Sh3Bands,
    Sh4Bands,
}

impl StreamType {
    /// Every stream type in canonical order.
    pub const ALL: [StreamType; 5] = [
        StreamType::Vertices,
        StreamType::Normals,
        StreamType::TexCoords,
        StreamType::Sh3Bands,
        StreamType::Sh4Bands,
    ];

    /// Float components this stream occupies in the interleaved vertex.
    pub fn layout_components(self) -> u32 {
        match self {
            StreamType::TexCoords => 2,
            StreamType::Vertices | StreamType::Normals | StreamType::Sh3Bands => 3,
            StreamType::Sh4Bands => 4,
        }
    }

    /// Required start alignment inside the interleaved vertex, in bits.
    pub fn required_bit_alignment(self) -> u32 {
        match self {
            StreamType::Sh3Bands => 96,
            StreamType::Sh4Bands => 128,
            _ => 8,
        }
    }

    /// Required start alignment in bytes.
    pub fn alignment_bytes(self) -> usize {
        (self.required_bit_alignment() / 8) as usize
    }

    /// Spherical-harmonic band count implied by this stream, if any.
    pub fn sh_bands(self) -> Option<u8> {
        match self {
            StreamType::Sh3Bands => Some(3),
            StreamType::Sh4Bands => Some(4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Vertices => "VERTICES",
            StreamType::Normals => "NORMALS",
            StreamType::TexCoords => "TEXCOORDS",
            StreamType::Sh3Bands => "SH_3BANDS",
            StreamType::Sh4Bands => "SH_4BANDS",
        }
    }

    /// Stable on-disk tag.
    pub fn to_tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw float attribute data registered on a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DataStream {
    pub component_count: u32,
    pub item_count: u32,
    /// Flat item data: `item_count * component_count` floats.
    pub data: Vec<f32>,
    pub required_bit_alignment: u32,
    /// Unique set id naming the element-sequential channel used by passes
    /// that register no index set for this stream.
    pub implicit_set_id: u32,
}

impl DataStream {
    /// Components of item `index`, or `None` when out of range.
    pub fn item(&self, index: u32) -> Option<&[f32]> {
        let c = self.component_count as usize;
        let start = index as usize * c;
        self.data.get(start..start + c)
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }
}
