use std::collections::BTreeSet;

use crate::types::StreamType;

/// Size of one entry in the index array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexWidth {
    U8 = 1,
    U16 = 2,
    U32 = 4,
}

impl IndexWidth {
    /// Narrowest width that can address `unique_vertices` ids.
    pub fn for_vertex_count(unique_vertices: u32) -> IndexWidth {
        if unique_vertices <= u8::MAX as u32 {
            IndexWidth::U8
        } else if unique_vertices <= u16::MAX as u32 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    pub fn bytes(self) -> usize {
        self as usize
    }

    pub fn from_bytes(bytes: u8) -> Option<IndexWidth> {
        match bytes {
            1 => Some(IndexWidth::U8),
            2 => Some(IndexWidth::U16),
            4 => Some(IndexWidth::U32),
            _ => None,
        }
    }

    /// Store `value` in host byte order. `dst` must be `self.bytes()` long.
    #[inline]
    pub fn write(self, dst: &mut [u8], value: u32) {
        match self {
            IndexWidth::U8 => dst[0] = value as u8,
            IndexWidth::U16 => dst.copy_from_slice(&(value as u16).to_ne_bytes()),
            IndexWidth::U32 => dst.copy_from_slice(&value.to_ne_bytes()),
        }
    }

    #[inline]
    pub fn read(self, src: &[u8]) -> u32 {
        match self {
            IndexWidth::U8 => src[0] as u32,
            IndexWidth::U16 => u16::from_ne_bytes([src[0], src[1]]) as u32,
            IndexWidth::U32 => u32::from_ne_bytes([src[0], src[1], src[2], src[3]]),
        }
    }
}

/// Placement of one (stream, set) channel inside the interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSlot {
    pub stream: StreamType,
    pub set_id: u32,
    /// Byte offset from the start of a vertex.
    pub offset: u32,
    pub components: u32,
}

impl StreamSlot {
    pub fn byte_len(&self) -> usize {
        self.components as usize * size_of::<f32>()
    }
}

/// Interleaved vertex layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    pub slots: Vec<StreamSlot>,
    pub stride: u32,
}

impl VertexLayout {
    /// Pack the used channels in canonical stream order, then set-id order,
    /// padding each slot to its stream's alignment.
    pub fn build(used: &BTreeSet<(StreamType, u32)>) -> VertexLayout {
        let mut slots = Vec::with_capacity(used.len());
        let mut offset = 0usize;

        for &(stream, set_id) in used {
            let align = stream.alignment_bytes();
            offset = offset.div_ceil(align) * align;

            let components = stream.layout_components();
            slots.push(StreamSlot {
                stream,
                set_id,
                offset: offset as u32,
                components,
            });
            offset += components as usize * size_of::<f32>();
        }

        VertexLayout {
            slots,
            stride: offset as u32,
        }
    }

    pub fn slot(&self, stream: StreamType, set_id: u32) -> Option<&StreamSlot> {
        self.slots
            .iter()
            .find(|s| s.stream == stream && s.set_id == set_id)
    }

    pub fn has_stream(&self, stream: StreamType) -> bool {
        self.slots.iter().any(|s| s.stream == stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn used(items: &[(StreamType, u32)]) -> BTreeSet<(StreamType, u32)> {
        items.iter().copied().collect()
    }

    #[test]
    fn index_width_boundaries() {
        assert_eq!(IndexWidth::for_vertex_count(0), IndexWidth::U8);
        assert_eq!(IndexWidth::for_vertex_count(255), IndexWidth::U8);
        assert_eq!(IndexWidth::for_vertex_count(256), IndexWidth::U16);
        assert_eq!(IndexWidth::for_vertex_count(65535), IndexWidth::U16);
        assert_eq!(IndexWidth::for_vertex_count(65536), IndexWidth::U32);
        assert_eq!(IndexWidth::U16.bytes(), 2);
    }

    #[test]
    fn index_width_write_read() {
        let mut buf = [0u8; 4];
        for (width, value) in [
            (IndexWidth::U8, 200),
            (IndexWidth::U16, 60_000),
            (IndexWidth::U32, 1 << 20),
        ] {
            let dst = &mut buf[..width.bytes()];
            width.write(dst, value);
            assert_eq!(width.read(dst), value);
        }
        assert_eq!(IndexWidth::from_bytes(3), None);
    }

    #[test]
    fn position_normal_uv_packing() {
        let layout = VertexLayout::build(&used(&[
            (StreamType::TexCoords, 0),
            (StreamType::Vertices, 0),
            (StreamType::Normals, 0),
        ]));
        let offsets: Vec<_> = layout.slots.iter().map(|s| (s.stream, s.offset)).collect();
        assert_eq!(
            offsets,
            vec![
                (StreamType::Vertices, 0),
                (StreamType::Normals, 12),
                (StreamType::TexCoords, 24),
            ]
        );
        assert_eq!(layout.stride, 32);
    }

    #[test]
    fn sh_slots_are_aligned() {
        // 12 + 8 = 20 bytes before SH_3 -> padded to 24; 24 + 12 = 36 -> SH_4 at 48.
        let layout = VertexLayout::build(&used(&[
            (StreamType::Vertices, 0),
            (StreamType::TexCoords, 0),
            (StreamType::Sh3Bands, 0),
            (StreamType::Sh4Bands, 0),
        ]));
        let sh3 = layout.slot(StreamType::Sh3Bands, 0).unwrap();
        let sh4 = layout.slot(StreamType::Sh4Bands, 0).unwrap();
        assert_eq!(sh3.offset, 24);
        assert_eq!(sh3.offset % 12, 0);
        assert_eq!(sh4.offset, 48);
        assert_eq!(sh4.offset % 16, 0);
        assert_eq!(layout.stride, 64);
    }

    #[test]
    fn uv_sets_get_separate_slots() {
        let layout = VertexLayout::build(&used(&[
            (StreamType::Vertices, 0),
            (StreamType::TexCoords, 1),
            (StreamType::TexCoords, 0),
        ]));
        assert_eq!(layout.slot(StreamType::TexCoords, 0).unwrap().offset, 12);
        assert_eq!(layout.slot(StreamType::TexCoords, 1).unwrap().offset, 20);
        assert!(layout.slot(StreamType::Normals, 0).is_none());
        assert_eq!(layout.stride, 28);
    }
}
