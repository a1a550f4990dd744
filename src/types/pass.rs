use std::collections::BTreeMap;

use super::material::MaterialId;
use super::stream::StreamType;

/// Handle to a layer inside a `Mesh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub usize);

/// Handle to a pass: owning layer plus position within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PassId {
    pub layer: usize,
    pub pass: usize,
}

/// One index channel of a pass, element-aligned with the pass triangles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSet {
    pub indices: Vec<u32>,
    pub min_index: u32,
    pub max_index: u32,
}

impl IndexSet {
    /// Build a set and derive its bounds from the data.
    pub fn new(indices: Vec<u32>) -> Self {
        let min_index = indices.iter().copied().min().unwrap_or(0);
        let max_index = indices.iter().copied().max().unwrap_or(0);
        Self {
            indices,
            min_index,
            max_index,
        }
    }

    /// `start, start + 1, ..., start + len - 1`.
    pub fn sequential(start: u32, len: u32) -> Self {
        Self::new((start..start + len).collect())
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Where a pass landed in the assembled index array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawRange {
    /// Byte offset of the first index entry, relative to the index array start.
    pub index_byte_offset: u32,
    pub min_index: u32,
    pub max_index: u32,
    pub n_elements: u32,
}

/// A material-bound triangle list inside a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub material: MaterialId,
    /// Triangle-list length; always a multiple of 3.
    pub n_elements: u32,
    pub(crate) index_sets: BTreeMap<StreamType, BTreeMap<u32, IndexSet>>,
    pub(crate) unique_set_ids: BTreeMap<(StreamType, u32), u32>,
    pub(crate) draw: Option<DrawRange>,
    /// Smoothing angle the pass normals were last generated with.
    pub(crate) normal_angle: Option<f32>,
}

impl Pass {
    pub(crate) fn new(material: MaterialId, n_elements: u32) -> Self {
        Self {
            material,
            n_elements,
            index_sets: BTreeMap::new(),
            unique_set_ids: BTreeMap::new(),
            draw: None,
            normal_angle: None,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.n_elements as usize / 3
    }

    /// All sets registered for `stream`, ordered by set id.
    pub fn index_sets(&self, stream: StreamType) -> Option<&BTreeMap<u32, IndexSet>> {
        self.index_sets.get(&stream).filter(|sets| !sets.is_empty())
    }

    pub fn index_set(&self, stream: StreamType, set_id: u32) -> Option<&IndexSet> {
        self.index_sets.get(&stream)?.get(&set_id)
    }

    pub fn has_index_sets(&self, stream: StreamType) -> bool {
        self.index_sets(stream).is_some()
    }

    pub fn set_count(&self, stream: StreamType) -> usize {
        self.index_sets(stream).map_or(0, |sets| sets.len())
    }

    /// Mesh-wide identity of `(stream, set_id)` on this pass.
    pub fn unique_set_id(&self, stream: StreamType, set_id: u32) -> Option<u32> {
        self.unique_set_ids.get(&(stream, set_id)).copied()
    }

    /// Draw sub-range, available once the mesh is assembled.
    pub fn draw_range(&self) -> Option<DrawRange> {
        self.draw
    }

    /// Resolve the source item for `element` on the VERTICES channel.
    pub fn vertex_index(&self, element: u32) -> u32 {
        self.index_set(StreamType::Vertices, 0)
            .or_else(|| {
                self.index_sets(StreamType::Vertices)
                    .and_then(|sets| sets.values().next())
            })
            .map_or(element, |set| set.indices[element as usize])
    }

    pub(crate) fn remove_stream_sets(&mut self, stream: StreamType) {
        self.index_sets.remove(&stream);
        self.unique_set_ids.retain(|(ty, _), _| *ty != stream);
    }
}
