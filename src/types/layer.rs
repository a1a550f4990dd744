use std::collections::BTreeMap;

use super::bounds::BoundingBox;
use super::pass::Pass;
use super::stream::{DataStream, StreamType};

/// Where a layer's NORMALS stream came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalState {
    /// No NORMALS stream yet.
    #[default]
    Missing,
    /// Registered by the importer; never regenerated.
    Authored,
    /// Produced by the normal generator with the angles stored on each pass.
    Generated,
    /// Generated, but a material smoothing angle has since changed.
    Stale,
}

/// An independently drawable geometry batch.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub(crate) streams: BTreeMap<StreamType, DataStream>,
    pub(crate) passes: Vec<Pass>,
    pub(crate) bounds: BoundingBox,
    pub(crate) n_unique_elements: u32,
    pub(crate) normals: NormalState,
}

impl Layer {
    pub fn stream(&self, stream: StreamType) -> Option<&DataStream> {
        self.streams.get(&stream)
    }

    pub fn has_stream(&self, stream: StreamType) -> bool {
        self.streams.contains_key(&stream)
    }

    /// Registered streams in canonical order.
    pub fn streams(&self) -> impl Iterator<Item = (StreamType, &DataStream)> {
        self.streams.iter().map(|(ty, s)| (*ty, s))
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn pass(&self, index: usize) -> Option<&Pass> {
        self.passes.get(index)
    }

    /// Layer-local AABB derived from the VERTICES stream.
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Distinct deduplicated vertices referenced by this layer (after assembly).
    pub fn n_unique_elements(&self) -> u32 {
        self.n_unique_elements
    }

    pub fn normal_state(&self) -> NormalState {
        self.normals
    }

    /// Sum of `n_elements` over every pass.
    pub fn element_count(&self) -> u64 {
        self.passes.iter().map(|p| p.n_elements as u64).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.passes.iter().map(|p| p.triangle_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MaterialId;

    #[test]
    fn empty_layer() {
        let layer = Layer::default();
        assert!(layer.passes().is_empty());
        assert!(!layer.has_stream(StreamType::Vertices));
        assert!(layer.bounds().is_empty());
        assert_eq!(layer.normal_state(), NormalState::Missing);
        assert_eq!(layer.element_count(), 0);
    }

    #[test]
    fn element_and_triangle_counts() {
        let layer = Layer {
            passes: vec![Pass::new(MaterialId(0), 6), Pass::new(MaterialId(1), 9)],
            ..Default::default()
        };
        assert_eq!(layer.element_count(), 15);
        assert_eq!(layer.triangle_count(), 5);
    }
}
