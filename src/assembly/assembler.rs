use std::collections::BTreeSet;

use tracing::{debug, info};

use super::dedup::DedupIndex;
use super::key::{self, Channel, KeySchema};
use super::layout::{IndexWidth, StreamSlot, VertexLayout};
use crate::error::{MeshError, Result};
use crate::types::{DrawRange, Layer, StreamType};

/// Single-indexed GPU representation: interleaved vertices followed by the
/// index array, in host byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuBlob {
    pub data: Vec<u8>,
    pub layout: VertexLayout,
    pub unique_vertex_count: u32,
    pub total_elements: u32,
    pub index_width: IndexWidth,
}

impl GpuBlob {
    /// Byte offset of the index array.
    pub fn index_offset(&self) -> usize {
        self.layout.stride as usize * self.unique_vertex_count as usize
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        &self.data[..self.index_offset()]
    }

    pub fn index_bytes(&self) -> &[u8] {
        &self.data[self.index_offset()..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Index entry `i` of the traversal-ordered index array.
    pub fn index(&self, i: usize) -> Option<u32> {
        let w = self.index_width.bytes();
        let start = self.index_offset() + i * w;
        self.data.get(start..start + w).map(|b| self.index_width.read(b))
    }

    /// Every index entry widened to u32.
    pub fn indices(&self) -> Vec<u32> {
        self.index_bytes()
            .chunks_exact(self.index_width.bytes())
            .map(|b| self.index_width.read(b))
            .collect()
    }

    /// Floats stored for `vertex` in `slot`.
    pub fn read_slot(&self, vertex: u32, slot: &StreamSlot) -> Option<Vec<f32>> {
        if vertex >= self.unique_vertex_count {
            return None;
        }
        let start = slot.offset as usize + self.layout.stride as usize * vertex as usize;
        let bytes = self.data.get(start..start + slot.byte_len())?;
        Some(
            bytes
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect(),
        )
    }

    /// Convenience lookup by stream and set.
    pub fn attribute(&self, vertex: u32, stream: StreamType, set_id: u32) -> Option<Vec<f32>> {
        let slot = self.layout.slot(stream, set_id)?;
        self.read_slot(vertex, slot)
    }
}

/// Output of one assembly run, not yet applied to a mesh.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub blob: GpuBlob,
    /// `[layer][pass]` draw sub-ranges.
    pub draw_ranges: Vec<Vec<DrawRange>>,
    /// Distinct vertex ids referenced per layer.
    pub layer_unique: Vec<u32>,
}

/// Build the deduplicated interleaved blob for `layers`.
///
/// Traversal is layer order, pass order, element order; the same order
/// drives the sizing and scatter passes so the output is deterministic.
pub fn assemble(layers: &[Layer]) -> Result<Assembly> {
    let schema = KeySchema::for_layers(layers)?;
    let plan = plan_channels(layers)?;

    // Sizing pass
    let mut dedup = DedupIndex::new();
    let mut key = vec![0u32; schema.width()];
    let mut used: BTreeSet<(StreamType, u32)> = BTreeSet::new();
    let mut total_elements: u64 = 0;

    for (layer, pass_channels) in layers.iter().zip(&plan) {
        for (pass, channels) in layer.passes.iter().zip(pass_channels) {
            for channel in channels {
                used.insert((channel.stream, channel.set_id));
            }
            for element in 0..pass.n_elements {
                key::build_key(channels, pass.material, element, &mut key);
                dedup.lookup_or_insert(&key)?;
            }
            total_elements += pass.n_elements as u64;
        }
    }

    let total_elements = u32::try_from(total_elements)
        .map_err(|_| MeshError::Capacity(format!("{total_elements} elements exceed u32")))?;
    let unique = dedup.len() as u32;

    // Layout pass
    let layout = VertexLayout::build(&used);
    let index_width = IndexWidth::for_vertex_count(unique);
    let vertex_bytes = (layout.stride as usize)
        .checked_mul(unique as usize)
        .ok_or_else(|| MeshError::Capacity("vertex section overflows usize".into()))?;
    let total_bytes = index_width
        .bytes()
        .checked_mul(total_elements as usize)
        .and_then(|b| b.checked_add(vertex_bytes))
        .ok_or_else(|| MeshError::Capacity("blob size overflows usize".into()))?;

    debug!(
        key_width = schema.width(),
        stride = layout.stride,
        slots = layout.slots.len(),
        unique,
        total_elements,
        index_width = index_width.bytes(),
        "Computed vertex layout"
    );

    let mut data = Vec::new();
    data.try_reserve_exact(total_bytes)
        .map_err(|_| MeshError::OutOfMemory { bytes: total_bytes })?;
    data.resize(total_bytes, 0);

    // Scatter copy
    let stride = layout.stride as usize;
    let width = index_width.bytes();
    let mut cursor = 0usize;
    let mut draw_ranges = Vec::with_capacity(layers.len());
    let mut layer_unique = Vec::with_capacity(layers.len());
    // Per-vertex stamp: `layer index + 1` of the last layer that referenced it.
    let mut seen = vec![0u32; unique as usize];

    for (li, (layer, pass_channels)) in layers.iter().zip(&plan).enumerate() {
        let stamp = li as u32 + 1;
        let mut seen_count = 0u32;
        let mut ranges = Vec::with_capacity(layer.passes.len());

        for (pi, (pass, channels)) in layer.passes.iter().zip(pass_channels).enumerate() {
            let slots = channels
                .iter()
                .map(|c| {
                    layout.slot(c.stream, c.set_id).copied().ok_or_else(|| {
                        MeshError::Integrity(format!("no slot for {} set {}", c.stream, c.set_id))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let mut range = DrawRange {
                index_byte_offset: index_byte_offset(cursor, width)?,
                min_index: u32::MAX,
                max_index: 0,
                n_elements: pass.n_elements,
            };

            for element in 0..pass.n_elements {
                key::build_key(channels, pass.material, element, &mut key);
                let id = dedup.get(&key).ok_or_else(|| {
                    MeshError::Integrity(format!(
                        "key of layer {li} pass {pi} element {element} missing from the dedup index"
                    ))
                })?;

                let at = vertex_bytes + cursor * width;
                index_width.write(&mut data[at..at + width], id);
                cursor += 1;

                range.min_index = range.min_index.min(id);
                range.max_index = range.max_index.max(id);
                if seen[id as usize] != stamp {
                    seen[id as usize] = stamp;
                    seen_count += 1;
                }

                for (channel, slot) in channels.iter().zip(&slots) {
                    let source = channel.resolve(element);
                    let item = layer
                        .stream(channel.stream)
                        .and_then(|s| s.item(source))
                        .ok_or_else(|| {
                            MeshError::Integrity(format!(
                                "{} index {source} out of range on layer {li} pass {pi}",
                                channel.stream
                            ))
                        })?;
                    let n = item.len().min(slot.components as usize);
                    let dst = slot.offset as usize + stride * id as usize;
                    data[dst..dst + n * 4].copy_from_slice(bytemuck::cast_slice(&item[..n]));
                }
            }

            if pass.n_elements == 0 {
                range.min_index = 0;
            }
            ranges.push(range);
        }

        draw_ranges.push(ranges);
        layer_unique.push(seen_count);
    }

    info!(
        layers = layers.len(),
        unique_vertices = unique,
        elements = total_elements,
        bytes = total_bytes,
        "Assembled GPU blob"
    );

    Ok(Assembly {
        blob: GpuBlob {
            data,
            layout,
            unique_vertex_count: unique,
            total_elements,
            index_width,
        },
        draw_ranges,
        layer_unique,
    })
}

/// Byte offset of index entry `cursor`; draw ranges address it with 32 bits.
fn index_byte_offset(cursor: usize, width: usize) -> Result<u32> {
    cursor
        .checked_mul(width)
        .and_then(|offset| u32::try_from(offset).ok())
        .ok_or_else(|| {
            MeshError::Capacity(format!(
                "index entry {cursor} lies beyond the 4 GiB draw-range limit"
            ))
        })
}

/// Channels of every pass; fails when a pass indexes a stream its layer lacks.
fn plan_channels(layers: &[Layer]) -> Result<Vec<Vec<Vec<Channel<'_>>>>> {
    layers
        .iter()
        .enumerate()
        .map(|(li, layer)| {
            layer
                .passes
                .iter()
                .enumerate()
                .map(|(pi, pass)| {
                    let channels = key::channels(layer, pass)?;
                    if let Some(missing) = channels.iter().find(|c| !layer.has_stream(c.stream)) {
                        return Err(MeshError::Integrity(format!(
                            "layer {li} pass {pi} indexes {} but the layer has no such stream",
                            missing.stream
                        )));
                    }
                    Ok(channels)
                })
                .collect()
        })
        .collect()
}
