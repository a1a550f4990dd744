//! Composite vertex keys.
//!
//! A key is a fixed-width word array: `(unique_set_id, resolved_index)` for
//! every channel a pass reads, in canonical stream order then set-id order,
//! zero padding, and the material id in the last word. Unique set ids start
//! at 1 so that padding words can never be mistaken for a channel.

use crate::error::{MeshError, Result};
use crate::types::{IndexSet, Layer, MaterialId, Pass, StreamType};

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Indexed(&'a IndexSet),
    /// Element-sequential: the element is its own source index.
    Implicit,
}

/// One attribute channel read by a pass.
#[derive(Debug, Clone, Copy)]
pub struct Channel<'a> {
    pub stream: StreamType,
    /// Set id on the pass (0 for the implicit channel).
    pub set_id: u32,
    pub unique_set_id: u32,
    source: Source<'a>,
}

impl Channel<'_> {
    /// Source item in the layer stream for `element`.
    #[inline]
    pub fn resolve(&self, element: u32) -> u32 {
        match self.source {
            Source::Indexed(set) => set.indices[element as usize],
            Source::Implicit => element,
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self.source, Source::Implicit)
    }
}

/// Enumerate the channels of `pass`, in key order.
///
/// A stream type with registered index sets contributes one channel per set;
/// a stream type the layer carries but the pass never indexes contributes the
/// layer's implicit channel.
pub fn channels<'a>(layer: &'a Layer, pass: &'a Pass) -> Result<Vec<Channel<'a>>> {
    let mut out = Vec::new();
    for stream in StreamType::ALL {
        if let Some(sets) = pass.index_sets(stream) {
            for (&set_id, set) in sets {
                let unique_set_id = pass.unique_set_id(stream, set_id).ok_or_else(|| {
                    MeshError::Integrity(format!(
                        "{stream} set {set_id} has no unique set id"
                    ))
                })?;
                out.push(Channel {
                    stream,
                    set_id,
                    unique_set_id,
                    source: Source::Indexed(set),
                });
            }
        } else if let Some(data) = layer.stream(stream) {
            out.push(Channel {
                stream,
                set_id: 0,
                unique_set_id: data.implicit_set_id,
                source: Source::Implicit,
            });
        }
    }
    Ok(out)
}

/// Mesh-wide key width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySchema {
    width: usize,
}

impl KeySchema {
    /// `2 * max channel count over every pass + 1` words.
    pub fn for_layers(layers: &[Layer]) -> Result<KeySchema> {
        let mut max_channels = 0;
        for layer in layers {
            for pass in &layer.passes {
                max_channels = max_channels.max(channels(layer, pass)?.len());
            }
        }
        Ok(KeySchema::with_channels(max_channels))
    }

    pub fn with_channels(max_channels: usize) -> KeySchema {
        KeySchema {
            width: 2 * max_channels + 1,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

/// Write the key of `(pass, element)` into `out` (exactly `schema.width()` words).
pub fn build_key(channels: &[Channel<'_>], material: MaterialId, element: u32, out: &mut [u32]) {
    out.fill(0);
    for (i, channel) in channels.iter().enumerate() {
        out[2 * i] = channel.unique_set_id;
        out[2 * i + 1] = channel.resolve(element);
    }
    if let Some(last) = out.last_mut() {
        *last = material.0;
    }
}
