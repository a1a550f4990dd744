use std::sync::Arc;

use tracing::{debug, info};

use super::bounds::BoundingBox;
use super::layer::{Layer, NormalState};
use super::material::{ANGLE_EPSILON, MaterialId, SmoothingAngles};
use super::pass::{IndexSet, LayerId, Pass, PassId};
use super::stream::{DataStream, StreamType};
use crate::assembly::assembler::{self, Assembly, GpuBlob};
use crate::assembly::normals::{self, GeneratedNormals};
use crate::error::{MeshError, Result, ValidationError};

/// Front-face orientation of the triangle lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Winding {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl Winding {
    pub fn to_tag(self) -> u8 {
        match self {
            Winding::CounterClockwise => 0,
            Winding::Clockwise => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Winding::CounterClockwise),
            1 => Some(Winding::Clockwise),
            _ => None,
        }
    }
}

/// Creation flags controlling what survives assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshFlags {
    /// Keep raw streams and index sets after the blob is built.
    pub keep_raw_streams: bool,
    /// Raw geometry is needed later for spatial acceleration structures.
    pub support_kd_tree_generation: bool,
}

impl MeshFlags {
    fn retains_raw(&self) -> bool {
        self.keep_raw_streams || self.support_kd_tree_generation
    }
}

/// Multi-layer, multi-stream source geometry plus its assembled GPU blob.
#[derive(Debug, Clone)]
pub struct Mesh {
    name: String,
    flags: MeshFlags,
    winding: Winding,
    layers: Vec<Layer>,
    materials: Vec<MaterialId>,
    bounds: BoundingBox,
    sh_bands: u8,
    next_unique_set_id: u32,
    blob: Option<Arc<GpuBlob>>,
    raw_released: bool,
}

impl Mesh {
    pub fn new(name: impl Into<String>, flags: MeshFlags) -> Self {
        Self {
            name: name.into(),
            flags,
            winding: Winding::default(),
            layers: Vec::new(),
            materials: Vec::new(),
            bounds: BoundingBox::EMPTY,
            sh_bands: 0,
            // 0 is reserved for key padding.
            next_unique_set_id: 1,
            blob: None,
            raw_released: false,
        }
    }

    pub fn with_winding(mut self, winding: Winding) -> Self {
        self.winding = winding;
        self
    }

    // --- Accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> MeshFlags {
        self.flags
    }

    pub fn winding(&self) -> Winding {
        self.winding
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id.0)
    }

    pub fn pass(&self, id: PassId) -> Option<&Pass> {
        self.layers.get(id.layer)?.passes.get(id.pass)
    }

    /// Distinct materials in first-use order.
    pub fn materials(&self) -> &[MaterialId] {
        &self.materials
    }

    /// Model-space AABB (union of layer AABBs).
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Spherical-harmonic band count, 0 when unused.
    pub fn sh_bands(&self) -> u8 {
        self.sh_bands
    }

    pub fn blob(&self) -> Option<&Arc<GpuBlob>> {
        self.blob.as_ref()
    }

    pub fn is_frozen(&self) -> bool {
        self.blob.is_some()
    }

    /// Whether raw streams and index sets are still held.
    pub fn has_raw_geometry(&self) -> bool {
        !self.raw_released
    }

    pub fn triangle_count(&self) -> usize {
        self.layers.iter().map(Layer::triangle_count).sum()
    }

    // --- Mutators ---

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(ValidationError::FrozenMesh.into());
        }
        Ok(())
    }

    fn alloc_unique_set_id(&mut self) -> u32 {
        let id = self.next_unique_set_id;
        self.next_unique_set_id += 1;
        id
    }

    pub fn add_layer(&mut self) -> LayerId {
        self.layers.push(Layer::default());
        LayerId(self.layers.len() - 1)
    }

    /// Register a float stream on `layer`.
    pub fn add_stream(
        &mut self,
        layer: LayerId,
        stream: StreamType,
        components: u32,
        data: Vec<f32>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let target = self
            .layers
            .get(layer.0)
            .ok_or(ValidationError::UnknownLayer(layer.0))?;

        if !(1..=4).contains(&components) || (stream == StreamType::Vertices && components < 3) {
            return Err(ValidationError::InvalidArity(components).into());
        }
        if target.streams.contains_key(&stream) {
            return Err(ValidationError::DuplicateStream(stream, layer.0).into());
        }
        if data.len() % components as usize != 0 {
            return Err(ValidationError::MisalignedData {
                len: data.len(),
                components,
            }
            .into());
        }
        if let Some(bands) = stream.sh_bands() {
            if self.sh_bands != 0 && self.sh_bands != bands {
                return Err(MeshError::Capacity(format!(
                    "{stream} conflicts with the mesh's {} SH bands",
                    self.sh_bands
                )));
            }
        }

        let item_count = u32::try_from(data.len() / components as usize)
            .map_err(|_| MeshError::Capacity(format!("{stream} holds more than u32::MAX items")))?;
        let implicit_set_id = self.alloc_unique_set_id();

        if let Some(bands) = stream.sh_bands() {
            self.sh_bands = bands;
        }

        let target = &mut self.layers[layer.0];
        if stream == StreamType::Vertices {
            target.bounds = BoundingBox::from_points(&data, components as usize);
            self.bounds = self.bounds.merge(&target.bounds);
        }
        if stream == StreamType::Normals {
            target.normals = NormalState::Authored;
        }

        debug!(layer = layer.0, %stream, components, item_count, "Registered stream");
        target.streams.insert(
            stream,
            DataStream {
                component_count: components,
                item_count,
                data,
                required_bit_alignment: stream.required_bit_alignment(),
                implicit_set_id,
            },
        );
        Ok(())
    }

    /// Append a triangle-list pass to `layer`.
    pub fn add_pass(
        &mut self,
        layer: LayerId,
        material: MaterialId,
        n_elements: u32,
    ) -> Result<PassId> {
        self.ensure_mutable()?;
        if n_elements % 3 != 0 {
            return Err(ValidationError::InvalidTopology(n_elements).into());
        }
        let target = self
            .layers
            .get_mut(layer.0)
            .ok_or(ValidationError::UnknownLayer(layer.0))?;

        target.passes.push(Pass::new(material, n_elements));
        let id = PassId {
            layer: layer.0,
            pass: target.passes.len() - 1,
        };
        if !self.materials.contains(&material) {
            self.materials.push(material);
        }
        Ok(id)
    }

    /// Register index set `set_id` of `stream` on `pass`. Returns its unique set id.
    pub fn add_pass_index_set(
        &mut self,
        pass: PassId,
        stream: StreamType,
        set_id: u32,
        indices: Vec<u32>,
        min_index: u32,
        max_index: u32,
    ) -> Result<u32> {
        self.ensure_mutable()?;
        let target = self
            .layers
            .get(pass.layer)
            .and_then(|l| l.passes.get(pass.pass))
            .ok_or(ValidationError::UnknownPass(pass.pass))?;

        if target.index_set(stream, set_id).is_some() {
            return Err(ValidationError::DuplicateIndexSet {
                pass: pass.pass,
                stream,
                set_id,
            }
            .into());
        }
        if stream == StreamType::Vertices && target.has_index_sets(StreamType::Vertices) {
            return Err(MeshError::Capacity(
                "a pass supports a single VERTICES index set".into(),
            ));
        }
        if indices.len() != target.n_elements as usize {
            return Err(ValidationError::IndexCountMismatch {
                expected: target.n_elements,
                actual: indices.len(),
            }
            .into());
        }

        let unique = self.alloc_unique_set_id();
        let target = &mut self.layers[pass.layer].passes[pass.pass];
        target.index_sets.entry(stream).or_default().insert(
            set_id,
            IndexSet {
                indices,
                min_index,
                max_index,
            },
        );
        target.unique_set_ids.insert((stream, set_id), unique);
        Ok(unique)
    }

    /// `add_pass_index_set` with bounds derived from the data.
    pub fn add_pass_indices(
        &mut self,
        pass: PassId,
        stream: StreamType,
        set_id: u32,
        indices: Vec<u32>,
    ) -> Result<u32> {
        let set = IndexSet::new(indices);
        self.add_pass_index_set(pass, stream, set_id, set.indices, set.min_index, set.max_index)
    }

    // --- Normal generation ---

    /// Generate normals for every layer that has passes but no NORMALS stream,
    /// and regenerate generated layers that gained passes since.
    ///
    /// All layers are computed before any is modified. Returns the number of
    /// layers that received normals.
    pub fn generate_normals(&mut self, angles: &impl SmoothingAngles) -> Result<usize> {
        self.ensure_mutable()?;

        let mut generated = Vec::new();
        for (li, layer) in self.layers.iter().enumerate() {
            if layer.passes.is_empty() {
                continue;
            }
            match layer.normals {
                NormalState::Missing if !layer.has_stream(StreamType::Normals) => {
                    generated.push((li, normals::generate_layer_normals(layer, self.winding, angles)?));
                }
                NormalState::Generated | NormalState::Stale if has_ungenerated_pass(layer) => {
                    let mut stripped = layer.clone();
                    strip_normals(&mut stripped);
                    generated.push((
                        li,
                        normals::generate_layer_normals(&stripped, self.winding, angles)?,
                    ));
                }
                _ => {}
            }
        }

        let count = generated.len();
        for (li, normals) in generated {
            apply_normals(&mut self.layers[li], normals, &mut self.next_unique_set_id);
        }
        if count > 0 {
            info!(mesh = %self.name, layers = count, "Generated missing normals");
        }
        Ok(count)
    }

    /// Layers whose generated normals no longer match the material angles.
    pub fn stale_layers(&self, angles: &impl SmoothingAngles) -> Vec<usize> {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| {
                matches!(layer.normals, NormalState::Generated | NormalState::Stale)
                    && layer.passes.iter().any(|pass| match pass.normal_angle {
                        Some(used) => {
                            (angles.smoothing_angle(pass.material) - used).abs() > ANGLE_EPSILON
                        }
                        None => true,
                    })
            })
            .map(|(li, _)| li)
            .collect()
    }

    /// Material-change hook: regenerate stale normals and, when the mesh is
    /// already assembled, rebuild the blob.
    ///
    /// Returns `true` when a new blob was produced and must be re-uploaded.
    /// On error the previous blob and draw ranges are left in place.
    pub fn refresh_normals(&mut self, angles: &impl SmoothingAngles) -> Result<bool> {
        let stale = self.stale_layers(angles);
        if stale.is_empty() {
            return Ok(false);
        }
        if self.raw_released {
            return Err(MeshError::Integrity(
                "raw streams were released; normals cannot be regenerated".into(),
            ));
        }

        let mut layers = self.layers.clone();
        let mut next_id = self.next_unique_set_id;
        for &li in &stale {
            let layer = &mut layers[li];
            layer.normals = NormalState::Stale;
            strip_normals(layer);
            let normals = normals::generate_layer_normals(layer, self.winding, angles)?;
            apply_normals(layer, normals, &mut next_id);
        }

        let reassemble = self.blob.is_some();
        let assembly = if reassemble {
            Some(assembler::assemble(&layers)?)
        } else {
            None
        };

        info!(mesh = %self.name, layers = stale.len(), reassemble, "Regenerated stale normals");
        self.layers = layers;
        self.next_unique_set_id = next_id;
        if let Some(assembly) = assembly {
            self.commit(assembly);
        }
        Ok(reassemble)
    }

    // --- Assembly ---

    /// Build the single-indexed GPU blob and freeze the mesh.
    ///
    /// Returns the existing blob when the mesh is already assembled.
    pub fn assemble(&mut self) -> Result<Arc<GpuBlob>> {
        if let Some(blob) = &self.blob {
            return Ok(Arc::clone(blob));
        }
        if let Some(li) = self.layers.iter().position(has_ungenerated_pass) {
            return Err(MeshError::Integrity(format!(
                "layer {li} has passes added after normal generation; call generate_normals first"
            )));
        }
        let assembly = assembler::assemble(&self.layers)?;
        let blob = self.commit(assembly);
        self.release_raw_geometry();
        Ok(blob)
    }

    fn commit(&mut self, assembly: Assembly) -> Arc<GpuBlob> {
        for ((layer, ranges), unique) in self
            .layers
            .iter_mut()
            .zip(assembly.draw_ranges)
            .zip(assembly.layer_unique)
        {
            for (pass, range) in layer.passes.iter_mut().zip(ranges) {
                pass.draw = Some(range);
            }
            layer.n_unique_elements = unique;
        }
        let blob = Arc::new(assembly.blob);
        self.blob = Some(Arc::clone(&blob));
        blob
    }

    /// Drop raw streams and index sets when neither flag asks to keep them.
    ///
    /// Layers with generated normals keep their raw data so that a material
    /// change can still regenerate them.
    fn release_raw_geometry(&mut self) {
        if self.flags.retains_raw() || self.raw_released {
            return;
        }
        if self
            .layers
            .iter()
            .any(|l| matches!(l.normals, NormalState::Generated | NormalState::Stale))
        {
            return;
        }
        for layer in &mut self.layers {
            layer.streams.clear();
            for pass in &mut layer.passes {
                pass.index_sets.clear();
            }
        }
        self.raw_released = true;
        debug!(mesh = %self.name, "Released raw geometry");
    }

    /// Rebuild a frozen mesh from persisted parts.
    pub(crate) fn from_assembled(
        name: String,
        winding: Winding,
        bounds: BoundingBox,
        sh_bands: u8,
        layers: Vec<Layer>,
        blob: GpuBlob,
    ) -> Self {
        let mut materials = Vec::new();
        for pass in layers.iter().flat_map(|l| &l.passes) {
            if !materials.contains(&pass.material) {
                materials.push(pass.material);
            }
        }
        Self {
            name,
            flags: MeshFlags::default(),
            winding,
            layers,
            materials,
            bounds,
            sh_bands,
            next_unique_set_id: 1,
            blob: Some(Arc::new(blob)),
            raw_released: true,
        }
    }
}

/// A generated layer with a pass that has no generated NORMALS set.
fn has_ungenerated_pass(layer: &Layer) -> bool {
    matches!(layer.normals, NormalState::Generated | NormalState::Stale)
        && layer.passes.iter().any(|pass| pass.normal_angle.is_none())
}

/// Drop a layer's NORMALS stream and every pass's NORMALS index sets.
fn strip_normals(layer: &mut Layer) {
    layer.streams.remove(&StreamType::Normals);
    for pass in &mut layer.passes {
        pass.remove_stream_sets(StreamType::Normals);
    }
}

/// Install generated normals as the layer's NORMALS stream plus one
/// sequential NORMALS index set per pass.
fn apply_normals(layer: &mut Layer, normals: GeneratedNormals, next_id: &mut u32) {
    let item_count = normals.item_count();
    let stream_id = *next_id;
    *next_id += 1;

    for ((pass, (start, len)), angle) in layer
        .passes
        .iter_mut()
        .zip(&normals.pass_ranges)
        .zip(&normals.angles)
    {
        pass.remove_stream_sets(StreamType::Normals);
        pass.index_sets
            .entry(StreamType::Normals)
            .or_default()
            .insert(0, IndexSet::sequential(*start, *len));
        pass.unique_set_ids.insert((StreamType::Normals, 0), *next_id);
        *next_id += 1;
        pass.normal_angle = Some(*angle);
    }

    layer.streams.insert(
        StreamType::Normals,
        DataStream {
            component_count: 3,
            item_count,
            data: normals.data,
            required_bit_alignment: StreamType::Normals.required_bit_alignment(),
            implicit_set_id: stream_id,
        },
    );
    layer.normals = NormalState::Generated;
}
