//! `.mwb` files: an assembled mesh persisted without its raw streams.
//!
//! Every header field is little-endian. The blob bytes are stored exactly as
//! assembled, so a reloaded mesh can be uploaded without re-running
//! deduplication.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::assembly::{GpuBlob, IndexWidth, StreamSlot, VertexLayout};
use crate::error::{MeshError, Result};
use crate::types::{
    BoundingBox, DrawRange, Layer, MaterialId, Mesh, MeshInstance, NormalState, Pass, StreamType,
    Winding,
};

pub const MAGIC: [u8; 4] = *b"MWBL";
pub const FORMAT_VERSION: u32 = 1;

/// One decoded record.
#[derive(Debug)]
pub enum BlobRecord {
    Mesh(Mesh),
    /// An instance that draws `parent`'s geometry.
    Instance { name: String, parent: String },
}

/// Write `instance`: a short parent reference for instances, the full
/// assembled mesh otherwise.
pub fn write_record<W: Write>(
    w: &mut W,
    instance: &MeshInstance,
    material_ids: &HashMap<MaterialId, u32>,
) -> Result<()> {
    match instance.parent() {
        Some(parent) => write_instance(w, instance.name(), parent.name()),
        None => write_mesh(w, instance.resolve(), material_ids),
    }
}

pub fn write_instance<W: Write>(w: &mut W, name: &str, parent: &str) -> Result<()> {
    write_header(w, name)?;
    w.write_all(&[1])?;
    write_str(w, parent)?;
    Ok(())
}

/// Write an assembled mesh. Material ids are translated through `material_ids`.
pub fn write_mesh<W: Write>(
    w: &mut W,
    mesh: &Mesh,
    material_ids: &HashMap<MaterialId, u32>,
) -> Result<()> {
    let blob = mesh
        .blob()
        .ok_or_else(|| MeshError::Output(format!("mesh '{}' is not assembled", mesh.name())))?;

    write_header(w, mesh.name())?;
    w.write_all(&[0])?;
    write_bounds(w, &mesh.bounds())?;

    w.write_all(&(blob.len() as u64).to_le_bytes())?;
    w.write_all(&blob.data)?;

    write_u32(w, blob.layout.slots.len() as u32)?;
    for slot in &blob.layout.slots {
        w.write_all(&[slot.stream.to_tag()])?;
        write_u32(w, slot.set_id)?;
        write_u32(w, slot.offset)?;
        write_u32(w, slot.components)?;
    }
    write_u32(w, blob.layout.stride)?;
    write_u32(w, blob.total_elements)?;
    write_u32(w, blob.unique_vertex_count)?;
    w.write_all(&[
        blob.index_width.bytes() as u8,
        mesh.sh_bands(),
        mesh.winding().to_tag(),
    ])?;

    write_u32(w, mesh.layers().len() as u32)?;
    for layer in mesh.layers() {
        write_bounds(w, &layer.bounds())?;
        write_u32(w, layer.n_unique_elements())?;
        write_u32(w, layer.passes().len() as u32)?;
        for pass in layer.passes() {
            let range = pass.draw_range().unwrap_or_default();
            write_u32(w, range.index_byte_offset)?;
            write_u32(w, range.min_index)?;
            write_u32(w, range.max_index)?;
            write_u32(w, pass.n_elements)?;
            w.write_all(&pass.normal_angle.unwrap_or(0.0).to_le_bytes())?;
            let id = material_ids.get(&pass.material).ok_or_else(|| {
                MeshError::Output(format!("material {} has no persisted id", pass.material.0))
            })?;
            write_u32(w, *id)?;
        }
    }
    Ok(())
}

/// Read one record. Persisted material ids are translated through `materials`.
pub fn read_record<R: Read>(r: &mut R, materials: &HashMap<u32, MaterialId>) -> Result<BlobRecord> {
    let mut r = FieldReader { inner: r };

    let magic: [u8; 4] = r.array("magic")?;
    if magic != MAGIC {
        return Err(MeshError::Format(format!("bad magic {magic:02x?}")));
    }
    let version = r.u32("version")?;
    if version != FORMAT_VERSION {
        return Err(MeshError::Format(format!(
            "unsupported format version {version}"
        )));
    }
    let name = r.string("mesh name")?;
    match r.u8("instance flag")? {
        0 => {}
        1 => {
            let parent = r.string("parent name")?;
            return Ok(BlobRecord::Instance { name, parent });
        }
        other => return Err(MeshError::Format(format!("bad instance flag {other}"))),
    }

    let bounds = r.bounds("mesh bounds")?;
    let blob_len = r.u64("blob size")?;
    let data = r.bytes(blob_len, "blob")?;

    let slot_count = r.u32("slot count")?;
    let mut slots = Vec::new();
    for _ in 0..slot_count {
        let tag = r.u8("stream type")?;
        let stream = StreamType::from_tag(tag)
            .ok_or_else(|| MeshError::Format(format!("unknown stream type {tag}")))?;
        slots.push(StreamSlot {
            stream,
            set_id: r.u32("set id")?,
            offset: r.u32("slot offset")?,
            components: r.u32("slot components")?,
        });
    }
    let stride = r.u32("stride")?;
    let total_elements = r.u32("element count")?;
    let unique_vertex_count = r.u32("unique vertex count")?;
    let [width, sh_bands, winding]: [u8; 3] = r.array("index width, SH bands, winding")?;
    let index_width = IndexWidth::from_bytes(width)
        .ok_or_else(|| MeshError::Format(format!("bad index width {width}")))?;
    let winding = Winding::from_tag(winding)
        .ok_or_else(|| MeshError::Format(format!("bad winding {winding}")))?;
    if !matches!(sh_bands, 0 | 3 | 4) {
        return Err(MeshError::Format(format!("bad SH band count {sh_bands}")));
    }

    for slot in &slots {
        let end = slot.offset as u64 + slot.components as u64 * 4;
        if end > stride as u64 || !(1..=4).contains(&slot.components) {
            return Err(MeshError::Format(format!(
                "{} slot {} does not fit a {stride}-byte vertex",
                slot.stream, slot.set_id
            )));
        }
    }
    let expected = stride as u64 * unique_vertex_count as u64
        + index_width.bytes() as u64 * total_elements as u64;
    if expected != blob_len {
        return Err(MeshError::Format(format!(
            "blob holds {blob_len} bytes, layout needs {expected}"
        )));
    }

    let blob = GpuBlob {
        data,
        layout: VertexLayout { slots, stride },
        unique_vertex_count,
        total_elements,
        index_width,
    };
    let index_bytes = blob.index_bytes().len() as u64;
    let normals = if blob.layout.has_stream(StreamType::Normals) {
        NormalState::Authored
    } else {
        NormalState::Missing
    };

    let layer_count = r.u32("layer count")?;
    let mut layers = Vec::new();
    for li in 0..layer_count {
        let layer_bounds = r.bounds("layer bounds")?;
        let n_unique_elements = r.u32("layer unique count")?;
        let pass_count = r.u32("pass count")?;
        let mut passes = Vec::new();
        for pi in 0..pass_count {
            let range = DrawRange {
                index_byte_offset: r.u32("index byte offset")?,
                min_index: r.u32("min index")?,
                max_index: r.u32("max index")?,
                n_elements: 0,
            };
            let n_elements = r.u32("element count")?;
            let angle = r.f32("smoothing angle")?;
            let persisted = r.u32("material id")?;
            let material = *materials.get(&persisted).ok_or_else(|| {
                MeshError::Format(format!("unmapped material id {persisted}"))
            })?;

            let end =
                range.index_byte_offset as u64 + n_elements as u64 * index_width.bytes() as u64;
            if n_elements % 3 != 0 || end > index_bytes {
                return Err(MeshError::Format(format!(
                    "layer {li} pass {pi} draw range lies outside the index array"
                )));
            }

            let mut pass = Pass::new(material, n_elements);
            pass.draw = Some(DrawRange { n_elements, ..range });
            pass.normal_angle = Some(angle);
            passes.push(pass);
        }
        layers.push(Layer {
            passes,
            bounds: layer_bounds,
            n_unique_elements,
            normals,
            ..Default::default()
        });
    }

    debug!(
        mesh = %name,
        bytes = blob_len,
        layers = layers.len(),
        "Read blob record"
    );
    Ok(BlobRecord::Mesh(Mesh::from_assembled(
        name, winding, bounds, sh_bands, layers, blob,
    )))
}

/// Write `instance` to `path`.
pub fn save(
    path: &Path,
    instance: &MeshInstance,
    material_ids: &HashMap<MaterialId, u32>,
) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write_record(&mut w, instance, material_ids)?;
    w.flush()?;
    Ok(())
}

pub fn load(path: &Path, materials: &HashMap<u32, MaterialId>) -> Result<BlobRecord> {
    let mut r = BufReader::new(File::open(path)?);
    read_record(&mut r, materials)
}

fn write_header<W: Write>(w: &mut W, name: &str) -> Result<()> {
    w.write_all(&MAGIC)?;
    write_u32(w, FORMAT_VERSION)?;
    write_str(w, name)
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_str<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let len = u32::try_from(s.len())
        .map_err(|_| MeshError::Output(format!("name of {} bytes is too long", s.len())))?;
    write_u32(w, len)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_bounds<W: Write>(w: &mut W, bb: &BoundingBox) -> Result<()> {
    for v in bb.min.iter().chain(&bb.max) {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Little-endian field reader; a short read is a format error naming the field.
struct FieldReader<'a, R> {
    inner: &'a mut R,
}

impl<R: Read> FieldReader<'_, R> {
    fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| truncated(e, field))?;
        Ok(buf)
    }

    fn u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.array::<1>(field)?[0])
    }

    fn u32(&mut self, field: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(field)?))
    }

    fn u64(&mut self, field: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array(field)?))
    }

    fn f32(&mut self, field: &str) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array(field)?))
    }

    fn bytes(&mut self, len: u64, field: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.inner.by_ref().take(len).read_to_end(&mut buf)?;
        if buf.len() as u64 != len {
            return Err(MeshError::Format(format!(
                "truncated {field}: expected {len} bytes, found {}",
                buf.len()
            )));
        }
        Ok(buf)
    }

    fn string(&mut self, field: &str) -> Result<String> {
        let len = self.u32(field)?;
        let bytes = self.bytes(len as u64, field)?;
        String::from_utf8(bytes).map_err(|_| MeshError::Format(format!("{field} is not UTF-8")))
    }

    fn bounds(&mut self, field: &str) -> Result<BoundingBox> {
        let mut v = [0f32; 6];
        for x in &mut v {
            *x = self.f32(field)?;
        }
        Ok(BoundingBox {
            min: [v[0], v[1], v[2]],
            max: [v[3], v[4], v[5]],
        })
    }
}

fn truncated(err: io::Error, field: &str) -> MeshError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        MeshError::Format(format!("truncated {field}"))
    } else {
        MeshError::Io(err)
    }
}
