//! Mesh attribute extraction and per-feature position resolution
//!
//! The embedded glTF document of a batch payload carries every feature's
//! vertices, tagged with a per-vertex batch id. This module reads those
//! attributes (through the [`MeshAttributeReader`] capability seam, so
//! compressed encodings can plug in), pushes each vertex through the
//! tile/RTC/up-axis/node transform chain into ECEF, converts to geographic
//! coordinates, and reduces every batch id to one representative position.

use crate::geometry::{self, Cartographic, Rectangle, Y_UP_TO_Z_UP};
use crate::{BatchPayload, Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use glam::{DMat4, DVec3};
use std::collections::HashMap;
use std::sync::Arc;

/// Extension marker for Draco-compressed mesh attributes
pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

/// Vertex attributes of one mesh primitive
///
/// `batch_ids` parallels `positions`; an empty `batch_ids` means the
/// primitive carried no batch-id attribute and every vertex belongs to
/// batch 0.
#[derive(Clone, Debug, Default)]
pub struct PrimitiveAttributes {
    /// Raw vertex positions in the node's local frame
    pub positions: Vec<DVec3>,
    /// Per-vertex batch ids
    pub batch_ids: Vec<u32>,
}

/// Capability seam over mesh-attribute encodings
///
/// The plain implementation reads standard accessors; a compressed
/// implementation decodes the primitive's compressed buffer view instead.
/// Which one runs is decided per document by its `extensionsUsed` list.
pub trait MeshAttributeReader: Send + Sync {
    /// Read batch-id and position attributes for one primitive
    fn read_primitive(
        &self,
        document: &gltf::Document,
        blob: &[u8],
        primitive: &gltf::Primitive<'_>,
    ) -> Result<PrimitiveAttributes>;
}

/// Reads uncompressed vertex attributes from standard glTF accessors
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainAttributeReader;

impl MeshAttributeReader for PlainAttributeReader {
    fn read_primitive(
        &self,
        _document: &gltf::Document,
        blob: &[u8],
        primitive: &gltf::Primitive<'_>,
    ) -> Result<PrimitiveAttributes> {
        let reader = primitive.reader(|buffer| match buffer.source() {
            gltf::buffer::Source::Bin => Some(blob),
            gltf::buffer::Source::Uri(_) => None,
        });

        let positions: Vec<DVec3> = reader
            .read_positions()
            .ok_or_else(|| Error::Parse("mesh primitive has no POSITION attribute".to_string()))?
            .map(|p| DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64))
            .collect();

        let batch_ids = match find_batch_id_accessor(primitive) {
            Some(accessor) => read_scalar_accessor(&accessor, blob)?,
            None => {
                tracing::debug!("primitive has no batch-id attribute; using batch 0");
                Vec::new()
            }
        };

        if !batch_ids.is_empty() && batch_ids.len() != positions.len() {
            return Err(Error::Parse(format!(
                "batch-id count {} does not match vertex count {}",
                batch_ids.len(),
                positions.len()
            )));
        }

        Ok(PrimitiveAttributes {
            positions,
            batch_ids,
        })
    }
}

/// Locate the `_BATCHID` attribute accessor on a primitive
fn find_batch_id_accessor<'a>(
    primitive: &gltf::Primitive<'a>,
) -> Option<gltf::Accessor<'a>> {
    primitive
        .attributes()
        .find(|(semantic, _)| semantic.to_string() == "_BATCHID")
        .map(|(_, accessor)| accessor)
}

/// Read a scalar accessor as u32 values, honoring byte stride
///
/// Batch ids appear as u8, u16, u32, or (from some producers) f32.
fn read_scalar_accessor(accessor: &gltf::Accessor<'_>, blob: &[u8]) -> Result<Vec<u32>> {
    use gltf::accessor::DataType;

    let view = accessor
        .view()
        .ok_or_else(|| Error::Parse("batch-id accessor has no buffer view".to_string()))?;
    if !matches!(view.buffer().source(), gltf::buffer::Source::Bin) {
        return Err(Error::Unsupported(
            "batch-id accessor stored in an external buffer".to_string(),
        ));
    }

    let component_size = match accessor.data_type() {
        DataType::U8 => 1,
        DataType::U16 => 2,
        DataType::U32 | DataType::F32 => 4,
        other => {
            return Err(Error::Parse(format!(
                "unsupported batch-id component type {other:?}"
            )));
        }
    };
    let stride = view.stride().unwrap_or(component_size);
    let base = view.offset() + accessor.offset();

    let mut values = Vec::with_capacity(accessor.count());
    for i in 0..accessor.count() {
        let start = base + i * stride;
        let end = start + component_size;
        if end > blob.len() {
            return Err(Error::Parse(
                "batch-id accessor reads past end of buffer".to_string(),
            ));
        }
        let bytes = &blob[start..end];
        let value = match accessor.data_type() {
            DataType::U8 => bytes[0] as u32,
            DataType::U16 => LittleEndian::read_u16(bytes) as u32,
            DataType::U32 => LittleEndian::read_u32(bytes),
            DataType::F32 => LittleEndian::read_f32(bytes) as u32,
            _ => unreachable!(),
        };
        values.push(value);
    }
    Ok(values)
}

/// Per-batch accumulation state while vertices stream through
#[derive(Default)]
struct BatchAccumulator {
    rectangle: Rectangle,
    min_height: f64,
    max_height: f64,
}

/// Resolves one representative geographic position per batch id of a payload
#[derive(Clone, Default)]
pub struct GeometryResolver {
    compressed: Option<Arc<dyn MeshAttributeReader>>,
}

impl GeometryResolver {
    /// Create a resolver; pass a compressed-attribute reader to accept
    /// Draco-encoded content
    pub fn new(compressed: Option<Arc<dyn MeshAttributeReader>>) -> Self {
        Self { compressed }
    }

    /// Compute the representative position of every batch id in the payload
    ///
    /// For each batch id the longitude/latitude is the center of the
    /// geographic bounding rectangle of its vertices, and the height is the
    /// span between its lowest and highest vertex (a vertical extent, not an
    /// elevation). Returns an empty map when the payload embeds no mesh.
    pub fn resolve(
        &self,
        payload: &BatchPayload,
        tile_world: &DMat4,
    ) -> Result<HashMap<u32, Cartographic>> {
        let Some(glb) = payload.glb.as_ref() else {
            return Ok(HashMap::new());
        };

        let gltf = gltf::Gltf::from_slice(glb)?;
        let blob: &[u8] = gltf.blob.as_deref().unwrap_or(&[]);
        let document = &gltf.document;

        let reader: &dyn MeshAttributeReader = if document
            .extensions_used()
            .any(|name| name == DRACO_EXTENSION)
        {
            self.compressed.as_deref().ok_or_else(|| {
                Error::Unsupported(format!(
                    "content uses {DRACO_EXTENSION} but no compressed attribute reader is configured"
                ))
            })?
        } else {
            &PlainAttributeReader
        };

        let base = *tile_world * geometry::rtc_translation(payload.rtc_center) * Y_UP_TO_Z_UP;

        let mut groups: HashMap<u32, BatchAccumulator> = HashMap::new();
        for (mesh, node_matrix) in mesh_nodes(document) {
            let chain = base * node_matrix;
            for primitive in mesh.primitives() {
                let attributes = reader.read_primitive(document, blob, &primitive)?;
                for (i, position) in attributes.positions.iter().enumerate() {
                    let batch_id = attributes.batch_ids.get(i).copied().unwrap_or(0);
                    let world = chain.transform_point3(*position);
                    let cartographic = Cartographic::from_cartesian(world);

                    let group = groups.entry(batch_id).or_insert_with(|| BatchAccumulator {
                        rectangle: Rectangle::new(),
                        min_height: f64::INFINITY,
                        max_height: f64::NEG_INFINITY,
                    });
                    group.rectangle.extend(&cartographic);
                    group.min_height = group.min_height.min(cartographic.height);
                    group.max_height = group.max_height.max(cartographic.height);
                }
            }
        }

        Ok(groups
            .into_iter()
            .filter_map(|(batch_id, group)| {
                let mut center = group.rectangle.center()?;
                center.height = group.max_height - group.min_height;
                Some((batch_id, center))
            })
            .collect())
    }
}

/// Collect every mesh along with its node's composed transform
///
/// Composition starts at the default scene's roots (first scene, then free
/// nodes, as fallbacks) and multiplies node matrices top-down.
fn mesh_nodes<'a>(document: &'a gltf::Document) -> Vec<(gltf::Mesh<'a>, DMat4)> {
    fn visit<'a>(node: gltf::Node<'a>, parent: DMat4, out: &mut Vec<(gltf::Mesh<'a>, DMat4)>) {
        let local = glam::Mat4::from_cols_array_2d(&node.transform().matrix()).as_dmat4();
        let composed = parent * local;
        if let Some(mesh) = node.mesh() {
            out.push((mesh, composed));
        }
        for child in node.children() {
            visit(child, composed, out);
        }
    }

    let mut out = Vec::new();
    let roots: Vec<gltf::Node<'a>> = match document.default_scene() {
        Some(scene) => scene.nodes().collect(),
        None => match document.scenes().next() {
            Some(scene) => scene.nodes().collect(),
            None => document.nodes().collect(),
        },
    };
    for node in roots {
        visit(node, DMat4::IDENTITY, &mut out);
    }
    out
}
