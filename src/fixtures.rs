//! Test fixtures: hand-assembled b3dm payloads and binary glTF documents
//!
//! These builders produce the smallest valid documents the decoders accept,
//! so tests can state vertex data and batch tables directly.

use serde_json::Value;

/// Assemble a b3dm payload from feature/batch table JSON and a glb tail
pub(crate) fn b3dm(feature_table: Value, batch_table: Value, glb: &[u8]) -> Vec<u8> {
    b3dm_with_binary(feature_table, &[], batch_table, glb)
}

/// Assemble a b3dm payload including a feature-table binary body
pub(crate) fn b3dm_with_binary(
    feature_table: Value,
    feature_table_binary: &[u8],
    batch_table: Value,
    glb: &[u8],
) -> Vec<u8> {
    let ft_json = match feature_table {
        Value::Null => Vec::new(),
        other => serde_json::to_vec(&other).unwrap(),
    };
    let bt_json = match batch_table {
        Value::Null => Vec::new(),
        other => serde_json::to_vec(&other).unwrap(),
    };

    let byte_length =
        28 + ft_json.len() + feature_table_binary.len() + bt_json.len() + glb.len();

    let mut out = Vec::with_capacity(byte_length);
    out.extend_from_slice(b"b3dm");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(byte_length as u32).to_le_bytes());
    out.extend_from_slice(&(ft_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&(feature_table_binary.len() as u32).to_le_bytes());
    out.extend_from_slice(&(bt_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&ft_json);
    out.extend_from_slice(feature_table_binary);
    out.extend_from_slice(&bt_json);
    out.extend_from_slice(glb);
    out
}

/// Options for [`glb`]
#[derive(Default)]
pub(crate) struct GlbOptions {
    /// Column-major node matrix for the single mesh node
    pub node_matrix: Option<[f64; 16]>,
    /// Entries for the document's `extensionsUsed` list
    pub extensions_used: Vec<String>,
    /// Omit the `_BATCHID` attribute entirely
    pub skip_batch_ids: bool,
}

/// Assemble a binary glTF document with one mesh primitive carrying
/// `POSITION` (f32 vec3) and `_BATCHID` (u16 scalar) attributes
pub(crate) fn glb(positions: &[[f32; 3]], batch_ids: &[u16], options: GlbOptions) -> Vec<u8> {
    assert_eq!(positions.len(), batch_ids.len());

    // Binary chunk: positions then batch ids, 4-byte aligned
    let mut bin = Vec::new();
    for p in positions {
        for c in p {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    let batch_id_offset = bin.len();
    if !options.skip_batch_ids {
        for id in batch_ids {
            bin.extend_from_slice(&id.to_le_bytes());
        }
    }
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for p in positions {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }

    let mut attributes = serde_json::json!({"POSITION": 0});
    let mut buffer_views = vec![serde_json::json!({
        "buffer": 0,
        "byteOffset": 0,
        "byteLength": batch_id_offset,
    })];
    let mut accessors = vec![serde_json::json!({
        "bufferView": 0,
        "componentType": 5126,
        "count": positions.len(),
        "type": "VEC3",
        "min": min,
        "max": max,
    })];
    if !options.skip_batch_ids {
        attributes["_BATCHID"] = 1.into();
        buffer_views.push(serde_json::json!({
            "buffer": 0,
            "byteOffset": batch_id_offset,
            "byteLength": batch_ids.len() * 2,
        }));
        accessors.push(serde_json::json!({
            "bufferView": 1,
            "componentType": 5123,
            "count": batch_ids.len(),
            "type": "SCALAR",
        }));
    }

    let mut node = serde_json::json!({"mesh": 0});
    if let Some(matrix) = options.node_matrix {
        node["matrix"] = serde_json::json!(matrix);
    }

    let mut document = serde_json::json!({
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [node],
        "meshes": [{"primitives": [{"attributes": attributes, "mode": 4}]}],
        "buffers": [{"byteLength": bin.len()}],
        "bufferViews": buffer_views,
        "accessors": accessors,
    });
    if !options.extensions_used.is_empty() {
        document["extensionsUsed"] = serde_json::json!(options.extensions_used);
    }

    let mut json = serde_json::to_vec(&document).unwrap();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin);
    out
}

/// A glb vertex that lands at the given geographic position after the
/// y-up-to-z-up conversion (identity tile and node transforms assumed)
pub(crate) fn vertex_at(longitude_deg: f64, latitude_deg: f64, height: f64) -> [f32; 3] {
    let ecef =
        crate::geometry::Cartographic::from_degrees(longitude_deg, latitude_deg, height)
            .to_cartesian();
    // Inverse of (x, y, z) -> (x, -z, y)
    [ecef.x as f32, ecef.z as f32, -ecef.y as f32]
}
