//! Batched 3D model (`.b3dm`) payload decoding
//!
//! A b3dm payload carries a fixed 28-byte header, two length-prefixed JSON
//! blocks (feature table and batch table, each with an optional binary body)
//! and the remaining bytes as an embedded binary glTF document. The feature
//! table's `BATCH_LENGTH` declares how many discrete features the payload
//! batches together; the batch table holds one value array per property.

use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use glam::DVec3;
use serde_json::Value;
use std::collections::HashMap;

const MAGIC: &[u8; 4] = b"b3dm";
const HEADER_LEN: usize = 28;

/// Decoded b3dm content: batch count, per-property value arrays, and the
/// embedded glTF document
#[derive(Clone, Debug)]
pub struct BatchPayload {
    /// Number of discrete features batched into this payload
    pub batch_length: usize,
    /// Relative-to-center offset declared by the feature table, if any
    pub rtc_center: Option<DVec3>,
    /// Embedded binary glTF document, if present
    pub glb: Option<Bytes>,
    /// Property name to per-batch value array
    batch_table: HashMap<String, Vec<Value>>,
}

impl BatchPayload {
    /// Decode a b3dm payload from its raw bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::Parse(format!(
                "b3dm payload truncated: {} bytes",
                data.len()
            )));
        }
        if &data[0..4] != MAGIC {
            return Err(Error::Parse("b3dm payload has wrong magic".to_string()));
        }

        let version = LittleEndian::read_u32(&data[4..8]);
        if version != 1 {
            return Err(Error::Parse(format!("unsupported b3dm version {version}")));
        }

        let byte_length = LittleEndian::read_u32(&data[8..12]) as usize;
        let ft_json_len = LittleEndian::read_u32(&data[12..16]) as usize;
        let ft_bin_len = LittleEndian::read_u32(&data[16..20]) as usize;
        let bt_json_len = LittleEndian::read_u32(&data[20..24]) as usize;
        let bt_bin_len = LittleEndian::read_u32(&data[24..28]) as usize;

        if byte_length > data.len() {
            return Err(Error::Parse(format!(
                "b3dm header declares {byte_length} bytes but payload has {}",
                data.len()
            )));
        }

        // Tables and the GLB tail must all fit inside the declared byte
        // length, so every read below bounds against the body slice
        let body = &data[..byte_length];
        let mut offset = HEADER_LEN;
        let ft_json = take(body, &mut offset, ft_json_len)?;
        let ft_bin = take(body, &mut offset, ft_bin_len)?;
        let bt_json = take(body, &mut offset, bt_json_len)?;
        let _bt_bin = take(body, &mut offset, bt_bin_len)?;
        let glb = &body[offset..];

        let (batch_length, rtc_center) = decode_feature_table(ft_json, ft_bin)?;
        let batch_table = decode_batch_table(bt_json, batch_length)?;

        Ok(Self {
            batch_length,
            rtc_center,
            glb: (!glb.is_empty()).then(|| Bytes::copy_from_slice(glb)),
            batch_table,
        })
    }

    /// Property map for one batch id
    ///
    /// A property whose array is shorter than the batch length is simply
    /// absent for ids beyond its end; this never indexes out of bounds.
    pub fn properties_of(&self, batch_id: usize) -> HashMap<String, Value> {
        self.batch_table
            .iter()
            .filter_map(|(name, values)| {
                values.get(batch_id).map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }

    /// Single property value for one batch id, if present
    pub fn property(&self, name: &str, batch_id: usize) -> Option<&Value> {
        self.batch_table.get(name)?.get(batch_id)
    }

    /// Names of all batch-table properties
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.batch_table.keys().map(|s| s.as_str())
    }
}

/// Slice `len` bytes at `*offset`, advancing the offset
fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| Error::Parse("b3dm table extends past end of payload".to_string()))?;
    let slice = &data[*offset..end];
    *offset = end;
    Ok(slice)
}

/// Decode `BATCH_LENGTH` and `RTC_CENTER` from the feature table
///
/// `RTC_CENTER` is either inline JSON (`[x, y, z]`) or a `byteOffset`
/// reference into the feature table's binary body (three little-endian f32).
fn decode_feature_table(json: &[u8], binary: &[u8]) -> Result<(usize, Option<DVec3>)> {
    if json.is_empty() {
        return Err(Error::Parse("b3dm payload has no feature table".to_string()));
    }
    let table: Value = serde_json::from_slice(json)?;

    let batch_length = table
        .get("BATCH_LENGTH")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Parse("feature table missing BATCH_LENGTH".to_string()))?
        as usize;

    let rtc_center = match table.get("RTC_CENTER") {
        None => None,
        Some(Value::Array(values)) => {
            let coords: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if coords.len() != 3 {
                return Err(Error::Parse("RTC_CENTER must have 3 components".to_string()));
            }
            Some(DVec3::new(coords[0], coords[1], coords[2]))
        }
        Some(reference) => {
            let offset = reference
                .get("byteOffset")
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::Parse("RTC_CENTER is neither array nor byteOffset".to_string()))?
                as usize;
            let end = offset
                .checked_add(12)
                .filter(|&end| end <= binary.len())
                .ok_or_else(|| {
                    Error::Parse(
                        "RTC_CENTER byteOffset past end of feature table binary".to_string(),
                    )
                })?;
            Some(DVec3::new(
                LittleEndian::read_f32(&binary[offset..offset + 4]) as f64,
                LittleEndian::read_f32(&binary[offset + 4..offset + 8]) as f64,
                LittleEndian::read_f32(&binary[offset + 8..end]) as f64,
            ))
        }
    };

    Ok((batch_length, rtc_center))
}

/// Decode the batch table's per-property JSON arrays
///
/// Binary-body property references and non-array values are skipped with a
/// warning; arrays shorter than the batch length are kept as-is and treated
/// as "property absent" beyond their end.
fn decode_batch_table(json: &[u8], batch_length: usize) -> Result<HashMap<String, Vec<Value>>> {
    if json.is_empty() {
        return Ok(HashMap::new());
    }
    let table: Value = serde_json::from_slice(json)?;
    let object = table
        .as_object()
        .ok_or_else(|| Error::Parse("batch table is not a JSON object".to_string()))?;

    let mut properties = HashMap::with_capacity(object.len());
    for (name, value) in object {
        match value {
            Value::Array(values) => {
                if values.len() < batch_length {
                    tracing::warn!(
                        property = name.as_str(),
                        len = values.len(),
                        batch_length,
                        "batch table array shorter than batch length; trailing ids lack this property"
                    );
                }
                properties.insert(name.clone(), values.clone());
            }
            _ => {
                tracing::warn!(
                    property = name.as_str(),
                    "skipping non-array batch table property"
                );
            }
        }
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_decode_minimal() {
        let payload = fixtures::b3dm(
            serde_json::json!({"BATCH_LENGTH": 2}),
            serde_json::json!({"name": ["A", "B"], "floors": [3, 5]}),
            &[],
        );
        let decoded = BatchPayload::decode(&payload).unwrap();
        assert_eq!(decoded.batch_length, 2);
        assert!(decoded.rtc_center.is_none());
        assert!(decoded.glb.is_none());
        assert_eq!(decoded.property("name", 0), Some(&Value::from("A")));
        assert_eq!(decoded.property("floors", 1), Some(&Value::from(5)));
    }

    #[test]
    fn test_decode_wrong_magic() {
        let err = BatchPayload::decode(b"nope0000000000000000000000000000").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_decode_truncated() {
        let err = BatchPayload::decode(b"b3dm").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_decode_table_past_end() {
        let mut payload = fixtures::b3dm(serde_json::json!({"BATCH_LENGTH": 1}), Value::Null, &[]);
        // Corrupt the feature table JSON length to point past the payload
        payload[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            BatchPayload::decode(&payload),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_byte_length_smaller_than_tables() {
        let mut payload = fixtures::b3dm(
            serde_json::json!({"BATCH_LENGTH": 1}),
            serde_json::json!({"name": ["A"]}),
            &[],
        );
        // Shrink the declared byte length to the bare header while the
        // table lengths still claim their full size
        payload[8..12].copy_from_slice(&28u32.to_le_bytes());
        assert!(matches!(
            BatchPayload::decode(&payload),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_missing_batch_length() {
        let payload = fixtures::b3dm(serde_json::json!({}), Value::Null, &[]);
        assert!(matches!(
            BatchPayload::decode(&payload),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_rtc_center_inline() {
        let payload = fixtures::b3dm(
            serde_json::json!({"BATCH_LENGTH": 1, "RTC_CENTER": [1.5, -2.0, 3.25]}),
            Value::Null,
            &[],
        );
        let decoded = BatchPayload::decode(&payload).unwrap();
        assert_eq!(decoded.rtc_center, Some(DVec3::new(1.5, -2.0, 3.25)));
    }

    #[test]
    fn test_rtc_center_binary_reference() {
        let mut binary = Vec::new();
        for v in [10.0f32, 20.0, 30.0] {
            binary.extend_from_slice(&v.to_le_bytes());
        }
        let payload = fixtures::b3dm_with_binary(
            serde_json::json!({"BATCH_LENGTH": 1, "RTC_CENTER": {"byteOffset": 0}}),
            &binary,
            Value::Null,
            &[],
        );
        let decoded = BatchPayload::decode(&payload).unwrap();
        assert_eq!(decoded.rtc_center, Some(DVec3::new(10.0, 20.0, 30.0)));
    }

    #[test]
    fn test_rtc_center_byte_offset_overflow() {
        let binary = [0u8; 12];
        let payload = fixtures::b3dm_with_binary(
            serde_json::json!({
                "BATCH_LENGTH": 1,
                "RTC_CENTER": {"byteOffset": u64::MAX},
            }),
            &binary,
            Value::Null,
            &[],
        );
        assert!(matches!(
            BatchPayload::decode(&payload),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_short_property_array_is_absent_not_panic() {
        // "name" covers only batch 0 while the payload declares 3 batches
        let payload = fixtures::b3dm(
            serde_json::json!({"BATCH_LENGTH": 3}),
            serde_json::json!({"name": ["only"], "height": [1, 2, 3]}),
            &[],
        );
        let decoded = BatchPayload::decode(&payload).unwrap();

        let first = decoded.properties_of(0);
        assert_eq!(first.get("name"), Some(&Value::from("only")));

        let last = decoded.properties_of(2);
        assert!(last.get("name").is_none());
        assert_eq!(last.get("height"), Some(&Value::from(3)));
    }

    #[test]
    fn test_non_array_property_skipped() {
        let payload = fixtures::b3dm(
            serde_json::json!({"BATCH_LENGTH": 1}),
            serde_json::json!({"ok": ["v"], "binaryRef": {"byteOffset": 0, "componentType": "INT"}}),
            &[],
        );
        let decoded = BatchPayload::decode(&payload).unwrap();
        let names: Vec<&str> = decoded.property_names().collect();
        assert_eq!(names, vec!["ok"]);
    }

    #[test]
    fn test_glb_tail_preserved() {
        let glb = b"glTF fake document bytes";
        let payload = fixtures::b3dm(serde_json::json!({"BATCH_LENGTH": 0}), Value::Null, glb);
        let decoded = BatchPayload::decode(&payload).unwrap();
        assert_eq!(decoded.glb.as_deref(), Some(&glb[..]));
    }
}
