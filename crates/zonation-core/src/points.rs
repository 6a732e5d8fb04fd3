//! Point observations handed over by the point loader.
//!
//! Coordinates are already in the grid's reference system (degrees for
//! geographic grids). Coordinate math uses f64.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result, ZonationError};
use crate::features::{FeatureMatrix, Schema};

/// Label of a confirmed occurrence.
pub const PRESENCE: u8 = 1;
/// Label of a pseudo- or true absence.
pub const ABSENCE: u8 = 0;

/// A point in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// One observation: location, predictor values by name, optional 0/1 label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub coord: LatLon,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
    #[serde(default)]
    pub label: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    pub records: Vec<PointRecord>,
}

impl PointSet {
    pub fn new(records: Vec<PointRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn coords(&self) -> Vec<LatLon> {
        self.records.iter().map(|r| r.coord).collect()
    }

    /// Feature rows in `schema` order.
    ///
    /// A value absent from one record is missing (NaN). A predictor absent from
    /// every record is a `SchemaMismatch`: the loader produced another schema.
    pub fn features(&self, schema: &Schema) -> Result<FeatureMatrix> {
        if !self.records.is_empty() {
            for name in schema.names() {
                if !self.records.iter().any(|r| r.values.contains_key(name)) {
                    let mut found: Vec<String> = self
                        .records
                        .iter()
                        .flat_map(|r| r.values.keys().cloned())
                        .collect();
                    found.sort();
                    found.dedup();
                    return Err(ZonationError::SchemaMismatch {
                        expected: schema.names().to_vec(),
                        found,
                    });
                }
            }
        }
        let mut data = Vec::with_capacity(self.records.len() * schema.len());
        for rec in &self.records {
            data.extend(
                schema
                    .names()
                    .iter()
                    .map(|n| rec.values.get(n).copied().unwrap_or(f64::NAN)),
            );
        }
        FeatureMatrix::new(schema.clone(), data)
    }

    /// Labels of every record; fails if one is unlabelled or not 0/1.
    pub fn labels(&self) -> Result<Vec<u8>> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| match r.label {
                Some(l @ (PRESENCE | ABSENCE)) => Ok(l),
                Some(l) => Err(invalid(format!("record {i} has label {l}, expected 0 or 1"))),
                None => Err(invalid(format!("record {i} is unlabelled"))),
            })
            .collect()
    }

    /// Records carrying the given label.
    pub fn with_label(&self, label: u8) -> PointSet {
        PointSet::new(
            self.records
                .iter()
                .filter(|r| r.label == Some(label))
                .cloned()
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(lat: f64, lon: f64, values: &[(&str, f64)], label: Option<u8>) -> PointRecord {
        PointRecord {
            coord: LatLon::new(lat, lon),
            values: values.iter().map(|&(k, v)| (k.to_string(), v)).collect(),
            label,
        }
    }

    #[test]
    fn features_follow_schema_order_with_missing_as_nan() {
        let set = PointSet::new(vec![
            rec(0.0, 0.0, &[("pop", 3.0), ("suit", 0.5)], Some(1)),
            rec(1.0, 1.0, &[("pop", 4.0)], Some(0)),
        ]);
        let schema = Schema::new(["suit", "pop"]).unwrap();
        let m = set.features(&schema).unwrap();
        assert_eq!(m.row(0), &[0.5, 3.0]);
        assert!(m.row(1)[0].is_nan());
        assert_eq!(m.row(1)[1], 4.0);
    }

    #[test]
    fn unknown_predictor_is_schema_mismatch() {
        let set = PointSet::new(vec![rec(0.0, 0.0, &[("pop", 3.0)], None)]);
        let schema = Schema::new(["suit"]).unwrap();
        assert!(matches!(set.features(&schema), Err(ZonationError::SchemaMismatch { .. })));
    }

    #[test]
    fn labels_must_be_binary() {
        let ok = PointSet::new(vec![rec(0.0, 0.0, &[], Some(1)), rec(0.0, 0.0, &[], Some(0))]);
        assert_eq!(ok.labels().unwrap(), vec![1, 0]);
        assert_eq!(ok.with_label(PRESENCE).len(), 1);
        let bad = PointSet::new(vec![rec(0.0, 0.0, &[], Some(2))]);
        assert!(bad.labels().is_err());
        let unlabelled = PointSet::new(vec![rec(0.0, 0.0, &[], None)]);
        assert!(unlabelled.labels().is_err());
    }

    #[test]
    fn point_set_parses_from_json() {
        let json = concat!(
            r#"{"records":[{"coord":{"lat":-3.5,"lon":30.25},"#,
            r#""values":{"suit":0.7},"label":1}]}"#
        );
        let set: PointSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.records[0].coord.lon, 30.25);
        assert_eq!(set.records[0].label, Some(PRESENCE));
    }
}
