//! Named predictor schema and row-major feature batches.
//!
//! Every batch that enters the engine carries its `Schema`. Missing values are
//! stored as NaN and survive every transformation untouched.

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result, ZonationError};

/// Ordered list of predictor names shared by training and every prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    names: Vec<String>,
}

impl Schema {
    /// Build a schema. Names must be non-empty and unique.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(invalid("schema must name at least one predictor"));
        }
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(invalid(format!("predictor {i} has an empty name")));
            }
            if names[..i].contains(name) {
                return Err(invalid(format!("duplicate predictor name '{name}'")));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Fail with `SchemaMismatch` unless `other` has the same names in the same order.
    pub fn ensure_matches(&self, other: &Schema) -> Result<()> {
        if self.names == other.names {
            Ok(())
        } else {
            Err(ZonationError::SchemaMismatch {
                expected: self.names.clone(),
                found: other.names.clone(),
            })
        }
    }
}

/// A batch of feature vectors, row-major, `n_rows × schema.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    schema: Schema,
    data: Vec<f64>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Wrap flat row-major `data`; its length must be a multiple of the schema width.
    pub fn new(schema: Schema, data: Vec<f64>) -> Result<Self> {
        let dim = schema.len();
        if data.len() % dim != 0 {
            return Err(invalid(format!(
                "{} values do not form rows of width {dim}",
                data.len()
            )));
        }
        let n_rows = data.len() / dim;
        Ok(Self { schema, data, n_rows })
    }

    pub fn empty(schema: Schema) -> Self {
        Self { schema, data: Vec::new(), n_rows: 0 }
    }

    pub fn from_rows(schema: Schema, rows: &[Vec<f64>]) -> Result<Self> {
        let mut m = Self::empty(schema);
        for row in rows {
            m.push_row(row)?;
        }
        Ok(m)
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.dim() {
            return Err(invalid(format!(
                "row has {} values, schema has {}",
                row.len(),
                self.dim()
            )));
        }
        self.data.extend_from_slice(row);
        self.n_rows += 1;
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn dim(&self) -> usize {
        self.schema.len()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        let d = self.dim();
        &self.data[i * d..(i + 1) * d]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.dim() + col]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.dim())
    }

    /// True if row `i` has no missing (non-finite) value.
    pub fn is_complete(&self, i: usize) -> bool {
        self.row(i).iter().all(|v| v.is_finite())
    }

    /// Indices of rows without missing values.
    pub fn complete_indices(&self) -> Vec<usize> {
        (0..self.n_rows).filter(|&i| self.is_complete(i)).collect()
    }

    /// Copy of the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> FeatureMatrix {
        let mut data = Vec::with_capacity(indices.len() * self.dim());
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        FeatureMatrix { schema: self.schema.clone(), data, n_rows: indices.len() }
    }

    /// Drop rows with any missing value.
    pub fn complete_rows(&self) -> FeatureMatrix {
        self.select(&self.complete_indices())
    }

    /// Stack batches that share one schema.
    pub fn concat(parts: &[&FeatureMatrix]) -> Result<FeatureMatrix> {
        let first = parts.first().ok_or_else(|| invalid("nothing to concatenate"))?;
        let mut out = FeatureMatrix::empty(first.schema.clone());
        for part in parts {
            out.schema.ensure_matches(&part.schema)?;
            out.data.extend_from_slice(&part.data);
            out.n_rows += part.n_rows;
        }
        Ok(out)
    }

    /// Reorder columns by name to match `target`. Extra columns are dropped;
    /// a predictor missing from this batch is a `SchemaMismatch`.
    pub fn align_to(&self, target: &Schema) -> Result<FeatureMatrix> {
        if self.schema == *target {
            return Ok(self.clone());
        }
        let mapping: Option<Vec<usize>> =
            target.names().iter().map(|n| self.schema.index_of(n)).collect();
        let mapping = mapping.ok_or_else(|| ZonationError::SchemaMismatch {
            expected: target.names().to_vec(),
            found: self.schema.names().to_vec(),
        })?;
        let mut data = Vec::with_capacity(self.n_rows * mapping.len());
        for row in self.rows() {
            data.extend(mapping.iter().map(|&j| row[j]));
        }
        Ok(FeatureMatrix { schema: target.clone(), data, n_rows: self.n_rows })
    }

    /// Per-column mean over complete rows. NaN when there are none.
    pub fn column_means(&self) -> Vec<f64> {
        let complete = self.complete_indices();
        let n = complete.len() as f64;
        (0..self.dim())
            .map(|j| complete.iter().map(|&i| self.get(i, j)).sum::<f64>() / n)
            .collect()
    }
}

/// Euclidean distance between two equal-length vectors.
#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_euclidean(a, b).sqrt()
}

#[inline]
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
