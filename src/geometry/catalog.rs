//! Shape catalog
//!
//! One immutable catalog per run, resolved once and injected wherever depths
//! are planned. Protocol code never re-declares calibration coefficients;
//! it looks shapes up here by id.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{ContainerSpec, RegimeOffset};
use crate::error::{AliquotError, Result};

/// Catalog of container shapes keyed by shape id.
///
/// Specs are stored behind `Arc` so every registered container of a shape
/// shares the same calibration data.
#[derive(Debug, Clone, Default)]
pub struct ShapeCatalog {
    shapes: HashMap<String, Arc<ContainerSpec>>,
}

impl ShapeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the calibrated shapes used across the bench protocols
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for spec in builtin_specs() {
            // Built-in calibrations are known-good
            catalog
                .insert(spec)
                .unwrap_or_else(|e| unreachable!("builtin shape failed validation: {e}"));
        }
        catalog
    }

    /// Add a shape to the catalog after validating its calibration.
    ///
    /// Inserting an existing shape id replaces the earlier calibration.
    pub fn insert(&mut self, spec: ContainerSpec) -> Result<()> {
        spec.validate()?;
        debug!(shape = %spec.shape, capacity_ul = spec.capacity_ul, "registered shape");
        self.shapes.insert(spec.shape.clone(), Arc::new(spec));
        Ok(())
    }

    /// Look up a shape by id
    pub fn get(&self, shape: &str) -> Result<&Arc<ContainerSpec>> {
        self.shapes
            .get(shape)
            .ok_or_else(|| AliquotError::UnknownShape {
                shape: shape.to_string(),
            })
    }

    /// Safe tip height for `volume_ul` remaining in a container of `shape`
    pub fn height(&self, shape: &str, volume_ul: f64) -> Result<f64> {
        self.get(shape)?.height(volume_ul)
    }

    /// Number of shapes in the catalog
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Check if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Iterate over the catalog's shapes
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ContainerSpec>> {
        self.shapes.values()
    }

    /// Parse a catalog from a JSON array of shape specs
    pub fn from_json_str(json: &str) -> Result<Self> {
        let specs: Vec<ContainerSpec> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for spec in specs {
            catalog.insert(spec)?;
        }
        Ok(catalog)
    }

    /// Serialize the catalog to a JSON array of shape specs
    pub fn to_json_string(&self) -> Result<String> {
        let mut specs: Vec<&ContainerSpec> = self.shapes.values().map(Arc::as_ref).collect();
        specs.sort_by(|a, b| a.shape.cmp(&b.shape));
        Ok(serde_json::to_string_pretty(&specs)?)
    }

    /// Load a catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Save the catalog to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

/// Calibration data for the bench's standard containers.
///
/// Coefficients are empirical level fits (volume in ul, surface height in
/// mm); the conicals switch to a tighter submersion offset below the cone
/// transition.
fn builtin_specs() -> Vec<ContainerSpec> {
    vec![
        ContainerSpec {
            shape: "tube_1_5ml".to_string(),
            display_name: "1.5 mL tube".to_string(),
            capacity_ul: 1500.0,
            coefficients: vec![-2.5, 0.0235, -6.2e-6],
            floor_mm: 1.0,
            offset_mm: 3.0,
            regime: None,
        },
        ContainerSpec {
            shape: "tube_2ml".to_string(),
            display_name: "2 mL tube".to_string(),
            capacity_ul: 2000.0,
            coefficients: vec![-1.8, 0.0183, -3.1e-6],
            floor_mm: 1.0,
            offset_mm: 3.0,
            regime: None,
        },
        ContainerSpec {
            shape: "conical_15ml".to_string(),
            display_name: "15 mL conical".to_string(),
            capacity_ul: 15000.0,
            coefficients: vec![1.2, 9.35e-3, -4.8e-7, 1.1e-11],
            floor_mm: 1.5,
            offset_mm: 5.0,
            regime: Some(RegimeOffset {
                transition_ul: 1200.0,
                below_mm: 2.0,
            }),
        },
        ContainerSpec {
            shape: "conical_50ml".to_string(),
            display_name: "50 mL conical".to_string(),
            capacity_ul: 50000.0,
            coefficients: vec![2.0, 3.1e-3, -5.6e-8, 5.1e-13],
            floor_mm: 2.0,
            offset_mm: 8.0,
            regime: Some(RegimeOffset {
                transition_ul: 5000.0,
                below_mm: 3.0,
            }),
        },
    ]
}
