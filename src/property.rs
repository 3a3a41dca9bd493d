// Geological property access

use std::cell::Cell;
use std::collections::HashMap;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::component::ComponentId;
use crate::constants::DEFAULT_UNDEFINED_VALUE;
use crate::error::{MigrationError, MigrationResult};

/// Properties the migration pipeline reads per formation and snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Depth (m) per k level; the highest k is the top of the formation.
    Depth,
    /// Porosity as a fraction.
    Porosity,
    /// Permeability (mD).
    Permeability,
    /// Temperature (C).
    Temperature,
    /// Pore pressure (MPa).
    Pressure,
    NetToGross,
    /// Fault status codes, see `FaultStatus`.
    FaultStatus,
    /// Cumulative expelled mass (kg/m2) of one species.
    Expelled(ComponentId),
}

impl PropertyKind {
    pub fn as_str(&self) -> String {
        match self {
            PropertyKind::Depth => "Depth".to_string(),
            PropertyKind::Porosity => "Porosity".to_string(),
            PropertyKind::Permeability => "Permeability".to_string(),
            PropertyKind::Temperature => "Temperature".to_string(),
            PropertyKind::Pressure => "Pressure".to_string(),
            PropertyKind::NetToGross => "NetToGross".to_string(),
            PropertyKind::FaultStatus => "FaultStatus".to_string(),
            PropertyKind::Expelled(id) => format!("{}ExpelledCumulative", id.as_str()),
        }
    }
}

/// A 3D scalar field. Element access is only valid between
/// `retrieve_data` and `restore_data`; use [`RetrievedField`] to scope it.
pub trait PropertyField {
    /// (num_i, num_j, num_k)
    fn dimensions(&self) -> (usize, usize, usize);

    fn undefined_value(&self) -> f64;

    fn retrieve_data(&self);
    fn restore_data(&self);
    fn is_retrieved(&self) -> bool;

    fn get(&self, i: usize, j: usize, k: usize) -> f64;

    fn num_k(&self) -> usize {
        self.dimensions().2
    }

    /// Linear interpolation between the two k levels around `fractional_k`.
    /// Undefined if either level is.
    fn interpolate(&self, i: usize, j: usize, fractional_k: f64) -> f64 {
        let top = self.num_k().saturating_sub(1);
        let k = fractional_k.clamp(0.0, top as f64);
        let lower = k.floor() as usize;
        let upper = (lower + 1).min(top);
        let a = self.get(i, j, lower);
        let b = self.get(i, j, upper);
        let undefined = self.undefined_value();
        if a == undefined || b == undefined {
            return undefined;
        }
        a + (b - a) * (k - lower as f64)
    }

    fn is_undefined(&self, value: f64) -> bool {
        value == self.undefined_value()
    }
}

/// Holds a field retrieved for the guard's lifetime.
pub struct RetrievedField<'a> {
    field: &'a dyn PropertyField,
}

impl<'a> RetrievedField<'a> {
    pub fn new(field: &'a dyn PropertyField) -> Self {
        field.retrieve_data();
        RetrievedField { field }
    }

    /// Top (highest k) value of the column at (i, j).
    pub fn top(&self, i: usize, j: usize) -> f64 {
        self.field.get(i, j, self.field.num_k().saturating_sub(1))
    }

    pub fn bottom(&self, i: usize, j: usize) -> f64 {
        self.field.get(i, j, 0)
    }
}

impl<'a> Deref for RetrievedField<'a> {
    type Target = dyn PropertyField + 'a;

    fn deref(&self) -> &Self::Target {
        self.field
    }
}

impl Drop for RetrievedField<'_> {
    fn drop(&mut self) {
        self.field.restore_data();
    }
}

/// Formation and snapshot scoped access to property fields.
pub trait PropertyProvider {
    fn property(&self, scope: &str, kind: PropertyKind, age_ma: f64) -> Option<&dyn PropertyField>;

    fn retrieve(&self, scope: &str, kind: PropertyKind, age_ma: f64) -> MigrationResult<RetrievedField<'_>> {
        self.property(scope, kind, age_ma)
            .map(RetrievedField::new)
            .ok_or_else(|| MigrationError::MissingProperty {
                property: kind.as_str(),
                scope: format!("{} at {} Ma", scope, age_ma),
            })
    }
}

/// Dense in-memory field, indexed `i + num_i * (j + num_j * k)`.
#[derive(Debug, Clone)]
pub struct GridPropertyField {
    num_i: usize,
    num_j: usize,
    num_k: usize,
    undefined_value: f64,
    values: Vec<f64>,
    retrievals: Cell<u32>,
}

impl GridPropertyField {
    pub fn uniform(num_i: usize, num_j: usize, num_k: usize, value: f64) -> Self {
        GridPropertyField {
            num_i,
            num_j,
            num_k,
            undefined_value: DEFAULT_UNDEFINED_VALUE,
            values: vec![value; num_i * num_j * num_k],
            retrievals: Cell::new(0),
        }
    }

    /// Single-level field from a map laid out `i + j * num_i`.
    pub fn from_map(num_i: usize, num_j: usize, values: Vec<f64>) -> MigrationResult<Self> {
        Self::from_layers(num_i, num_j, vec![values])
    }

    /// One map per k level, bottom level first.
    pub fn from_layers(num_i: usize, num_j: usize, layers: Vec<Vec<f64>>) -> MigrationResult<Self> {
        if layers.is_empty() {
            return Err(MigrationError::InvalidGrid("property field without levels".to_string()));
        }
        let mut field = Self::uniform(num_i, num_j, layers.len(), 0.0);
        for (k, layer) in layers.into_iter().enumerate() {
            if layer.len() != num_i * num_j {
                return Err(MigrationError::InvalidGrid(format!(
                    "level {} has {} values, expected {}",
                    k,
                    layer.len(),
                    num_i * num_j
                )));
            }
            let start = k * num_i * num_j;
            field.values[start..start + num_i * num_j].copy_from_slice(&layer);
        }
        Ok(field)
    }

    pub fn with_undefined_value(mut self, undefined_value: f64) -> Self {
        self.undefined_value = undefined_value;
        self
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let index = self.index(i, j, k);
        self.values[index] = value;
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.num_i * (j + self.num_j * k)
    }
}

impl PropertyField for GridPropertyField {
    fn dimensions(&self) -> (usize, usize, usize) {
        (self.num_i, self.num_j, self.num_k)
    }

    fn undefined_value(&self) -> f64 {
        self.undefined_value
    }

    fn retrieve_data(&self) {
        self.retrievals.set(self.retrievals.get() + 1);
    }

    fn restore_data(&self) {
        self.retrievals.set(self.retrievals.get().saturating_sub(1));
    }

    fn is_retrieved(&self) -> bool {
        self.retrievals.get() > 0
    }

    fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        if !self.is_retrieved() {
            panic!("property field read at ({}, {}, {}) before retrieve_data", i, j, k);
        }
        self.values[self.index(i, j, k)]
    }
}

/// Property store keyed by scope and kind. Each entry may hold several
/// snapshots; a lookup returns the snapshot nearest the requested age.
#[derive(Debug, Default)]
pub struct MemoryPropertyProvider {
    fields: HashMap<(String, PropertyKind), Vec<(f64, GridPropertyField)>>,
}

impl MemoryPropertyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scope: &str, kind: PropertyKind, age_ma: f64, field: GridPropertyField) {
        let snapshots = self.fields.entry((scope.to_string(), kind)).or_default();
        snapshots.retain(|(age, _)| *age != age_ma);
        snapshots.push((age_ma, field));
    }

    pub fn with(mut self, scope: &str, kind: PropertyKind, age_ma: f64, field: GridPropertyField) -> Self {
        self.insert(scope, kind, age_ma, field);
        self
    }
}

impl PropertyProvider for MemoryPropertyProvider {
    fn property(&self, scope: &str, kind: PropertyKind, age_ma: f64) -> Option<&dyn PropertyField> {
        let snapshots = self.fields.get(&(scope.to_string(), kind))?;
        snapshots
            .iter()
            .min_by(|a, b| (a.0 - age_ma).abs().total_cmp(&(b.0 - age_ma).abs()))
            .map(|(_, field)| field as &dyn PropertyField)
    }
}
