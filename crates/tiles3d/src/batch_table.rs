//! Per-feature attributes shared by every shape with the same batch id.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tiles3d_decode::Color;

use crate::error::{Error, Result};

/// Batch table shared between a content and the code that built it.
pub type SharedBatchTable = Rc<RefCell<BatchTable>>;

/// Color, visibility and JSON properties for each batch id.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTable {
    features_length: usize,
    colors: Vec<Color>,
    show: Vec<bool>,
    properties: HashMap<String, Vec<Value>>,
}

impl BatchTable {
    /// A table of `features_length` white, visible features without properties.
    #[must_use]
    pub fn new(features_length: usize) -> Self {
        Self {
            features_length,
            colors: vec![Color::WHITE; features_length],
            show: vec![true; features_length],
            properties: HashMap::new(),
        }
    }

    /// Build a table from a batch table JSON object.
    ///
    /// Every member must be an array with one value per feature.
    pub fn from_json(features_length: usize, json: &Value) -> Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| Error::InvalidBatchTable("expected a JSON object".to_string()))?;
        let mut table = Self::new(features_length);
        for (name, column) in object {
            let values = column.as_array().ok_or_else(|| {
                Error::InvalidBatchTable(format!("property {name:?} is not an array"))
            })?;
            if values.len() != features_length {
                return Err(Error::InvalidBatchTable(format!(
                    "property {name:?} has {} values, expected {features_length}",
                    values.len()
                )));
            }
            table.properties.insert(name.clone(), values.clone());
        }
        Ok(table)
    }

    #[must_use]
    pub fn into_shared(self) -> SharedBatchTable {
        Rc::new(RefCell::new(self))
    }

    #[must_use]
    pub fn features_length(&self) -> usize {
        self.features_length
    }

    /// Color of a feature; out-of-range ids read as white.
    #[must_use]
    pub fn color(&self, batch_id: u32) -> Color {
        self.colors
            .get(batch_id as usize)
            .copied()
            .unwrap_or(Color::WHITE)
    }

    pub fn set_color(&mut self, batch_id: u32, color: Color) {
        if let Some(slot) = self.colors.get_mut(batch_id as usize) {
            *slot = color;
        }
    }

    pub fn set_all_colors(&mut self, color: Color) {
        self.colors.fill(color);
    }

    #[must_use]
    pub fn show(&self, batch_id: u32) -> bool {
        self.show.get(batch_id as usize).copied().unwrap_or(true)
    }

    pub fn set_show(&mut self, batch_id: u32, show: bool) {
        if let Some(slot) = self.show.get_mut(batch_id as usize) {
            *slot = show;
        }
    }

    #[must_use]
    pub fn has_property(&self, batch_id: u32, name: &str) -> bool {
        (batch_id as usize) < self.features_length && self.properties.contains_key(name)
    }

    #[must_use]
    pub fn property(&self, batch_id: u32, name: &str) -> Option<&Value> {
        self.properties.get(name)?.get(batch_id as usize)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Approximate memory held by colors and visibility flags.
    #[must_use]
    pub fn memory_size_in_bytes(&self) -> usize {
        self.colors.len() * std::mem::size_of::<Color>() + self.show.len()
    }
}

/// Handle to one row of a [`BatchTable`].
#[derive(Clone)]
pub struct Feature {
    batch_id: u32,
    batch_table: SharedBatchTable,
}

impl Feature {
    #[must_use]
    pub fn new(batch_id: u32, batch_table: SharedBatchTable) -> Self {
        Self {
            batch_id,
            batch_table,
        }
    }

    #[must_use]
    pub fn batch_id(&self) -> u32 {
        self.batch_id
    }

    #[must_use]
    pub fn color(&self) -> Color {
        self.batch_table.borrow().color(self.batch_id)
    }

    pub fn set_color(&self, color: Color) {
        self.batch_table.borrow_mut().set_color(self.batch_id, color);
    }

    #[must_use]
    pub fn show(&self) -> bool {
        self.batch_table.borrow().show(self.batch_id)
    }

    pub fn set_show(&self, show: bool) {
        self.batch_table.borrow_mut().set_show(self.batch_id, show);
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.batch_table.borrow().has_property(self.batch_id, name)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<Value> {
        self.batch_table.borrow().property(self.batch_id, name).cloned()
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("batch_id", &self.batch_id)
            .finish_non_exhaustive()
    }
}

/// Evaluated style applied to features.
///
/// Expression evaluation lives elsewhere; implementors only answer per feature.
pub trait TileStyle {
    fn color(&self, feature: &Feature) -> Color;

    fn show(&self, _feature: &Feature) -> bool {
        true
    }
}

impl TileStyle for Color {
    fn color(&self, _feature: &Feature) -> Color {
        *self
    }
}
