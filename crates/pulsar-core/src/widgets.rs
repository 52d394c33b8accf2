//! Interactive widgets.
//!
//! A widget is an external input whose value behaves like a symbol owned by
//! the cell that creates it. Running the cell registers the widget and reads
//! its current value; updating the value from outside marks that cell changed,
//! so the update flows through the same scheduling path as a source edit.
//!
//! # Example
//!
//! ```text
//! // %% controls
//! speed = slider("speed", 0, 100, 50);
//!
//! // %% report
//! format!("going {} km/h", speed)
//! ```

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::CellId;

/// Widget definition reported by a cell run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetDef {
    /// Numeric slider widget.
    Slider {
        id: String,
        label: String,
        min: f64,
        max: f64,
        step: f64,
        value: f64,
    },
    /// Text input widget.
    TextInput {
        id: String,
        label: String,
        value: String,
    },
    /// Dropdown select widget.
    Select {
        id: String,
        label: String,
        options: Vec<String>,
        selected: usize,
    },
    /// Checkbox widget.
    Checkbox {
        id: String,
        label: String,
        value: bool,
    },
}

impl WidgetDef {
    pub fn id(&self) -> &str {
        match self {
            WidgetDef::Slider { id, .. } => id,
            WidgetDef::TextInput { id, .. } => id,
            WidgetDef::Select { id, .. } => id,
            WidgetDef::Checkbox { id, .. } => id,
        }
    }

    /// The value the widget showed when it was registered.
    pub fn current_value(&self) -> WidgetValue {
        match self {
            WidgetDef::Slider { value, .. } => WidgetValue::Number(*value),
            WidgetDef::TextInput { value, .. } => WidgetValue::Text(value.clone()),
            WidgetDef::Select { selected, .. } => WidgetValue::Index(*selected),
            WidgetDef::Checkbox { value, .. } => WidgetValue::Bool(*value),
        }
    }
}

/// A value pushed in from outside for one widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WidgetValue {
    Number(f64),
    Text(String),
    /// Selected option of a select widget.
    Index(usize),
    Bool(bool),
}

impl WidgetValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WidgetValue::Number(n) => Some(*n),
            WidgetValue::Index(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WidgetValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Untagged JSON cannot tell `2` from `2.0`, so integral numbers count.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            WidgetValue::Index(i) => Some(*i),
            WidgetValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WidgetValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Per-run widget context.
///
/// Handed to the language binding for one cell run. Widgets register
/// themselves here and read the value the user last set.
#[derive(Debug, Default)]
pub struct WidgetContext<'a> {
    /// Widgets registered during this run.
    widgets: Vec<WidgetDef>,
    /// Current widget values (set by user interaction).
    values: Option<&'a FxHashMap<String, WidgetValue>>,
}

impl<'a> WidgetContext<'a> {
    pub fn with_values(values: &'a FxHashMap<String, WidgetValue>) -> Self {
        Self {
            widgets: Vec::new(),
            values: Some(values),
        }
    }

    fn value(&self, id: &str) -> Option<&WidgetValue> {
        self.values.and_then(|values| values.get(id))
    }

    /// Register a slider and return its current value.
    pub fn slider(&mut self, id: &str, min: f64, max: f64, step: f64, default: f64) -> f64 {
        let value = self
            .value(id)
            .and_then(|v| v.as_f64())
            .unwrap_or(default)
            .clamp(min, max);

        self.widgets.push(WidgetDef::Slider {
            id: id.to_string(),
            label: id.to_string(),
            min,
            max,
            step,
            value,
        });

        value
    }

    /// Register a text input and return its current value.
    pub fn text_input(&mut self, id: &str, default: &str) -> String {
        let value = self
            .value(id)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string();

        self.widgets.push(WidgetDef::TextInput {
            id: id.to_string(),
            label: id.to_string(),
            value: value.clone(),
        });

        value
    }

    /// Register a select widget and return the currently selected option.
    pub fn select(&mut self, id: &str, options: &[String], default: usize) -> String {
        let selected = self
            .value(id)
            .and_then(|v| v.as_index())
            .unwrap_or(default)
            .min(options.len().saturating_sub(1));

        self.widgets.push(WidgetDef::Select {
            id: id.to_string(),
            label: id.to_string(),
            options: options.to_vec(),
            selected,
        });

        options.get(selected).cloned().unwrap_or_default()
    }

    /// Register a checkbox and return its current value.
    pub fn checkbox(&mut self, id: &str, default: bool) -> bool {
        let value = self.value(id).and_then(|v| v.as_bool()).unwrap_or(default);

        self.widgets.push(WidgetDef::Checkbox {
            id: id.to_string(),
            label: id.to_string(),
            value,
        });

        value
    }

    /// Drain the widgets created by this run.
    pub fn take_widgets(&mut self) -> Vec<WidgetDef> {
        std::mem::take(&mut self.widgets)
    }
}

/// A registered widget with its owning cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredWidget {
    pub cell_id: CellId,
    pub def: WidgetDef,
    /// Value set by the user, if any. Otherwise the cell used its default.
    pub value: Option<WidgetValue>,
}

/// Tracks which cell owns each widget and the values set from outside.
#[derive(Debug, Default)]
pub struct WidgetRegistry {
    /// Widget id to owning cell and last reported definition.
    widgets: BTreeMap<String, (CellId, WidgetDef)>,
    /// Values set by user interaction.
    values: FxHashMap<String, WidgetValue>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the widgets registered by `cell_id` with `defs`.
    pub fn register(&mut self, cell_id: CellId, defs: Vec<WidgetDef>) {
        self.widgets.retain(|_, (owner, _)| *owner != cell_id);
        for def in defs {
            let id = def.id().to_string();
            if let Some((previous, _)) = self.widgets.get(&id)
                && *previous != cell_id
            {
                tracing::warn!(
                    "Widget '{}' registered by {} replaces registration from {}",
                    id,
                    cell_id,
                    previous
                );
            }
            self.widgets.insert(id, (cell_id, def));
        }
    }

    /// Forget every widget owned by a removed cell.
    pub fn remove_cell(&mut self, cell_id: CellId) {
        let removed: Vec<String> = self
            .widgets
            .iter()
            .filter(|(_, (owner, _))| *owner == cell_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in removed {
            self.widgets.remove(&id);
            self.values.remove(&id);
        }
    }

    /// Store a value for a widget and return the cell that must re-run.
    ///
    /// Returns `None` when the value is unchanged.
    pub fn set_value(&mut self, widget_id: &str, value: WidgetValue) -> Result<Option<CellId>> {
        let (owner, _) = self
            .widgets
            .get(widget_id)
            .ok_or_else(|| Error::UnknownWidget(widget_id.to_string()))?;
        let owner = *owner;

        if self.values.get(widget_id) == Some(&value) {
            return Ok(None);
        }
        self.values.insert(widget_id.to_string(), value);
        Ok(Some(owner))
    }

    /// Values set by user interaction, keyed by widget id.
    pub fn values(&self) -> &FxHashMap<String, WidgetValue> {
        &self.values
    }

    /// Cell that owns a widget.
    pub fn owner(&self, widget_id: &str) -> Option<CellId> {
        self.widgets.get(widget_id).map(|(owner, _)| *owner)
    }

    /// All registered widgets, ordered by id.
    pub fn widgets(&self) -> Vec<RegisteredWidget> {
        self.widgets
            .iter()
            .map(|(id, (cell_id, def))| RegisteredWidget {
                cell_id: *cell_id,
                def: def.clone(),
                value: self.values.get(id).cloned(),
            })
            .collect()
    }
}
