//! Live configuration values.
//!
//! Fields live in a [`FieldArena`] owned by the [`crate::Tree`] and refer to
//! each other by [`FieldId`]. Mutation goes through the tree (see
//! `mutate.rs`) so that every change can be propagated to dependents.

mod mutate;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    block::BlockId,
    catalog::{FieldSpec, SelectOption},
    propagation::Source,
    LightweaveError, Result,
};

/// Handle of a field inside the tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub(crate) usize);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Variable-length list of element groups, each built from the template.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub(crate) template: Vec<FieldSpec>,
    pub(crate) elements: Vec<Vec<FieldId>>,
}

impl Composite {
    pub(crate) fn new(template: Vec<FieldSpec>) -> Self {
        Self {
            template,
            elements: Vec::new(),
        }
    }

    pub fn template(&self) -> &[FieldSpec] {
        &self.template
    }

    pub fn elements(&self) -> &[Vec<FieldId>] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Current value of a field, one variant per field kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Position(i64),
    Boolean(bool),
    Select {
        options: Vec<SelectOption>,
        selected: usize,
    },
    Text(String),
    Color(String),
    Repeat(Composite),
    /// Like `Repeat`, but the length follows the linked list.
    LinkLength(Composite),
    Rely {
        inner: FieldId,
    },
    RelyValue {
        inner: FieldId,
        target: String,
    },
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Position(_) => "position",
            Self::Boolean(_) => "boolean",
            Self::Select { .. } => "select",
            Self::Text(_) => "string",
            Self::Color(_) => "color",
            Self::Repeat(_) => "repeat",
            Self::LinkLength(_) => "link",
            Self::Rely { .. } => "rely",
            Self::RelyValue { .. } => "rely_value",
        }
    }

    /// Field wrapped by `Rely`/`RelyValue`.
    pub fn wrapped(&self) -> Option<FieldId> {
        match self {
            Self::Rely { inner } | Self::RelyValue { inner, .. } => Some(*inner),
            _ => None,
        }
    }

    pub fn composite(&self) -> Option<&Composite> {
        match self {
            Self::Repeat(list) | Self::LinkLength(list) => Some(list),
            _ => None,
        }
    }

    pub(crate) fn composite_mut(&mut self) -> Option<&mut Composite> {
        match self {
            Self::Repeat(list) | Self::LinkLength(list) => Some(list),
            _ => None,
        }
    }

    pub fn selected_option(&self) -> Option<&SelectOption> {
        match self {
            Self::Select { options, selected } => options.get(*selected),
            _ => None,
        }
    }
}

/// A typed configuration value attached to a node.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) owner: BlockId,
    pub(crate) value: FieldValue,
    pub(crate) active: bool,
    /// The one source this field derives its state from.
    pub(crate) link: Option<Source>,
    pub(crate) listeners: Vec<FieldId>,
    /// Composite whose element group holds this field.
    pub(crate) container: Option<FieldId>,
}

impl Field {
    pub(crate) fn new(
        name: impl Into<String>,
        owner: BlockId,
        value: FieldValue,
        container: Option<FieldId>,
    ) -> Self {
        Self {
            name: name.into(),
            owner,
            value,
            active: true,
            link: None,
            listeners: Vec::new(),
            container,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> BlockId {
        self.owner
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn link(&self) -> Option<Source> {
        self.link
    }

    pub fn listeners(&self) -> &[FieldId] {
        &self.listeners
    }

    pub fn container(&self) -> Option<FieldId> {
        self.container
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> LightweaveError {
        LightweaveError::FieldKindMismatch {
            field: self.name.clone(),
            expected,
        }
    }
}

/// Slot storage for every field of a tree. Slots of released fields stay
/// empty so ids are never reused.
#[derive(Debug, Default)]
pub struct FieldArena {
    slots: Vec<Option<Field>>,
}

impl FieldArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, field: Field) -> FieldId {
        self.slots.push(Some(field));
        FieldId(self.slots.len() - 1)
    }

    pub fn get(&self, id: FieldId) -> Option<&Field> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: FieldId) -> Option<&mut Field> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub(crate) fn try_get(&self, id: FieldId) -> Result<&Field> {
        self.get(id).ok_or(LightweaveError::UnknownField(id))
    }

    pub(crate) fn try_get_mut(&mut self, id: FieldId) -> Result<&mut Field> {
        self.get_mut(id).ok_or(LightweaveError::UnknownField(id))
    }

    pub(crate) fn take(&mut self, id: FieldId) -> Option<Field> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    /// Number of live fields.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Follows rely wrappers down to the field that actually holds a value.
    pub fn unwrap_wrappers(&self, mut id: FieldId) -> FieldId {
        while let Some(inner) = self.get(id).and_then(|field| field.value.wrapped()) {
            id = inner;
        }
        id
    }

    /// Raw comparison value of a field: the option value for selects, the
    /// decimal string for numbers, `1`/`0` for booleans and the element
    /// count for lists.
    pub fn raw_value(&self, id: FieldId) -> Option<String> {
        let field = self.get(self.unwrap_wrappers(id))?;
        let raw = match &field.value {
            FieldValue::Int(value) | FieldValue::Position(value) => value.to_string(),
            FieldValue::Boolean(value) => bool_token(*value).to_string(),
            FieldValue::Select { .. } => field.value.selected_option()?.value.clone(),
            FieldValue::Text(value) | FieldValue::Color(value) => value.clone(),
            FieldValue::Repeat(list) | FieldValue::LinkLength(list) => list.len().to_string(),
            FieldValue::Rely { .. } | FieldValue::RelyValue { .. } => return None,
        };
        Some(raw)
    }

    /// Element count of a list field, looking through rely wrappers.
    pub fn list_len(&self, id: FieldId) -> usize {
        self.get(self.unwrap_wrappers(id))
            .and_then(|field| field.value.composite())
            .map_or(0, Composite::len)
    }
}

pub(crate) fn bool_token(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Strips a leading `#` and checks for exactly six hex digits.
pub(crate) fn normalise_color(field: &str, value: &str) -> Result<String> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hex.to_string())
    } else {
        Err(LightweaveError::InvalidColor {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

/// Text values travel unescaped, so they must not contain the delimiter.
pub(crate) fn check_token(field: &str, value: &str) -> Result<()> {
    if value.contains(char::is_whitespace) {
        Err(LightweaveError::InvalidToken {
            field: field.to_string(),
            value: value.to_string(),
        })
    } else {
        Ok(())
    }
}
