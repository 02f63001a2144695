use serde::{Deserialize, Serialize};

/// A `(name, value)` pair offered by select fields. The `value` is what goes
/// on the wire; the `name` is what a user sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub name: String,
    pub value: String,
}

impl SelectOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Where a link field takes its length from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    /// The child list of the node owning the field.
    Inner,
    /// A sibling list field, by name.
    Field(String),
}

/// Declarative description of a field. Catalog entries hold a list of these
/// and nodes instantiate them into live fields; composite fields keep their
/// element specs as the template for new elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSpec {
    Int {
        name: String,
        default: i64,
    },
    Position {
        name: String,
        default: i64,
    },
    Boolean {
        name: String,
        default: bool,
    },
    Select {
        name: String,
        options: Vec<SelectOption>,
    },
    Text {
        name: String,
        default: String,
    },
    Color {
        name: String,
        default: String,
    },
    Repeat {
        name: String,
        element: Vec<FieldSpec>,
    },
    Link {
        name: String,
        source: LinkSource,
        element: Vec<FieldSpec>,
    },
    Rely {
        name: String,
        source: String,
        inner: Box<FieldSpec>,
    },
    RelyValue {
        name: String,
        source: String,
        target: String,
        inner: Box<FieldSpec>,
    },
}

impl FieldSpec {
    pub fn int(name: impl Into<String>) -> Self {
        Self::Int {
            name: name.into(),
            default: 0,
        }
    }

    pub fn position(name: impl Into<String>) -> Self {
        Self::Position {
            name: name.into(),
            default: 0,
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::Boolean {
            name: name.into(),
            default: false,
        }
    }

    /// Select over `(name, value)` pairs; the first option is the initial
    /// selection.
    pub fn select(name: impl Into<String>, options: &[(&str, &str)]) -> Self {
        Self::Select {
            name: name.into(),
            options: options
                .iter()
                .map(|(name, value)| SelectOption::new(*name, *value))
                .collect(),
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            default: String::new(),
        }
    }

    pub fn color(name: impl Into<String>) -> Self {
        Self::Color {
            name: name.into(),
            default: "000000".to_string(),
        }
    }

    pub fn repeat(name: impl Into<String>, element: Vec<FieldSpec>) -> Self {
        Self::Repeat {
            name: name.into(),
            element,
        }
    }

    pub fn link(name: impl Into<String>, source: LinkSource, element: Vec<FieldSpec>) -> Self {
        Self::Link {
            name: name.into(),
            source,
            element,
        }
    }

    pub fn rely(name: impl Into<String>, source: impl Into<String>, inner: FieldSpec) -> Self {
        Self::Rely {
            name: name.into(),
            source: source.into(),
            inner: Box::new(inner),
        }
    }

    pub fn rely_value(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        inner: FieldSpec,
    ) -> Self {
        Self::RelyValue {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            inner: Box::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Int { name, .. }
            | Self::Position { name, .. }
            | Self::Boolean { name, .. }
            | Self::Select { name, .. }
            | Self::Text { name, .. }
            | Self::Color { name, .. }
            | Self::Repeat { name, .. }
            | Self::Link { name, .. }
            | Self::Rely { name, .. }
            | Self::RelyValue { name, .. } => name,
        }
    }

    /// Descriptor keyword of this kind of field.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Int { .. } => "int",
            Self::Position { .. } => "position",
            Self::Boolean { .. } => "boolean",
            Self::Select { .. } => "select",
            Self::Text { .. } => "string",
            Self::Color { .. } => "color",
            Self::Repeat { .. } => "repeat",
            Self::Link { .. } => "link",
            Self::Rely { .. } => "rely",
            Self::RelyValue { .. } => "rely_value",
        }
    }

    /// Name of the sibling field this field depends on, if any. Links bound
    /// to the owning node's children have no named dependency.
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Self::Link {
                source: LinkSource::Field(source),
                ..
            }
            | Self::Rely { source, .. }
            | Self::RelyValue { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Element template of composite fields.
    pub fn element(&self) -> Option<&[FieldSpec]> {
        match self {
            Self::Repeat { element, .. } | Self::Link { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Field wrapped by rely fields.
    pub fn wrapped(&self) -> Option<&FieldSpec> {
        match self {
            Self::Rely { inner, .. } | Self::RelyValue { inner, .. } => Some(inner),
            _ => None,
        }
    }

    /// Scalar fields fit in a single descriptor token pair inside
    /// `repeat`/`link` element lists.
    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            Self::Int { .. }
                | Self::Position { .. }
                | Self::Boolean { .. }
                | Self::Text { .. }
                | Self::Color { .. }
        )
    }
}
