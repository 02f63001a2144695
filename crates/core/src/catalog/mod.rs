//! Static registry of node kinds.
//!
//! Every entry names its wire symbol, the kind of children it accepts with
//! their bounds, and the declarative field list nodes of that kind are built
//! from.

mod descriptor;
mod schema;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use schema::{FieldSpec, LinkSource, SelectOption};

use crate::{LightweaveError, Result};

/// Closed category of a node. `None` marks entries that accept no children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    System,
    Object,
    Animation,
    Function,
    None,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::System => "System",
            Self::Object => "Object",
            Self::Animation => "Animation",
            Self::Function => "Function",
            Self::None => "None",
        };
        f.write_str(label)
    }
}

/// Immutable descriptor of one node kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    /// Wire symbol; empty for the root system node.
    pub symbol: String,
    pub item_type: ItemType,
    pub inner_type: ItemType,
    pub inner_min: usize,
    /// `None` means the node takes any number of children.
    pub inner_max: Option<usize>,
    pub fields: Vec<FieldSpec>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            item_type,
            inner_type: ItemType::None,
            inner_min: 0,
            inner_max: Some(0),
            fields: Vec::new(),
        }
    }

    /// Accept children of `inner_type`, between `min` and `max` of them.
    pub fn children(mut self, inner_type: ItemType, min: usize, max: Option<usize>) -> Self {
        self.inner_type = inner_type;
        self.inner_min = min;
        self.inner_max = max;
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Checks arity consistency and that every dependency points at a field
    /// declared before it, which keeps the dependency graph acyclic.
    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.inner_max {
            if self.inner_min > max {
                return Err(LightweaveError::Schema(format!(
                    "`{}` requires {} children but allows at most {max}",
                    self.name, self.inner_min
                )));
            }
        }

        let accepts_nothing = self.inner_max == Some(0);
        if accepts_nothing != (self.inner_type == ItemType::None) {
            return Err(LightweaveError::Schema(format!(
                "`{}` must use inner type None exactly when it accepts no children",
                self.name
            )));
        }

        if self.item_type == ItemType::None {
            return Err(LightweaveError::Schema(format!(
                "`{}` cannot be of item type None",
                self.name
            )));
        }

        validate_group(&self.fields, &[])
    }
}

fn validate_group(group: &[FieldSpec], outer: &[&str]) -> Result<()> {
    let mut declared: Vec<&str> = Vec::new();
    for spec in group {
        if declared.contains(&spec.name()) {
            return Err(LightweaveError::Schema(format!(
                "field `{}` is declared twice",
                spec.name()
            )));
        }
        validate_spec(spec, &declared, outer)?;
        declared.push(spec.name());
    }
    Ok(())
}

fn validate_spec(spec: &FieldSpec, declared: &[&str], outer: &[&str]) -> Result<()> {
    if let Some(dependency) = spec.dependency() {
        if !declared.contains(&dependency) && !outer.contains(&dependency) {
            return Err(LightweaveError::UnknownSource {
                field: spec.name().to_string(),
                dependency: dependency.to_string(),
            });
        }
    }

    match spec {
        FieldSpec::Select { name, options } if options.is_empty() => Err(
            LightweaveError::Schema(format!("select `{name}` has no options")),
        ),
        FieldSpec::Repeat { element, .. } | FieldSpec::Link { element, .. } => {
            // element groups see the node's fields declared so far
            let scope: Vec<&str> = outer.iter().chain(declared).copied().collect();
            validate_group(element, &scope)
        }
        FieldSpec::Rely { inner, .. } | FieldSpec::RelyValue { inner, .. } => {
            validate_spec(inner, declared, outer)
        }
        _ => Ok(()),
    }
}

/// Ordered set of catalog entries. The first entry registered for an item
/// type is the one used when a child is added by type alone.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog from custom entries after validating each one.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self> {
        for entry in &entries {
            entry.validate()?;
        }
        if !entries.iter().any(|entry| entry.item_type == ItemType::System) {
            return Err(LightweaveError::Schema(
                "catalog has no System entry to act as root".to_string(),
            ));
        }
        let catalog = Self { entries };
        catalog.check_required_children()?;
        Ok(catalog)
    }

    /// Follows the children each entry builds on construction and rejects a
    /// chain that comes back to an entry it already built.
    fn check_required_children(&self) -> Result<()> {
        for start in 0..self.entries.len() {
            let mut chain = vec![start];
            let mut current = &self.entries[start];
            while current.inner_min > 0 {
                let Some(next) = self
                    .entries
                    .iter()
                    .position(|entry| entry.item_type == current.inner_type)
                else {
                    break;
                };
                if chain.contains(&next) {
                    return Err(LightweaveError::Schema(format!(
                        "`{}` requires a `{}` child, which requires itself again",
                        self.entries[start].name, self.entries[next].name
                    )));
                }
                chain.push(next);
                current = &self.entries[next];
            }
        }
        Ok(())
    }

    /// The node kinds understood by the lighting controller.
    pub fn standard() -> Result<Self> {
        let mut entries = vec![system()];
        entries.extend(objects());
        entries.extend(animations());
        entries.extend(functions());
        Self::new(entries)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn root(&self) -> Option<&CatalogEntry> {
        self.first_of(ItemType::System)
    }

    pub fn first_of(&self, item_type: ItemType) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|entry| entry.item_type == item_type)
    }

    pub fn find(&self, item_type: ItemType, symbol: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|entry| entry.item_type == item_type && entry.symbol == symbol)
    }

    pub fn of_type(&self, item_type: ItemType) -> impl Iterator<Item = &CatalogEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.item_type == item_type)
    }
}

fn system() -> CatalogEntry {
    CatalogEntry::new("System", "", ItemType::System).children(ItemType::Object, 0, None)
}

fn objects() -> Vec<CatalogEntry> {
    vec![
        // <pos> <persistent> <l|c> (<length> | <# colors> <hex>...) <# animations> ...
        CatalogEntry::new("Standard Object", "l", ItemType::Object)
            .children(ItemType::Animation, 0, None)
            .field(FieldSpec::position("position"))
            .field(FieldSpec::boolean("persistent"))
            .field(FieldSpec::select(
                "defineBy",
                &[("Length", "l"), ("Colors", "c")],
            ))
            .field(FieldSpec::rely_value(
                "length",
                "defineBy",
                "l",
                FieldSpec::int("length"),
            ))
            .field(FieldSpec::rely_value(
                "colors",
                "defineBy",
                "c",
                FieldSpec::repeat("colors", vec![FieldSpec::color("color")]),
            )),
        // <pos> <spacing> <object to copy>
        CatalogEntry::new("Generator", "g", ItemType::Object)
            .children(ItemType::Object, 1, Some(1))
            .field(FieldSpec::position("position"))
            .field(FieldSpec::int("spacing")),
    ]
}

fn animations() -> Vec<CatalogEntry> {
    let transition = || vec![FieldSpec::int("state"), FieldSpec::int("frame")];
    let trigger = || vec![FieldSpec::int("state")];

    vec![
        CatalogEntry::new("Basic Animation", "b", ItemType::Animation)
            .children(ItemType::Function, 0, Some(16))
            .field(FieldSpec::int("duration"))
            .field(FieldSpec::boolean("loop"))
            .field(FieldSpec::select(
                "bind",
                &[
                    ("Position", "p"),
                    ("Relative Position", "r"),
                    ("Colors", "c"),
                    ("Opacity", "o"),
                    ("Brightness", "b"),
                    ("Length", "l"),
                ],
            ))
            .field(FieldSpec::int("frameOffset"))
            .field(FieldSpec::boolean("bindToLength"))
            .field(FieldSpec::int("lightOffset"))
            .field(FieldSpec::repeat("absoluteStateTransitions", transition()))
            .field(FieldSpec::repeat("relativeStateTransitions", transition())),
        CatalogEntry::new("Animation Sequence", "s", ItemType::Animation)
            .children(ItemType::Animation, 0, Some(16))
            .field(FieldSpec::int("loops"))
            .field(FieldSpec::repeat("nextTriggers", trigger()))
            .field(FieldSpec::repeat("prevTriggers", trigger()))
            .field(FieldSpec::repeat("resetTriggers", trigger())),
        CatalogEntry::new("State Map", "m", ItemType::Animation)
            .children(ItemType::Animation, 0, Some(16))
            .field(FieldSpec::link(
                "states",
                LinkSource::Inner,
                vec![FieldSpec::int("state"), FieldSpec::int("animation")],
            )),
    ]
}

fn functions() -> Vec<CatalogEntry> {
    let function = |name: &str, symbol: &str, params: &[&str]| {
        params.iter().fold(
            CatalogEntry::new(name, symbol, ItemType::Function),
            |entry, param| entry.field(FieldSpec::int(*param)),
        )
    };

    vec![
        function("Ease", "e", &["start", "end"]),
        function("Linear", "l", &["start", "end"]),
        function("Perlin", "p", &["speed", "min", "max"]),
        function("Random", "r", &["min", "max"]),
        function("Static", "s", &["value"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_validates() {
        let catalog = Catalog::standard().unwrap();
        assert_eq!(catalog.root().unwrap().symbol, "");
        assert_eq!(catalog.of_type(ItemType::Function).count(), 5);
        assert_eq!(catalog.first_of(ItemType::Object).unwrap().name, "Standard Object");
        assert_eq!(catalog.first_of(ItemType::Animation).unwrap().symbol, "b");
        assert_eq!(
            catalog.find(ItemType::Function, "p").unwrap().name,
            "Perlin"
        );
        assert!(catalog.find(ItemType::Object, "e").is_none());
    }

    #[test]
    fn rejects_forward_dependencies() {
        let entry = CatalogEntry::new("Broken", "x", ItemType::Object)
            .field(FieldSpec::rely("late", "flag", FieldSpec::int("late")))
            .field(FieldSpec::boolean("flag"));

        let err = entry.validate().unwrap_err();
        assert!(matches!(err, LightweaveError::UnknownSource { .. }));
    }

    #[test]
    fn element_groups_see_earlier_node_fields() {
        let entry = CatalogEntry::new("Strip", "x", ItemType::Object)
            .field(FieldSpec::boolean("dimmed"))
            .field(FieldSpec::repeat(
                "segments",
                vec![
                    FieldSpec::int("length"),
                    FieldSpec::rely("level", "dimmed", FieldSpec::int("level")),
                ],
            ));
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn rejects_inconsistent_arity() {
        let too_many = CatalogEntry::new("Pair", "x", ItemType::Object).children(
            ItemType::Animation,
            3,
            Some(2),
        );
        assert!(too_many.validate().is_err());

        let leaf_with_type =
            CatalogEntry::new("Leaf", "x", ItemType::Function).children(ItemType::Function, 0, Some(0));
        assert!(leaf_with_type.validate().is_err());

        let duplicate = CatalogEntry::new("Dup", "x", ItemType::Function)
            .field(FieldSpec::int("a"))
            .field(FieldSpec::int("a"));
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn rejects_required_children_that_require_themselves() {
        let system = || {
            CatalogEntry::new("System", "", ItemType::System).children(ItemType::Object, 0, None)
        };

        let nested = Catalog::new(vec![
            system(),
            CatalogEntry::new("Generator", "g", ItemType::Object).children(
                ItemType::Object,
                1,
                Some(1),
            ),
        ])
        .unwrap_err();
        assert!(matches!(nested, LightweaveError::Schema(_)));

        let mutual = Catalog::new(vec![
            system(),
            CatalogEntry::new("Holder", "h", ItemType::Object)
                .children(ItemType::Animation, 1, None),
            CatalogEntry::new("Owner", "o", ItemType::Animation).children(
                ItemType::Object,
                2,
                Some(4),
            ),
        ])
        .unwrap_err();
        assert!(matches!(mutual, LightweaveError::Schema(_)));

        // a required child whose own minimum is zero ends the chain
        let bounded = Catalog::new(vec![
            system(),
            CatalogEntry::new("Holder", "h", ItemType::Object)
                .children(ItemType::Animation, 1, None),
            CatalogEntry::new("Pulse", "b", ItemType::Animation).children(
                ItemType::Object,
                0,
                Some(4),
            ),
        ]);
        assert!(bounded.is_ok());
    }

    #[test]
    fn catalog_requires_a_root() {
        let err = Catalog::new(vec![CatalogEntry::new("Ease", "e", ItemType::Function)]).unwrap_err();
        assert!(format!("{err}").contains("root"));
    }
}
