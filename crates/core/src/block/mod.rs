//! The node tree.
//!
//! A [`Tree`] owns every [`Block`] and every field. Blocks bind a catalog
//! entry to live fields and an ordered child list whose kind and size are
//! bounded by the entry. Structural operations that would break those bounds
//! are ignored rather than reported as errors.

use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    catalog::{Catalog, CatalogEntry, FieldSpec, ItemType, LinkSource},
    config::TreeConfig,
    field::{Composite, Field, FieldArena, FieldId, FieldValue},
    propagation::{ChangeSink, Source},
    LightweaveError, Result,
};

/// Unique, monotonically assigned node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub(crate) u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out node ids for one tree.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> BlockId {
        let id = BlockId(self.next);
        self.next += 1;
        id
    }
}

/// Whether a structural operation changed the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

/// A node of the tree.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) name: String,
    pub(crate) symbol: String,
    pub(crate) item_type: ItemType,
    pub(crate) inner_type: ItemType,
    pub(crate) inner_min: usize,
    pub(crate) inner_max: Option<usize>,
    pub(crate) fields: Vec<FieldId>,
    pub(crate) children: Vec<BlockId>,
    pub(crate) parent: Option<BlockId>,
    pub(crate) length_listeners: Vec<FieldId>,
}

impl Block {
    fn new(id: BlockId, entry: &CatalogEntry) -> Self {
        Self {
            id,
            name: entry.name.clone(),
            symbol: entry.symbol.clone(),
            item_type: entry.item_type,
            inner_type: entry.inner_type,
            inner_min: entry.inner_min,
            inner_max: entry.inner_max,
            fields: Vec::new(),
            children: Vec::new(),
            parent: None,
            length_listeners: Vec::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Display name of the catalog entry this node was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn inner_type(&self) -> ItemType {
        self.inner_type
    }

    pub fn inner_min(&self) -> usize {
        self.inner_min
    }

    pub fn inner_max(&self) -> Option<usize> {
        self.inner_max
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner_max
            .is_some_and(|max| self.children.len() >= max)
    }

    /// Whether another child of `item_type` fits.
    pub fn accepts(&self, item_type: ItemType) -> bool {
        !self.is_full() && item_type == self.inner_type && item_type != ItemType::None
    }

    /// Nodes with a variable number of children put the count on the wire.
    pub fn emits_child_count(&self) -> bool {
        self.inner_max.map_or(true, |max| max > 1)
    }
}

/// A lighting system: the root System node and everything below it.
pub struct Tree {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) config: TreeConfig,
    pub(crate) blocks: HashMap<BlockId, Block>,
    pub(crate) fields: FieldArena,
    pub(crate) ids: IdAllocator,
    pub(crate) root: BlockId,
    pub(crate) sink: Box<dyn ChangeSink + Send>,
}

impl Tree {
    /// Creates an empty system using the standard catalog.
    pub fn new(config: TreeConfig, sink: impl ChangeSink + Send + 'static) -> Result<Self> {
        Self::with_catalog(Catalog::standard()?, config, sink)
    }

    pub fn with_catalog(
        catalog: Catalog,
        config: TreeConfig,
        sink: impl ChangeSink + Send + 'static,
    ) -> Result<Self> {
        let catalog = Arc::new(catalog);
        let mut ids = IdAllocator::new();
        let placeholder = ids.next_id();
        let mut tree = Self {
            catalog: Arc::clone(&catalog),
            config,
            blocks: HashMap::new(),
            fields: FieldArena::new(),
            ids,
            root: placeholder,
            sink: Box::new(sink),
        };

        let root = catalog
            .root()
            .ok_or_else(|| LightweaveError::Schema("catalog has no System entry".to_string()))?;
        tree.root = tree.build(placeholder, root)?;
        Ok(tree)
    }

    pub fn root(&self) -> BlockId {
        self.root
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id)
    }

    pub fn fields(&self) -> &FieldArena {
        &self.fields
    }

    /// Top-level field of `block` called `name`.
    pub fn field_named(&self, block: BlockId, name: &str) -> Option<FieldId> {
        self.blocks.get(&block)?.fields.iter().copied().find(|id| {
            self.fields
                .get(*id)
                .is_some_and(|field| field.name == name)
        })
    }

    /// Builds a detached node of `entry`, including its `inner_min`
    /// children. Attach it with [`Tree::add_child`]; a node that is never
    /// attached stays in the tree until it is offered to `add_child`.
    pub fn create(&mut self, entry: &CatalogEntry) -> Result<BlockId> {
        entry.validate()?;
        let id = self.ids.next_id();
        let built = self.build(id, entry);
        if built.is_err() {
            self.release_block(id);
        }
        built
    }

    fn build(&mut self, id: BlockId, entry: &CatalogEntry) -> Result<BlockId> {
        self.blocks.insert(id, Block::new(id, entry));

        for spec in &entry.fields {
            let field = self.instantiate(id, spec, &[], None)?;
            if let Some(block) = self.blocks.get_mut(&id) {
                block.fields.push(field);
            }
        }

        if entry.inner_type != ItemType::None {
            let required = self.catalog.first_of(entry.inner_type).cloned();
            for _ in 0..entry.inner_min {
                let Some(required) = &required else {
                    return Err(LightweaveError::Schema(format!(
                        "`{}` needs {} children but the catalog has no {} entry",
                        entry.name, entry.inner_min, entry.inner_type
                    )));
                };
                let child = self.create(required)?;
                match self.attach(id, child, false) {
                    Ok(Outcome::Applied) => {}
                    rejected => {
                        self.release_block(child);
                        rejected?;
                        return Err(LightweaveError::Schema(format!(
                            "`{}` rejected its required `{}` child",
                            entry.name, required.name
                        )));
                    }
                }
            }
        }

        debug!(id = %id, name = %entry.name, "block built");
        Ok(id)
    }

    /// Appends `child` to `parent`'s children. Ignored when `parent` is full,
    /// the kinds do not match, or `child` is already attached somewhere.
    /// A detached `child` is consumed: if it is not attached, it is released.
    pub fn add_child(&mut self, parent: BlockId, child: BlockId) -> Result<Outcome> {
        let result = self.attach(parent, child, true);
        if !matches!(result, Ok(Outcome::Applied)) && self.is_detached(child) {
            debug!(child = %child, "released unattached block");
            self.release_block(child);
        }
        result
    }

    fn is_detached(&self, id: BlockId) -> bool {
        id != self.root
            && self
                .blocks
                .get(&id)
                .is_some_and(|block| block.parent.is_none())
    }

    fn attach(&mut self, parent: BlockId, child: BlockId, refresh: bool) -> Result<Outcome> {
        let (Some(target), Some(item)) = (self.blocks.get(&parent), self.blocks.get(&child))
        else {
            return Ok(Outcome::Ignored);
        };
        if item.parent.is_some() || child == self.root || self.is_ancestor(child, parent) {
            return Ok(Outcome::Ignored);
        }
        if !target.accepts(item.item_type) {
            debug!(parent = %parent, child = %child, "child rejected");
            return Ok(Outcome::Ignored);
        }
        self.check_cascade(Source::Children(parent))?;

        if let Some(target) = self.blocks.get_mut(&parent) {
            target.children.push(child);
        }
        if let Some(item) = self.blocks.get_mut(&child) {
            item.parent = Some(parent);
        }
        self.children_changed(parent, refresh)?;
        Ok(Outcome::Applied)
    }

    /// Builds the first catalog entry of `item_type` and appends it.
    pub fn add_by_type(&mut self, parent: BlockId, item_type: ItemType) -> Result<Outcome> {
        let accepts = self
            .blocks
            .get(&parent)
            .is_some_and(|block| block.accepts(item_type));
        if !accepts {
            return Ok(Outcome::Ignored);
        }

        let catalog = Arc::clone(&self.catalog);
        let Some(entry) = catalog.first_of(item_type) else {
            return Ok(Outcome::Ignored);
        };
        let child = self.create(entry)?;
        self.add_child(parent, child)
    }

    /// Removes `child` from `parent` and releases its subtree.
    pub fn remove_child(&mut self, parent: BlockId, child: BlockId) -> Result<Outcome> {
        let Some(block) = self.blocks.get(&parent) else {
            return Ok(Outcome::Ignored);
        };
        let Some(index) = block.children.iter().position(|id| *id == child) else {
            return Ok(Outcome::Ignored);
        };
        self.check_cascade(Source::Children(parent))?;
        if let Some(block) = self.blocks.get_mut(&parent) {
            block.children.remove(index);
        }

        self.release_block(child);
        debug!(parent = %parent, child = %child, "child removed");
        self.children_changed(parent, true)?;
        Ok(Outcome::Applied)
    }

    /// Removes a node from whatever parent it is attached to.
    pub fn detach(&mut self, id: BlockId) -> Result<Outcome> {
        match self.blocks.get(&id).and_then(Block::parent) {
            Some(parent) => self.remove_child(parent, id),
            None => Ok(Outcome::Ignored),
        }
    }

    /// Replaces a node by a fresh node of the entry with the same item type
    /// and `symbol`, at the same position among its siblings.
    pub fn retype(&mut self, id: BlockId, symbol: &str) -> Result<Outcome> {
        let Some((item_type, parent)) = self
            .blocks
            .get(&id)
            .and_then(|block| Some((block.item_type, block.parent?)))
        else {
            return Ok(Outcome::Ignored);
        };

        let catalog = Arc::clone(&self.catalog);
        let Some(entry) = catalog.find(item_type, symbol) else {
            return Ok(Outcome::Ignored);
        };
        self.check_cascade(Source::Children(parent))?;
        let replacement = self.create(entry)?;

        let slot = self
            .blocks
            .get_mut(&parent)
            .and_then(|siblings| siblings.children.iter_mut().find(|child| **child == id));
        let Some(slot) = slot else {
            self.release_block(replacement);
            return Ok(Outcome::Ignored);
        };
        *slot = replacement;
        if let Some(block) = self.blocks.get_mut(&replacement) {
            block.parent = Some(parent);
        }

        self.release_block(id);
        debug!(old = %id, new = %replacement, symbol, "block retyped");
        self.children_changed(parent, true)?;
        Ok(Outcome::Applied)
    }

    /// Depth-first search for `id` in the subtree rooted at `from`.
    pub fn descendant(&self, from: BlockId, id: BlockId) -> Option<&Block> {
        let block = self.blocks.get(&from)?;
        if block.id == id {
            return Some(block);
        }
        block
            .children
            .iter()
            .find_map(|child| self.descendant(*child, id))
    }

    fn is_ancestor(&self, ancestor: BlockId, mut id: BlockId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.blocks.get(&id).and_then(Block::parent) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    fn children_changed(&mut self, parent: BlockId, refresh: bool) -> Result<()> {
        if refresh {
            self.source_changed(Source::Children(parent))
        } else {
            let mut cascade = crate::propagation::Cascade::new(false);
            self.propagate(Source::Children(parent), &mut cascade)
        }
    }

    /// Builds the live field for `spec`. Dependencies resolve against the
    /// fields built so far in the same group first, then against the owning
    /// node's top-level fields.
    pub(crate) fn instantiate(
        &mut self,
        owner: BlockId,
        spec: &FieldSpec,
        group: &[FieldId],
        container: Option<FieldId>,
    ) -> Result<FieldId> {
        let value = match spec {
            FieldSpec::Int { default, .. } => FieldValue::Int(*default),
            FieldSpec::Position { default, .. } => FieldValue::Position(*default),
            FieldSpec::Boolean { default, .. } => FieldValue::Boolean(*default),
            FieldSpec::Select { name, options } => {
                if options.is_empty() {
                    return Err(LightweaveError::Schema(format!(
                        "select `{name}` has no options"
                    )));
                }
                FieldValue::Select {
                    options: options.clone(),
                    selected: 0,
                }
            }
            FieldSpec::Text { default, .. } => FieldValue::Text(default.clone()),
            FieldSpec::Color { default, .. } => FieldValue::Color(default.clone()),
            FieldSpec::Repeat { element, .. } => FieldValue::Repeat(Composite::new(element.clone())),
            FieldSpec::Link { element, .. } => {
                FieldValue::LinkLength(Composite::new(element.clone()))
            }
            FieldSpec::Rely { inner, .. } => FieldValue::Rely {
                inner: self.instantiate(owner, inner, group, container)?,
            },
            FieldSpec::RelyValue { inner, target, .. } => FieldValue::RelyValue {
                inner: self.instantiate(owner, inner, group, container)?,
                target: target.clone(),
            },
        };

        let id = self
            .fields
            .insert(Field::new(spec.name(), owner, value, container));

        let source = match spec {
            FieldSpec::Link {
                source: LinkSource::Inner,
                ..
            } => Some(Source::Children(owner)),
            _ => match spec.dependency() {
                Some(name) => Some(Source::Field(self.resolve(owner, group, spec, name)?)),
                None => None,
            },
        };
        if let Some(source) = source {
            self.rebind(id, source)?;
        }
        Ok(id)
    }

    /// Builds one element group of a list field.
    pub(crate) fn instantiate_group(
        &mut self,
        owner: BlockId,
        template: &[FieldSpec],
        container: Option<FieldId>,
    ) -> Result<Vec<FieldId>> {
        let mut group = Vec::with_capacity(template.len());
        for spec in template {
            let id = self.instantiate(owner, spec, &group, container)?;
            group.push(id);
        }
        Ok(group)
    }

    fn resolve(
        &self,
        owner: BlockId,
        group: &[FieldId],
        spec: &FieldSpec,
        name: &str,
    ) -> Result<FieldId> {
        let named = |id: &FieldId| {
            self.fields
                .get(*id)
                .is_some_and(|field| field.name == name)
        };
        let top_level = self
            .blocks
            .get(&owner)
            .map(|block| block.fields.as_slice())
            .unwrap_or_default();

        group
            .iter()
            .chain(top_level)
            .copied()
            .find(|id| named(id))
            .ok_or_else(|| LightweaveError::UnknownSource {
                field: spec.name().to_string(),
                dependency: name.to_string(),
            })
    }

    /// Drops a node, its descendants and all of their fields.
    fn release_block(&mut self, id: BlockId) {
        let Some(block) = self.blocks.remove(&id) else {
            return;
        };
        for child in block.children {
            self.release_block(child);
        }
        for field in block.fields {
            self.release_field(field);
        }
    }

    /// Drops a field and everything it owns, unsubscribing it from its
    /// source first.
    pub(crate) fn release_field(&mut self, id: FieldId) {
        let Some(field) = self.fields.get(id) else {
            return;
        };
        if let Some(link) = field.link {
            self.unsubscribe(link, id);
        }
        let Some(field) = self.fields.take(id) else {
            return;
        };
        match field.value {
            FieldValue::Rely { inner } | FieldValue::RelyValue { inner, .. } => {
                self.release_field(inner)
            }
            FieldValue::Repeat(list) | FieldValue::LinkLength(list) => {
                for element in list.elements.into_iter().flatten() {
                    self.release_field(element);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("blocks", &self.blocks.len())
            .field("fields", &self.fields.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    fn tree() -> Tree {
        Tree::new(TreeConfig::default(), || {}).unwrap()
    }

    fn first_child(tree: &Tree, id: BlockId) -> BlockId {
        tree.block(id).unwrap().children()[0]
    }

    #[test]
    fn root_is_an_empty_system() {
        let tree = tree();
        let root = tree.block(tree.root()).unwrap();
        assert_eq!(root.item_type(), ItemType::System);
        assert_eq!(root.symbol(), "");
        assert!(root.is_empty());
        assert_eq!(root.inner_max(), None);
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let mut tree = tree();
        let root = tree.root();
        for _ in 0..3 {
            assert!(tree.add_by_type(root, ItemType::Object).unwrap().is_applied());
        }
        let children = tree.block(root).unwrap().children().to_vec();
        assert!(children.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(children.iter().all(|id| *id > root));
    }

    #[test]
    fn generator_is_built_with_its_object() {
        let mut tree = tree();
        let root = tree.root();
        let object = tree.add_by_type(root, ItemType::Object).unwrap();
        assert_eq!(object, Outcome::Applied);

        let standard = first_child(&tree, root);
        assert!(tree.retype(standard, "g").unwrap().is_applied());

        let generator = first_child(&tree, root);
        let block = tree.block(generator).unwrap();
        assert_eq!(block.symbol(), "g");
        assert_eq!(block.len(), 1);
        assert!(block.is_full());
        assert!(tree.block(standard).is_none());
    }

    #[test]
    fn full_and_mismatched_additions_are_ignored() {
        let mut tree = tree();
        let root = tree.root();
        tree.add_by_type(root, ItemType::Object).unwrap();
        let object = first_child(&tree, root);
        tree.retype(object, "g").unwrap();
        let generator = first_child(&tree, root);

        let before = tree.serialize();
        assert_eq!(
            tree.add_by_type(generator, ItemType::Object).unwrap(),
            Outcome::Ignored
        );
        assert_eq!(
            tree.add_by_type(root, ItemType::Animation).unwrap(),
            Outcome::Ignored
        );

        let catalog = tree.catalog();
        let fields = tree.fields().len();
        let function = tree
            .create(catalog.first_of(ItemType::Function).unwrap())
            .unwrap();
        assert!(tree.fields().len() > fields);
        assert_eq!(tree.add_child(root, function).unwrap(), Outcome::Ignored);
        assert_eq!(tree.serialize(), before);

        // the rejected node was never attached, so it is gone
        assert!(tree.block(function).is_none());
        assert_eq!(tree.fields().len(), fields);
    }

    #[test]
    fn basic_animation_caps_functions_at_sixteen() {
        let mut tree = tree();
        let root = tree.root();
        tree.add_by_type(root, ItemType::Object).unwrap();
        let object = first_child(&tree, root);
        tree.add_by_type(object, ItemType::Animation).unwrap();
        let animation = first_child(&tree, object);

        let applied = (0..20)
            .filter(|_| {
                tree.add_by_type(animation, ItemType::Function)
                    .unwrap()
                    .is_applied()
            })
            .count();
        assert_eq!(applied, 16);
        assert_eq!(tree.block(animation).unwrap().len(), 16);
    }

    #[test]
    fn attached_nodes_cannot_be_added_twice() {
        let mut tree = tree();
        let root = tree.root();
        tree.add_by_type(root, ItemType::Object).unwrap();
        let object = first_child(&tree, root);

        assert_eq!(tree.add_child(root, object).unwrap(), Outcome::Ignored);
        assert_eq!(tree.add_child(object, root).unwrap(), Outcome::Ignored);
        assert_eq!(tree.block(root).unwrap().len(), 1);
    }

    #[test]
    fn removal_releases_the_subtree() {
        let mut tree = tree();
        let root = tree.root();
        tree.add_by_type(root, ItemType::Object).unwrap();
        let object = first_child(&tree, root);
        tree.add_by_type(object, ItemType::Animation).unwrap();
        let animation = first_child(&tree, object);
        let fields_before = tree.fields().len();

        assert!(tree.detach(object).unwrap().is_applied());
        assert!(tree.block(object).is_none());
        assert!(tree.block(animation).is_none());
        assert!(tree.fields().len() < fields_before);
        assert!(tree.fields().is_empty());

        assert_eq!(tree.remove_child(root, object).unwrap(), Outcome::Ignored);
        assert_eq!(tree.detach(root).unwrap(), Outcome::Ignored);
    }

    #[test]
    fn finds_descendants_by_id() {
        let mut tree = tree();
        let root = tree.root();
        tree.add_by_type(root, ItemType::Object).unwrap();
        let object = first_child(&tree, root);
        tree.add_by_type(object, ItemType::Animation).unwrap();
        let animation = first_child(&tree, object);

        assert_eq!(tree.descendant(root, animation).unwrap().symbol(), "b");
        assert_eq!(tree.descendant(object, object).unwrap().id(), object);
        assert!(tree.descendant(animation, object).is_none());
        assert!(tree.descendant(root, BlockId(999)).is_none());
    }

    #[test]
    fn retype_keeps_the_position() {
        let mut tree = tree();
        let root = tree.root();
        tree.add_by_type(root, ItemType::Object).unwrap();
        let object = first_child(&tree, root);
        for _ in 0..3 {
            tree.add_by_type(object, ItemType::Animation).unwrap();
        }
        let middle = tree.block(object).unwrap().children()[1];

        assert!(tree.retype(middle, "s").unwrap().is_applied());
        let children = tree.block(object).unwrap().children().to_vec();
        assert_eq!(children.len(), 3);
        assert_eq!(tree.block(children[1]).unwrap().symbol(), "s");
        assert_eq!(tree.block(children[0]).unwrap().symbol(), "b");

        assert_eq!(tree.retype(children[1], "zz").unwrap(), Outcome::Ignored);
        assert_eq!(tree.retype(root, "").unwrap(), Outcome::Ignored);
    }

    /// Objects holding a list of stops, each with a tint that only shows
    /// while the object glows.
    fn glow_catalog() -> Catalog {
        Catalog::new(vec![
            CatalogEntry::new("System", "", ItemType::System).children(ItemType::Object, 0, None),
            CatalogEntry::new("Glow", "w", ItemType::Object)
                .field(FieldSpec::boolean("glow"))
                .field(FieldSpec::repeat(
                    "stops",
                    vec![
                        FieldSpec::int("at"),
                        FieldSpec::rely("tint", "glow", FieldSpec::color("tint")),
                    ],
                )),
        ])
        .unwrap()
    }

    #[test]
    fn list_elements_follow_node_fields() {
        let mut tree = Tree::with_catalog(glow_catalog(), TreeConfig::default(), || {}).unwrap();
        let root = tree.root();
        tree.add_by_type(root, ItemType::Object).unwrap();
        let object = first_child(&tree, root);
        let glow = tree.field_named(object, "glow").unwrap();
        let stops = tree.field_named(object, "stops").unwrap();

        let first = tree.repeat_add(stops).unwrap();
        let second = tree.repeat_add(stops).unwrap();
        assert_eq!(tree.field(glow).unwrap().listeners().len(), 2);
        assert!(!tree.field(first[1]).unwrap().is_active());
        assert_eq!(tree.serialize(), "1 w 0 2 0 0");

        tree.set_bool(glow, true).unwrap();
        assert!(tree.field(first[1]).unwrap().is_active());
        assert!(tree.field(second[1]).unwrap().is_active());
        assert_eq!(tree.serialize(), "1 w 1 2 0 000000 0 000000");

        tree.repeat_remove(stops, 0).unwrap();
        assert_eq!(tree.field(glow).unwrap().listeners(), &[second[1]]);

        tree.set_bool(glow, false).unwrap();
        assert!(!tree.field(second[1]).unwrap().is_active());
        assert_eq!(tree.serialize(), "1 w 0 1 0");
    }

    #[test]
    fn failed_builds_leave_nothing_behind() {
        // attaching the required pulse runs slots -> extra, one step too deep
        let catalog = Catalog::new(vec![
            CatalogEntry::new("System", "", ItemType::System).children(ItemType::Object, 0, None),
            CatalogEntry::new("Holder", "h", ItemType::Object)
                .children(ItemType::Animation, 1, None)
                .field(FieldSpec::link("slots", LinkSource::Inner, vec![FieldSpec::int("slot")]))
                .field(FieldSpec::rely("extra", "slots", FieldSpec::int("extra"))),
            CatalogEntry::new("Pulse", "b", ItemType::Animation).field(FieldSpec::int("duration")),
        ])
        .unwrap();
        let config = TreeConfig {
            max_cascade_depth: 1,
            ..TreeConfig::default()
        };
        let mut tree = Tree::with_catalog(catalog, config, || {}).unwrap();
        let root = tree.root();

        let err = tree.add_by_type(root, ItemType::Object).unwrap_err();
        assert!(matches!(err, LightweaveError::CascadeTooDeep { depth: 1 }));
        assert_eq!(tree.blocks.len(), 1);
        assert!(tree.fields().is_empty());
        assert_eq!(tree.serialize(), "0");
    }

    #[test]
    fn structural_changes_refresh_the_sink() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut tree = Tree::new(TreeConfig::default(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let root = tree.root();
        tree.add_by_type(root, ItemType::Object).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tree.add_by_type(root, ItemType::Function).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let object = first_child(&tree, root);
        tree.remove_child(root, object).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
