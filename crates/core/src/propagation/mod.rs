//! Dependency propagation between fields.
//!
//! A dependent subscribes to exactly one [`Source`]: another field, or the
//! child list of a node. Mutating a source synchronously notifies every
//! dependent, which recomputes its derived state and forwards the
//! notification to its own dependents before control returns. Only the head
//! of a cascade reaches the [`ChangeSink`] when notifications are coalesced.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    block::{BlockId, Tree},
    field::{FieldId, FieldValue},
    LightweaveError, Result,
};

/// Something a dependent field can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Field(FieldId),
    /// The child list of a node.
    Children(BlockId),
}

/// Receiver of change notifications, typically owned by a view layer that
/// re-renders on each call.
pub trait ChangeSink {
    fn refresh(&mut self);
}

impl<F: FnMut()> ChangeSink for F {
    fn refresh(&mut self) {
        self()
    }
}

/// State of one running cascade.
#[derive(Debug)]
pub(crate) struct Cascade {
    /// Whether this cascade was started by a user mutation, as opposed to
    /// wiring done while a node is being built.
    refresh: bool,
    path: Vec<FieldId>,
}

impl Cascade {
    pub(crate) fn new(refresh: bool) -> Self {
        Self {
            refresh,
            path: Vec::new(),
        }
    }
}

impl Tree {
    /// Registers `dependent` with `source`. Registrations on rely fields are
    /// forwarded to the wrapped field as well, so changes to the wrapped
    /// value reach the dependent directly.
    pub(crate) fn subscribe(&mut self, source: Source, dependent: FieldId) {
        match source {
            Source::Children(block) => {
                if let Some(block) = self.blocks.get_mut(&block) {
                    block.length_listeners.push(dependent);
                }
            }
            Source::Field(id) => {
                let Some(field) = self.fields.get_mut(id) else {
                    return;
                };
                field.listeners.push(dependent);
                if let Some(inner) = field.value.wrapped() {
                    self.subscribe(Source::Field(inner), dependent);
                }
            }
        }
    }

    pub(crate) fn unsubscribe(&mut self, source: Source, dependent: FieldId) {
        match source {
            Source::Children(block) => {
                if let Some(block) = self.blocks.get_mut(&block) {
                    block.length_listeners.retain(|id| *id != dependent);
                }
            }
            Source::Field(id) => {
                let Some(field) = self.fields.get_mut(id) else {
                    return;
                };
                field.listeners.retain(|listener| *listener != dependent);
                if let Some(inner) = field.value.wrapped() {
                    self.unsubscribe(Source::Field(inner), dependent);
                }
            }
        }
    }

    /// Moves `dependent` onto a new source and recomputes it without
    /// notifying the change sink. A source that would feed changes of
    /// `dependent` back into it is rejected and the previous source is kept.
    pub fn rebind(&mut self, dependent: FieldId, source: Source) -> Result<()> {
        let field = self.fields.try_get(dependent)?;
        if self.closes_cycle(dependent, source) {
            warn!(field = %field.name, "rebind would close a dependency cycle");
            return Err(LightweaveError::DependencyCycle {
                field: field.name.clone(),
            });
        }
        self.check_notify(dependent, &mut Vec::new())?;

        let previous = self.relink(dependent, Some(source))?;
        let mut cascade = Cascade::new(false);
        if let Err(err) = self.notify(dependent, &mut cascade) {
            self.relink(dependent, previous)?;
            return Err(err);
        }
        Ok(())
    }

    /// Swaps the subscription of `dependent` and returns the one it had.
    fn relink(&mut self, dependent: FieldId, source: Option<Source>) -> Result<Option<Source>> {
        let previous = self.fields.try_get(dependent)?.link;
        if let Some(previous) = previous {
            self.unsubscribe(previous, dependent);
        }
        if let Some(source) = source {
            self.subscribe(source, dependent);
        }
        self.fields.try_get_mut(dependent)?.link = source;
        Ok(previous)
    }

    /// Whether a change of `dependent` can already reach `source`, or a field
    /// `source` wraps, through listeners and enclosing lists.
    fn closes_cycle(&self, dependent: FieldId, source: Source) -> bool {
        let Source::Field(mut upstream) = source else {
            return false;
        };
        let mut targets = vec![upstream];
        while let Some(inner) = self.fields.get(upstream).and_then(|f| f.value.wrapped()) {
            targets.push(inner);
            upstream = inner;
        }

        let mut pending = vec![dependent];
        let mut seen = HashSet::new();
        while let Some(id) = pending.pop() {
            if targets.contains(&id) {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(field) = self.fields.get(id) {
                pending.extend(field.listeners.iter().copied());
                pending.extend(field.container);
            }
        }
        false
    }

    /// Walks the cascade a change of `source` would run, without changing
    /// anything, and fails with the error the cascade itself would hit.
    pub(crate) fn check_cascade(&self, source: Source) -> Result<()> {
        self.check_propagate(source, &mut Vec::new())
    }

    fn check_propagate(&self, source: Source, path: &mut Vec<FieldId>) -> Result<()> {
        let Some((listeners, container)) = self.downstream(source) else {
            return Ok(());
        };
        for dependent in listeners {
            self.check_notify(*dependent, path)?;
        }
        if let Some(container) = container {
            self.check_propagate(Source::Field(container), path)?;
        }
        Ok(())
    }

    fn check_notify(&self, dependent: FieldId, path: &mut Vec<FieldId>) -> Result<()> {
        if self.fields.get(dependent).is_none() {
            return Ok(());
        }
        self.guard(dependent, path)?;
        path.push(dependent);
        let result = self.check_propagate(Source::Field(dependent), path);
        path.pop();
        result
    }

    /// Runs a full cascade for a user-driven change of `source`, then
    /// refreshes the sink once. Callers check the cascade with
    /// [`Tree::check_cascade`] before storing their change; the sink is
    /// refreshed even if the cascade still stops early, since the change is
    /// stored by then.
    pub(crate) fn source_changed(&mut self, source: Source) -> Result<()> {
        let mut cascade = Cascade::new(true);
        let result = self.propagate(source, &mut cascade);
        self.sink.refresh();
        result
    }

    /// Listeners of `source` and the list enclosing it, if any.
    fn downstream(&self, source: Source) -> Option<(&[FieldId], Option<FieldId>)> {
        match source {
            Source::Children(block) => self
                .blocks
                .get(&block)
                .map(|block| (block.length_listeners.as_slice(), None)),
            Source::Field(id) => self
                .fields
                .get(id)
                .map(|field| (field.listeners.as_slice(), field.container)),
        }
    }

    pub(crate) fn propagate(&mut self, source: Source, cascade: &mut Cascade) -> Result<()> {
        let Some((listeners, container)) = self
            .downstream(source)
            .map(|(listeners, container)| (listeners.to_vec(), container))
        else {
            return Ok(());
        };

        for dependent in listeners {
            self.notify(dependent, cascade)?;
        }

        // a change inside an element is a change of the enclosing list
        if let Some(container) = container {
            self.propagate(Source::Field(container), cascade)?;
        }
        Ok(())
    }

    fn notify(&mut self, dependent: FieldId, cascade: &mut Cascade) -> Result<()> {
        if self.fields.get(dependent).is_none() {
            // released earlier in this cascade
            return Ok(());
        }
        self.guard(dependent, &cascade.path)?;

        trace!(id = %dependent, "notify");
        cascade.path.push(dependent);
        let result = self.recompute(dependent).and_then(|()| {
            if cascade.refresh && !self.config.coalesce_notifications {
                self.sink.refresh();
            }
            self.propagate(Source::Field(dependent), cascade)
        });
        cascade.path.pop();
        result
    }

    /// Cycle and depth checks for entering `dependent` from `path`.
    fn guard(&self, dependent: FieldId, path: &[FieldId]) -> Result<()> {
        let field = self.fields.try_get(dependent)?;
        if path.contains(&dependent) {
            warn!(field = %field.name, "dependency cycle detected");
            return Err(LightweaveError::DependencyCycle {
                field: field.name.clone(),
            });
        }
        if path.len() >= self.config.max_cascade_depth {
            warn!(field = %field.name, depth = path.len(), "cascade depth limit reached");
            return Err(LightweaveError::CascadeTooDeep {
                depth: self.config.max_cascade_depth,
            });
        }
        Ok(())
    }

    /// Recomputes the derived state of one dependent from its source.
    fn recompute(&mut self, dependent: FieldId) -> Result<()> {
        let field = self.fields.try_get(dependent)?;
        let Some(link) = field.link else {
            return Ok(());
        };

        match &field.value {
            FieldValue::Rely { .. } => {
                let active = self.is_present(link);
                self.fields.try_get_mut(dependent)?.active = active;
            }
            FieldValue::RelyValue { target, .. } => {
                let active = self.raw_value_of(link).as_deref() == Some(target.as_str());
                self.fields.try_get_mut(dependent)?.active = active;
            }
            FieldValue::LinkLength(_) => {
                let len = self.source_len(link);
                self.resize_link(dependent, len)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// A source counts as present when it is active and, for booleans, set.
    /// Child lists are present when non-empty.
    fn is_present(&self, source: Source) -> bool {
        match source {
            Source::Children(block) => self
                .blocks
                .get(&block)
                .is_some_and(|block| !block.children.is_empty()),
            Source::Field(id) => {
                let Some(field) = self.fields.get(id) else {
                    return false;
                };
                let value = self.fields.get(self.fields.unwrap_wrappers(id));
                match value.map(|inner| &inner.value) {
                    Some(FieldValue::Boolean(set)) => field.active && *set,
                    Some(_) => field.active,
                    None => false,
                }
            }
        }
    }

    fn raw_value_of(&self, source: Source) -> Option<String> {
        match source {
            Source::Children(block) => self
                .blocks
                .get(&block)
                .map(|block| block.children.len().to_string()),
            Source::Field(id) => self.fields.raw_value(id),
        }
    }

    fn source_len(&self, source: Source) -> usize {
        match source {
            Source::Children(block) => self
                .blocks
                .get(&block)
                .map_or(0, |block| block.children.len()),
            Source::Field(id) => self.fields.list_len(id),
        }
    }

    /// Grows a link field by cloning its template at the tail, or shrinks it
    /// by dropping tail elements, until it has `len` elements.
    fn resize_link(&mut self, id: FieldId, len: usize) -> Result<()> {
        let field = self.fields.try_get(id)?;
        let owner = field.owner;
        let Some(list) = field.value.composite() else {
            return Err(field.mismatch("link"));
        };
        let current = list.len();
        let template = list.template.clone();

        for _ in current..len {
            let group = self.instantiate_group(owner, &template, Some(id))?;
            if let Some(list) = self.fields.try_get_mut(id)?.value.composite_mut() {
                list.elements.push(group);
            }
        }

        for _ in len..current {
            let removed = self
                .fields
                .try_get_mut(id)?
                .value
                .composite_mut()
                .and_then(|list| list.elements.pop());
            for element in removed.into_iter().flatten() {
                self.release_field(element);
            }
        }

        if current != len {
            trace!(id = %id, from = current, to = len, "link resized");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::{
        catalog::{Catalog, CatalogEntry, FieldSpec, ItemType, LinkSource},
        config::TreeConfig,
    };

    fn counting_tree(catalog: Catalog, config: TreeConfig) -> (Tree, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let tree = Tree::with_catalog(catalog, config, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (tree, count)
    }

    /// System of "chain" objects: a boolean, a rely on it, a rely on the
    /// rely, and a list whose length a link mirrors.
    fn chain_catalog() -> Catalog {
        Catalog::new(vec![
            CatalogEntry::new("System", "", ItemType::System).children(ItemType::Object, 0, None),
            CatalogEntry::new("Chain", "c", ItemType::Object)
                .field(FieldSpec::boolean("enabled"))
                .field(FieldSpec::rely("level", "enabled", FieldSpec::int("level")))
                .field(FieldSpec::rely("offset", "level", FieldSpec::int("offset")))
                .field(FieldSpec::repeat("points", vec![FieldSpec::int("at")]))
                .field(FieldSpec::link(
                    "weights",
                    LinkSource::Field("points".to_string()),
                    vec![FieldSpec::int("weight")],
                ))
                .field(FieldSpec::link(
                    "labels",
                    LinkSource::Field("weights".to_string()),
                    vec![FieldSpec::text("label")],
                )),
        ])
        .unwrap()
    }

    fn chain(tree: &mut Tree) -> BlockId {
        let root = tree.root();
        tree.add_by_type(root, ItemType::Object).unwrap();
        tree.block(root).unwrap().children()[0]
    }

    #[test]
    fn rely_activity_cascades_through_two_links() {
        let (mut tree, _) = counting_tree(chain_catalog(), TreeConfig::default());
        let object = chain(&mut tree);
        let enabled = tree.field_named(object, "enabled").unwrap();
        let level = tree.field_named(object, "level").unwrap();
        let offset = tree.field_named(object, "offset").unwrap();

        assert!(!tree.field(level).unwrap().is_active());
        assert!(!tree.field(offset).unwrap().is_active());

        tree.set_bool(enabled, true).unwrap();
        assert!(tree.field(level).unwrap().is_active());
        assert!(tree.field(offset).unwrap().is_active());

        tree.set_bool(enabled, false).unwrap();
        assert!(!tree.field(offset).unwrap().is_active());
    }

    #[test]
    fn links_follow_links() {
        let (mut tree, _) = counting_tree(chain_catalog(), TreeConfig::default());
        let object = chain(&mut tree);
        let points = tree.field_named(object, "points").unwrap();
        let labels = tree.field_named(object, "labels").unwrap();

        tree.repeat_add(points).unwrap();
        tree.repeat_add(points).unwrap();
        assert_eq!(tree.fields().list_len(labels), 2);

        tree.repeat_remove(points, 0).unwrap();
        assert_eq!(tree.fields().list_len(labels), 1);
    }

    #[test]
    fn coalesced_cascades_refresh_once() {
        let (mut tree, count) = counting_tree(chain_catalog(), TreeConfig::default());
        let object = chain(&mut tree);
        let enabled = tree.field_named(object, "enabled").unwrap();

        count.store(0, Ordering::SeqCst);
        tree.set_bool(enabled, true).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn uncoalesced_cascades_refresh_per_dependent() {
        let config = TreeConfig {
            coalesce_notifications: false,
            ..TreeConfig::default()
        };
        let (mut tree, count) = counting_tree(chain_catalog(), config);
        let object = chain(&mut tree);
        let enabled = tree.field_named(object, "enabled").unwrap();

        count.store(0, Ordering::SeqCst);
        tree.set_bool(enabled, true).unwrap();
        // level, then offset (registered on level and forwarded to its
        // inner int, which does not change here), then the head mutation
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rejected_rebind_keeps_the_previous_source() {
        let (mut tree, _) = counting_tree(chain_catalog(), TreeConfig::default());
        let object = chain(&mut tree);
        let enabled = tree.field_named(object, "enabled").unwrap();
        let level = tree.field_named(object, "level").unwrap();
        let offset = tree.field_named(object, "offset").unwrap();

        // offset already relies on level; closing the loop must fail
        let err = tree.rebind(level, Source::Field(offset)).unwrap_err();
        assert!(matches!(err, LightweaveError::DependencyCycle { .. }));
        assert_eq!(tree.field(level).unwrap().link(), Some(Source::Field(enabled)));
        assert!(!tree.field(offset).unwrap().listeners().contains(&level));

        let before = tree.serialize();
        tree.set_bool(enabled, true).unwrap();
        assert!(tree.field(level).unwrap().is_active());
        assert!(tree.field(offset).unwrap().is_active());
        assert_ne!(tree.serialize(), before);
    }

    #[test]
    fn rebinding_onto_itself_is_a_cycle() {
        let (mut tree, _) = counting_tree(chain_catalog(), TreeConfig::default());
        let object = chain(&mut tree);
        let level = tree.field_named(object, "level").unwrap();

        let err = tree.rebind(level, Source::Field(level)).unwrap_err();
        assert!(matches!(err, LightweaveError::DependencyCycle { .. }));
        assert!(!tree.field(level).unwrap().listeners().contains(&level));
    }

    #[test]
    fn rebind_moves_the_subscription() {
        let (mut tree, count) = counting_tree(chain_catalog(), TreeConfig::default());
        let object = chain(&mut tree);
        let enabled = tree.field_named(object, "enabled").unwrap();
        let offset = tree.field_named(object, "offset").unwrap();
        let level = tree.field_named(object, "level").unwrap();

        count.store(0, Ordering::SeqCst);
        tree.rebind(offset, Source::Field(enabled)).unwrap();
        assert!(!tree.field(level).unwrap().listeners().contains(&offset));
        assert!(tree.field(enabled).unwrap().listeners().contains(&offset));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tree.set_bool(enabled, true).unwrap();
        assert!(tree.field(offset).unwrap().is_active());
    }

    #[test]
    fn too_deep_cascades_change_nothing() {
        let config = TreeConfig {
            max_cascade_depth: 1,
            ..TreeConfig::default()
        };
        let (mut tree, count) = counting_tree(chain_catalog(), config);
        let object = chain(&mut tree);
        let enabled = tree.field_named(object, "enabled").unwrap();
        let level = tree.field_named(object, "level").unwrap();
        let offset = tree.field_named(object, "offset").unwrap();
        let before = tree.serialize();

        count.store(0, Ordering::SeqCst);
        let err = tree.set_bool(enabled, true).unwrap_err();
        assert!(matches!(err, LightweaveError::CascadeTooDeep { depth: 1 }));
        assert_eq!(tree.fields().raw_value(enabled).as_deref(), Some("0"));
        assert!(!tree.field(level).unwrap().is_active());
        assert!(!tree.field(offset).unwrap().is_active());
        assert_eq!(tree.serialize(), before);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
