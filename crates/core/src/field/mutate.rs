use tracing::debug;

use super::{check_token, normalise_color, FieldId, FieldValue};
use crate::{block::Outcome, propagation::Source, Tree, LightweaveError, Result};

/// Value mutators. Each one addressed to a rely field applies to the field it
/// wraps, and every successful change is propagated to dependents before the
/// change sink is refreshed. A change whose cascade would hit a cycle or the
/// depth limit is rejected before anything is stored.
impl Tree {
    /// Sets an int or position field.
    pub fn set_int(&mut self, id: FieldId, value: i64) -> Result<()> {
        let id = self.fields.unwrap_wrappers(id);
        self.check_cascade(Source::Field(id))?;
        let field = self.fields.try_get_mut(id)?;
        match &mut field.value {
            FieldValue::Int(current) | FieldValue::Position(current) => *current = value,
            _ => return Err(field.mismatch("int")),
        }
        self.field_changed(id)
    }

    /// Sets an int or position field from numeric input, truncating toward
    /// zero.
    pub fn set_number(&mut self, id: FieldId, value: f64) -> Result<()> {
        self.set_int(id, value.trunc() as i64)
    }

    pub fn set_bool(&mut self, id: FieldId, value: bool) -> Result<()> {
        let id = self.fields.unwrap_wrappers(id);
        self.check_cascade(Source::Field(id))?;
        let field = self.fields.try_get_mut(id)?;
        match &mut field.value {
            FieldValue::Boolean(current) => *current = value,
            _ => return Err(field.mismatch("boolean")),
        }
        self.field_changed(id)
    }

    /// Selects the option whose wire value is `value`. Unknown values leave
    /// the selection as it was.
    pub fn select(&mut self, id: FieldId, value: &str) -> Result<()> {
        let id = self.fields.unwrap_wrappers(id);
        self.check_cascade(Source::Field(id))?;
        let field = self.fields.try_get_mut(id)?;
        let FieldValue::Select { options, selected } = &mut field.value else {
            return Err(field.mismatch("select"));
        };
        let Some(index) = options.iter().position(|option| option.value == value) else {
            return Err(LightweaveError::InvalidOption {
                field: field.name.clone(),
                value: value.to_string(),
            });
        };
        *selected = index;
        self.field_changed(id)
    }

    pub fn set_text(&mut self, id: FieldId, value: &str) -> Result<()> {
        let id = self.fields.unwrap_wrappers(id);
        self.check_cascade(Source::Field(id))?;
        let field = self.fields.try_get_mut(id)?;
        check_token(&field.name, value)?;
        match &mut field.value {
            FieldValue::Text(current) => *current = value.to_string(),
            _ => return Err(field.mismatch("string")),
        }
        self.field_changed(id)
    }

    /// Sets a colour from `rrggbb` or `#rrggbb`.
    pub fn set_color(&mut self, id: FieldId, value: &str) -> Result<()> {
        let id = self.fields.unwrap_wrappers(id);
        self.check_cascade(Source::Field(id))?;
        let field = self.fields.try_get_mut(id)?;
        if !matches!(field.value, FieldValue::Color(_)) {
            return Err(field.mismatch("color"));
        }
        let hex = normalise_color(&field.name, value)?;
        field.value = FieldValue::Color(hex);
        self.field_changed(id)
    }

    /// Appends a new element built from the template of a repeat field and
    /// returns its fields.
    pub fn repeat_add(&mut self, id: FieldId) -> Result<Vec<FieldId>> {
        let id = self.fields.unwrap_wrappers(id);
        self.check_cascade(Source::Field(id))?;
        let field = self.fields.try_get(id)?;
        let FieldValue::Repeat(list) = &field.value else {
            return Err(field.mismatch("repeat"));
        };
        let owner = field.owner;
        let template = list.template.clone();

        let group = self.instantiate_group(owner, &template, Some(id))?;
        if let Some(list) = self.fields.try_get_mut(id)?.value.composite_mut() {
            list.elements.push(group.clone());
        }
        debug!(field = %id, "repeat element added");
        self.field_changed(id)?;
        Ok(group)
    }

    /// Removes the element at `index` of a repeat field; out of range indices
    /// are ignored.
    pub fn repeat_remove(&mut self, id: FieldId, index: usize) -> Result<Outcome> {
        let id = self.fields.unwrap_wrappers(id);
        self.check_cascade(Source::Field(id))?;
        let field = self.fields.try_get_mut(id)?;
        let FieldValue::Repeat(list) = &mut field.value else {
            return Err(field.mismatch("repeat"));
        };
        if index >= list.elements.len() {
            return Ok(Outcome::Ignored);
        }
        let removed = list.elements.remove(index);

        for element in removed {
            self.release_field(element);
        }
        debug!(field = %id, index, "repeat element removed");
        self.field_changed(id)?;
        Ok(Outcome::Applied)
    }

    fn field_changed(&mut self, id: FieldId) -> Result<()> {
        self.source_changed(Source::Field(id))
    }
}
