//! Controller command format.
//!
//! A tree compiles to a single line of space separated tokens, written in
//! pre-order: a node's symbol, its active fields, the child count when the
//! node allows more than one child, then every child. List fields always
//! lead with their element count. Inactive fields contribute nothing, not
//! even a delimiter.

use crate::{
    block::{BlockId, Tree},
    field::{bool_token, FieldId, FieldValue},
};

pub const DELIMITER: char = ' ';

/// Accumulates tokens, skipping empty ones.
#[derive(Debug, Default)]
pub struct WireWriter {
    out: String,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }
        if !self.out.is_empty() {
            self.out.push(DELIMITER);
        }
        self.out.push_str(token);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl Tree {
    /// Compiles the whole system.
    pub fn serialize(&self) -> String {
        self.serialize_block(self.root)
    }

    /// Compiles the subtree rooted at `id`; unknown ids give an empty string.
    pub fn serialize_block(&self, id: BlockId) -> String {
        let mut writer = WireWriter::new();
        self.write_block(id, &mut writer);
        writer.finish()
    }

    pub fn serialize_field(&self, id: FieldId) -> String {
        let mut writer = WireWriter::new();
        self.write_field(id, &mut writer);
        writer.finish()
    }

    fn write_block(&self, id: BlockId, writer: &mut WireWriter) {
        let Some(block) = self.blocks.get(&id) else {
            return;
        };

        writer.push(&block.symbol);
        for field in &block.fields {
            self.write_field(*field, writer);
        }
        if block.emits_child_count() {
            writer.push(&block.children.len().to_string());
        }
        for child in &block.children {
            self.write_block(*child, writer);
        }
    }

    fn write_field(&self, id: FieldId, writer: &mut WireWriter) {
        let Some(field) = self.fields.get(id) else {
            return;
        };
        if !field.active {
            return;
        }

        match &field.value {
            FieldValue::Int(value) | FieldValue::Position(value) => {
                writer.push(&value.to_string())
            }
            FieldValue::Boolean(value) => writer.push(bool_token(*value)),
            FieldValue::Select { .. } => {
                if let Some(option) = field.value.selected_option() {
                    writer.push(&option.value);
                }
            }
            FieldValue::Text(value) | FieldValue::Color(value) => writer.push(value),
            FieldValue::Repeat(list) | FieldValue::LinkLength(list) => {
                writer.push(&list.len().to_string());
                for element in list.elements.iter().flatten() {
                    self.write_field(*element, writer);
                }
            }
            FieldValue::Rely { inner } | FieldValue::RelyValue { inner, .. } => {
                self.write_field(*inner, writer)
            }
        }
    }
}
