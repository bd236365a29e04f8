use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::builder::{AttachContext, Hooks};
use crate::layout;
use crate::tree::{NameState, NodeId, NodeKind, Tree};

/// Session-only attribute keys that must never reach persisted output.
const EPHEMERAL_ATTRS: &[&str] = &[
    "instance_handle",
    "fresh_drop",
    "auto_name_active",
    "loaded_from_storage",
    "name_edited",
];

/// One persisted page: its number and document-ordered items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageData {
    pub page: u32,
    #[serde(default)]
    pub content: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Item {
    Field { data: Value },
    Section { data: SectionData },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub html_id: String,
    #[serde(default)]
    pub cssclass: String,
    /// Per-column style overrides; always emitted with exactly one entry per
    /// live column.
    #[serde(default)]
    pub col_styles: Value,
    #[serde(default)]
    pub columns: Vec<ColumnData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnData {
    /// Basis percentage. Zero means "unset, use the default split".
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub items: Vec<Item>,
}

// ---- serialization -------------------------------------------------------

/// Convert the live tree into its persistable shape. Field identifiers are
/// re-normalized first so out-of-band attr edits cannot leak an unsanitized
/// or colliding id into storage.
pub fn serialize(tree: &mut Tree, gap: f64) -> Vec<PageData> {
    heal_field_identifiers(tree);
    let pages: Vec<NodeId> = tree.pages().to_vec();
    pages
        .iter()
        .filter_map(|&page| {
            let number = tree.page(page)?.number;
            Some(PageData {
                page: number,
                content: serialize_items(tree, page, gap),
            })
        })
        .collect()
}

fn serialize_items(tree: &Tree, parent: NodeId, gap: f64) -> Vec<Item> {
    let children = tree
        .node(parent)
        .map(|n| n.children.clone())
        .unwrap_or_default();
    let mut items = Vec::new();
    for child in children {
        match tree.node(child).map(|n| &n.kind) {
            Some(NodeKind::Field(field)) => {
                if field.invalid {
                    continue;
                }
                items.push(Item::Field {
                    data: strip_ephemeral(&field.attrs),
                });
            }
            Some(NodeKind::Section(section)) => {
                if section.invalid {
                    continue;
                }
                items.push(Item::Section {
                    data: serialize_section(tree, child, gap),
                });
            }
            _ => {}
        }
    }
    items
}

/// Serialize one section, healing `col_styles` to exactly the live column
/// count on the way out.
pub fn serialize_section(tree: &Tree, section: NodeId, gap: f64) -> SectionData {
    let Some(node) = tree.section(section) else {
        return SectionData::default();
    };
    let columns = tree.columns(section);
    let styles = healed_col_styles(&node.col_styles, columns.len());
    let bases = tree
        .section_row(section)
        .map(|row| layout::effective_bases(&tree.raw_bases(row), gap))
        .unwrap_or_default();

    SectionData {
        id: node.id.clone(),
        label: node.label.clone(),
        html_id: node.html_id.clone().unwrap_or_default(),
        cssclass: node.css_classes.join(" "),
        col_styles: Value::Array(styles),
        columns: columns
            .iter()
            .enumerate()
            .map(|(index, &column)| ColumnData {
                width: round_width(bases.get(index).copied().unwrap_or(0.0)),
                items: serialize_items(tree, column, gap),
            })
            .collect(),
    }
}

/// Snap widths to 4 decimals so normalization noise never reaches storage
/// and re-serializing an unchanged tree is byte-stable.
fn round_width(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Defensive re-parse of a section's raw `col_styles` JSON: strict JSON
/// first, json5 for hand-edited text, anything else treated as empty. The
/// result is truncated or null-padded to `count`.
pub fn healed_col_styles(raw: &str, count: usize) -> Vec<Value> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => json5::from_str(raw).unwrap_or(Value::Null),
    };
    let mut styles = match parsed {
        Value::Array(entries) => entries,
        _ => Vec::new(),
    };
    styles.truncate(count);
    while styles.len() < count {
        styles.push(Value::Null);
    }
    styles
}

fn strip_ephemeral(attrs: &Value) -> Value {
    let mut data = attrs.clone();
    if let Value::Object(map) = &mut data {
        for key in EPHEMERAL_ATTRS {
            map.remove(*key);
        }
    }
    data
}

/// Re-normalize every field's internal id and name against the registry,
/// preferring what the attrs claim (the surface out-of-band edits touch).
fn heal_field_identifiers(tree: &mut Tree) {
    for field_id in tree.fields() {
        let Some(field) = tree.field(field_id) else {
            continue;
        };
        let current_id = field.id.clone();
        let current_name = field.name.clone();
        let raw_id = field
            .attrs
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&current_id)
            .to_string();
        let raw_name = field
            .attrs
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&current_name)
            .to_string();

        let healed_id = tree.registry.ensure_unique_id(&raw_id, Some(&current_id));
        if healed_id != current_id {
            tree.registry.release_id(&current_id);
            tree.registry.claim_id(&healed_id);
        }
        let healed_name = tree
            .registry
            .ensure_unique_name(&raw_name, Some(&current_name));
        if healed_name != current_name {
            tree.registry.release_name(&current_name);
            tree.registry.claim_name(&healed_name);
        }
        if let Some(field) = tree.field_mut(field_id) {
            field.id = healed_id;
            field.name = healed_name;
        }
        tree.sync_field_attrs(field_id);
    }
}

// ---- deserialization -----------------------------------------------------

/// Replace the whole tree with `pages`. Fields are constructed by the host
/// via [`Hooks::build_field`]; a `None` from the hook drops the item. Fires
/// the structure-loaded notification at the end.
pub fn deserialize(tree: &mut Tree, pages: &[PageData], gap: f64, hooks: &mut dyn Hooks) {
    tree.clear();
    for page_data in pages {
        let page = tree.add_page();
        rebuild_items(tree, &page_data.content, page, gap, hooks);
    }
    hooks.on_structure_loaded(tree);
}

fn rebuild_items(
    tree: &mut Tree,
    items: &[Item],
    parent: NodeId,
    gap: f64,
    hooks: &mut dyn Hooks,
) {
    for item in items {
        match item {
            Item::Field { data } => {
                let Some(attrs) = hooks.build_field(data) else {
                    continue;
                };
                if let Some(field) = tree.attach_field(parent, attrs) {
                    if let Some(node) = tree.field_mut(field) {
                        node.loaded_from_storage = true;
                        node.name_state = NameState::UserEdited;
                    }
                    hooks.on_field_attached(tree, field, AttachContext::Load);
                }
            }
            Item::Section { data } => {
                rebuild_section(tree, data, parent, gap, hooks);
            }
        }
    }
}

/// Reconstruct a section (recursively) from persisted data under `parent`,
/// then retag the whole inserted subtree with fresh instance handles and
/// dedupe it against everything outside it. Persisted data may come from a
/// copy or another document, so its identifiers are only hints.
pub fn rebuild_section(
    tree: &mut Tree,
    data: &SectionData,
    parent: NodeId,
    gap: f64,
    hooks: &mut dyn Hooks,
) -> Option<NodeId> {
    let section = tree.add_section(parent, data.columns.len())?;
    if !data.id.trim().is_empty() {
        tree.set_internal_id(section, &data.id);
    }
    if !data.html_id.trim().is_empty() {
        tree.set_html_id(section, &data.html_id);
    }
    if let Some(node) = tree.section_mut(section) {
        node.label = data.label.clone();
        node.css_classes = data
            .cssclass
            .split_whitespace()
            .map(str::to_string)
            .collect();
        node.col_styles = match &data.col_styles {
            Value::Array(entries) => {
                serde_json::to_string(entries).unwrap_or_else(|_| "[]".to_string())
            }
            Value::String(text) => text.clone(),
            _ => "[]".to_string(),
        };
    }

    let columns = tree.columns(section);
    for (&column, col_data) in columns.iter().zip(&data.columns) {
        if col_data.width > 0.0 && col_data.width.is_finite() {
            if let Some(node) = tree.column_mut(column) {
                node.basis = Some(col_data.width);
            }
        }
        rebuild_items(tree, &col_data.items, column, gap, hooks);
    }

    if let Some(row) = tree.section_row(section) {
        let bases = layout::effective_bases(&tree.raw_bases(row), gap);
        tree.apply_bases(row, &bases);
    }

    tree.retag_subtree(section);
    tree.dedupe_subtree(section);
    Some(section)
}
