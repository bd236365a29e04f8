use std::collections::BTreeSet;

use serde_json::Value;

use crate::ident::IdRegistry;

/// Handle into the tree's node arena. Stable for the life of the node;
/// slots are not reused, so a stale handle resolves to `None` rather than
/// to some unrelated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Name lifecycle of a field. `Fresh` means the name still auto-tracks the
/// label; the first explicit rename moves it to `UserEdited` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameState {
    Fresh,
    UserEdited,
}

#[derive(Debug, Clone)]
pub struct PageNode {
    pub number: u32,
}

#[derive(Debug, Clone)]
pub struct SectionNode {
    /// Session-scoped instance handle; never persisted.
    pub handle: u64,
    pub id: String,
    pub html_id: Option<String>,
    pub label: String,
    pub css_classes: Vec<String>,
    /// Raw JSON text of the per-column style overrides, healed to the live
    /// column count at serialization time.
    pub col_styles: String,
    /// Structurally invalid sections stay in the tree but are skipped when
    /// serializing, like invalid fields.
    pub invalid: bool,
}

#[derive(Debug, Clone)]
pub struct ColumnNode {
    /// Raw percentage share; `None` until something assigns one.
    pub basis: Option<f64>,
    /// Pixel floor maintained by the min-width guard.
    pub min_px: f64,
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    pub handle: u64,
    pub id: String,
    pub name: String,
    pub html_id: Option<String>,
    /// Type-specific attributes, opaque to the core. Always a JSON object.
    pub attrs: Value,
    pub name_state: NameState,
    pub loaded_from_storage: bool,
    /// Structurally invalid fields stay in the tree but are skipped when
    /// serializing.
    pub invalid: bool,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Page(PageNode),
    Section(SectionNode),
    /// Implicit horizontal wrapper a section owns; its children are the
    /// columns.
    Row,
    Column(ColumnNode),
    Field(FieldNode),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

/// The live form tree: an arena of nodes plus the identifier registry kept
/// in lockstep with it. Rendering consumes this read-only; all mutation
/// funnels through the methods here so the registry never drifts.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    pages: Vec<NodeId>,
    pub registry: IdRegistry,
    next_handle: u64,
    page_counter: u32,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every node and reset the page counter. External html-id
    /// reservations are kept.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.pages.clear();
        self.page_counter = 0;
        self.registry.clear_tree();
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(|slot| slot.as_mut())
    }

    fn alloc(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            parent,
            children: Vec::new(),
            kind,
        }));
        id
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn pages(&self) -> &[NodeId] {
        &self.pages
    }

    pub fn page(&self, id: NodeId) -> Option<&PageNode> {
        match &self.node(id)?.kind {
            NodeKind::Page(page) => Some(page),
            _ => None,
        }
    }

    pub fn section(&self, id: NodeId) -> Option<&SectionNode> {
        match &self.node(id)?.kind {
            NodeKind::Section(section) => Some(section),
            _ => None,
        }
    }

    pub fn section_mut(&mut self, id: NodeId) -> Option<&mut SectionNode> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Section(section) => Some(section),
            _ => None,
        }
    }

    pub fn column(&self, id: NodeId) -> Option<&ColumnNode> {
        match &self.node(id)?.kind {
            NodeKind::Column(column) => Some(column),
            _ => None,
        }
    }

    pub fn column_mut(&mut self, id: NodeId) -> Option<&mut ColumnNode> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Column(column) => Some(column),
            _ => None,
        }
    }

    pub fn field(&self, id: NodeId) -> Option<&FieldNode> {
        match &self.node(id)?.kind {
            NodeKind::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, id: NodeId) -> Option<&mut FieldNode> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn is_section(&self, id: NodeId) -> bool {
        matches!(self.node(id).map(|n| &n.kind), Some(NodeKind::Section(_)))
    }

    pub fn is_field(&self, id: NodeId) -> bool {
        matches!(self.node(id).map(|n| &n.kind), Some(NodeKind::Field(_)))
    }

    // ---- construction ----------------------------------------------------

    pub fn add_page(&mut self) -> NodeId {
        self.page_counter += 1;
        let number = self.page_counter;
        let id = self.alloc(None, NodeKind::Page(PageNode { number }));
        self.pages.push(id);
        id
    }

    /// Create a fresh section (with its implicit row and `columns` empty
    /// columns) under a page or a column.
    pub fn add_section(&mut self, parent: NodeId, columns: usize) -> Option<NodeId> {
        match self.node(parent)?.kind {
            NodeKind::Page(_) | NodeKind::Column(_) => {}
            _ => return None,
        }
        let internal_id = self.registry.ensure_unique_id("section", None);
        self.registry.claim_id(&internal_id);
        let handle = self.next_handle();
        let section = self.alloc(
            Some(parent),
            NodeKind::Section(SectionNode {
                handle,
                id: internal_id,
                html_id: None,
                label: String::new(),
                css_classes: Vec::new(),
                col_styles: "[]".to_string(),
                invalid: false,
            }),
        );
        self.node_mut(parent)
            .expect("parent checked above")
            .children
            .push(section);
        let row = self.alloc(Some(section), NodeKind::Row);
        self.node_mut(section).unwrap().children.push(row);
        for _ in 0..columns {
            self.add_column(section);
        }
        Some(section)
    }

    pub fn add_column(&mut self, section: NodeId) -> Option<NodeId> {
        let row = self.section_row(section)?;
        let column = self.alloc(
            Some(row),
            NodeKind::Column(ColumnNode {
                basis: None,
                min_px: 0.0,
            }),
        );
        self.node_mut(row)?.children.push(column);
        Some(column)
    }

    pub fn remove_column(&mut self, section: NodeId, index: usize) -> bool {
        let Some(row) = self.section_row(section) else {
            return false;
        };
        let Some(&column) = self.node(row).and_then(|n| n.children.get(index)) else {
            return false;
        };
        self.remove(column);
        true
    }

    /// Attach a host-built field to a column (or directly to a page, for
    /// top-level items). Identifier hints are read from the attrs (`id`,
    /// `name`, `html_id`) and resolved against the registry; the chosen
    /// values are written back into the attrs.
    pub fn attach_field(&mut self, column: NodeId, attrs: Value) -> Option<NodeId> {
        match self.node(column)?.kind {
            NodeKind::Column(_) | NodeKind::Page(_) => {}
            _ => return None,
        }
        let attrs = match attrs {
            Value::Object(map) => Value::Object(map),
            _ => return None,
        };

        let id_hint = attrs.get("id").and_then(Value::as_str).unwrap_or("field");
        let name_hint = attrs.get("name").and_then(Value::as_str).unwrap_or(id_hint);
        let html_hint = attrs
            .get("html_id")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        let internal_id = self.registry.ensure_unique_id(id_hint, None);
        self.registry.claim_id(&internal_id);
        let name = self.registry.ensure_unique_name(name_hint, None);
        self.registry.claim_name(&name);
        let html_id = html_hint.map(|hint| {
            let chosen = self.registry.ensure_unique_html_id(&hint, None);
            self.registry.claim_html_id(&chosen);
            chosen
        });

        let handle = self.next_handle();
        let field = self.alloc(
            Some(column),
            NodeKind::Field(FieldNode {
                handle,
                id: internal_id,
                name,
                html_id,
                attrs,
                name_state: NameState::Fresh,
                loaded_from_storage: false,
                invalid: false,
            }),
        );
        self.node_mut(column)?.children.push(field);
        self.sync_field_attrs(field);
        Some(field)
    }

    /// Unlink a field from its column without releasing its identifiers, so
    /// a reorder can re-attach it elsewhere without a rename.
    pub fn detach_field(&mut self, field: NodeId) -> bool {
        if self.field(field).is_none() {
            return false;
        }
        let Some(parent) = self.node(field).and_then(|n| n.parent) else {
            return false;
        };
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.retain(|&c| c != field);
        }
        if let Some(node) = self.node_mut(field) {
            node.parent = None;
        }
        true
    }

    /// Re-attach a detached field at `index` (clamped) in `column`.
    pub fn attach_detached(&mut self, field: NodeId, column: NodeId, index: usize) -> bool {
        let detached = self
            .node(field)
            .is_some_and(|n| n.parent.is_none() && matches!(n.kind, NodeKind::Field(_)));
        if !detached || self.column(column).is_none() {
            return false;
        }
        let len = self.node(column).map(|n| n.children.len()).unwrap_or(0);
        let at = index.min(len);
        self.node_mut(column).unwrap().children.insert(at, field);
        self.node_mut(field).unwrap().parent = Some(column);
        true
    }

    /// Delete a node and its whole subtree, releasing identifier claims.
    /// Nothing is renumbered or reassigned afterwards.
    pub fn remove(&mut self, id: NodeId) {
        let parent = self.node(id).and_then(|n| n.parent);
        for node in self.subtree(id) {
            match self.node(node).map(|n| n.kind.clone()) {
                Some(NodeKind::Field(field)) => {
                    self.registry.release_id(&field.id);
                    self.registry.release_name(&field.name);
                    if let Some(html_id) = &field.html_id {
                        self.registry.release_html_id(html_id);
                    }
                }
                Some(NodeKind::Section(section)) => {
                    self.registry.release_id(&section.id);
                    if let Some(html_id) = &section.html_id {
                        self.registry.release_html_id(html_id);
                    }
                }
                _ => {}
            }
            self.nodes[node.0 as usize] = None;
        }
        match parent {
            Some(parent) => {
                if let Some(parent_node) = self.node_mut(parent) {
                    parent_node.children.retain(|&c| c != id);
                }
            }
            None => self.pages.retain(|&p| p != id),
        }
    }

    // ---- identifiers -----------------------------------------------------

    /// Sanitize, resolve uniqueness (excluding the node itself) and write
    /// the internal id. Returns the value actually chosen.
    pub fn set_internal_id(&mut self, node: NodeId, raw: &str) -> Option<String> {
        let current = match &self.node(node)?.kind {
            NodeKind::Field(f) => f.id.clone(),
            NodeKind::Section(s) => s.id.clone(),
            _ => return None,
        };
        let chosen = self.registry.ensure_unique_id(raw, Some(&current));
        if chosen != current {
            self.registry.release_id(&current);
            self.registry.claim_id(&chosen);
        }
        match &mut self.node_mut(node)?.kind {
            NodeKind::Field(f) => f.id = chosen.clone(),
            NodeKind::Section(s) => s.id = chosen.clone(),
            _ => unreachable!(),
        }
        self.sync_field_attrs(node);
        Some(chosen)
    }

    /// Field-name counterpart of [`set_internal_id`]; marks the name as
    /// user-edited so auto-naming stops tracking the label.
    pub fn set_name(&mut self, node: NodeId, raw: &str) -> Option<String> {
        let current = self.field(node)?.name.clone();
        let chosen = self.registry.ensure_unique_name(raw, Some(&current));
        if chosen != current {
            self.registry.release_name(&current);
            self.registry.claim_name(&chosen);
        }
        let field = self.field_mut(node)?;
        field.name = chosen.clone();
        field.name_state = NameState::UserEdited;
        self.sync_field_attrs(node);
        Some(chosen)
    }

    /// Set or clear the public external id. Empty input clears rather than
    /// assigning a default.
    pub fn set_html_id(&mut self, node: NodeId, raw: &str) -> Option<Option<String>> {
        let current = match &self.node(node)?.kind {
            NodeKind::Field(f) => f.html_id.clone(),
            NodeKind::Section(s) => s.html_id.clone(),
            _ => return None,
        };
        let trimmed = raw.trim();
        let chosen = if trimmed.is_empty() {
            None
        } else {
            Some(
                self.registry
                    .ensure_unique_html_id(trimmed, current.as_deref()),
            )
        };
        if chosen != current {
            if let Some(old) = &current {
                self.registry.release_html_id(old);
            }
            if let Some(new) = &chosen {
                self.registry.claim_html_id(new);
            }
        }
        match &mut self.node_mut(node)?.kind {
            NodeKind::Field(f) => f.html_id = chosen.clone(),
            NodeKind::Section(s) => s.html_id = chosen.clone(),
            _ => unreachable!(),
        }
        self.sync_field_attrs(node);
        Some(chosen)
    }

    /// Keep the chosen identifiers visible in the field's own attrs, which
    /// is where collaborators and the serializer read them back.
    pub(crate) fn sync_field_attrs(&mut self, node: NodeId) {
        let Some(field) = self.field_mut(node) else {
            return;
        };
        let (id, name, html_id) = (field.id.clone(), field.name.clone(), field.html_id.clone());
        if let Value::Object(map) = &mut field.attrs {
            map.insert("id".to_string(), Value::String(id));
            map.insert("name".to_string(), Value::String(name));
            match html_id {
                Some(html_id) => {
                    map.insert("html_id".to_string(), Value::String(html_id));
                }
                None => {
                    map.remove("html_id");
                }
            }
        }
    }

    // ---- traversal -------------------------------------------------------

    /// Document-order ids of `root` and everything below it.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            out.push(id);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Every node of every page, document order.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &page in &self.pages {
            out.extend(self.subtree(page));
        }
        out
    }

    /// All field nodes, document order.
    pub fn fields(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|&id| self.is_field(id))
            .collect()
    }

    pub fn section_row(&self, section: NodeId) -> Option<NodeId> {
        if self.section(section).is_none() {
            return None;
        }
        self.node(section)?.children.first().copied()
    }

    /// Columns of a row (or of a section, resolving through its row).
    pub fn columns(&self, node: NodeId) -> Vec<NodeId> {
        let row = match self.node(node).map(|n| &n.kind) {
            Some(NodeKind::Row) => Some(node),
            Some(NodeKind::Section(_)) => self.section_row(node),
            _ => None,
        };
        row.and_then(|r| self.node(r))
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn column_count(&self, section: NodeId) -> usize {
        self.columns(section).len()
    }

    /// Every row in the tree (one per section), document order.
    pub fn rows(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|&id| matches!(self.node(id).map(|n| &n.kind), Some(NodeKind::Row)))
            .collect()
    }

    /// Raw basis shares for a row's columns, in order.
    pub fn raw_bases(&self, row: NodeId) -> Vec<Option<f64>> {
        self.columns(row)
            .iter()
            .map(|&c| self.column(c).and_then(|col| col.basis))
            .collect()
    }

    /// Write normalized shares back onto a row's columns. Extra entries are
    /// ignored, missing ones leave the column untouched.
    pub fn apply_bases(&mut self, row: NodeId, bases: &[f64]) {
        let columns = self.columns(row);
        for (column, basis) in columns.into_iter().zip(bases.iter().copied()) {
            if let Some(col) = self.column_mut(column) {
                col.basis = Some(basis);
            }
        }
    }

    // ---- subtree healing -------------------------------------------------

    /// Stamp fresh instance handles on every field and section under `root`
    /// (inclusive). Run after any copy, reparent, or rebuild so live-object
    /// identity never survives into the inserted subtree.
    pub fn retag_subtree(&mut self, root: NodeId) {
        for id in self.subtree(root) {
            let handle = self.next_handle();
            match self.node_mut(id).map(|n| &mut n.kind) {
                Some(NodeKind::Field(field)) => field.handle = handle,
                Some(NodeKind::Section(section)) => section.handle = handle,
                _ => {}
            }
        }
    }

    /// Rewrite any internal id, name, or html id inside `root`'s subtree
    /// that collides with a node outside it, using the same suffix-bump
    /// strategy as the setters. The subtree's own claims are released first
    /// so it only competes with the rest of the tree, then re-claimed in
    /// document order (so duplicates inside the subtree also separate).
    pub fn dedupe_subtree(&mut self, root: NodeId) {
        let nodes = self.subtree(root);
        let inside: BTreeSet<NodeId> = nodes.iter().copied().collect();

        for &id in &nodes {
            match self.node(id).map(|n| n.kind.clone()) {
                Some(NodeKind::Field(field)) => {
                    self.registry.release_id(&field.id);
                    self.registry.release_name(&field.name);
                    if let Some(html_id) = &field.html_id {
                        self.registry.release_html_id(html_id);
                    }
                }
                Some(NodeKind::Section(section)) => {
                    self.registry.release_id(&section.id);
                    if let Some(html_id) = &section.html_id {
                        self.registry.release_html_id(html_id);
                    }
                }
                _ => {}
            }
        }

        // Claims are sets, so releasing a subtree value also drops it for an
        // outside node holding the same value. Re-claim everything outside
        // before resolving, so the subtree competes with the full rest of
        // the tree.
        for id in self.walk() {
            if inside.contains(&id) {
                continue;
            }
            match self.node(id).map(|n| n.kind.clone()) {
                Some(NodeKind::Field(field)) => {
                    self.registry.claim_id(&field.id);
                    self.registry.claim_name(&field.name);
                    if let Some(html_id) = &field.html_id {
                        self.registry.claim_html_id(html_id);
                    }
                }
                Some(NodeKind::Section(section)) => {
                    self.registry.claim_id(&section.id);
                    if let Some(html_id) = &section.html_id {
                        self.registry.claim_html_id(html_id);
                    }
                }
                _ => {}
            }
        }

        for &id in &nodes {
            match self.node(id).map(|n| n.kind.clone()) {
                Some(NodeKind::Field(field)) => {
                    let new_id = self.registry.ensure_unique_id(&field.id, None);
                    self.registry.claim_id(&new_id);
                    let new_name = self.registry.ensure_unique_name(&field.name, None);
                    self.registry.claim_name(&new_name);
                    let new_html = field.html_id.as_ref().map(|html_id| {
                        let chosen = self.registry.ensure_unique_html_id(html_id, None);
                        self.registry.claim_html_id(&chosen);
                        chosen
                    });
                    let f = self.field_mut(id).expect("field exists");
                    f.id = new_id;
                    f.name = new_name;
                    f.html_id = new_html;
                    self.sync_field_attrs(id);
                }
                Some(NodeKind::Section(section)) => {
                    let new_id = self.registry.ensure_unique_id(&section.id, None);
                    self.registry.claim_id(&new_id);
                    let new_html = section.html_id.as_ref().map(|html_id| {
                        let chosen = self.registry.ensure_unique_html_id(html_id, None);
                        self.registry.claim_html_id(&chosen);
                        chosen
                    });
                    let s = self.section_mut(id).expect("section exists");
                    s.id = new_id;
                    s.html_id = new_html;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree_with_section(columns: usize) -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new();
        let page = tree.add_page();
        let section = tree.add_section(page, columns).unwrap();
        (tree, page, section)
    }

    #[test]
    fn pages_are_counter_numbered() {
        let mut tree = Tree::new();
        let first = tree.add_page();
        let second = tree.add_page();
        assert_eq!(tree.page(first).unwrap().number, 1);
        assert_eq!(tree.page(second).unwrap().number, 2);
        tree.clear();
        let again = tree.add_page();
        assert_eq!(tree.page(again).unwrap().number, 1);
    }

    #[test]
    fn section_owns_row_and_columns() {
        let (tree, _page, section) = tree_with_section(3);
        assert_eq!(tree.column_count(section), 3);
        let row = tree.section_row(section).unwrap();
        assert_eq!(tree.columns(row).len(), 3);
    }

    #[test]
    fn attach_field_resolves_identifier_hints() {
        let (mut tree, _page, section) = tree_with_section(1);
        let column = tree.columns(section)[0];
        let a = tree
            .attach_field(column, json!({"id": "Email", "type": "text"}))
            .unwrap();
        let b = tree
            .attach_field(column, json!({"id": "Email", "type": "text"}))
            .unwrap();
        let (id_a, id_b) = (tree.field(a).unwrap().id.clone(), tree.field(b).unwrap().id.clone());
        assert_eq!(id_a, "email");
        assert_ne!(id_a, id_b);
        assert_ne!(tree.field(a).unwrap().name, tree.field(b).unwrap().name);
        // Chosen ids are mirrored into the attrs.
        assert_eq!(tree.field(b).unwrap().attrs["id"], json!(id_b));
    }

    #[test]
    fn instance_handles_are_unique_per_live_object() {
        let (mut tree, _page, section) = tree_with_section(1);
        let column = tree.columns(section)[0];
        let a = tree.attach_field(column, json!({"id": "a"})).unwrap();
        let b = tree.attach_field(column, json!({"id": "b"})).unwrap();
        assert_ne!(tree.field(a).unwrap().handle, tree.field(b).unwrap().handle);
    }

    #[test]
    fn set_name_marks_user_edited() {
        let (mut tree, _page, section) = tree_with_section(1);
        let column = tree.columns(section)[0];
        let field = tree.attach_field(column, json!({"id": "a"})).unwrap();
        assert_eq!(tree.field(field).unwrap().name_state, NameState::Fresh);
        let chosen = tree.set_name(field, "My Name").unwrap();
        assert_eq!(chosen, "my_name");
        assert_eq!(tree.field(field).unwrap().name_state, NameState::UserEdited);
    }

    #[test]
    fn html_id_clears_on_empty_input() {
        let (mut tree, _page, section) = tree_with_section(1);
        let column = tree.columns(section)[0];
        let field = tree.attach_field(column, json!({"id": "a"})).unwrap();
        tree.set_html_id(field, "anchor");
        assert_eq!(tree.field(field).unwrap().html_id.as_deref(), Some("anchor"));
        assert!(tree.registry.has_html_id("anchor"));
        tree.set_html_id(field, "   ");
        assert_eq!(tree.field(field).unwrap().html_id, None);
        assert!(!tree.registry.has_html_id("anchor"));
    }

    #[test]
    fn html_id_respects_external_reservations() {
        let (mut tree, _page, section) = tree_with_section(1);
        tree.registry.reserve_external_html_id("hero");
        let column = tree.columns(section)[0];
        let field = tree.attach_field(column, json!({"id": "a"})).unwrap();
        let chosen = tree.set_html_id(field, "hero").unwrap().unwrap();
        assert_eq!(chosen, "hero-2");
    }

    #[test]
    fn setting_same_id_is_a_noop() {
        let (mut tree, _page, section) = tree_with_section(1);
        let column = tree.columns(section)[0];
        let field = tree.attach_field(column, json!({"id": "email"})).unwrap();
        assert_eq!(tree.set_internal_id(field, "email").unwrap(), "email");
    }

    #[test]
    fn remove_releases_claims_without_renumbering() {
        let (mut tree, _page, section) = tree_with_section(1);
        let column = tree.columns(section)[0];
        let field = tree.attach_field(column, json!({"id": "email"})).unwrap();
        let survivor = tree.attach_field(column, json!({"id": "email"})).unwrap();
        let survivor_id = tree.field(survivor).unwrap().id.clone();
        tree.remove(field);
        assert!(tree.field(field).is_none());
        assert!(!tree.registry.has_id("email"));
        // The survivor keeps its suffixed id; nothing is reassigned.
        assert_eq!(tree.field(survivor).unwrap().id, survivor_id);
        assert_ne!(survivor_id, "email");
    }

    #[test]
    fn detach_and_reattach_keeps_identifiers() {
        let (mut tree, _page, section) = tree_with_section(2);
        let columns = tree.columns(section);
        let field = tree.attach_field(columns[0], json!({"id": "email"})).unwrap();
        assert!(tree.detach_field(field));
        assert!(tree.registry.has_id("email"));
        assert!(tree.attach_detached(field, columns[1], 0));
        assert_eq!(tree.node(field).unwrap().parent, Some(columns[1]));
        assert_eq!(tree.field(field).unwrap().id, "email");
    }

    #[test]
    fn dedupe_rewrites_only_inside_the_subtree() {
        let (mut tree, page, section_a) = tree_with_section(1);
        let col_a = tree.columns(section_a)[0];
        let outside = tree.attach_field(col_a, json!({"id": "email"})).unwrap();

        let section_b = tree.add_section(page, 1).unwrap();
        let col_b = tree.columns(section_b)[0];
        let inside = tree.attach_field(col_b, json!({"id": "contact"})).unwrap();
        // Simulate a copied subtree carrying a colliding id in by force.
        tree.registry.release_id("contact");
        tree.field_mut(inside).unwrap().id = "email".to_string();
        tree.registry.claim_id("email");

        tree.dedupe_subtree(section_b);

        assert_eq!(tree.field(outside).unwrap().id, "email");
        let healed = tree.field(inside).unwrap().id.clone();
        assert_ne!(healed, "email");
        assert!(tree.registry.has_id(&healed));
    }

    #[test]
    fn retag_assigns_fresh_handles() {
        let (mut tree, _page, section) = tree_with_section(1);
        let column = tree.columns(section)[0];
        let field = tree.attach_field(column, json!({"id": "a"})).unwrap();
        let before = tree.field(field).unwrap().handle;
        tree.retag_subtree(section);
        assert_ne!(tree.field(field).unwrap().handle, before);
    }
}
