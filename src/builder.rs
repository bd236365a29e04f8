use serde_json::Value;

use crate::config::Config;
use crate::guard::{self, Measure};
use crate::layout::{self, LayoutError};
use crate::resize::ResizeDrag;
use crate::structure::{self, PageData};
use crate::tree::{NodeId, Tree};

/// How a field ended up in the tree; field-type collaborators seed
/// different defaults for a fresh drop than for a storage load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachContext {
    Drop,
    Load,
}

/// Host collaborators the core consumes. Field semantics live entirely on
/// the host side; the core only attaches what `build_field` hands back.
pub trait Hooks {
    /// Construct (or veto) a field from persisted data. The default passes
    /// the data through untouched.
    fn build_field(&mut self, data: &Value) -> Option<Value> {
        Some(data.clone())
    }

    fn on_field_attached(&mut self, tree: &Tree, field: NodeId, context: AttachContext) {
        let _ = (tree, field, context);
    }

    /// Usage/limit refresh, invoked after every structural change.
    fn on_usage_changed(&mut self, tree: &Tree) {
        let _ = tree;
    }

    fn on_structure_loaded(&mut self, tree: &Tree) {
        let _ = tree;
    }
}

/// Hook impl for headless hosts (CLI, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Defer the load while a property edit is in flight instead of
    /// yanking the surface out from under the user.
    pub defer_while_editing: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            defer_while_editing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Parked in the pending slot; call [`FormBuilder::poll_pending_load`]
    /// once editing ends.
    Deferred,
}

/// Facade tying the tree, allocator, guard and serializer together behind
/// the host-facing surface.
pub struct FormBuilder<M: Measure, H: Hooks> {
    tree: Tree,
    config: Config,
    measure: M,
    hooks: H,
    editing: bool,
    /// Single pending-load slot; a second deferred load replaces the first
    /// (last call wins, nothing stacks).
    pending_load: Option<Vec<PageData>>,
}

impl<M: Measure, H: Hooks> FormBuilder<M, H> {
    pub fn new(config: Config, measure: M, hooks: H) -> Self {
        Self {
            tree: Tree::new(),
            config,
            measure,
            hooks,
            editing: false,
            pending_load: None,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gap_percent(&self) -> f64 {
        self.config.gap_percent
    }

    fn after_structural_change(&mut self) {
        guard::refresh_all(&mut self.tree, &self.measure, &self.config);
        self.hooks.on_usage_changed(&self.tree);
    }

    // ---- structure edits -------------------------------------------------

    pub fn add_page(&mut self) -> NodeId {
        let page = self.tree.add_page();
        self.after_structural_change();
        page
    }

    pub fn add_section(&mut self, parent: NodeId, columns: usize) -> Option<NodeId> {
        let section = self.tree.add_section(parent, columns)?;
        if let Some(row) = self.tree.section_row(section) {
            let bases = layout::equal_bases(columns, self.config.gap_percent);
            self.tree.apply_bases(row, &bases);
        }
        self.after_structural_change();
        Some(section)
    }

    /// Rebuild a persisted section (copy/paste, template insert) under
    /// `parent`; the inserted subtree comes back retagged and deduped.
    pub fn rebuild_section(
        &mut self,
        data: &structure::SectionData,
        parent: NodeId,
    ) -> Option<NodeId> {
        let section = structure::rebuild_section(
            &mut self.tree,
            data,
            parent,
            self.config.gap_percent,
            &mut self.hooks,
        )?;
        self.after_structural_change();
        Some(section)
    }

    /// Drop a host-described field into a column.
    pub fn drop_field(&mut self, column: NodeId, data: &Value) -> Option<NodeId> {
        let attrs = self.hooks.build_field(data)?;
        let field = self.tree.attach_field(column, attrs)?;
        self.hooks
            .on_field_attached(&self.tree, field, AttachContext::Drop);
        self.after_structural_change();
        Some(field)
    }

    pub fn detach_field(&mut self, field: NodeId) -> bool {
        let detached = self.tree.detach_field(field);
        if detached {
            self.after_structural_change();
        }
        detached
    }

    pub fn attach_detached(&mut self, field: NodeId, column: NodeId, index: usize) -> bool {
        let attached = self.tree.attach_detached(field, column, index);
        if attached {
            self.after_structural_change();
        }
        attached
    }

    pub fn remove_node(&mut self, node: NodeId) {
        self.tree.remove(node);
        self.after_structural_change();
    }

    // ---- identifier edits ------------------------------------------------

    pub fn set_internal_id(&mut self, node: NodeId, raw: &str) -> Option<String> {
        self.tree.set_internal_id(node, raw)
    }

    pub fn set_field_name(&mut self, field: NodeId, raw: &str) -> Option<String> {
        self.tree.set_name(field, raw)
    }

    pub fn set_html_id(&mut self, node: NodeId, raw: &str) -> Option<Option<String>> {
        self.tree.set_html_id(node, raw)
    }

    pub fn reserve_external_html_id(&mut self, id: &str) {
        self.tree.registry.reserve_external_html_id(id);
    }

    // ---- layout ----------------------------------------------------------

    /// Interactive preset application. Unlike the guard path this surfaces
    /// infeasibility to the caller and leaves the layout untouched.
    pub fn apply_layout_preset(&mut self, row: NodeId, weights: &[f64]) -> Result<(), LayoutError> {
        let columns = self.tree.columns(row);
        for &column in &columns {
            guard::apply_col_min(&mut self.tree, column, &self.measure, &self.config);
        }
        let minima: Vec<f64> = columns
            .iter()
            .map(|&c| self.tree.column(c).map(|col| col.min_px).unwrap_or(0.0))
            .collect();
        let row_px = self.measure.row_px_width(&self.tree, row);
        // One weight per live column; a mismatched list degrades to the
        // equal split instead of fitting against the wrong column count.
        let targets = layout::preset_bases(weights, columns.len(), self.config.gap_percent);
        let bases = layout::fit_weights_respecting_min(
            &targets,
            &minima,
            row_px,
            self.config.gap_percent,
            self.config.min_fit_epsilon,
        )?;
        self.tree.apply_bases(row, &bases);
        Ok(())
    }

    pub fn set_equal_bases(&mut self, row: NodeId) {
        let bases = layout::equal_bases(self.tree.columns(row).len(), self.config.gap_percent);
        self.tree.apply_bases(row, &bases);
    }

    pub fn begin_resize(&self, row: NodeId, boundary: usize) -> Option<ResizeDrag> {
        ResizeDrag::begin(&self.tree, row, boundary, &self.measure, &self.config)
    }

    pub fn update_resize(&mut self, drag: &ResizeDrag, dx: f64) {
        drag.update(&mut self.tree, dx);
    }

    pub fn finish_resize(&mut self, drag: ResizeDrag) {
        drag.finish(&mut self.tree, &self.config);
    }

    /// Viewport-resize entry point: recompute floors and refit every row.
    pub fn refresh_min_widths(&mut self) -> usize {
        guard::refresh_all(&mut self.tree, &self.measure, &self.config)
    }

    // ---- persistence surface ---------------------------------------------

    pub fn get_structure(&mut self) -> Vec<PageData> {
        structure::serialize(&mut self.tree, self.config.gap_percent)
    }

    /// Replace the tree with a saved structure. While the host reports an
    /// active property edit the call parks the payload instead; a newer
    /// request simply replaces the parked one.
    pub fn load_saved_structure(&mut self, pages: Vec<PageData>, opts: LoadOptions) -> LoadOutcome {
        if self.editing && opts.defer_while_editing {
            self.pending_load = Some(pages);
            return LoadOutcome::Deferred;
        }
        self.apply_load(&pages);
        LoadOutcome::Loaded
    }

    fn apply_load(&mut self, pages: &[PageData]) {
        structure::deserialize(
            &mut self.tree,
            pages,
            self.config.gap_percent,
            &mut self.hooks,
        );
        self.after_structural_change();
    }

    /// Host signal that a property surface gained or lost focus.
    pub fn set_editing(&mut self, editing: bool) {
        self.editing = editing;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Apply a parked load once editing has ended. Returns whether one ran.
    pub fn poll_pending_load(&mut self) -> bool {
        if self.editing {
            return false;
        }
        let Some(pages) = self.pending_load.take() else {
            return false;
        };
        self.apply_load(&pages);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::FixedMeasure;
    use serde_json::json;

    fn builder() -> FormBuilder<FixedMeasure, NoopHooks> {
        FormBuilder::new(Config::default(), FixedMeasure::default(), NoopHooks)
    }

    fn one_page(field_id: &str) -> Vec<PageData> {
        serde_json::from_value(json!([
            {"page": 1, "content": [
                {"type": "section", "data": {
                    "id": "s",
                    "columns": [{"width": 0.0, "items": [
                        {"type": "field", "data": {"id": field_id}}
                    ]}]
                }}
            ]}
        ]))
        .unwrap()
    }

    #[test]
    fn drop_field_runs_the_build_hook() {
        struct TaggingHooks;
        impl Hooks for TaggingHooks {
            fn build_field(&mut self, data: &Value) -> Option<Value> {
                let mut built = data.clone();
                built["seeded"] = json!(true);
                Some(built)
            }
            fn on_field_attached(&mut self, _: &Tree, _: NodeId, context: AttachContext) {
                assert_eq!(context, AttachContext::Drop);
            }
        }

        let mut builder = FormBuilder::new(Config::default(), FixedMeasure::default(), TaggingHooks);
        let page = builder.add_page();
        let section = builder.add_section(page, 1).unwrap();
        let column = builder.tree().columns(section)[0];
        let field = builder.drop_field(column, &json!({"id": "a"})).unwrap();
        // The hook's transformation made it into the attached attrs.
        assert_eq!(
            builder.tree().field(field).unwrap().attrs["seeded"],
            json!(true)
        );
    }

    #[test]
    fn preset_rejection_leaves_layout_unchanged() {
        let mut builder = builder();
        let page = builder.add_page();
        let section = builder.add_section(page, 2).unwrap();
        let row = builder.tree().section_row(section).unwrap();
        let columns = builder.tree().columns(row);
        builder
            .drop_field(columns[0], &json!({"id": "a", "min_width": "600px"}))
            .unwrap();
        builder
            .drop_field(columns[1], &json!({"id": "b", "min_width": "600px"}))
            .unwrap();

        let before: Vec<Option<f64>> = builder.tree().raw_bases(row);
        let err = builder.apply_layout_preset(row, &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, LayoutError::Infeasible { .. }));
        assert_eq!(builder.tree().raw_bases(row), before);
    }

    #[test]
    fn preset_success_writes_bases() {
        let mut builder = builder();
        let page = builder.add_page();
        let section = builder.add_section(page, 3).unwrap();
        let row = builder.tree().section_row(section).unwrap();
        builder.apply_layout_preset(row, &[1.0, 3.0, 1.0]).unwrap();
        let bases: Vec<f64> = builder
            .tree()
            .raw_bases(row)
            .into_iter()
            .map(Option::unwrap)
            .collect();
        assert!((bases[1] - 56.4).abs() < 0.1, "{bases:?}");
    }

    #[test]
    fn mismatched_preset_length_falls_back_to_equal_split() {
        let mut builder = builder();
        let page = builder.add_page();
        let section = builder.add_section(page, 3).unwrap();
        let row = builder.tree().section_row(section).unwrap();

        // Two weights against three columns: every column is rewritten to
        // the equal split and the row still sums to its budget.
        builder.apply_layout_preset(row, &[1.0, 1.0]).unwrap();
        let bases: Vec<f64> = builder
            .tree()
            .raw_bases(row)
            .into_iter()
            .map(Option::unwrap)
            .collect();
        assert_eq!(bases.len(), 3);
        for basis in &bases {
            assert!((basis - 94.0 / 3.0).abs() < 0.1, "{bases:?}");
        }
        let sum: f64 = bases.iter().sum();
        assert!((sum - 94.0).abs() < 1e-6, "{bases:?}");
    }

    #[test]
    fn load_defers_while_editing_and_last_call_wins() {
        let mut builder = builder();
        builder.set_editing(true);

        let outcome = builder.load_saved_structure(one_page("first"), LoadOptions::default());
        assert_eq!(outcome, LoadOutcome::Deferred);
        let outcome = builder.load_saved_structure(one_page("second"), LoadOptions::default());
        assert_eq!(outcome, LoadOutcome::Deferred);

        // Still editing: nothing runs.
        assert!(!builder.poll_pending_load());
        assert!(builder.tree().fields().is_empty());

        builder.set_editing(false);
        assert!(builder.poll_pending_load());
        assert!(!builder.poll_pending_load());
        let fields = builder.tree().fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(builder.tree().field(fields[0]).unwrap().id, "second");
    }

    #[test]
    fn load_replaces_existing_tree() {
        let mut builder = builder();
        let page = builder.add_page();
        builder.add_section(page, 2).unwrap();

        builder.load_saved_structure(one_page("only"), LoadOptions::default());
        assert_eq!(builder.tree().pages().len(), 1);
        assert_eq!(builder.tree().fields().len(), 1);
        // Page counter restarted with the load.
        let first = builder.tree().pages()[0];
        assert_eq!(builder.tree().page(first).unwrap().number, 1);
    }

    #[test]
    fn structure_loaded_hook_fires() {
        #[derive(Default)]
        struct LoadedFlag(std::rc::Rc<std::cell::Cell<bool>>);
        impl Hooks for LoadedFlag {
            fn on_structure_loaded(&mut self, _: &Tree) {
                self.0.set(true);
            }
        }
        let flag = std::rc::Rc::new(std::cell::Cell::new(false));
        let mut builder = FormBuilder::new(
            Config::default(),
            FixedMeasure::default(),
            LoadedFlag(flag.clone()),
        );
        builder.load_saved_structure(one_page("x"), LoadOptions::default());
        assert!(flag.get());
    }
}
