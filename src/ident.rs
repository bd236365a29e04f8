use std::collections::BTreeSet;

use crate::sanitize::{sanitize_identifier, sanitize_name};

/// The three tree-wide uniqueness namespaces plus the external html-id
/// reservations. Maintained incrementally by the tree: every claim and
/// release goes through here, so resolution never re-scans nodes.
#[derive(Debug, Clone, Default)]
pub struct IdRegistry {
    ids: BTreeSet<String>,
    names: BTreeSet<String>,
    html_ids: BTreeSet<String>,
    external_html_ids: BTreeSet<String>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every tree-side claim. External html-id reservations survive a
    /// clear: they describe the world outside this tree.
    pub fn clear_tree(&mut self) {
        self.ids.clear();
        self.names.clear();
        self.html_ids.clear();
    }

    /// Record an html id that exists outside the tree's own scope.
    pub fn reserve_external_html_id(&mut self, id: &str) {
        self.external_html_ids.insert(id.to_string());
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn has_html_id(&self, id: &str) -> bool {
        self.html_ids.contains(id) || self.external_html_ids.contains(id)
    }

    /// Sanitize `desired` and bump its suffix until no other node holds it.
    /// `exclude` is the caller's own current value so re-assigning the same
    /// id is a no-op.
    pub fn ensure_unique_id(&self, desired: &str, exclude: Option<&str>) -> String {
        let mut candidate = sanitize_identifier(desired);
        while self.ids.contains(&candidate) && Some(candidate.as_str()) != exclude {
            candidate = bump_suffix(&candidate, '-');
        }
        candidate
    }

    pub fn ensure_unique_name(&self, desired: &str, exclude: Option<&str>) -> String {
        let mut candidate = sanitize_name(desired);
        while self.names.contains(&candidate) && Some(candidate.as_str()) != exclude {
            candidate = bump_suffix(&candidate, '_');
        }
        candidate
    }

    /// Html ids collide against the tree and against anything reserved
    /// outside it.
    pub fn ensure_unique_html_id(&self, desired: &str, exclude: Option<&str>) -> String {
        let mut candidate = sanitize_identifier(desired);
        while self.has_html_id(&candidate) && Some(candidate.as_str()) != exclude {
            candidate = bump_suffix(&candidate, '-');
        }
        candidate
    }

    pub fn claim_id(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    pub fn release_id(&mut self, id: &str) {
        self.ids.remove(id);
    }

    pub fn claim_name(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }

    pub fn release_name(&mut self, name: &str) {
        self.names.remove(name);
    }

    /// A chosen html id is recorded in both the tree namespace and the
    /// external reservations, so later lookups from either side see it.
    pub fn claim_html_id(&mut self, id: &str) {
        self.html_ids.insert(id.to_string());
        self.external_html_ids.insert(id.to_string());
    }

    pub fn release_html_id(&mut self, id: &str) {
        self.html_ids.remove(id);
        self.external_html_ids.remove(id);
    }
}

/// `email` -> `email-2`, `email-2` -> `email-3`. No iteration cap: the
/// suffix space is unbounded, so the caller's loop always terminates.
fn bump_suffix(value: &str, separator: char) -> String {
    if let Some(pos) = value.rfind(separator) {
        let (head, tail) = value.split_at(pos);
        if let Ok(n) = tail[1..].parse::<u64>() {
            return format!("{head}{separator}{}", n + 1);
        }
    }
    format!("{value}{separator}2")
}
