//! The controller ↔ app pairing relation.
//!
//! A partial bijection: an id may appear as a source at most once and as a
//! target at most once, and binding an id that is already on either side of
//! any pair fails. Kept as two maps in lockstep so lookup works from either
//! direction without scanning.

use std::collections::HashMap;

#[derive(Default)]
pub struct Pairing {
    by_controller: HashMap<String, String>,
    by_app: HashMap<String, String>,
}

impl Pairing {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `id` appears on either side of any pair.
    pub fn is_paired(&self, id: &str) -> bool {
        self.by_controller.contains_key(id) || self.by_app.contains_key(id)
    }

    /// Insert `controller → app`. Fails if either id already appears as a
    /// source or a target.
    pub fn insert(&mut self, controller: &str, app: &str) -> bool {
        if self.is_paired(controller) || self.is_paired(app) {
            return false;
        }
        self.by_controller
            .insert(controller.to_string(), app.to_string());
        self.by_app.insert(app.to_string(), controller.to_string());
        true
    }

    /// Partner of `id`, searched from either direction.
    pub fn partner_of(&self, id: &str) -> Option<&str> {
        self.by_controller
            .get(id)
            .or_else(|| self.by_app.get(id))
            .map(String::as_str)
    }

    /// Remove the pair containing `id`, returning `(controller, app)`.
    pub fn remove(&mut self, id: &str) -> Option<(String, String)> {
        if let Some(app) = self.by_controller.remove(id) {
            self.by_app.remove(&app);
            return Some((id.to_string(), app));
        }
        if let Some(controller) = self.by_app.remove(id) {
            self.by_controller.remove(&controller);
            return Some((controller, id.to_string()));
        }
        None
    }

    /// Controller id of the pair containing `id`, if any.
    pub fn controller_of<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        if self.by_controller.contains_key(id) {
            Some(id)
        } else {
            self.by_app.get(id).map(String::as_str)
        }
    }

    pub fn len(&self) -> usize {
        self.by_controller.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_controller.is_empty()
    }
}
