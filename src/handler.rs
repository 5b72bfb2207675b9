//! The ordered, concurrently-mutable registry of expectation/template
//! pairs with first-match lookup semantics.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::Result;
use crate::expectation::Expectation;
use crate::request::Request;
use crate::response::Response;
use crate::template::Template;

struct Entry {
    expectation: Expectation,
    template: Template,
}

/// Ordered set of `(Expectation, Template)` pairs behind a read-biased
/// lock. Many concurrent [`HandlerSet::lookup`] calls, few
/// [`HandlerSet::add`]/[`HandlerSet::clear`] calls. The lock is only held
/// long enough to clone the `Arc<Entry>` list, never across a template
/// render, so rendering never blocks writers.
#[derive(Default)]
pub struct HandlerSet {
    entries: RwLock<Vec<Arc<Entry>>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        HandlerSet::default()
    }

    /// Appends a pair. Never fails; no de-duplication.
    pub fn add(&self, expectation: Expectation, template: Template) {
        self.entries.write().push(Arc::new(Entry {
            expectation,
            template,
        }));
    }

    /// Truncates to empty. The `HandlerSet` itself keeps its identity,
    /// only its contents are discarded.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluates expectations in insertion order and renders the first
    /// one that accepts. Returns `Ok(None)` when nothing matches; that's
    /// a plain no-match signal, not an error at this layer, and it's the
    /// transport layer that turns a `None` into a 404. A render failure
    /// on the first matching expectation is returned directly, and later
    /// expectations are never consulted: we never fall through to later
    /// handlers on render failure.
    pub fn lookup(&self, req: &Request) -> Result<Option<Response>> {
        // Snapshot the list under the read lock, then release it before
        // any matching or rendering happens. An `Add` that serializes
        // after this clone is simply not visible to this lookup.
        let snapshot = self.entries.read().clone();

        for entry in snapshot.iter() {
            if let Some(m) = entry.expectation.matches(req) {
                return entry.template.respond(req, &m).map(Some);
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn expect_path(pattern: &str) -> Expectation {
        Expectation::new("", pattern, &BTreeMap::new(), "").unwrap()
    }

    fn body_template(body: &str) -> Template {
        Template::new("", &BTreeMap::new(), body).unwrap()
    }

    fn req(path: &str) -> crate::request::Request {
        crate::request::Request::new(
            "GET",
            path,
            crate::request::MultiMap::new(),
            b"",
            "",
            crate::request::MultiMap::new(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn first_match_wins() {
        let set = HandlerSet::new();
        set.add(expect_path("^/a"), body_template("A"));
        set.add(expect_path("^/a/b"), body_template("B"));

        let resp = set.lookup(&req("/a/b")).unwrap().unwrap();
        assert_eq!(resp.body, b"A");
    }

    #[test]
    fn no_match_returns_none_not_error() {
        let set = HandlerSet::new();
        set.add(expect_path("^/only-this$"), body_template("hit"));
        assert!(set.lookup(&req("/elsewhere")).unwrap().is_none());
    }

    #[test]
    fn clear_empties_the_set_but_keeps_its_identity() {
        let set = HandlerSet::new();
        set.add(expect_path("^/a$"), body_template("A"));
        assert_eq!(set.len(), 1);
        set.clear();
        assert_eq!(set.len(), 0);
        set.add(expect_path("^/b$"), body_template("B"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn duplicate_pairs_are_permitted() {
        let set = HandlerSet::new();
        set.add(expect_path("^/a$"), body_template("1"));
        set.add(expect_path("^/a$"), body_template("2"));
        assert_eq!(set.len(), 2);
        // first registration still wins
        assert_eq!(set.lookup(&req("/a")).unwrap().unwrap().body, b"1");
    }

    #[test]
    fn render_failure_on_matching_handler_does_not_fall_through() {
        let set = HandlerSet::new();
        set.add(expect_path("^/x$"), body_template("{{strict_index BodyGroups 9}}"));
        set.add(expect_path("^/x$"), body_template("never reached"));
        assert!(set.lookup(&req("/x")).is_err());
    }
}
