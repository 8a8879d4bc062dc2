//! Read-only cursor over a JSON tree that records requested changes

use serde_json::Value;
use std::cell::RefCell;

use super::{PatchProblem, Reason};

/// Escape one JSON pointer segment (`~` -> `~0`, `/` -> `~1`)
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Split a JSON pointer into unescaped segments
///
/// The empty pointer addresses the root and yields no segments.
pub fn parse_pointer(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn to_pointer(path: &[String]) -> String {
    path.iter().map(|s| format!("/{}", escape_segment(s))).collect()
}

#[derive(Debug, Clone)]
pub(crate) enum PatchOp {
    Replace(Value),
    Set { key: String, value: Value },
    Remove { key: String },
}

#[derive(Debug, Clone)]
pub(crate) struct PatchRequest {
    pub path: Vec<String>,
    pub op: PatchOp,
    pub reason: Reason,
    pub patch: Option<String>,
}

impl PatchRequest {
    pub fn pointer(&self) -> String {
        to_pointer(&self.path)
    }
}

/// Collects requests and problems while a patcher runs
#[derive(Debug, Default)]
pub(crate) struct PatchSession {
    requests: RefCell<Vec<PatchRequest>>,
    problems: RefCell<Vec<PatchProblem>>,
    current_patch: RefCell<Option<String>>,
}

impl PatchSession {
    pub fn finish(self) -> (Vec<PatchRequest>, Vec<PatchProblem>) {
        (self.requests.into_inner(), self.problems.into_inner())
    }

    /// Run `f` with every request attributed to the named patch
    pub fn named<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let previous = self.current_patch.replace(Some(name.to_string()));
        let result = f();
        self.current_patch.replace(previous);
        result
    }

    fn request(&self, path: Vec<String>, op: PatchOp, reason: &Reason) {
        self.requests.borrow_mut().push(PatchRequest {
            path,
            op,
            reason: reason.clone(),
            patch: self.current_patch.borrow().clone(),
        });
    }

    fn problem(&self, pointer: String, message: String, reason: &Reason) {
        self.problems.borrow_mut().push(PatchProblem {
            patch: self.current_patch.borrow().clone(),
            pointer,
            message,
            reason: reason.clone(),
        });
    }
}

/// A position in an immutable JSON tree
///
/// Navigation never fails loudly: descending into something that is not
/// there yields `None`. Change requests are recorded, not applied.
#[derive(Clone)]
pub struct Lens<'a> {
    value: &'a Value,
    path: Vec<String>,
    session: &'a PatchSession,
}

impl<'a> Lens<'a> {
    pub(crate) fn root(value: &'a Value, session: &'a PatchSession) -> Self {
        Self {
            value,
            path: Vec::new(),
            session,
        }
    }

    pub(crate) fn session(&self) -> &'a PatchSession {
        self.session
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// JSON pointer of this position
    pub fn pointer(&self) -> String {
        to_pointer(&self.path)
    }

    pub fn is_object(&self) -> bool {
        self.value.is_object()
    }

    fn child(&self, segment: String, value: &'a Value) -> Lens<'a> {
        let mut path = self.path.clone();
        path.push(segment);
        Lens {
            value,
            path,
            session: self.session,
        }
    }

    /// Descend into an object field
    pub fn field(&self, key: &str) -> Option<Lens<'a>> {
        let value = self.value.as_object()?.get(key)?;
        Some(self.child(key.to_string(), value))
    }

    /// Descend into an array element
    pub fn item(&self, index: usize) -> Option<Lens<'a>> {
        let value = self.value.as_array()?.get(index)?;
        Some(self.child(index.to_string(), value))
    }

    /// Follow a pointer relative to this position
    pub fn navigate(&self, pointer: &str) -> Option<Lens<'a>> {
        let mut lens = self.clone();
        for segment in parse_pointer(pointer) {
            lens = match lens.value {
                Value::Object(_) => lens.field(&segment)?,
                Value::Array(_) => lens.item(segment.parse().ok()?)?,
                _ => return None,
            };
        }
        Some(lens)
    }

    /// Direct children: object fields or array elements
    pub fn children(&self) -> Vec<Lens<'a>> {
        match self.value {
            Value::Object(object) => object
                .iter()
                .map(|(k, v)| self.child(k.clone(), v))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| self.child(i.to_string(), v))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Visit this position and every descendant, parents first
    pub fn walk(&self, visit: &mut dyn FnMut(&Lens<'a>)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Request that the value at this position be replaced
    ///
    /// Replacing a value with an equal one records nothing.
    pub fn replace_value(&self, value: Value, reason: &Reason) {
        if *self.value == value {
            return;
        }
        self.session
            .request(self.path.clone(), PatchOp::Replace(value), reason);
    }

    /// Request that `key` be set on the object at this position
    pub fn add_property(&self, key: &str, value: Value, reason: &Reason) {
        if !self.is_object() {
            self.report_problem(format!("cannot add '{}': not an object", key), reason);
            return;
        }
        self.session.request(
            self.path.clone(),
            PatchOp::Set {
                key: key.to_string(),
                value,
            },
            reason,
        );
    }

    /// Request that `key` be removed from the object at this position
    pub fn remove_property(&self, key: &str, reason: &Reason) {
        if self.field(key).is_none() {
            self.report_problem(format!("cannot remove '{}': not present", key), reason);
            return;
        }
        self.session.request(
            self.path.clone(),
            PatchOp::Remove {
                key: key.to_string(),
            },
            reason,
        );
    }

    /// Record that a patch could not be applied here
    pub fn report_problem(&self, message: impl Into<String>, reason: &Reason) {
        self.session.problem(self.pointer(), message.into(), reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pointer_escaping() {
        assert_eq!(escape_segment("a/b~c"), "a~1b~0c");
        assert_eq!(parse_pointer("/a~1b~0c/0"), vec!["a/b~c".to_string(), "0".to_string()]);
        assert!(parse_pointer("").is_empty());
    }

    #[test]
    fn test_navigation() {
        let value = json!({"properties": {"Tags": {"items": [{"type": "string"}]}}});
        let session = PatchSession::default();
        let root = Lens::root(&value, &session);

        let lens = root.navigate("/properties/Tags/items/0/type").unwrap();
        assert_eq!(lens.value(), &json!("string"));
        assert_eq!(lens.pointer(), "/properties/Tags/items/0/type");
        assert!(root.navigate("/properties/Missing").is_none());
        assert!(root.navigate("/properties/Tags/items/x").is_none());
    }

    #[test]
    fn test_walk_visits_parents_first() {
        let value = json!({"a": {"b": [1]}});
        let session = PatchSession::default();
        let mut seen = Vec::new();
        Lens::root(&value, &session).walk(&mut |lens| seen.push(lens.pointer()));
        assert_eq!(seen, vec!["", "/a", "/a/b", "/a/b/0"]);
    }

    #[test]
    fn test_requests_are_recorded_with_patch_name() {
        let value = json!({"x": 1});
        let session = PatchSession::default();
        let reason = Reason::other("test");
        session.named("rename-x", || {
            Lens::root(&value, &session).add_property("y", json!(2), &reason);
        });
        Lens::root(&value, &session).remove_property("z", &reason);

        let (requests, problems) = session.finish();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].patch.as_deref(), Some("rename-x"));
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].patch, None);
    }
}
