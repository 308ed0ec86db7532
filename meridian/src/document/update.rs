use serde_json::{Map, Value};

use super::{Document, ID_FIELD};

/// Single modification of an [`Update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Sets the field at a dotted path, creating intermediate objects.
    Set(String, Value),
    /// Removes the field at a dotted path.
    Unset(String),
    /// Replaces the whole document, keeping its identifier.
    Replace(Document),
}

/// Modification applied to documents by [`DocumentStore::update`](super::DocumentStore::update).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    /// Creates an update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an update replacing the document body.
    pub fn replace(document: Document) -> Self {
        Self {
            ops: vec![UpdateOp::Replace(document)],
        }
    }

    /// Adds a field assignment.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(path.into(), value.into()));
        self
    }

    /// Adds a field removal.
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset(path.into()));
        self
    }

    /// Modifications in application order.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Returns true if the update has no modifications.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns true if the update touches the field at `path`, its parents or its children.
    pub fn touches(&self, path: &str) -> bool {
        self.ops.iter().any(|op| match op {
            UpdateOp::Set(p, _) | UpdateOp::Unset(p) => paths_overlap(p, path),
            UpdateOp::Replace(_) => true,
        })
    }

    /// Applies the modifications to `document`.
    pub fn apply(&self, document: &mut Document) {
        for op in &self.ops {
            match op {
                UpdateOp::Set(path, value) => set_path(document, path, value.clone()),
                UpdateOp::Unset(path) => unset_path(document, path),
                UpdateOp::Replace(replacement) => {
                    let id = document.get(ID_FIELD).cloned();
                    *document = replacement.clone();
                    if let Some(id) = id {
                        document.insert(ID_FIELD.to_owned(), id);
                    }
                }
            }
        }
    }
}

fn paths_overlap(a: &str, b: &str) -> bool {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    longer == shorter
        || (longer.starts_with(shorter) && longer.as_bytes().get(shorter.len()) == Some(&b'.'))
}

fn set_path(document: &mut Document, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current: &mut Map<String, Value> = document;
    for segment in segments {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(object) => object,
            _ => return,
        };
    }

    current.insert(leaf.to_owned(), value);
}

fn unset_path(document: &mut Document, path: &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current: &mut Map<String, Value> = document;
    for segment in segments {
        current = match current.get_mut(segment) {
            Some(Value::Object(object)) => object,
            _ => return,
        };
    }

    current.remove(leaf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> Document {
        Document::try_from(value).unwrap()
    }

    #[test]
    fn set_and_unset() {
        let mut doc = document(json!({"_id": "a", "properties": {"name": "x", "size": 1}, "flag": 5}));
        Update::new()
            .set("properties.name", "y")
            .set("flag.nested", true)
            .unset("properties.size")
            .apply(&mut doc);

        assert_eq!(
            Value::from(doc),
            json!({"_id": "a", "properties": {"name": "y"}, "flag": {"nested": true}})
        );
    }

    #[test]
    fn replace_keeps_identifier() {
        let mut doc = document(json!({"_id": "a", "old": 1}));
        Update::replace(document(json!({"new": 2}))).apply(&mut doc);
        assert_eq!(Value::from(doc), json!({"_id": "a", "new": 2}));
    }

    #[test]
    fn touched_paths() {
        let update = Update::new().set("geometry.coordinates", json!([1, 2]));
        assert!(update.touches("geometry"));
        assert!(update.touches("geometry.coordinates.0"));
        assert!(!update.touches("geometryx"));
        assert!(!update.touches("properties"));
        assert!(Update::replace(Document::new()).touches("geometry"));
    }
}
