// ── Runtime-typed device representation ──
//
// The schema of a device is picked at runtime by the link's model
// reference, so a device is kept as a generic value tree. Every field access
// goes through an explicit path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::meta::{ObjectKey, OwnerReference, TypeMeta};

const METADATA: &str = "metadata";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicObject {
    object: Map<String, Value>,
}

impl DynamicObject {
    /// An empty object of the given type, addressed by `key`.
    pub fn new(types: &TypeMeta, key: &ObjectKey) -> Self {
        let mut obj = Self::default();
        obj.set_path(&["apiVersion"], Value::String(types.api_version.clone()));
        obj.set_path(&["kind"], Value::String(types.kind.clone()));
        obj.set_path(&[METADATA, "name"], Value::String(key.name.clone()));
        obj.set_path(&[METADATA, "namespace"], Value::String(key.namespace.clone()));
        obj
    }

    /// Wrap an arbitrary value. Returns `None` unless it is a mapping.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(object) => Some(Self { object }),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.object)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.object
    }

    // ── Path access ──────────────────────────────────────────────────

    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.object.get(*first)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    /// Set a nested field, creating (or replacing non-mapping) intermediate
    /// levels as needed.
    pub fn set_path(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut current = &mut self.object;
        for segment in parents {
            let entry = current
                .entry((*segment).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                return;
            };
            current = next;
        }
        current.insert((*last).to_owned(), value);
    }

    pub fn remove_path(&mut self, path: &[&str]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut current = &mut self.object;
        for segment in parents {
            current = current.get_mut(*segment)?.as_object_mut()?;
        }
        current.remove(*last)
    }

    fn str_at(&self, path: &[&str]) -> &str {
        self.get_path(path).and_then(Value::as_str).unwrap_or_default()
    }

    /// Read a `string → string` mapping; absent or malformed reads as empty.
    fn string_map_at(&self, path: &[&str]) -> BTreeMap<String, String> {
        self.get_path(path)
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_string_map_at(&mut self, path: &[&str], map: &BTreeMap<String, String>) {
        if map.is_empty() {
            self.remove_path(path);
            return;
        }
        let value = map
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<_, _>>();
        self.set_path(path, Value::Object(value));
    }

    // ── Typed accessors ──────────────────────────────────────────────

    pub fn api_version(&self) -> &str {
        self.str_at(&["apiVersion"])
    }

    pub fn kind(&self) -> &str {
        self.str_at(&["kind"])
    }

    pub fn type_meta(&self) -> TypeMeta {
        TypeMeta::new(self.api_version(), self.kind())
    }

    pub fn name(&self) -> &str {
        self.str_at(&[METADATA, "name"])
    }

    pub fn namespace(&self) -> &str {
        self.str_at(&[METADATA, "namespace"])
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace(), self.name())
    }

    pub fn uid(&self) -> &str {
        self.str_at(&[METADATA, "uid"])
    }

    pub fn set_uid(&mut self, uid: &str) {
        self.set_path(&[METADATA, "uid"], Value::String(uid.to_owned()));
    }

    pub fn resource_version(&self) -> &str {
        self.str_at(&[METADATA, "resourceVersion"])
    }

    pub fn set_resource_version(&mut self, version: &str) {
        self.set_path(
            &[METADATA, "resourceVersion"],
            Value::String(version.to_owned()),
        );
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map_at(&[METADATA, "labels"])
    }

    pub fn set_labels(&mut self, labels: &BTreeMap<String, String>) {
        self.set_string_map_at(&[METADATA, "labels"], labels);
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map_at(&[METADATA, "annotations"])
    }

    pub fn set_annotations(&mut self, annotations: &BTreeMap<String, String>) {
        self.set_string_map_at(&[METADATA, "annotations"], annotations);
    }

    pub fn spec(&self) -> Option<&Map<String, Value>> {
        self.get_path(&["spec"]).and_then(Value::as_object)
    }

    pub fn set_spec(&mut self, spec: Map<String, Value>) {
        self.set_path(&["spec"], Value::Object(spec));
    }

    pub fn owner_references(&self) -> Vec<OwnerReference> {
        self.get_path(&[METADATA, "ownerReferences"])
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn set_owner_references(&mut self, owners: &[OwnerReference]) {
        let value = serde_json::to_value(owners).unwrap_or(Value::Array(Vec::new()));
        self.set_path(&[METADATA, "ownerReferences"], value);
    }

    /// Uid of the controlling owner, if any.
    pub fn controller_uid(&self) -> Option<String> {
        self.owner_references()
            .into_iter()
            .find(|o| o.controller)
            .map(|o| o.uid)
    }

    pub fn is_deleting(&self) -> bool {
        self.get_path(&[METADATA, "deletionTimestamp"])
            .is_some_and(|v| !v.is_null())
    }

    /// Compares exactly the fields rendered from a template. Store-managed
    /// metadata (resource version, uid, timestamps) is ignored.
    pub fn rendered_eq(&self, other: &Self) -> bool {
        self.labels() == other.labels()
            && self.annotations() == other.annotations()
            && self.get_path(&["spec"]) == other.get_path(&["spec"])
    }
}
