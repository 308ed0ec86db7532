//! In-process document store.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;
use parking_lot::RwLock;
use uuid::Uuid;

use super::filter::compare_values;
use super::{
    Document, DocumentClient, DocumentStore, FeatureId, Filter, FindOptions, SortOrder, Update,
    UpdateResult, ID_FIELD,
};
use crate::error::StoreError;

/// Document store database keeping all collections in memory.
///
/// Documents are returned in insertion order unless a sort is requested.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<AHashMap<String, MemoryCollection>>,
}

#[derive(Debug, Default)]
struct MemoryCollection {
    next_seq: u64,
    documents: BTreeMap<u64, Document>,
    ids: AHashMap<FeatureId, u64>,
}

impl MemoryCollection {
    fn prepare(&self, mut document: Document) -> Result<(FeatureId, Document), StoreError> {
        let id = match document.id() {
            Some(id) => id,
            None => {
                let id = FeatureId::new(Uuid::new_v4().simple().to_string());
                document.set_id(&id);
                id
            }
        };

        if self.ids.contains_key(&id) {
            return Err(StoreError::Uniqueness(id.to_string()));
        }

        Ok((id, document))
    }

    fn push(&mut self, id: FeatureId, document: Document) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.documents.insert(seq, document);
        self.ids.insert(id, seq);
    }

    fn matching<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = (u64, &'a Document)> + 'a {
        self.documents
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(seq, doc)| (*seq, doc))
    }
}

impl MemoryStore {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn create_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.collections
            .write()
            .entry(collection.to_owned())
            .or_default();
        Ok(())
    }

    fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        if self.collections.write().remove(collection).is_some() {
            debug!("Dropped document collection {collection}");
        }
        Ok(())
    }

    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn insert(&self, collection: &str, document: Document) -> Result<FeatureId, StoreError> {
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_owned()).or_default();
        let (id, document) = target.prepare(document)?;
        target.push(id.clone(), document);
        Ok(id)
    }

    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<FeatureId>, StoreError> {
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_owned()).or_default();

        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            let (id, document) = target.prepare(document)?;
            if prepared.iter().any(|(other, _)| other == &id) {
                return Err(StoreError::Uniqueness(id.to_string()));
            }
            prepared.push((id, document));
        }

        let ids = prepared.iter().map(|(id, _)| id.clone()).collect();
        for (id, document) in prepared {
            target.push(id, document);
        }

        Ok(ids)
    }

    fn save(&self, collection: &str, document: Document) -> Result<FeatureId, StoreError> {
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_owned()).or_default();

        if let Some(id) = document.id() {
            if let Some(seq) = target.ids.get(&id) {
                target.documents.insert(*seq, document);
                return Ok(id);
            }
        }

        let (id, document) = target.prepare(document)?;
        target.push(id.clone(), document);
        Ok(id)
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read();
        let Some(source) = collections.get(collection) else {
            return Ok(vec![]);
        };

        let mut found: Vec<&Document> = source.matching(filter).map(|(_, doc)| doc).collect();
        if !options.sort.is_empty() {
            found.sort_by(|a, b| compare_by_keys(a, b, &options.sort));
        }

        Ok(found
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|doc| project(doc, options.fields.as_deref()))
            .collect())
    }

    fn update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
        multi: bool,
    ) -> Result<UpdateResult, StoreError> {
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_owned()).or_default();

        let limit = if multi { usize::MAX } else { 1 };
        let matched: Vec<u64> = target
            .matching(filter)
            .map(|(seq, _)| seq)
            .take(limit)
            .collect();

        let mut result = UpdateResult {
            matched: matched.len(),
            ..Default::default()
        };

        for seq in matched {
            let Some(document) = target.documents.get_mut(&seq) else {
                continue;
            };
            let before = document.clone();
            update.apply(document);
            if *document != before {
                if let Some(id) = document.id() {
                    result.modified.push(id);
                }
            }
        }

        if result.matched == 0 && upsert {
            let mut document = Document::new();
            for (path, value) in filter.equalities() {
                Update::new().set(path, value.clone()).apply(&mut document);
            }
            update.apply(&mut document);

            let (id, document) = target.prepare(document)?;
            target.push(id.clone(), document);
            result.upserted = Some(id);
        }

        Ok(result)
    }

    fn remove(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        let mut collections = self.collections.write();
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let removed: Vec<u64> = target.matching(filter).map(|(seq, _)| seq).collect();
        for seq in &removed {
            if let Some(document) = target.documents.remove(seq) {
                if let Some(id) = document.id() {
                    target.ids.remove(&id);
                }
            }
        }

        Ok(removed.len())
    }
}

fn compare_by_keys(a: &Document, b: &Document, keys: &[(String, SortOrder)]) -> Ordering {
    for (path, order) in keys {
        let ordering = match (a.get_path(path), b.get_path(path)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        };
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn project(document: &Document, fields: Option<&[String]>) -> Document {
    let Some(fields) = fields else {
        return document.clone();
    };

    let mut projected = Document::new();
    if let Some(id) = document.get(ID_FIELD) {
        projected.insert(ID_FIELD.to_owned(), id.clone());
    }
    for field in fields {
        if let Some(value) = document.get_path(field) {
            Update::new().set(field.as_str(), value.clone()).apply(&mut projected);
        }
    }

    projected
}

/// Document store client holding its databases in memory.
#[derive(Debug, Default)]
pub struct MemoryClient {
    databases: RwLock<AHashMap<String, Arc<MemoryStore>>>,
}

impl MemoryClient {
    /// Creates a client with no databases.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentClient for MemoryClient {
    fn database(&self, name: &str) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let mut databases = self.databases.write();
        let store: Arc<dyn DocumentStore> = databases.entry(name.to_owned()).or_default().clone();
        Ok(store)
    }

    fn drop_database(&self, name: &str) -> Result<(), StoreError> {
        if self.databases.write().remove(name).is_some() {
            debug!("Dropped document database {name}");
        }
        Ok(())
    }

    fn database_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{json, Value};

    fn document(value: Value) -> Document {
        Document::try_from(value).unwrap()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_many(
                "features",
                vec![
                    document(json!({"_id": "1", "properties": {"name": "b", "rank": 2}})),
                    document(json!({"_id": "2", "properties": {"name": "a", "rank": 3}})),
                    document(json!({"_id": "3", "properties": {"name": "c", "rank": 1}})),
                ],
            )
            .unwrap();
        store
    }

    fn ids(documents: &[Document]) -> Vec<String> {
        documents
            .iter()
            .filter_map(|d| d.id())
            .map(|id| id.to_string())
            .collect()
    }

    #[test]
    fn insert_assigns_identifier() {
        let store = MemoryStore::new();
        let id = store.insert("c", document(json!({"a": 1}))).unwrap();
        let found = store.find_one("c", &id).unwrap().unwrap();
        assert_eq!(found.id(), Some(id));
        assert_eq!(store.collection_names().unwrap(), vec!["c".to_string()]);
    }

    #[test]
    fn duplicate_identifiers_are_rejected_atomically() {
        let store = seeded();
        let result = store.insert_many(
            "features",
            vec![
                document(json!({"_id": "4"})),
                document(json!({"_id": "1"})),
            ],
        );
        assert_matches!(result, Err(StoreError::Uniqueness(id)) if id == "1");
        assert!(store
            .find_one("features", &FeatureId::from("4"))
            .unwrap()
            .is_none());

        assert_matches!(
            store.insert("features", document(json!({"_id": "2"}))),
            Err(StoreError::Uniqueness(_))
        );
    }

    #[test]
    fn find_sorts_skips_and_projects() {
        let store = seeded();
        let options = FindOptions::default()
            .sort_by("properties.rank", SortOrder::Descending)
            .with_skip(1)
            .with_fields(["properties.name"]);
        let found = store.find("features", &Filter::All, &options).unwrap();

        assert_eq!(ids(&found), vec!["1", "3"]);
        assert_eq!(
            Value::from(found[0].clone()),
            json!({"_id": "1", "properties": {"name": "b"}})
        );

        let limited = store
            .find("features", &Filter::All, &FindOptions::default().with_limit(2))
            .unwrap();
        assert_eq!(ids(&limited), vec!["1", "2"]);
    }

    #[test]
    fn save_replaces_by_identifier() {
        let store = seeded();
        store
            .save("features", document(json!({"_id": "2", "replaced": true})))
            .unwrap();
        let found = store
            .find_one("features", &FeatureId::from("2"))
            .unwrap()
            .unwrap();
        assert_eq!(Value::from(found), json!({"_id": "2", "replaced": true}));

        let found = store
            .find("features", &Filter::All, &FindOptions::ids_only())
            .unwrap();
        assert_eq!(ids(&found), vec!["1", "2", "3"]);
    }

    #[test]
    fn update_single_and_multi() {
        let store = seeded();
        let update = Update::new().set("properties.flag", true);

        let single = store
            .update("features", &Filter::All, &update, false, false)
            .unwrap();
        assert_eq!(single.matched, 1);
        assert_eq!(single.modified, vec![FeatureId::from("1")]);

        let multi = store
            .update("features", &Filter::All, &update, false, true)
            .unwrap();
        assert_eq!(multi.matched, 3);
        assert_eq!(multi.modified, vec![FeatureId::from("2"), FeatureId::from("3")]);
    }

    #[test]
    fn upsert_seeds_from_filter() {
        let store = seeded();
        let filter = Filter::eq("properties.name", "z");
        let result = store
            .update(
                "features",
                &filter,
                &Update::new().set("properties.rank", 9),
                true,
                false,
            )
            .unwrap();

        assert_eq!(result.matched, 0);
        let id = result.upserted.unwrap();
        let created = store.find_one("features", &id).unwrap().unwrap();
        assert_eq!(created.get_path("properties.name"), Some(&json!("z")));
        assert_eq!(created.get_path("properties.rank"), Some(&json!(9)));
    }

    #[test]
    fn remove_and_drop() {
        let store = seeded();
        let removed = store
            .remove("features", &Filter::Gte("properties.rank".into(), json!(2)))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.remove("missing", &Filter::All).unwrap(), 0);

        store.drop_collection("features").unwrap();
        store.drop_collection("features").unwrap();
        assert!(store.collection_names().unwrap().is_empty());
    }

    #[test]
    fn client_databases() {
        let client = MemoryClient::new();
        let db = client.database("geo").unwrap();
        db.insert("c", document(json!({}))).unwrap();

        let again = client.database("geo").unwrap();
        assert_eq!(again.collection_names().unwrap(), vec!["c".to_string()]);
        assert_eq!(client.database_names().unwrap(), vec!["geo".to_string()]);

        client.drop_database("geo").unwrap();
        assert!(client.database_names().unwrap().is_empty());
    }
}
