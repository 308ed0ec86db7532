//! Feature collections: GeoJSON features kept in a document store and indexed by a spatial index.
//!
//! A [`FeatureCollection`] owns three things: a collection of the document store that holds the features,
//! a [`SpatialIndex`] file that holds their geometries, and a metadata record with the declared CRS and
//! collection-level properties. The two stores are written without a shared transaction. Index entries are
//! only added after the document write they describe succeeded, and are removed before the document is, so
//! a failure midway can leave a document without an index entry (recoverable with
//! [`FeatureCollection::reindex`]) but never an index entry without a document.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info, warn};
use meridian_types::{BoundingRect, SpatialGeometry};
use serde_json::{Map, Value};

use crate::codec::GeometryCodec;
use crate::document::{Document, DocumentStore, FeatureId, Filter, FindOptions, Update, UpdateResult};
use crate::error::StoreError;
use crate::feature::{Feature, FeatureInput, GeoJsonFeatureCollection};
use crate::index::SpatialIndex;

mod builder;
mod cursor;
mod geo_spec;
mod meta;

pub use builder::FeatureCollectionBuilder;
pub use cursor::FeatureCursor;
pub use geo_spec::GeoSpec;
pub use meta::CollectionMeta;

pub(crate) use builder::validate_name;
use meta::MetaRecord;

/// Options of [`FeatureCollection::update`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Create a document from the filter equalities if nothing matches.
    pub upsert: bool,
    /// Update every matching document instead of the first one.
    pub multi: bool,
    /// Recompute and reindex the geometry of every written document.
    pub sync_index: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            upsert: false,
            multi: false,
            sync_index: true,
        }
    }
}

impl UpdateOptions {
    /// Sets the `upsert` flag.
    pub fn with_upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    /// Sets the `multi` flag.
    pub fn with_multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Leaves the spatial index untouched.
    pub fn without_index_sync(mut self) -> Self {
        self.sync_index = false;
        self
    }
}

/// A named set of geographic features with a persistent spatial index.
///
/// Created with [`FeatureCollectionBuilder`], usually through [`Database::collection`](crate::database::Database::collection).
pub struct FeatureCollection {
    store: Arc<dyn DocumentStore>,
    name: String,
    meta: MetaRecord,
    index: SpatialIndex,
    codec: GeometryCodec,
    default_srid: i32,
    batch_size: usize,
}

impl FeatureCollection {
    /// Name of the collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metadata record as last read or written.
    pub fn meta(&self) -> &CollectionMeta {
        self.meta.get()
    }

    /// Re-reads the metadata record, picking up changes made through other handles.
    pub fn refresh_meta(&mut self) -> Result<&CollectionMeta, StoreError> {
        self.meta.refresh()
    }

    /// The spatial index of the collection.
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Number of identifiers per document-store query of find and delete operations.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Imports features.
    ///
    /// Geometries are brought into the collection CRS before anything is written. For a feature collection
    /// wrapper, its members other than `type`, `crs` and `features` become collection properties: with
    /// `replace` they overwrite the properties, otherwise they are adopted where absent and the import fails
    /// with [`StoreError::MetadataConflict`] if any of them has a different value already, in which case
    /// nothing is written. Children of a wrapper are tagged with the collection id in `_parent`.
    ///
    /// Returns the identifiers of the stored features, in input order.
    pub fn insert_features(
        &mut self,
        data: impl Into<FeatureInput>,
        replace: bool,
    ) -> Result<Vec<FeatureId>, StoreError> {
        let mut input = data.into();
        let extracted = self.codec.extract(&mut input)?;

        match input {
            FeatureInput::Single(feature) => {
                let id = self.store.insert(&self.name, feature.into_document())?;
                if let Some(geometry) = extracted.geometries.into_iter().next().flatten() {
                    self.index_geometry(&id, &geometry)?;
                }
                debug!("Inserted feature {id} into {}", self.name);
                Ok(vec![id])
            }
            FeatureInput::Many(features) => {
                let mut ids = Vec::with_capacity(features.len());
                for (feature, geometry) in features.into_iter().zip(extracted.geometries) {
                    let id = self.store.insert(&self.name, feature.into_document())?;
                    if let Some(geometry) = geometry {
                        self.index_geometry(&id, &geometry)?;
                    }
                    ids.push(id);
                }
                debug!("Inserted {} features into {}", ids.len(), self.name);
                Ok(ids)
            }
            FeatureInput::Collection(collection) => {
                self.merge_properties(&collection.attributes, replace)?;

                let parent = self.meta.get().id.clone();
                let documents = collection
                    .features
                    .into_iter()
                    .map(|mut feature| {
                        feature.set_parent(&parent);
                        feature.into_document()
                    })
                    .collect();
                let ids = self.store.insert_many(&self.name, documents)?;

                let indexable = ids
                    .iter()
                    .zip(&extracted.geometries)
                    .filter_map(|(id, geometry)| geometry.as_ref().map(|g| (id, g)))
                    .filter(|(id, geometry)| {
                        let has_extent = geometry.bounding_rect().is_some();
                        if !has_extent {
                            warn!("Feature {id} has an empty geometry and is not indexed");
                        }
                        has_extent
                    });
                let indexed = self.index.bulk_insert(indexable)?;
                debug!(
                    "Imported {} features into {}, {indexed} indexed",
                    ids.len(),
                    self.name
                );
                Ok(ids)
            }
        }
    }

    /// Writes a document as is, replacing a stored document with the same id. The spatial index is not
    /// updated; use [`FeatureCollection::update`] or [`FeatureCollection::insert_features`] for geometry
    /// changes.
    pub fn save(&self, document: Document) -> Result<FeatureId, StoreError> {
        self.store.save(&self.name, document)
    }

    /// Applies `update` to the documents matching `spec`, and to those among them satisfying `geo_spec` if
    /// one is given.
    ///
    /// Unless disabled in `options`, every document the store reports as written is then re-read by id,
    /// its geometry brought into the collection CRS, the document saved again and its index entry replaced.
    /// A document whose geometry was removed loses its index entry.
    pub fn update(
        &mut self,
        spec: &Filter,
        update: &Update,
        geo_spec: Option<&GeoSpec>,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StoreError> {
        let filter = match geo_spec {
            Some(geo_spec) => spec.clone().and(Filter::id_in(&geo_spec.evaluate(&self.index)?)),
            None => spec.clone(),
        };

        let result = self
            .store
            .update(&self.name, &filter, update, options.upsert, options.multi)?;
        debug!(
            "Updated {} of {} matched documents in {}",
            result.modified.len(),
            result.matched,
            self.name
        );

        if options.sync_index {
            for id in result.touched() {
                self.sync_document(id)?;
            }
        }

        Ok(result)
    }

    /// Removes one feature. Returns false if there was no such document.
    pub fn delete_feature(&mut self, id: &FeatureId) -> Result<bool, StoreError> {
        self.index.delete(id)?;
        let removed = self.store.remove(&self.name, &Filter::id_eq(id))?;
        Ok(removed > 0)
    }

    /// Removes the features matching both `geo_spec` and `spec`, see [`FeatureCollection::find_features`].
    /// Without either constraint every feature is removed.
    ///
    /// Identifiers are processed in batches: index entries of a batch are removed first, then its documents
    /// with one store query. A failure aborts the operation without restoring the batches already removed.
    /// Returns the number of removed documents.
    pub fn delete_features(
        &mut self,
        geo_spec: Option<&GeoSpec>,
        spec: Option<&Filter>,
    ) -> Result<usize, StoreError> {
        let cursor = self.find_features(geo_spec, spec, FindOptions::ids_only())?;

        let mut removed = 0;
        let mut batch = Vec::with_capacity(self.batch_size);
        for document in cursor {
            let Some(id) = document?.id() else {
                continue;
            };
            batch.push(id);
            if batch.len() == self.batch_size {
                removed += self.delete_batch(&batch)?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            removed += self.delete_batch(&batch)?;
        }

        info!("Removed {removed} features from {}", self.name);
        Ok(removed)
    }

    /// Finds features.
    ///
    /// Without `geo_spec` the query goes to the document store as is. With it, the identifiers satisfying
    /// every geo constraint are computed first and the documents fetched in batches, each batch query being
    /// `spec AND _id in batch`. An empty `geo_spec` matches nothing. `options` are forwarded to the store;
    /// in batched mode `skip` and `limit` apply to the whole sequence and sorting applies per batch.
    pub fn find_features(
        &self,
        geo_spec: Option<&GeoSpec>,
        spec: Option<&Filter>,
        options: FindOptions,
    ) -> Result<FeatureCursor, StoreError> {
        let filter = spec.cloned().unwrap_or_default();
        let Some(geo_spec) = geo_spec else {
            return Ok(FeatureCursor::direct(
                self.store.clone(),
                &self.name,
                filter,
                options,
            ));
        };

        let ids: Vec<FeatureId> = geo_spec.evaluate(&self.index)?.into_iter().collect();
        if ids.is_empty() {
            return Ok(FeatureCursor::empty(self.store.clone(), &self.name));
        }

        debug!(
            "Geo constraints of a query on {} matched {} features",
            self.name,
            ids.len()
        );
        Ok(FeatureCursor::batched(
            self.store.clone(),
            &self.name,
            filter,
            options,
            ids,
            self.batch_size,
        ))
    }

    /// Identifiers of the features satisfying every constraint of `geo_spec`, in ascending order.
    pub fn find_ids(&self, geo_spec: &GeoSpec) -> Result<BTreeSet<FeatureId>, StoreError> {
        geo_spec.evaluate(&self.index)
    }

    /// Same as [`FeatureCollection::find_features`], with the result assembled into a GeoJSON feature
    /// collection carrying the collection properties and CRS.
    pub fn find_as_collection(
        &self,
        geo_spec: Option<&GeoSpec>,
        spec: Option<&Filter>,
        options: FindOptions,
    ) -> Result<Value, StoreError> {
        let features = self
            .find_features(geo_spec, spec, options)?
            .map(|document| document.map(Feature::from_document))
            .collect::<Result<Vec<_>, _>>()?;

        let mut collection =
            GeoJsonFeatureCollection::new(features).with_crs(self.codec.target().srid());
        collection.attributes = self.properties().clone();
        Ok(collection.to_value())
    }

    /// The document with the given id.
    pub fn get(&self, id: &FeatureId) -> Result<Option<Document>, StoreError> {
        self.store.find_one(&self.name, id)
    }

    /// Number of indexed features, or of those lying within `geometry`.
    pub fn count(&self, geometry: Option<&SpatialGeometry>) -> Result<usize, StoreError> {
        self.index.count(geometry)
    }

    /// Bounding rectangle of all indexed geometries.
    pub fn bounds(&self) -> Result<Option<BoundingRect>, StoreError> {
        self.index.bounds()
    }

    /// Rebuilds the spatial index from the stored documents. Returns the number of indexed features.
    ///
    /// Documents whose geometry cannot be read are skipped with a warning.
    pub fn reindex(&mut self) -> Result<usize, StoreError> {
        let cleared = self.index.clear()?;
        debug!("Rebuilding spatial index of {}, {cleared} stale entries", self.name);

        let documents = self.store.find(&self.name, &Filter::All, &FindOptions::default())?;
        let mut entries = Vec::with_capacity(documents.len());
        for document in documents {
            let Some(id) = document.id() else {
                continue;
            };
            let feature = Feature::from_document(document);
            match self.codec.decode_stored(&feature) {
                Ok(Some(geometry)) if geometry.bounding_rect().is_some() => {
                    entries.push((id, geometry))
                }
                Ok(_) => {}
                Err(err) => warn!("Feature {id} of {} is not indexed: {err}", self.name),
            }
        }

        let indexed = self
            .index
            .bulk_insert(entries.iter().map(|(id, geometry)| (id, geometry)))?;
        info!("Rebuilt spatial index of {} with {indexed} entries", self.name);
        Ok(indexed)
    }

    /// Collection property.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties().get(key)
    }

    /// All collection properties.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.meta.get().properties
    }

    /// Names of the collection properties.
    pub fn property_keys(&self) -> Vec<String> {
        self.properties().keys().cloned().collect()
    }

    /// Sets a collection property, overwriting any previous value.
    pub fn set_property(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.meta.modify(|meta| {
            meta.properties.insert(key.to_owned(), value.clone());
            Ok(())
        })
    }

    /// Removes a collection property. Returns its value.
    pub fn remove_property(&mut self, key: &str) -> Result<Option<Value>, StoreError> {
        self.meta.modify(|meta| Ok(meta.properties.remove(key)))
    }

    /// Declared SRID of the collection.
    pub fn srid(&self) -> Option<i32> {
        self.meta.get().srid
    }

    /// SRID geometries are stored in: the declared one, or the default if none is declared.
    pub fn effective_srid(&self) -> i32 {
        self.srid().unwrap_or(self.default_srid)
    }

    /// Declares the collection SRID.
    ///
    /// Declaring the current SRID again is a no-op. Once declared, the SRID can only be changed after
    /// [`FeatureCollection::unset_srid`]; otherwise [`StoreError::MetadataConflict`] is returned. Changing
    /// the storage SRID of a collection that has indexed features fails with [`StoreError::Validation`].
    pub fn set_srid(&mut self, srid: i32) -> Result<(), StoreError> {
        match self.srid() {
            Some(current) if current == srid => return Ok(()),
            Some(_) => return Err(StoreError::MetadataConflict { key: "srid".into() }),
            None => {}
        }

        let codec = GeometryCodec::for_srid(srid)?;
        self.check_storage_srid_change(srid)?;
        self.meta.modify(|meta| match meta.srid {
            Some(current) if current != srid => {
                Err(StoreError::MetadataConflict { key: "srid".into() })
            }
            _ => {
                meta.srid = Some(srid);
                Ok(())
            }
        })?;
        self.index.set_srid(srid)?;
        self.codec = codec;
        info!("Declared SRID {srid} for collection {}", self.name);
        Ok(())
    }

    /// Removes the SRID declaration. Geometries are then stored in the default SRID.
    pub fn unset_srid(&mut self) -> Result<(), StoreError> {
        let codec = GeometryCodec::for_srid(self.default_srid)?;
        self.check_storage_srid_change(self.default_srid)?;
        self.meta.modify(|meta| {
            meta.srid = None;
            Ok(())
        })?;
        self.index.set_srid(self.default_srid)?;
        self.codec = codec;
        Ok(())
    }

    /// Drops the spatial index, the documents and the metadata record, in this order. Parts that are
    /// already absent are skipped.
    pub fn drop(mut self) -> Result<(), StoreError> {
        self.index.drop()?;
        self.store.drop_collection(&self.name)?;
        MetaRecord::remove(self.store.as_ref(), self.meta.collection(), &self.name)?;
        info!("Dropped feature collection {}", self.name);
        Ok(())
    }

    fn merge_properties(
        &mut self,
        attributes: &Map<String, Value>,
        replace: bool,
    ) -> Result<(), StoreError> {
        if attributes.is_empty() && !replace {
            return Ok(());
        }

        self.meta.modify(|meta| {
            if replace {
                meta.properties = attributes.clone();
                return Ok(());
            }

            if let Some(key) = attributes
                .iter()
                .find(|(key, value)| meta.properties.get(*key).is_some_and(|v| v != *value))
                .map(|(key, _)| key)
            {
                return Err(StoreError::MetadataConflict { key: key.clone() });
            }
            for (key, value) in attributes {
                meta.properties
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            Ok(())
        })
    }

    fn check_storage_srid_change(&self, srid: i32) -> Result<(), StoreError> {
        if self.index.srid() != srid && self.index.count(None)? > 0 {
            return Err(StoreError::Validation(format!(
                "collection {} has indexed features in SRID {}",
                self.name,
                self.index.srid()
            )));
        }
        Ok(())
    }

    fn index_geometry(
        &mut self,
        id: &FeatureId,
        geometry: &SpatialGeometry,
    ) -> Result<(), StoreError> {
        if geometry.bounding_rect().is_none() {
            warn!("Feature {id} has an empty geometry and is not indexed");
            return Ok(());
        }
        self.index.insert(id, geometry, None)
    }

    fn sync_document(&mut self, id: &FeatureId) -> Result<(), StoreError> {
        let Some(document) = self.store.find_one(&self.name, id)? else {
            warn!("Updated feature {id} disappeared from {}", self.name);
            return Ok(());
        };

        let mut feature = Feature::from_document(document);
        let geometry = self.codec.extract_feature(&mut feature, None)?;
        self.store.save(&self.name, feature.into_document())?;

        match geometry.filter(|g| g.bounding_rect().is_some()) {
            Some(geometry) => self.index.replace(id, &geometry, None),
            None => self.index.delete(id).map(|_| ()),
        }
    }

    fn delete_batch(&mut self, ids: &[FeatureId]) -> Result<usize, StoreError> {
        self.index.bulk_delete(ids)?;
        let removed = self.store.remove(&self.name, &Filter::id_in(ids))?;
        debug!("Removed batch of {} features from {}", ids.len(), self.name);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryStore;
    use assert_matches::assert_matches;
    use geo::{point, polygon};
    use serde_json::json;

    use crate::index::Predicate;

    fn collection(dir: &std::path::Path) -> FeatureCollection {
        FeatureCollectionBuilder::new(Arc::new(MemoryStore::new()), "parcels")
            .with_index_dir(dir)
            .build()
            .unwrap()
    }

    fn square_feature(min: f64, max: f64, name: &str) -> Feature {
        let mut properties = Map::new();
        properties.insert("name".into(), name.into());
        Feature::new(
            Some(json!({
                "type": "Polygon",
                "coordinates": [[[min, min], [max, min], [max, max], [min, max], [min, min]]]
            })),
            properties,
        )
    }

    fn cover() -> SpatialGeometry {
        SpatialGeometry::new(
            polygon![(x: -100.0, y: -100.0), (x: 100.0, y: -100.0), (x: 100.0, y: 100.0), (x: -100.0, y: 100.0), (x: -100.0, y: -100.0)],
            Some(4326),
        )
    }

    #[test]
    fn single_and_many_are_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());

        let single = collection
            .insert_features(square_feature(0.0, 1.0, "a"), false)
            .unwrap();
        let many = collection
            .insert_features(
                vec![square_feature(2.0, 3.0, "b"), Feature::new(None, Map::new())],
                false,
            )
            .unwrap();

        assert_eq!(single.len(), 1);
        assert_eq!(many.len(), 2);
        assert_eq!(collection.count(None).unwrap(), 2);
        assert!(collection.index().exists(&single[0]).unwrap());
        assert!(!collection.index().exists(&many[1]).unwrap());
        assert!(collection.get(&many[1]).unwrap().is_some());
    }

    #[test]
    fn wide_strip_selects_by_both_axes() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());
        let point_feature = |x: f64, y: f64| {
            Feature::new(
                Some(json!({"type": "Point", "coordinates": [x, y]})),
                Map::new(),
            )
        };
        let east = collection
            .insert_features(point_feature(90.0, 5.0), false)
            .unwrap();
        collection
            .insert_features(point_feature(5.0, 90.0), false)
            .unwrap();

        let strip = SpatialGeometry::new(
            polygon![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)],
            Some(4326),
        );
        let spec = GeoSpec::new().with(Predicate::Within, strip);
        assert_eq!(
            collection.find_ids(&spec).unwrap().into_iter().collect::<Vec<_>>(),
            east
        );

        assert_eq!(collection.delete_features(Some(&spec), None).unwrap(), 1);
        assert_eq!(collection.count(None).unwrap(), 1);
        assert!(collection.get(&east[0]).unwrap().is_none());
    }

    #[test]
    fn collection_import_tags_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());

        let wrapper = GeoJsonFeatureCollection::new(vec![square_feature(0.0, 1.0, "a")])
            .with_attribute("title", "Parcels");
        let ids = collection.insert_features(wrapper, false).unwrap();

        let stored = collection.get(&ids[0]).unwrap().unwrap();
        assert_eq!(stored.get("_parent"), Some(&json!("parcels")));
        assert_eq!(collection.property("title"), Some(&json!("Parcels")));
    }

    #[test]
    fn update_reindexes_written_documents() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());
        let ids = collection
            .insert_features(square_feature(0.0, 1.0, "a"), false)
            .unwrap();

        let moved = json!({
            "type": "Point",
            "coordinates": [50.0, 50.0]
        });
        let result = collection
            .update(
                &Filter::eq("properties.name", "a"),
                &Update::new().set("geometry", moved),
                None,
                UpdateOptions::default(),
            )
            .unwrap();
        assert_eq!(result.modified, ids);

        let target = SpatialGeometry::new(point!(x: 50.0, y: 50.0), Some(4326));
        let spec = GeoSpec::new().with(Predicate::Intersects, target);
        assert_eq!(collection.find_ids(&spec).unwrap().len(), 1);

        collection
            .update(
                &Filter::id_eq(&ids[0]),
                &Update::new().unset("geometry"),
                None,
                UpdateOptions::default(),
            )
            .unwrap();
        assert_eq!(collection.count(None).unwrap(), 0);
    }

    #[test]
    fn update_without_sync_leaves_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());
        collection
            .insert_features(square_feature(0.0, 1.0, "a"), false)
            .unwrap();

        collection
            .update(
                &Filter::All,
                &Update::new().unset("geometry"),
                None,
                UpdateOptions::default().without_index_sync(),
            )
            .unwrap();
        assert_eq!(collection.count(None).unwrap(), 1);

        assert_eq!(collection.reindex().unwrap(), 0);
        assert_eq!(collection.count(None).unwrap(), 0);
    }

    #[test]
    fn update_narrowed_by_geo_spec() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());
        collection
            .insert_features(
                vec![
                    square_feature(0.0, 1.0, "a"),
                    square_feature(500.0, 501.0, "b"),
                ],
                false,
            )
            .unwrap();

        let spec = GeoSpec::new().with(Predicate::Within, cover());
        let result = collection
            .update(
                &Filter::All,
                &Update::new().set("properties.inside", true),
                Some(&spec),
                UpdateOptions::default().with_multi(),
            )
            .unwrap();
        assert_eq!(result.modified.len(), 1);

        let inside: Vec<_> = collection
            .find_features(None, Some(&Filter::eq("properties.inside", true)), FindOptions::default())
            .unwrap()
            .map(|doc| doc.unwrap().get_path("properties.name").cloned())
            .collect();
        assert_eq!(inside, vec![Some(json!("a"))]);
    }

    #[test]
    fn properties_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());

        collection.set_property("title", json!("Parcels")).unwrap();
        collection.set_property("year", json!(2024)).unwrap();
        assert_eq!(collection.property_keys(), vec!["title", "year"]);

        assert_eq!(
            collection.remove_property("year").unwrap(),
            Some(json!(2024))
        );
        assert_eq!(collection.remove_property("year").unwrap(), None);

        let meta = collection.refresh_meta().unwrap();
        assert_eq!(meta.properties.len(), 1);
    }

    #[test]
    fn srid_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());

        collection.set_srid(4326).unwrap();
        assert_matches!(
            collection.set_srid(3857),
            Err(StoreError::MetadataConflict { key }) if key == "srid"
        );

        collection.unset_srid().unwrap();
        assert_eq!(collection.srid(), None);
        assert_eq!(collection.effective_srid(), 4326);

        collection.set_srid(3857).unwrap();
        assert_eq!(collection.index().srid(), 3857);
        assert_eq!(collection.effective_srid(), 3857);
    }

    #[test]
    fn srid_change_requires_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());
        collection
            .insert_features(square_feature(0.0, 1.0, "a"), false)
            .unwrap();
        collection.unset_srid().unwrap();

        assert_matches!(collection.set_srid(3857), Err(StoreError::Validation(_)));
        assert_eq!(collection.srid(), None);
    }

    #[test]
    fn export_as_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = collection(dir.path());
        collection.set_property("title", json!("Parcels")).unwrap();
        collection
            .insert_features(square_feature(0.0, 1.0, "a"), false)
            .unwrap();

        let value = collection
            .find_as_collection(None, None, FindOptions::default().with_fields(["properties"]))
            .unwrap();
        assert_eq!(value["type"], json!("FeatureCollection"));
        assert_eq!(value["crs"], json!(4326));
        assert_eq!(value["title"], json!("Parcels"));
        assert_eq!(value["features"][0]["properties"]["name"], json!("a"));
    }

    #[test]
    fn drop_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut collection = FeatureCollectionBuilder::new(store.clone(), "parcels")
            .with_index_dir(dir.path())
            .build()
            .unwrap();
        collection
            .insert_features(square_feature(0.0, 1.0, "a"), false)
            .unwrap();

        collection.drop().unwrap();
        assert!(!dir.path().join("parcels.sqlite").exists());
        assert_eq!(
            store.collection_names().unwrap(),
            vec![crate::config::DEFAULT_META_COLLECTION.to_string()]
        );
        assert!(store
            .find_one(crate::config::DEFAULT_META_COLLECTION, &FeatureId::from("parcels"))
            .unwrap()
            .is_none());
    }
}
