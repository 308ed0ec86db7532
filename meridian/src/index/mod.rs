//! Persistent spatial index of feature geometries.
//!
//! Each [`SpatialIndex`] is backed by its own SQLite file holding one row per indexed feature: the stringified
//! identifier, the WKB geometry and its bounding box. An R*Tree virtual table mirrors the bounding boxes and
//! prefilters candidates; the exact predicate is then evaluated by the SQL functions of
//! [`register_spatial_functions`].
//!
//! All geometries are stored in the SRID of the index. Geometries given in another SRID are reprojected
//! on write, and query geometries are reprojected on read.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use meridian_types::{BoundingRect, Crs, SpatialGeometry};
use rusqlite::{params, Connection, ErrorCode, ToSql};

use crate::document::FeatureId;
use crate::error::{IndexState, StoreError};

mod functions;
mod predicate;

pub use functions::{register_spatial_functions, RELATE_FUNCTION};
pub use predicate::{GeoOperator, Predicate};

const FORMAT: &str = "meridian-spatialindex";
const FORMAT_VERSION: &str = "1";

const SCHEMA: &str = "
    CREATE TABLE spatial_metadata (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    );
    CREATE TABLE spatialindex_geometry (
        id INTEGER PRIMARY KEY,
        oid TEXT NOT NULL UNIQUE,
        srid INTEGER NOT NULL,
        geom BLOB NOT NULL,
        xmin REAL NOT NULL,
        ymin REAL NOT NULL,
        xmax REAL NOT NULL,
        ymax REAL NOT NULL
    );
    CREATE VIRTUAL TABLE idx_spatialindex_geometry USING rtree(pkid, xmin, xmax, ymin, ymax);
    CREATE TRIGGER spatialindex_geometry_insert AFTER INSERT ON spatialindex_geometry BEGIN
        INSERT INTO idx_spatialindex_geometry (pkid, xmin, xmax, ymin, ymax)
        VALUES (NEW.id, NEW.xmin, NEW.xmax, NEW.ymin, NEW.ymax);
    END;
    CREATE TRIGGER spatialindex_geometry_delete AFTER DELETE ON spatialindex_geometry BEGIN
        DELETE FROM idx_spatialindex_geometry WHERE pkid = OLD.id;
    END;
";

const INSERT: &str = "INSERT INTO spatialindex_geometry (oid, srid, geom, xmin, ymin, xmax, ymax)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
const DELETE: &str = "DELETE FROM spatialindex_geometry WHERE oid = ?1";
const BBOX_FILTER: &str = "g.id IN (SELECT pkid FROM idx_spatialindex_geometry
    WHERE xmin <= ?3 AND xmax >= ?1 AND ymin <= ?4 AND ymax >= ?2)";

/// Geometry prepared for storage: reprojected into the index SRID, encoded, with its bounding box.
struct Row {
    wkb: Vec<u8>,
    bbox: BoundingRect,
}

/// File-backed index mapping feature identifiers to geometries, answering topological predicate queries.
///
/// The index is `Open` after construction. [`SpatialIndex::close`] and [`SpatialIndex::drop`] move it to
/// `Closed` and `Dropped`; every other operation then fails with [`StoreError::State`].
#[derive(Debug)]
pub struct SpatialIndex {
    path: PathBuf,
    crs: Crs,
    connection: Option<Connection>,
    state: IndexState,
}

impl SpatialIndex {
    /// Opens the index file at `path`, creating it if it does not exist or is empty.
    ///
    /// `srid` is the SRID geometries are stored in. An existing empty index takes the given SRID; opening a
    /// non-empty index declared with another SRID fails with [`StoreError::Validation`]. A file that is not
    /// an index fails with [`StoreError::IncompatibleIndex`].
    pub fn open(path: impl AsRef<Path>, srid: i32) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let crs = resolve_srid(srid)?;

        let fresh = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len() == 0,
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(err) => return Err(err.into()),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(&path)?;
        Self::with_connection(connection, path, crs, fresh)
    }

    /// Creates a transient index that lives in memory only.
    pub fn open_in_memory(srid: i32) -> Result<Self, StoreError> {
        let crs = resolve_srid(srid)?;
        let connection = Connection::open_in_memory()?;
        Self::with_connection(connection, PathBuf::from(":memory:"), crs, true)
    }

    fn with_connection(
        connection: Connection,
        path: PathBuf,
        crs: Crs,
        fresh: bool,
    ) -> Result<Self, StoreError> {
        register_spatial_functions(&connection)?;

        let mut index = Self {
            path,
            crs,
            connection: Some(connection),
            state: IndexState::Open,
        };

        if fresh {
            index.initialize()?;
            info!("Created spatial index {:?} with SRID {}", index.path, crs.srid());
        } else {
            index.check_format()?;
            debug!("Opened spatial index {:?}", index.path);
        }

        Ok(index)
    }

    fn initialize(&mut self) -> Result<(), StoreError> {
        let srid = self.crs.srid().to_string();
        let connection = self.connection_mut()?;
        let tx = connection.transaction()?;
        tx.execute_batch(SCHEMA)?;
        {
            let mut statement =
                tx.prepare("INSERT INTO spatial_metadata (key, value) VALUES (?1, ?2)")?;
            statement.execute(params!["format", FORMAT])?;
            statement.execute(params!["version", FORMAT_VERSION])?;
            statement.execute(params!["srid", srid])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn check_format(&self) -> Result<(), StoreError> {
        let incompatible = || StoreError::IncompatibleIndex(self.path.clone());
        let connection = self.connection()?;

        let metadata = |key: &str| -> rusqlite::Result<String> {
            connection.query_row(
                "SELECT value FROM spatial_metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
        };

        let format = metadata("format").map_err(|_| incompatible())?;
        let version = metadata("version").map_err(|_| incompatible())?;
        if format != FORMAT || version != FORMAT_VERSION {
            return Err(incompatible());
        }

        let stored: i32 = metadata("srid")
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or_else(incompatible)?;
        if stored != self.crs.srid() {
            if self.count(None)? > 0 {
                return Err(StoreError::Validation(format!(
                    "index {:?} stores geometries in SRID {stored}, requested SRID {}",
                    self.path,
                    self.crs.srid()
                )));
            }
            let srid = self.crs.srid();
            self.write_srid(srid)?;
        }

        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SRID geometries are stored in.
    pub fn srid(&self) -> i32 {
        self.crs.srid()
    }

    /// Lifecycle state.
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// Changes the SRID of an empty index.
    pub fn set_srid(&mut self, srid: i32) -> Result<(), StoreError> {
        let crs = resolve_srid(srid)?;
        if crs.srid() == self.crs.srid() {
            return Ok(());
        }
        if self.count(None)? > 0 {
            return Err(StoreError::Validation(format!(
                "cannot change SRID of non-empty index {:?}",
                self.path
            )));
        }

        self.write_srid(crs.srid())?;
        self.crs = crs;
        Ok(())
    }

    fn write_srid(&self, srid: i32) -> Result<(), StoreError> {
        self.connection()?.execute(
            "UPDATE spatial_metadata SET value = ?1 WHERE key = 'srid'",
            params![srid.to_string()],
        )?;
        debug!("Spatial index {:?} now stores SRID {srid}", self.path);
        Ok(())
    }

    /// Closes the backing file. Closing an index that is not open does nothing.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.state != IndexState::Open {
            return Ok(());
        }

        if let Some(connection) = self.connection.take() {
            connection.close().map_err(|(_, err)| err)?;
        }
        self.state = IndexState::Closed;
        debug!("Closed spatial index {:?}", self.path);
        Ok(())
    }

    /// Closes the index and deletes the backing file. A missing file is not an error.
    pub fn drop(&mut self) -> Result<(), StoreError> {
        if let Some(connection) = self.connection.take() {
            connection.close().map_err(|(_, err)| err)?;
        }
        self.state = IndexState::Dropped;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Dropped spatial index {:?}", self.path);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("Spatial index file {:?} is already absent", self.path);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Adds a geometry under `id`.
    ///
    /// The SRID of the geometry is `srid` if given, otherwise the geometry's own SRID if it is known,
    /// otherwise the index SRID. Fails with [`StoreError::Uniqueness`] if `id` is already indexed.
    pub fn insert(
        &mut self,
        id: &FeatureId,
        geometry: &SpatialGeometry,
        srid: Option<i32>,
    ) -> Result<(), StoreError> {
        let row = self.prepare_row(geometry, srid)?;
        let index_srid = self.srid();
        let connection = self.connection_mut()?;

        let tx = connection.transaction()?;
        insert_row(&tx, id, index_srid, &row)?;
        tx.commit()?;

        debug!("Indexed geometry of {id}");
        Ok(())
    }

    /// Adds several geometries in one transaction. A duplicate identifier aborts the whole batch.
    pub fn bulk_insert<'a>(
        &mut self,
        items: impl IntoIterator<Item = (&'a FeatureId, &'a SpatialGeometry)>,
    ) -> Result<usize, StoreError> {
        let rows = items
            .into_iter()
            .map(|(id, geometry)| self.prepare_row(geometry, None).map(|row| (id, row)))
            .collect::<Result<Vec<_>, _>>()?;
        let index_srid = self.srid();
        let connection = self.connection_mut()?;

        let tx = connection.transaction()?;
        for (id, row) in &rows {
            insert_row(&tx, id, index_srid, row)?;
        }
        tx.commit()?;

        debug!("Indexed {} geometries", rows.len());
        Ok(rows.len())
    }

    /// Replaces the geometry indexed under `id`, or adds it if there is none.
    pub fn replace(
        &mut self,
        id: &FeatureId,
        geometry: &SpatialGeometry,
        srid: Option<i32>,
    ) -> Result<(), StoreError> {
        let row = self.prepare_row(geometry, srid)?;
        let index_srid = self.srid();
        let connection = self.connection_mut()?;

        let tx = connection.transaction()?;
        tx.execute(DELETE, params![id.as_str()])?;
        insert_row(&tx, id, index_srid, &row)?;
        tx.commit()?;

        debug!("Reindexed geometry of {id}");
        Ok(())
    }

    /// Removes the geometry of `id`. Returns false if there was none.
    pub fn delete(&mut self, id: &FeatureId) -> Result<bool, StoreError> {
        let removed = self
            .connection()?
            .execute(DELETE, params![id.as_str()])?;
        debug!("Removed {removed} index entries for {id}");
        Ok(removed > 0)
    }

    /// Removes the geometries of all `ids` in one transaction. Returns the number of removed entries.
    pub fn bulk_delete<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a FeatureId>,
    ) -> Result<usize, StoreError> {
        let connection = self.connection_mut()?;
        let tx = connection.transaction()?;
        let mut removed = 0;
        {
            let mut statement = tx.prepare_cached(DELETE)?;
            for id in ids {
                removed += statement.execute(params![id.as_str()])?;
            }
        }
        tx.commit()?;

        debug!("Removed {removed} index entries");
        Ok(removed)
    }

    /// Removes every entry.
    pub fn clear(&mut self) -> Result<usize, StoreError> {
        let removed = self
            .connection()?
            .execute("DELETE FROM spatialindex_geometry", [])?;
        debug!("Cleared {removed} entries from spatial index {:?}", self.path);
        Ok(removed)
    }

    /// Returns true if a geometry is indexed under `id`.
    pub fn exists(&self, id: &FeatureId) -> Result<bool, StoreError> {
        Ok(self.connection()?.query_row(
            "SELECT EXISTS (SELECT 1 FROM spatialindex_geometry WHERE oid = ?1)",
            params![id.as_str()],
            |row| row.get(0),
        )?)
    }

    /// Number of indexed geometries, or of those lying within `geometry`.
    pub fn count(&self, within: Option<&SpatialGeometry>) -> Result<usize, StoreError> {
        let count: i64 = match within {
            None => self.connection()?.query_row(
                "SELECT COUNT(*) FROM spatialindex_geometry",
                [],
                |row| row.get(0),
            )?,
            Some(geometry) => {
                let Some(row) = self.prepare_query(geometry, None)? else {
                    return Ok(0);
                };
                let sql = format!(
                    "SELECT COUNT(*) FROM spatialindex_geometry g WHERE {BBOX_FILTER} AND {}(g.geom, ?5)",
                    Predicate::Within.sql_function()
                );
                self.connection()?
                    .query_row(&sql, bbox_params(&row), |r| r.get(0))?
            }
        };

        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Identifiers of the indexed geometries satisfying `predicate` against `geometry`.
    pub fn predicate(
        &self,
        predicate: Predicate,
        geometry: &SpatialGeometry,
        srid: Option<i32>,
    ) -> Result<Vec<FeatureId>, StoreError> {
        let function = predicate.sql_function();
        let Some(row) = self.prepare_query(geometry, srid)? else {
            return match predicate {
                Predicate::Disjoint => self.all_ids(),
                _ => Ok(vec![]),
            };
        };

        if predicate.implies_bbox_intersection() {
            let sql = format!(
                "SELECT g.oid FROM spatialindex_geometry g
                 WHERE {BBOX_FILTER} AND {function}(g.geom, ?5) ORDER BY g.id"
            );
            self.collect_ids(&sql, bbox_params(&row))
        } else {
            let sql = format!(
                "SELECT g.oid FROM spatialindex_geometry g WHERE {function}(g.geom, ?1) ORDER BY g.id"
            );
            self.collect_ids(&sql, params![row.wkb])
        }
    }

    /// Identifiers of the indexed geometries whose DE-9IM relation to `geometry` matches `pattern`.
    pub fn relate(
        &self,
        pattern: &str,
        geometry: &SpatialGeometry,
        srid: Option<i32>,
    ) -> Result<Vec<FeatureId>, StoreError> {
        predicate::validate_pattern(pattern)?;
        let Some(row) = self.prepare_query(geometry, srid)? else {
            return Ok(vec![]);
        };

        let sql = format!(
            "SELECT g.oid FROM spatialindex_geometry g WHERE {RELATE_FUNCTION}(g.geom, ?1, ?2) ORDER BY g.id"
        );
        self.collect_ids(&sql, params![row.wkb, pattern])
    }

    /// Evaluates one geo spec operator.
    pub fn query(
        &self,
        operator: &GeoOperator,
        geometry: &SpatialGeometry,
    ) -> Result<Vec<FeatureId>, StoreError> {
        match operator {
            GeoOperator::Predicate(predicate) => self.predicate(*predicate, geometry, None),
            GeoOperator::Relate(pattern) => self.relate(pattern, geometry, None),
        }
    }

    /// Bounding box of all indexed geometries, `None` if the index is empty.
    pub fn bounds(&self) -> Result<Option<BoundingRect>, StoreError> {
        let (x_min, y_min, x_max, y_max): (Option<f64>, Option<f64>, Option<f64>, Option<f64>) =
            self.connection()?.query_row(
                "SELECT MIN(xmin), MIN(ymin), MAX(xmax), MAX(ymax) FROM spatialindex_geometry",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(match (x_min, y_min, x_max, y_max) {
            (Some(x_min), Some(y_min), Some(x_max), Some(y_max)) => {
                Some(BoundingRect::new(x_min, y_min, x_max, y_max))
            }
            _ => None,
        })
    }

    fn all_ids(&self) -> Result<Vec<FeatureId>, StoreError> {
        self.collect_ids(
            "SELECT g.oid FROM spatialindex_geometry g ORDER BY g.id",
            [],
        )
    }

    fn collect_ids(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<FeatureId>, StoreError> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(sql)?;
        let ids = statement
            .query_map(params, |row| row.get::<_, String>(0))?
            .map(|id| id.map(FeatureId::from))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn connection(&self) -> Result<&Connection, StoreError> {
        match (&self.connection, self.state) {
            (Some(connection), IndexState::Open) => Ok(connection),
            (_, state) => Err(StoreError::State(state)),
        }
    }

    fn connection_mut(&mut self) -> Result<&mut Connection, StoreError> {
        match (&mut self.connection, self.state) {
            (Some(connection), IndexState::Open) => Ok(connection),
            (_, state) => Err(StoreError::State(state)),
        }
    }

    fn normalize(
        &self,
        geometry: &SpatialGeometry,
        srid: Option<i32>,
    ) -> Result<SpatialGeometry, StoreError> {
        let effective = srid.unwrap_or_else(|| {
            geometry
                .srid()
                .filter(|s| Crs::from_srid(*s).is_some())
                .unwrap_or(self.crs.srid())
        });

        let mut normalized = SpatialGeometry::new(geometry.geometry().clone(), Some(effective));
        normalized.transform(&self.crs)?;
        Ok(normalized)
    }

    fn prepare_row(
        &self,
        geometry: &SpatialGeometry,
        srid: Option<i32>,
    ) -> Result<Row, StoreError> {
        self.connection()?;
        self.prepare_query(geometry, srid)?.ok_or_else(|| {
            StoreError::Validation("an empty geometry cannot be indexed".into())
        })
    }

    fn prepare_query(
        &self,
        geometry: &SpatialGeometry,
        srid: Option<i32>,
    ) -> Result<Option<Row>, StoreError> {
        let normalized = self.normalize(geometry, srid)?;
        let Some(bbox) = normalized.bounding_rect() else {
            return Ok(None);
        };

        Ok(Some(Row {
            wkb: normalized.to_wkb()?,
            bbox,
        }))
    }
}

fn resolve_srid(srid: i32) -> Result<Crs, StoreError> {
    Crs::from_srid(srid).ok_or_else(|| {
        StoreError::Validation(format!("SRID {srid} is not a supported reference system"))
    })
}

fn insert_row(
    connection: &Connection,
    id: &FeatureId,
    srid: i32,
    row: &Row,
) -> Result<(), StoreError> {
    let mut statement = connection.prepare_cached(INSERT)?;
    statement
        .execute(params![
            id.as_str(),
            srid,
            row.wkb,
            row.bbox.x_min,
            row.bbox.y_min,
            row.bbox.x_max,
            row.bbox.y_max
        ])
        .map_err(|err| match err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Uniqueness(id.to_string())
            }
            other => other.into(),
        })?;
    Ok(())
}

fn bbox_params(row: &Row) -> [&dyn ToSql; 5] {
    [
        &row.bbox.x_min,
        &row.bbox.y_min,
        &row.bbox.x_max,
        &row.bbox.y_max,
        &row.wkb,
    ]
}
