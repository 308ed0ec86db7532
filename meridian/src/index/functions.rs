//! SQL functions evaluating spatial predicates over WKB blobs.

use geo::{Geometry, Relate};
use meridian_types::SpatialGeometry;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::Connection;

use super::predicate::{validate_pattern, Predicate};

/// Name of the generic DE-9IM function: `ST_Relate(indexed, query, pattern)`.
pub const RELATE_FUNCTION: &str = "ST_Relate";

/// Registers the predicate functions on `connection`.
///
/// Each function of [`Predicate::sql_function`] takes two WKB blobs and returns `1`, `0`, or `NULL` when
/// either argument is `NULL`.
pub fn register_spatial_functions(connection: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    for predicate in Predicate::ALL {
        connection.create_scalar_function(predicate.sql_function(), 2, flags, move |ctx| {
            let (Some(indexed), Some(query)) = (blob_geometry(ctx, 0)?, blob_geometry(ctx, 1)?)
            else {
                return Ok(None);
            };
            Ok(Some(predicate.evaluate(&indexed, &query)))
        })?;
    }

    connection.create_scalar_function(RELATE_FUNCTION, 3, flags, |ctx| {
        let pattern: String = ctx.get(2)?;
        validate_pattern(&pattern)
            .map_err(|err| rusqlite::Error::UserFunctionError(err.to_string().into()))?;

        let (Some(indexed), Some(query)) = (blob_geometry(ctx, 0)?, blob_geometry(ctx, 1)?) else {
            return Ok(None);
        };
        indexed
            .relate(&query)
            .matches(&pattern)
            .map(Some)
            .map_err(|err| rusqlite::Error::UserFunctionError(format!("{err:?}").into()))
    })?;

    Ok(())
}

fn blob_geometry(ctx: &Context<'_>, index: usize) -> rusqlite::Result<Option<Geometry<f64>>> {
    let Some(bytes) = ctx.get::<Option<Vec<u8>>>(index)? else {
        return Ok(None);
    };

    SpatialGeometry::from_wkb(&bytes, None)
        .map(|geometry| Some(geometry.into_inner()))
        .map_err(|err| rusqlite::Error::UserFunctionError(err.to_string().into()))
}
