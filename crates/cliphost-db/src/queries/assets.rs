//! Asset catalog queries.

use chrono::{DateTime, Utc};
use cliphost_common::{AssetId, Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::Asset;

const ASSET_COLUMNS: &str = "id, processing, views, created_at, updated_at";

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_id(index: usize, value: String) -> rusqlite::Result<AssetId> {
    value.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_asset(row: &Row<'_>) -> rusqlite::Result<Asset> {
    Ok(Asset {
        id: parse_id(0, row.get(0)?)?,
        processing: row.get(1)?,
        views: row.get(2)?,
        created_at: parse_time(&row.get::<_, String>(3)?).unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, Option<String>>(4)?
            .as_deref()
            .and_then(parse_time),
    })
}

/// Record `id` as processing, creating the row if needed.
///
/// Re-uploading an existing asset puts it back into the processing state.
pub fn mark_processing(conn: &Connection, id: AssetId) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO assets (id, processing, views, created_at) VALUES (?1, 1, 0, ?2)
         ON CONFLICT(id) DO UPDATE SET processing = 1, updated_at = ?2",
        params![id.to_string(), now],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Fetch one asset.
pub fn get_asset(conn: &Connection, id: AssetId) -> Result<Asset> {
    conn.query_row(
        &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?"),
        [id.to_string()],
        row_to_asset,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found(id.to_string()),
        _ => Error::database(e.to_string()),
    })
}

/// Fetch one asset, `None` when absent.
pub fn find_asset(conn: &Connection, id: AssetId) -> Result<Option<Asset>> {
    conn.query_row(
        &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?"),
        [id.to_string()],
        row_to_asset,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Every asset whose processing flag is still set, oldest first.
pub fn list_processing(conn: &Connection) -> Result<Vec<AssetId>> {
    let mut stmt = conn
        .prepare("SELECT id FROM assets WHERE processing = 1 ORDER BY created_at, id")
        .map_err(|e| Error::database(e.to_string()))?;

    let ids = stmt
        .query_map([], |row| parse_id(0, row.get(0)?))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(ids)
}

/// Update the processing flag. Fails with `NotFound` for unknown assets.
pub fn set_processing(conn: &Connection, id: AssetId, processing: bool) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE assets SET processing = ?, updated_at = ? WHERE id = ?",
            params![processing, Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if updated == 0 {
        return Err(Error::not_found(id.to_string()));
    }
    Ok(())
}

/// Remove the asset row. Returns whether a row existed.
pub fn delete_asset(conn: &Connection, id: AssetId) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM assets WHERE id = ?", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(deleted > 0)
}

/// Bump the view counter. Unknown assets are a no-op and return `false`.
pub fn increment_views(conn: &Connection, id: AssetId) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE assets SET views = views + 1 WHERE id = ?",
            [id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(updated > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};

    #[test]
    fn test_mark_processing_creates_and_resets() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let id = AssetId::new();

        mark_processing(&conn, id).unwrap();
        let asset = get_asset(&conn, id).unwrap();
        assert!(asset.processing);
        assert_eq!(asset.views, 0);
        assert!(asset.updated_at.is_none());

        set_processing(&conn, id, false).unwrap();
        assert!(!get_asset(&conn, id).unwrap().processing);

        mark_processing(&conn, id).unwrap();
        let asset = get_asset(&conn, id).unwrap();
        assert!(asset.processing);
        assert!(asset.updated_at.is_some());
    }

    #[test]
    fn test_list_processing() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let a = AssetId::new();
        let b = AssetId::new();
        let c = AssetId::new();

        for id in [a, b, c] {
            mark_processing(&conn, id).unwrap();
        }
        set_processing(&conn, b, false).unwrap();

        let mut processing = list_processing(&conn).unwrap();
        processing.sort();
        let mut expected = vec![a, c];
        expected.sort();
        assert_eq!(processing, expected);
    }

    #[test]
    fn test_missing_asset() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let id = AssetId::new();

        assert!(matches!(get_asset(&conn, id), Err(Error::NotFound(_))));
        assert!(find_asset(&conn, id).unwrap().is_none());
        assert!(matches!(
            set_processing(&conn, id, false),
            Err(Error::NotFound(_))
        ));
        assert!(!delete_asset(&conn, id).unwrap());
        assert!(!increment_views(&conn, id).unwrap());
    }

    #[test]
    fn test_increment_views_and_delete() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let id = AssetId::new();
        mark_processing(&conn, id).unwrap();

        assert!(increment_views(&conn, id).unwrap());
        assert!(increment_views(&conn, id).unwrap());
        assert_eq!(get_asset(&conn, id).unwrap().views, 2);

        assert!(delete_asset(&conn, id).unwrap());
        assert!(find_asset(&conn, id).unwrap().is_none());
    }
}
