//! Normalization of stored rows back into canonical item JSON
//!
//! Rows come out of SQLite with JSON-valued columns as text, SQL column
//! names and NULLs for absent values. These functions parse the JSON columns,
//! rename columns to their canonical field names, drop absent fields and
//! spread the opaque `extra` column back over the object.

use crate::sql::JoinTable;
use crate::{LibraryError, Result};
use serde_json::{Map, Value};

type Row = Map<String, Value>;

/// Parse a JSON text column in place.
fn parse_json_column(row: &mut Row, column: &str, table: &str) -> Result<()> {
    if let Some(Value::String(text)) = row.get(column) {
        let parsed = serde_json::from_str(text).map_err(|e| {
            LibraryError::decode(table, format!("column {column} holds invalid JSON: {e}"))
        })?;
        row.insert(column.to_string(), parsed);
    }
    Ok(())
}

fn rename(row: &mut Row, from: &str, to: &str) {
    if let Some(value) = row.remove(from) {
        row.insert(to.to_string(), value);
    }
}

/// Merge the `extra` column into the object. Modelled fields win.
fn spread_extra(row: &mut Row, table: &str) -> Result<()> {
    parse_json_column(row, "extra", table)?;
    match row.remove("extra") {
        Some(Value::Object(extra)) => {
            for (key, value) in extra {
                row.entry(key).or_insert(value);
            }
            Ok(())
        }
        Some(Value::Null) | None => Ok(()),
        Some(other) => Err(LibraryError::decode(
            table,
            format!("extra column is not an object: {other}"),
        )),
    }
}

fn drop_nulls(row: &mut Row) {
    row.retain(|_, value| !value.is_null());
}

fn int_to_bool(row: &mut Row, column: &str) {
    if let Some(flag) = row.get(column).and_then(Value::as_i64) {
        row.insert(column.to_string(), Value::Bool(flag != 0));
    }
}

/// Canonical track object from a `Track` row.
pub fn transform_track(mut row: Row) -> Result<Value> {
    const TABLE: &str = "Track";
    row.remove("updateTime");
    drop_nulls(&mut row);
    row.insert("type".to_string(), Value::from("track"));
    rename(&mut row, "albumURI", "albumUri");
    parse_json_column(&mut row, "artists", TABLE)?;
    parse_json_column(&mut row, "images", TABLE)?;
    int_to_bool(&mut row, "playable");
    spread_extra(&mut row, TABLE)?;
    Ok(Value::Object(row))
}

/// Canonical artist object from an `Artist` row.
pub fn transform_artist(mut row: Row) -> Result<Value> {
    const TABLE: &str = "Artist";
    row.remove("updateTime");
    drop_nulls(&mut row);
    parse_json_column(&mut row, "images", TABLE)?;
    spread_extra(&mut row, TABLE)?;
    Ok(Value::Object(row))
}

/// Canonical album or playlist metadata from a `TrackCollection` row.
pub fn transform_track_collection(mut row: Row) -> Result<Value> {
    const TABLE: &str = "TrackCollection";
    row.remove("updateTime");
    drop_nulls(&mut row);
    parse_json_column(&mut row, "artists", TABLE)?;
    parse_json_column(&mut row, "images", TABLE)?;
    parse_json_column(&mut row, "owner", TABLE)?;
    spread_extra(&mut row, TABLE)?;
    Ok(Value::Object(row))
}

/// Collection item object paired with its track. Returns the item's index
/// alongside it.
pub fn transform_track_collection_item(mut item: Row, track: Row) -> Result<(u64, Value)> {
    const TABLE: &str = "TrackCollectionItem";
    let index = item
        .get("indexNum")
        .and_then(Value::as_u64)
        .ok_or_else(|| LibraryError::decode(TABLE, "missing indexNum"))?;

    for column in ["collectionURI", "indexNum", "trackURI", "updateTime"] {
        item.remove(column);
    }
    drop_nulls(&mut item);
    parse_json_column(&mut item, "addedBy", TABLE)?;
    item.insert("track".to_string(), transform_track(track)?);
    Ok((index, Value::Object(item)))
}

/// Saved-item object wrapping the normalized media item.
pub fn transform_saved_item(mut saved: Row, media_item: Value) -> Value {
    let mut object = Row::new();
    for column in ["libraryProvider", "addedAt", "updateTime"] {
        object.insert(
            column.to_string(),
            saved.remove(column).unwrap_or(Value::Null),
        );
    }
    object.insert("mediaItem".to_string(), media_item);
    Value::Object(object)
}

/// Split a prefixed joined row into one object per table.
pub fn split_joined(tables: &[JoinTable], row: Row) -> Vec<Row> {
    let mut split: Vec<Row> = tables.iter().map(|_| Row::new()).collect();
    for (column, value) in row {
        if let Some((index, table)) = tables
            .iter()
            .enumerate()
            .find(|(_, table)| column.starts_with(table.prefix))
        {
            split[index].insert(column[table.prefix.len()..].to_string(), value);
        }
    }
    split
}
