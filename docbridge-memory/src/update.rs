//! Update operators, upsert seeding and projections over stored documents.

use bson::{Bson, Document};

use docbridge_core::{backend::DriverResult, error::DriverError};

use crate::evaluator::lookup;

const BAD_VALUE: i32 = 2;
const FAILED_TO_PARSE: i32 = 9;
const TYPE_MISMATCH: i32 = 14;
const IMMUTABLE_FIELD: i32 = 66;

/// Whether an update document is made of `$` operators rather than being a
/// replacement document.
pub(crate) fn is_operator_update(update: &Document) -> bool {
    update.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DriverResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(DriverError::command(
                    TYPE_MISMATCH,
                    format!("cannot create field '{rest}' in non-document element '{head}'"),
                )),
            }
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn increment(current: Option<&Bson>, by: &Bson, path: &str) -> DriverResult<Bson> {
    let mismatch = || {
        DriverError::command(
            TYPE_MISMATCH,
            format!("cannot apply $inc to a value of non-numeric type at '{path}'"),
        )
    };

    Ok(match (current, by) {
        (None, by) if as_number(by).is_some() => by.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(i64::from(*a).saturating_add(*b)),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(a.saturating_add(i64::from(*b))),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(a.saturating_add(*b)),
        (Some(current), by) => match (as_number(current), as_number(by)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => return Err(mismatch()),
        },
        _ => return Err(mismatch()),
    })
}

fn operand<'a>(operator: &str, operand: &'a Bson) -> DriverResult<&'a Document> {
    match operand {
        Bson::Document(fields) => Ok(fields),
        other => Err(DriverError::command(
            FAILED_TO_PARSE,
            format!("modifier {operator} expects a document, got {other}"),
        )),
    }
}

/// Applies an operator update to `document`.
///
/// `inserting` enables `$setOnInsert`, which is ignored for updates of
/// existing documents.
///
/// # Errors
///
/// Returns a command error for unknown operators, `_id` modifications and
/// `$inc` on non-numeric values.
pub(crate) fn apply_operators(document: &mut Document, update: &Document, inserting: bool) -> DriverResult<()> {
    for (operator, fields) in update {
        let fields = operand(operator, fields)?;

        for (path, value) in fields {
            if path == "_id" || path.starts_with("_id.") {
                if (operator == "$setOnInsert" && inserting) || lookup(document, path) == Some(value) {
                    set_path(document, path, value.clone())?;
                    continue;
                }
                return Err(DriverError::command(
                    IMMUTABLE_FIELD,
                    "Performing an update on the path '_id' would modify the immutable field '_id'",
                ));
            }

            match operator.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$setOnInsert" if inserting => set_path(document, path, value.clone())?,
                "$setOnInsert" => {}
                "$unset" => remove_path(document, path),
                "$inc" => {
                    let next = increment(lookup(document, path), value, path)?;
                    set_path(document, path, next)?;
                }
                "$push" => match lookup(document, path).cloned() {
                    None => set_path(document, path, Bson::Array(vec![value.clone()]))?,
                    Some(Bson::Array(mut items)) => {
                        items.push(value.clone());
                        set_path(document, path, Bson::Array(items))?;
                    }
                    Some(_) => {
                        return Err(DriverError::command(
                            BAD_VALUE,
                            format!("the field '{path}' must be an array"),
                        ));
                    }
                },
                other => {
                    return Err(DriverError::command(
                        FAILED_TO_PARSE,
                        format!("unknown modifier: {other}"),
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Replaces the content of `document`, keeping its `_id`.
///
/// # Errors
///
/// Returns a command error when the replacement carries a different `_id`.
pub(crate) fn replace(document: &Document, replacement: &Document) -> DriverResult<Document> {
    let id = document.get("_id");

    if let (Some(id), Some(new_id)) = (id, replacement.get("_id")) {
        if id != new_id {
            return Err(DriverError::command(
                IMMUTABLE_FIELD,
                "the (immutable) field '_id' was found to have been altered",
            ));
        }
    }

    let mut replaced = Document::new();
    if let Some(id) = id {
        replaced.insert("_id", id.clone());
    }
    for (key, value) in replacement {
        if key != "_id" {
            replaced.insert(key.clone(), value.clone());
        }
    }

    Ok(replaced)
}

/// Builds the starting document of an upsert from the equality clauses of
/// its filter.
pub(crate) fn upsert_seed(filter: &Document) -> DriverResult<Document> {
    let mut seed = Document::new();

    for (key, value) in filter {
        if key.starts_with('$') {
            continue;
        }

        let value = match value {
            Bson::Document(ops) if is_operator_update(ops) => match ops.get("$eq") {
                Some(value) => value,
                None => continue,
            },
            Bson::RegularExpression(_) => continue,
            value => value,
        };

        set_path(&mut seed, key, value.clone())?;
    }

    Ok(seed)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_number(other).is_none_or(|n| n != 0.0),
    }
}

/// Applies a projection document.
///
/// Projections either include or exclude fields; `_id` is included unless it
/// is excluded explicitly.
///
/// # Errors
///
/// Returns a `BadValue` command error when inclusions and exclusions are mixed.
pub(crate) fn project(document: &Document, projection: &Document) -> DriverResult<Document> {
    let include_id = projection.get("_id").is_none_or(truthy);
    let (includes, excludes): (Vec<_>, Vec<_>) = projection
        .iter()
        .filter(|(key, _)| key.as_str() != "_id")
        .partition(|(_, value)| truthy(value));

    if !includes.is_empty() && !excludes.is_empty() {
        return Err(DriverError::command(
            BAD_VALUE,
            "Projection cannot have a mix of inclusion and exclusion.",
        ));
    }

    let mut projected = if includes.is_empty() {
        let mut remaining = document.clone();
        for (path, _) in &excludes {
            remove_path(&mut remaining, path);
        }
        remaining
    } else {
        let mut selected = Document::new();
        if let Some(id) = document.get("_id") {
            selected.insert("_id", id.clone());
        }
        for (path, _) in &includes {
            if let Some(value) = lookup(document, path) {
                set_path(&mut selected, path, value.clone())?;
            }
        }
        selected
    };

    if !include_id {
        projected.remove("_id");
    }

    Ok(projected)
}
