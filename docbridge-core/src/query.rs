//! Filter expressions and sort specifications.
//!
//! Filters reach a backend as plain BSON documents. Backends that evaluate
//! filters themselves parse them into the [`Expr`] AST with
//! [`Expr::from_filter`] and walk it with a [`QueryVisitor`].
//!
//! # Filter Documents
//!
//! The supported query language:
//!
//! - Implicit equality: `{ "status": "active" }`
//! - Comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - Membership: `$in`, `$nin`
//! - Existence: `$exists`
//! - Pattern: `$regex` with optional `$options`, or a regex value
//! - Logical: `$and`, `$or`, `$nor` at the top level, `$not` per field
//!
//! Field names may be dotted paths into embedded documents.
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct builds the same expressions directly:
//!
//! ```ignore
//! use docbridge::query::Filter;
//!
//! let expr = Filter::eq("status", "active").and(Filter::gt("age", 18));
//! ```

use bson::{Bson, Document, Regex};
use thiserror::Error;

use crate::error::BridgeError;

/// Error raised for filter or sort documents outside the supported language.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("filter parse error: {0}")]
pub struct QueryParseError(pub String);

impl From<QueryParseError> for BridgeError {
    fn from(err: QueryParseError) -> Self {
        BridgeError::InvalidValue(err.to_string())
    }
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Parses a sort document such as `{ "age": -1, "name": 1 }`, keeping key order.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryParseError`] for directions other than `1` and `-1`.
    pub fn from_document(spec: &Document) -> Result<Vec<Sort>, QueryParseError> {
        spec.iter()
            .map(|(field, direction)| {
                let direction = match number(direction) {
                    Some(n) if n > 0.0 => SortDirection::Asc,
                    Some(n) if n < 0.0 => SortDirection::Desc,
                    _ => {
                        return Err(QueryParseError(format!(
                            "invalid sort direction for '{field}': {direction}"
                        )));
                    }
                };

                Ok(Sort {
                    field: field.clone(),
                    direction,
                })
            })
            .collect()
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String or array contains value.
    Contains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field (or one of its elements) is one of the values.
    AnyOf,
    /// Field (and each of its elements) is none of the values.
    NoneOf,
    /// String matches a regular expression value.
    Matches,
}

/// A filter expression for querying documents.
///
/// # Example
///
/// ```ignore
/// use docbridge::query::{Expr, Filter};
///
/// let expr = Filter::and(vec![
///     Filter::eq("status", "active"),
///     Filter::gt("age", 18),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Parses a filter document.
    ///
    /// Returns `Ok(None)` for the empty filter, which matches every document.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryParseError`] for unknown operators or malformed operands.
    pub fn from_filter(filter: &Document) -> Result<Option<Expr>, QueryParseError> {
        let mut children = parse_clauses(filter)?;

        Ok(match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Expr::And(children)),
        })
    }
}

fn parse_clauses(filter: &Document) -> Result<Vec<Expr>, QueryParseError> {
    let mut children = Vec::with_capacity(filter.len());

    for (key, value) in filter {
        match key.as_str() {
            "$and" => children.push(Expr::And(parse_logical_array(key, value)?)),
            "$or" => children.push(Expr::Or(parse_logical_array(key, value)?)),
            "$nor" => children.push(Expr::Or(parse_logical_array(key, value)?).not()),
            "$comment" => {}
            k if k.starts_with('$') => {
                return Err(QueryParseError(format!("unknown top-level operator: {k}")));
            }
            _ => children.push(parse_field_condition(key, value)?),
        }
    }

    Ok(children)
}

fn parse_logical_array(operator: &str, value: &Bson) -> Result<Vec<Expr>, QueryParseError> {
    let items = match value {
        Bson::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(QueryParseError(format!(
                "{operator} value must be a non-empty array"
            )));
        }
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(sub) => {
                let mut clauses = parse_clauses(sub)?;
                Ok(match clauses.len() {
                    1 => clauses.remove(0),
                    _ => Expr::And(clauses),
                })
            }
            _ => Err(QueryParseError(format!(
                "{operator} array elements must be documents"
            ))),
        })
        .collect()
}

fn parse_field_condition(field: &str, value: &Bson) -> Result<Expr, QueryParseError> {
    match value {
        Bson::Document(sub) if sub.keys().next().is_some_and(|k| k.starts_with('$')) => {
            parse_operator_doc(field, sub)
        }
        Bson::RegularExpression(_) => Ok(Expr::field(field.to_string(), FieldOp::Matches, value.clone())),
        _ => Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone())),
    }
}

fn parse_operator_doc(field: &str, ops: &Document) -> Result<Expr, QueryParseError> {
    let mut conditions = Vec::with_capacity(ops.len());

    if let Some(pattern) = ops.get("$regex") {
        conditions.push(parse_regex(field, pattern, ops.get("$options"))?);
    } else if ops.contains_key("$options") {
        return Err(QueryParseError("$options without $regex".into()));
    }

    for (key, value) in ops {
        let field_expr = |op: FieldOp| Expr::field(field.to_string(), op, value.clone());

        let expr = match key.as_str() {
            "$regex" | "$options" => continue,
            "$eq" => field_expr(FieldOp::Eq),
            "$ne" => field_expr(FieldOp::Ne),
            "$gt" => field_expr(FieldOp::Gt),
            "$gte" => field_expr(FieldOp::Gte),
            "$lt" => field_expr(FieldOp::Lt),
            "$lte" => field_expr(FieldOp::Lte),
            "$in" | "$nin" => {
                if !matches!(value, Bson::Array(_)) {
                    return Err(QueryParseError(format!("{key} needs an array")));
                }
                field_expr(if key == "$in" { FieldOp::AnyOf } else { FieldOp::NoneOf })
            }
            "$exists" => match value {
                Bson::Boolean(b) => Expr::Exists(field.to_string(), *b),
                other => match number(other) {
                    Some(n) => Expr::Exists(field.to_string(), n != 0.0),
                    None => return Err(QueryParseError("$exists value must be a boolean".into())),
                },
            },
            "$not" => match value {
                Bson::Document(sub) => parse_operator_doc(field, sub)?.not(),
                Bson::RegularExpression(_) => field_expr(FieldOp::Matches).not(),
                _ => return Err(QueryParseError("$not needs a regex or a document".into())),
            },
            k => return Err(QueryParseError(format!("unknown field operator: {k}"))),
        };

        conditions.push(expr);
    }

    match conditions.len() {
        0 => Err(QueryParseError(format!("empty operator document for '{field}'"))),
        1 => Ok(conditions.remove(0)),
        _ => Ok(Expr::And(conditions)),
    }
}

fn parse_regex(field: &str, pattern: &Bson, options: Option<&Bson>) -> Result<Expr, QueryParseError> {
    let (pattern, mut flags) = match pattern {
        Bson::String(pattern) => (pattern.clone(), String::new()),
        Bson::RegularExpression(regex) => (
            regex.pattern.as_str().to_string(),
            regex.options.as_str().to_string(),
        ),
        _ => return Err(QueryParseError("$regex value must be a string".into())),
    };

    match options {
        None => {}
        Some(Bson::String(extra)) => flags.push_str(extra),
        Some(_) => return Err(QueryParseError("$options value must be a string".into())),
    }

    let cstring = |s: String| {
        bson::raw::CString::try_from(s).map_err(|e| QueryParseError(format!("invalid regex: {e}")))
    };

    Ok(Expr::field(
        field.to_string(),
        FieldOp::Matches,
        Bson::RegularExpression(Regex {
            pattern: cstring(pattern)?,
            options: cstring(flags)?,
        }),
    ))
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the string field starts with the specified value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Matches documents where the string field ends with the specified value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches documents where the field (string or array) contains the specified value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Matches documents where the field exists.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field does not exist.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field is any of the specified values.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Matches documents where the field is none of the specified values.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<BridgeError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(Expr::from_filter(&doc! {}).unwrap(), None);
    }

    #[test]
    fn implicit_equality() {
        assert_eq!(
            Expr::from_filter(&doc! { "status": "active" }).unwrap(),
            Some(Filter::eq("status", "active"))
        );
    }

    #[test]
    fn multiple_fields_are_anded() {
        assert_eq!(
            Expr::from_filter(&doc! { "a": 1, "b": { "$gt": 2, "$lte": 9 } }).unwrap(),
            Some(Filter::and(vec![
                Filter::eq("a", 1),
                Filter::and(vec![Filter::gt("b", 2), Filter::lte("b", 9)]),
            ]))
        );
    }

    #[test]
    fn logical_operators() {
        let expr = Expr::from_filter(&doc! {
            "$or": [{ "a": 1 }, { "b": { "$exists": false } }],
            "$nor": [{ "c": { "$in": [1, 2] } }],
        })
        .unwrap()
        .unwrap();

        assert_eq!(
            expr,
            Filter::and(vec![
                Filter::or(vec![Filter::eq("a", 1), Filter::not_exists("b")]),
                Filter::or(vec![Filter::any_of("c", vec![1, 2])]).not(),
            ])
        );
    }

    #[test]
    fn regex_with_options() {
        let expr = Expr::from_filter(&doc! { "name": { "$regex": "^ac", "$options": "i" } })
            .unwrap()
            .unwrap();

        match expr {
            Expr::Field { op: FieldOp::Matches, value: Bson::RegularExpression(regex), .. } => {
                assert_eq!(regex.pattern.as_str(), "^ac");
                assert_eq!(regex.options.as_str(), "i");
            }
            other => panic!("expected regex match, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(Expr::from_filter(&doc! { "$where": "1" }).is_err());
        assert!(Expr::from_filter(&doc! { "a": { "$near": [0, 0] } }).is_err());
        assert!(Expr::from_filter(&doc! { "a": { "$in": 1 } }).is_err());
        assert!(Expr::from_filter(&doc! { "$or": [] }).is_err());
        assert!(Expr::from_filter(&doc! { "a": { "$options": "i" } }).is_err());
    }

    #[test]
    fn sort_documents_keep_key_order() {
        let sorts = Sort::from_document(&doc! { "age": -1, "name": 1.0 }).unwrap();
        assert_eq!(
            sorts,
            vec![
                Sort { field: "age".into(), direction: SortDirection::Desc },
                Sort { field: "name".into(), direction: SortDirection::Asc },
            ]
        );
        assert!(Sort::from_document(&doc! { "age": "up" }).is_err());
    }
}
