//! Query expression evaluation for in-memory document filtering.
//!
//! Filters arrive as BSON documents, are parsed into [`Expr`] trees by
//! [`Expr::from_filter`] and evaluated here against each stored document.
//! Field names may be dotted paths; comparisons against an array field match
//! when any element matches.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::Regex;
use std::{cmp::Ordering, collections::HashMap};

use docbridge_core::query::{Expr, FieldOp, QueryParseError, QueryVisitor, Sort, SortDirection};

/// Resolves a dotted path inside a document.
///
/// Numeric segments index into arrays, so `tags.0` is the first tag.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut value = document.get(segments.next()?)?;

    for segment in segments {
        value = match value {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(value)
}

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64`. Values with no natural ordering
/// (binary, timestamps, ..) only compare equal to themselves.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Other(_) => 5,
            Comparable::ObjectId(_) => 6,
            Comparable::Bool(_) => 7,
            Comparable::DateTime(_) => 8,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

/// Orders two documents by a list of sort keys. Missing fields sort as null.
pub(crate) fn compare_documents(left: &Document, right: &Document, sorts: &[Sort]) -> Ordering {
    for sort in sorts {
        let l = lookup(left, &sort.field).map_or(Comparable::Null, Comparable::from);
        let r = lookup(right, &sort.field).map_or(Comparable::Null, Comparable::from);

        let ordering = match sort.direction {
            SortDirection::Asc => l.sort_cmp(&r),
            SortDirection::Desc => r.sort_cmp(&l),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Compiled regular expressions, keyed by pattern and options.
#[derive(Debug, Default)]
pub(crate) struct PatternCache {
    compiled: HashMap<(String, String), Regex>,
}

impl PatternCache {
    fn get(&mut self, pattern: &str, options: &str) -> Result<&Regex, QueryParseError> {
        let key = (pattern.to_string(), options.to_string());

        if !self.compiled.contains_key(&key) {
            let flags: String = options
                .chars()
                .map(|flag| match flag {
                    'i' | 'm' | 's' | 'x' => Ok(flag),
                    other => Err(QueryParseError(format!("unsupported regex option: {other}"))),
                })
                .collect::<Result<_, _>>()?;

            let source = if flags.is_empty() {
                pattern.to_string()
            } else {
                format!("(?{flags}){pattern}")
            };
            let regex = Regex::new(&source)
                .map_err(|e| QueryParseError(format!("invalid regex {pattern:?}: {e}")))?;

            self.compiled.insert(key.clone(), regex);
        }

        self.compiled
            .get(&key)
            .ok_or_else(|| QueryParseError(format!("invalid regex {pattern:?}")))
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
    patterns: &'a mut PatternCache,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document, patterns: &'a mut PatternCache) -> Self {
        Self { document, patterns }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<bool, QueryParseError> {
        self.visit_expr(expr)
    }

    /// Returns the documents matching `expr`, in their original order.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryParseError`] for regular expressions that do not compile.
    pub fn filter_documents<'d>(
        documents: impl IntoIterator<Item = &'d Document>,
        expr: Option<&Expr>,
    ) -> Result<Vec<Document>, QueryParseError> {
        let Some(expr) = expr else {
            return Ok(documents.into_iter().cloned().collect());
        };

        let mut patterns = PatternCache::default();
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document, &mut patterns).evaluate(expr)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    fn equals(field_value: Option<&Bson>, value: &Bson) -> bool {
        let expected = Comparable::from(value);

        match field_value {
            None => expected == Comparable::Null,
            Some(field_value) => {
                let actual = Comparable::from(field_value);
                if actual == expected {
                    return true;
                }
                match actual {
                    Comparable::Array(items) => items.iter().any(|item| item == &expected),
                    _ => false,
                }
            }
        }
    }

    fn compare(field_value: &Bson, value: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let expected = Comparable::from(value);

        match Comparable::from(field_value) {
            Comparable::Array(items) => items
                .iter()
                .any(|item| item.partial_cmp(&expected).is_some_and(&accept)),
            actual => actual.partial_cmp(&expected).is_some_and(accept),
        }
    }

    fn any_of(field_value: Option<&Bson>, values: &Bson) -> bool {
        match values {
            Bson::Array(values) => values.iter().any(|value| Self::equals(field_value, value)),
            value => Self::equals(field_value, value),
        }
    }

    fn matches(&mut self, field_value: &Bson, value: &Bson) -> Result<bool, QueryParseError> {
        let regex = match value {
            Bson::RegularExpression(regex) => {
                self.patterns.get(regex.pattern.as_str(), regex.options.as_str())?
            }
            Bson::String(pattern) => self.patterns.get(pattern, "")?,
            _ => return Ok(false),
        };

        Ok(match field_value {
            Bson::String(text) => regex.is_match(text),
            Bson::Array(items) => items
                .iter()
                .any(|item| matches!(item, Bson::String(text) if regex.is_match(text))),
            _ => false,
        })
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = QueryParseError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let field_value = lookup(self.document, field);

        // Operators that have an answer for a missing field.
        match op {
            FieldOp::Eq => return Ok(Self::equals(field_value, value)),
            FieldOp::Ne => return Ok(!Self::equals(field_value, value)),
            FieldOp::AnyOf => return Ok(Self::any_of(field_value, value)),
            FieldOp::NoneOf => return Ok(!Self::any_of(field_value, value)),
            _ => {}
        }

        let Some(field_value) = field_value else {
            return Ok(false);
        };

        Ok(match op {
            FieldOp::Gt => Self::compare(field_value, value, |o| o == Ordering::Greater),
            FieldOp::Gte => Self::compare(field_value, value, |o| o != Ordering::Less),
            FieldOp::Lt => Self::compare(field_value, value, |o| o == Ordering::Less),
            FieldOp::Lte => Self::compare(field_value, value, |o| o != Ordering::Greater),
            FieldOp::Contains => match (Comparable::from(field_value), Comparable::from(value)) {
                (Comparable::Array(items), expected) => items.iter().any(|item| item == &expected),
                (Comparable::String(left), Comparable::String(right)) => left.contains(right),
                _ => false,
            },
            FieldOp::StartsWith => match (field_value, value) {
                (Bson::String(left), Bson::String(right)) => left.starts_with(right.as_str()),
                _ => false,
            },
            FieldOp::EndsWith => match (field_value, value) {
                (Bson::String(left), Bson::String(right)) => left.ends_with(right.as_str()),
                _ => false,
            },
            FieldOp::Matches => self.matches(field_value, value)?,
            FieldOp::Eq | FieldOp::Ne | FieldOp::AnyOf | FieldOp::NoneOf => false,
        })
    }
}
