//! Evaluation of query documents and pipeline stages against stored documents.
//!
//! Covers the operators and stages the compilers emit, plus a few neighbours
//! (`$exists`, `$count`, exclusion projections) that make hand-written raw filters
//! and pipelines usable against the in-memory store.

use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::Regex;

use super::memory::MemoryStoreError;
use crate::compile::SortOrder;

type EvalResult<T> = Result<T, MemoryStoreError>;

/// Read the value at a dotted path. Arrays along the path are traversed element-wise.
pub(crate) fn lookup(document: &Document, path: &str) -> Option<Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let (head, rest) = segments.split_first()?;
    lookup_in(document.get(*head)?, rest)
}

fn lookup_in(value: &Bson, segments: &[&str]) -> Option<Bson> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Bson::Document(document) => lookup_in(document.get(*head)?, rest),
        Bson::Array(items) => Some(Bson::Array(
            items
                .iter()
                .filter_map(|item| lookup_in(item, segments))
                .collect(),
        )),
        _ => None,
    }
}

/// Write `value` at a dotted path, creating intermediate documents.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            let mut nested = match document.get(head) {
                Some(Bson::Document(existing)) => existing.clone(),
                _ => Document::new(),
            };
            set_path(&mut nested, rest, value);
            document.insert(head, nested);
        }
    }
}

pub(crate) fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(nested)) = document.get_mut(head) {
                remove_path(nested, rest);
            }
        }
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn compare_numbers(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (as_i64(a), as_i64(b)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
    }
}

/// Check if two values are equal. Numbers compare by value across widths.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    if let Some(ordering) = compare_numbers(a, b) {
        return ordering == Ordering::Equal;
    }
    match (a, b) {
        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Bson::Document(a), Bson::Document(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => a == b,
    }
}

/// Compare two values of the same type, returning their ordering if comparable.
fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let Some(ordering) = compare_numbers(a, b) {
        return Some(ordering);
    }
    match (a, b) {
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.bytes().cmp(&b.bytes())),
        (Bson::Binary(a), Bson::Binary(b)) => Some(a.bytes.cmp(&b.bytes)),
        _ => None,
    }
}

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 2,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(_) => 10,
    }
}

/// Total order across types, as used by `$sort`.
fn canonical_cmp(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        _ => true,
    }
}

/// Candidates a comparison is tried against: the value itself and, for arrays, each element.
fn candidates(value: Option<&Bson>) -> Vec<&Bson> {
    match value {
        None => Vec::new(),
        Some(value) => match value {
            Bson::Array(items) => {
                let mut all: Vec<&Bson> = items.iter().collect();
                all.push(value);
                all
            }
            scalar => vec![scalar],
        },
    }
}

fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(value) => candidates(Some(value))
            .into_iter()
            .any(|candidate| values_equal(candidate, expected)),
    }
}

fn clauses<'a>(operator: &str, operand: &'a Bson) -> EvalResult<Vec<&'a Document>> {
    let invalid = || MemoryStoreError::InvalidOperand {
        operator: operator.to_string(),
    };
    match operand {
        Bson::Array(items) => items
            .iter()
            .map(|item| item.as_document().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

/// Evaluate a query document against a document.
pub(crate) fn matches(filter: &Document, document: &Document) -> EvalResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(clause, document)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" | "$nor" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(clause, document)? {
                        any = true;
                        break;
                    }
                }
                if key == "$or" {
                    any
                } else {
                    !any
                }
            }
            "$expr" => truthy(&evaluate(condition, document)?),
            operator if operator.starts_with('$') => {
                return Err(MemoryStoreError::UnknownOperator(operator.to_string()))
            }
            path => matches_condition(lookup(document, path).as_ref(), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(operators) => operators
            .keys()
            .next()
            .map_or(false, |key| key.starts_with('$')),
        _ => false,
    }
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> EvalResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(condition) => {
            for (operator, operand) in operators {
                if operator == "$options" {
                    continue;
                }
                if !matches_operator(value, operator, operand, operators)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Bson::RegularExpression(regex) => {
            let regex = compile_regex(&regex.pattern, &regex.options)?;
            Ok(regex_matches(value, &regex))
        }
        literal => Ok(equals(value, literal)),
    }
}

fn matches_operator(
    value: Option<&Bson>,
    operator: &str,
    operand: &Bson,
    siblings: &Document,
) -> EvalResult<bool> {
    let ordered = |accept: fn(Ordering) -> bool| {
        candidates(value).into_iter().any(|candidate| {
            compare_values(candidate, operand).map_or(false, accept)
        })
    };

    match operator {
        "$eq" => Ok(equals(value, operand)),
        "$ne" => Ok(!equals(value, operand)),
        "$gt" => Ok(ordered(Ordering::is_gt)),
        "$gte" => Ok(ordered(Ordering::is_ge)),
        "$lt" => Ok(ordered(Ordering::is_lt)),
        "$lte" => Ok(ordered(Ordering::is_le)),
        "$in" | "$nin" => {
            let items = match operand {
                Bson::Array(items) => items,
                _ => {
                    return Err(MemoryStoreError::InvalidOperand {
                        operator: operator.to_string(),
                    })
                }
            };
            let found = items.iter().any(|item| equals(value, item));
            Ok(if operator == "$in" { found } else { !found })
        }
        "$regex" => {
            let (pattern, mut options) = match operand {
                Bson::String(pattern) => (pattern.as_str(), String::new()),
                Bson::RegularExpression(regex) => (regex.pattern.as_str(), regex.options.clone()),
                _ => {
                    return Err(MemoryStoreError::InvalidOperand {
                        operator: operator.to_string(),
                    })
                }
            };
            if let Some(Bson::String(extra)) = siblings.get("$options") {
                options.push_str(extra);
            }
            let regex = compile_regex(pattern, &options)?;
            Ok(regex_matches(value, &regex))
        }
        "$not" => Ok(!matches_condition(value, operand)?),
        "$exists" => Ok(value.is_some() == truthy(operand)),
        other => Err(MemoryStoreError::UnknownOperator(other.to_string())),
    }
}

fn compile_regex(pattern: &str, options: &str) -> EvalResult<Regex> {
    let flags: String = options
        .chars()
        .filter(|flag| matches!(flag, 'i' | 'm' | 's' | 'x'))
        .collect();
    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };
    Ok(Regex::new(&source)?)
}

fn regex_matches(value: Option<&Bson>, regex: &Regex) -> bool {
    candidates(value).into_iter().any(|candidate| match candidate {
        Bson::String(s) => regex.is_match(s),
        _ => false,
    })
}

/// Evaluate an aggregation expression against a document.
pub(crate) fn evaluate(expression: &Bson, document: &Document) -> EvalResult<Bson> {
    match expression {
        Bson::String(s) => match s.strip_prefix('$') {
            Some("$ROOT") => Ok(Bson::Document(document.clone())),
            Some(variable) if variable.starts_with('$') => {
                Err(MemoryStoreError::UnknownOperator(s.clone()))
            }
            Some(path) => Ok(lookup(document, path).unwrap_or(Bson::Null)),
            None => Ok(expression.clone()),
        },
        Bson::Document(fields) => {
            let mut entries = fields.iter();
            match (entries.next(), entries.next()) {
                (Some((operator, arguments)), None) if operator.starts_with('$') => {
                    apply_expression(operator, arguments, document)
                }
                _ => {
                    let mut evaluated = Document::new();
                    for (key, value) in fields {
                        evaluated.insert(key.clone(), evaluate(value, document)?);
                    }
                    Ok(Bson::Document(evaluated))
                }
            }
        }
        Bson::Array(items) => Ok(Bson::Array(
            items
                .iter()
                .map(|item| evaluate(item, document))
                .collect::<EvalResult<Vec<_>>>()?,
        )),
        other => Ok(other.clone()),
    }
}

fn apply_expression(operator: &str, arguments: &Bson, document: &Document) -> EvalResult<Bson> {
    let invalid = || MemoryStoreError::InvalidOperand {
        operator: operator.to_string(),
    };
    let operands = |arguments: &Bson| -> EvalResult<Vec<Bson>> {
        match arguments {
            Bson::Array(items) => items.iter().map(|item| evaluate(item, document)).collect(),
            single => Ok(vec![evaluate(single, document)?]),
        }
    };

    match operator {
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
            let values = operands(arguments)?;
            let [lhs, rhs] = values.as_slice() else {
                return Err(invalid());
            };
            let ordering = canonical_cmp(Some(lhs), Some(rhs));
            let result = match operator {
                "$eq" => values_equal(lhs, rhs),
                "$ne" => !values_equal(lhs, rhs),
                "$gt" => ordering.is_gt(),
                "$gte" => ordering.is_ge(),
                "$lt" => ordering.is_lt(),
                _ => ordering.is_le(),
            };
            Ok(Bson::Boolean(result))
        }
        "$and" => Ok(Bson::Boolean(operands(arguments)?.iter().all(truthy))),
        "$or" => Ok(Bson::Boolean(operands(arguments)?.iter().any(truthy))),
        "$not" => {
            let values = operands(arguments)?;
            let [value] = values.as_slice() else {
                return Err(invalid());
            };
            Ok(Bson::Boolean(!truthy(value)))
        }
        "$literal" => Ok(arguments.clone()),
        other => Err(MemoryStoreError::UnknownOperator(other.to_string())),
    }
}

/// Sort documents by a `{path: 1 | -1}` specification. The sort is stable.
pub(crate) fn sort_documents(documents: &mut [Document], spec: &Document) -> EvalResult<()> {
    let keys = spec
        .iter()
        .map(|(path, direction)| {
            SortOrder::from_primitive(direction)
                .map(|order| (path.as_str(), order))
                .ok_or_else(|| MemoryStoreError::InvalidOperand {
                    operator: "$sort".to_string(),
                })
        })
        .collect::<EvalResult<Vec<_>>>()?;

    documents.sort_by(|a, b| {
        for (path, order) in &keys {
            let ordering = canonical_cmp(lookup(a, path).as_ref(), lookup(b, path).as_ref());
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Run pipeline stages over `documents`. `collection` reads other collections for `$lookup`.
pub(crate) fn run_pipeline<F>(
    mut documents: Vec<Document>,
    stages: &[Document],
    collection: F,
) -> EvalResult<Vec<Document>>
where
    F: Fn(&str) -> Vec<Document>,
{
    for stage in stages {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(MemoryStoreError::UnsupportedStage(format!("{}", stage)));
            }
        };
        documents = apply_stage(name, spec, documents, &collection)?;
    }
    Ok(documents)
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> EvalResult<&'a Document> {
    spec.as_document()
        .ok_or_else(|| MemoryStoreError::InvalidOperand {
            operator: name.to_string(),
        })
}

fn stage_str<'a>(name: &str, spec: &'a Document, key: &str) -> EvalResult<&'a str> {
    spec.get_str(key).map_err(|_| MemoryStoreError::InvalidOperand {
        operator: format!("{}.{}", name, key),
    })
}

fn stage_count(name: &str, spec: &Bson) -> EvalResult<usize> {
    as_i64(spec)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| MemoryStoreError::InvalidOperand {
            operator: name.to_string(),
        })
}

fn apply_stage<F>(
    name: &str,
    spec: &Bson,
    documents: Vec<Document>,
    collection: &F,
) -> EvalResult<Vec<Document>>
where
    F: Fn(&str) -> Vec<Document>,
{
    match name {
        "$replaceRoot" => {
            let new_root = stage_document(name, spec)?
                .get("newRoot")
                .ok_or_else(|| MemoryStoreError::InvalidOperand {
                    operator: "$replaceRoot.newRoot".to_string(),
                })?;
            documents
                .iter()
                .map(|document| match evaluate(new_root, document)? {
                    Bson::Document(root) => Ok(root),
                    _ => Err(MemoryStoreError::InvalidOperand {
                        operator: name.to_string(),
                    }),
                })
                .collect()
        }
        "$lookup" => {
            let spec = stage_document(name, spec)?;
            let foreign = collection(stage_str(name, spec, "from")?);
            let local_field = stage_str(name, spec, "localField")?;
            let foreign_field = stage_str(name, spec, "foreignField")?;
            let output = stage_str(name, spec, "as")?;

            Ok(documents
                .into_iter()
                .map(|mut document| {
                    let local = lookup(&document, local_field).unwrap_or(Bson::Null);
                    let joined: Vec<Bson> = foreign
                        .iter()
                        .filter(|candidate| {
                            let key = lookup(candidate, foreign_field).unwrap_or(Bson::Null);
                            match &local {
                                Bson::Array(items) => {
                                    items.iter().any(|item| equals(Some(&key), item))
                                }
                                local => equals(Some(&key), local),
                            }
                        })
                        .map(|candidate| Bson::Document(candidate.clone()))
                        .collect();
                    set_path(&mut document, output, Bson::Array(joined));
                    document
                })
                .collect())
        }
        "$unwind" => {
            let (path, preserve) = match spec {
                Bson::String(path) => (path.as_str(), false),
                Bson::Document(options) => (
                    stage_str(name, options, "path")?,
                    options
                        .get_bool("preserveNullAndEmptyArrays")
                        .unwrap_or(false),
                ),
                _ => {
                    return Err(MemoryStoreError::InvalidOperand {
                        operator: name.to_string(),
                    })
                }
            };
            let path = path.strip_prefix('$').unwrap_or(path);

            let mut unwound = Vec::with_capacity(documents.len());
            for document in documents {
                match lookup(&document, path) {
                    Some(Bson::Array(items)) if !items.is_empty() => {
                        for item in items {
                            let mut copy = document.clone();
                            set_path(&mut copy, path, item);
                            unwound.push(copy);
                        }
                    }
                    Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                        if preserve {
                            unwound.push(document);
                        }
                    }
                    Some(_) => unwound.push(document),
                }
            }
            Ok(unwound)
        }
        "$match" => {
            let filter = stage_document(name, spec)?;
            let mut kept = Vec::with_capacity(documents.len());
            for document in documents {
                if matches(filter, &document)? {
                    kept.push(document);
                }
            }
            Ok(kept)
        }
        "$sort" => {
            let mut documents = documents;
            sort_documents(&mut documents, stage_document(name, spec)?)?;
            Ok(documents)
        }
        "$skip" => {
            let count = stage_count(name, spec)?;
            Ok(documents.into_iter().skip(count).collect())
        }
        "$limit" => {
            let count = stage_count(name, spec)?;
            Ok(documents.into_iter().take(count).collect())
        }
        "$project" => {
            let spec = stage_document(name, spec)?;
            Ok(documents
                .iter()
                .map(|document| project(document, spec))
                .collect())
        }
        "$group" => group(stage_document(name, spec)?, &documents),
        "$count" => {
            let output = match spec {
                Bson::String(output) => output,
                _ => {
                    return Err(MemoryStoreError::InvalidOperand {
                        operator: name.to_string(),
                    })
                }
            };
            if documents.is_empty() {
                return Ok(Vec::new());
            }
            let mut counted = Document::new();
            counted.insert(output.clone(), documents.len() as i64);
            Ok(vec![counted])
        }
        other => Err(MemoryStoreError::UnsupportedStage(other.to_string())),
    }
}

fn project(document: &Document, spec: &Document) -> Document {
    let include_id = spec.get("_id").map_or(true, truthy);
    let included: Vec<&str> = spec
        .iter()
        .filter(|(path, flag)| path.as_str() != "_id" && truthy(flag))
        .map(|(path, _)| path.as_str())
        .collect();

    if included.is_empty() {
        let mut projected = document.clone();
        for (path, flag) in spec {
            if !truthy(flag) {
                remove_path(&mut projected, path);
            }
        }
        return projected;
    }

    let mut projected = Document::new();
    if include_id {
        if let Some(id) = document.get("_id") {
            projected.insert("_id", id.clone());
        }
    }
    for path in included {
        let segments: Vec<&str> = path.split('.').collect();
        project_into(&mut projected, document, &segments);
    }
    projected
}

fn project_into(target: &mut Document, source: &Document, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Some(value) = source.get(*head) else {
        return;
    };
    if rest.is_empty() {
        target.insert(*head, value.clone());
        return;
    }

    match value {
        Bson::Document(inner) => {
            let mut nested = match target.get(*head) {
                Some(Bson::Document(existing)) => existing.clone(),
                _ => Document::new(),
            };
            project_into(&mut nested, inner, rest);
            target.insert(*head, nested);
        }
        Bson::Array(items) => {
            let existing = match target.get(*head) {
                Some(Bson::Array(existing)) => existing.clone(),
                _ => Vec::new(),
            };
            let projected: Vec<Bson> = items
                .iter()
                .filter_map(Bson::as_document)
                .enumerate()
                .map(|(index, item)| {
                    let mut nested = match existing.get(index) {
                        Some(Bson::Document(existing)) => existing.clone(),
                        _ => Document::new(),
                    };
                    project_into(&mut nested, item, rest);
                    Bson::Document(nested)
                })
                .collect();
            target.insert(*head, projected);
        }
        _ => {}
    }
}

fn group(spec: &Document, documents: &[Document]) -> EvalResult<Vec<Document>> {
    let key_expression = spec.get("_id").unwrap_or(&Bson::Null);

    let mut groups: Vec<(Bson, Vec<&Document>)> = Vec::new();
    for document in documents {
        let key = evaluate(key_expression, document)?;
        match groups.iter_mut().find(|(existing, _)| values_equal(existing, &key)) {
            Some((_, members)) => members.push(document),
            None => groups.push((key, vec![document])),
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut output = Document::new();
            output.insert("_id", key);
            for (name, accumulator) in spec {
                if name == "_id" {
                    continue;
                }
                let accumulator = accumulator.as_document().ok_or_else(|| {
                    MemoryStoreError::InvalidOperand {
                        operator: name.clone(),
                    }
                })?;
                output.insert(name.clone(), accumulate(accumulator, &members)?);
            }
            Ok(output)
        })
        .collect()
}

fn accumulate(accumulator: &Document, members: &[&Document]) -> EvalResult<Bson> {
    let mut entries = accumulator.iter();
    let (operator, expression) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(MemoryStoreError::InvalidOperand {
                operator: format!("{}", accumulator),
            })
        }
    };

    if operator == "$count" {
        return Ok(Bson::Int64(members.len() as i64));
    }

    let values = members
        .iter()
        .map(|member| evaluate(expression, member))
        .collect::<EvalResult<Vec<_>>>()?;

    match operator.as_str() {
        "$sum" => {
            let mut integer: i64 = 0;
            let mut float = 0.0;
            let mut is_float = false;
            for value in &values {
                match value {
                    Bson::Double(f) => {
                        is_float = true;
                        float += f;
                    }
                    other => {
                        if let Some(i) = as_i64(other) {
                            integer = integer.saturating_add(i);
                        }
                    }
                }
            }
            if is_float {
                Ok(Bson::Double(float + integer as f64))
            } else if let Ok(small) = i32::try_from(integer) {
                Ok(Bson::Int32(small))
            } else {
                Ok(Bson::Int64(integer))
            }
        }
        "$avg" => {
            let numbers: Vec<f64> = values.iter().filter_map(as_f64).collect();
            if numbers.is_empty() {
                Ok(Bson::Null)
            } else {
                Ok(Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64))
            }
        }
        "$min" | "$max" => {
            let present = values
                .into_iter()
                .filter(|value| !matches!(value, Bson::Null | Bson::Undefined));
            let chosen = if operator == "$min" {
                present.min_by(|a, b| canonical_cmp(Some(a), Some(b)))
            } else {
                present.max_by(|a, b| canonical_cmp(Some(a), Some(b)))
            };
            Ok(chosen.unwrap_or(Bson::Null))
        }
        other => Err(MemoryStoreError::UnknownOperator(other.to_string())),
    }
}
