//! JSON query documents.
//!
//! A query document is an object with exactly one of the keys `node`,
//! `boolean`, `phrase` or `twig`:
//!
//! ```json
//! {"twig": {
//!     "root": "author",
//!     "child": [{"occur": "MUST", "node": {"attribute": "name", "query": "Ada"}}],
//!     "descendant": [{"occur": "MUST_NOT", "node": {"query": "draft"}}]
//! }}
//! ```
//!
//! String query text runs through the same value stages as indexed text, so
//! the parser must be configured with the pipeline the corpus was indexed
//! with.

use std::ops::Bound;
use std::str::FromStr;

use arbor_common::{Result, error::Error};
use arbor_node_index::{Datatype, analysis::AnalysisPipeline};
use itertools::Itertools;
use serde_json::{Map, Value};

use crate::query::{
    AttributePath, Axis, BooleanQuery, BooleanScope, DEFAULT_FIELD, NodeQuery, Occur,
    PhraseQuery, Query, TermMatch, TermValue, TwigChild, TwigQuery,
};

const QUERY_KINDS: [&str; 4] = ["node", "boolean", "phrase", "twig"];

type Object = Map<String, Value>;

pub struct QueryParser {
    pipeline: AnalysisPipeline,
    default_field: String,
}

impl Default for QueryParser {
    fn default() -> Self {
        QueryParser::new(AnalysisPipeline::default())
    }
}

impl QueryParser {
    pub fn new(pipeline: AnalysisPipeline) -> Self {
        QueryParser {
            pipeline,
            default_field: DEFAULT_FIELD.to_string(),
        }
    }

    pub fn with_default_field(mut self, field: impl Into<String>) -> Self {
        self.default_field = field.into();
        self
    }

    pub fn parse(&self, json: &str) -> Result<Query> {
        let document: Value =
            serde_json::from_str(json).map_err(|e| Error::json("query document", e))?;
        self.parse_value(&document)
    }

    pub fn parse_value(&self, document: &Value) -> Result<Query> {
        let object = as_object(document, "query")?;
        let (kind, body) = query_entry(object)?;
        if object.len() > 1 {
            return Err(Error::invalid_arg(
                "query",
                format!(
                    "unexpected keys next to '{kind}': {}",
                    object.keys().filter(|key| *key != kind).join(", ")
                ),
            ));
        }
        self.parse_kind(kind, body)
    }

    fn parse_kind(&self, kind: &str, body: &Value) -> Result<Query> {
        let body = as_object(body, kind)?;
        match kind {
            "node" => self.parse_node(body),
            "boolean" => self.parse_boolean(body).map(Query::Boolean),
            "phrase" => self.parse_phrase(body).map(Query::Phrase),
            "twig" => self.parse_twig(body).map(Query::Twig),
            _ => Err(Error::invalid_arg("query", format!("unknown query kind '{kind}'"))),
        }
    }

    fn field(&self, body: &Object) -> Result<String> {
        Ok(get_str(body, "field")?
            .unwrap_or(&self.default_field)
            .to_string())
    }

    /// Single-term text becomes a node query; text the analyzer splits into
    /// several terms becomes a node-scope conjunction of them.
    fn parse_node(&self, body: &Object) -> Result<Query> {
        let field = self.field(body)?;
        let datatype = get_str(body, "datatype")?
            .map(Datatype::from_str)
            .transpose()?;
        let attribute = get_str(body, "attribute")?
            .map(AttributePath::parse)
            .transpose()?;

        let selectors = ["query", "prefix", "range"]
            .into_iter()
            .filter(|key| body.contains_key(*key))
            .collect::<Vec<_>>();
        if selectors.len() != 1 {
            return Err(Error::invalid_arg(
                "node",
                "expected exactly one of 'query', 'prefix' or 'range'",
            ));
        }

        let terms = match selectors[0] {
            "query" => {
                let text = value_text(&body["query"], "query")?;
                match datatype.unwrap_or(Datatype::String) {
                    Datatype::String => self
                        .analyze(&text, "query")?
                        .into_iter()
                        .map(|term| TermMatch::Exact(TermValue::String(term)))
                        .collect(),
                    datatype => vec![TermMatch::Exact(TermValue::parse(datatype, &text)?)],
                }
            }
            "prefix" => {
                if datatype.is_some_and(|datatype| datatype != Datatype::String) {
                    return Err(Error::invalid_arg("prefix", "prefix queries match string terms"));
                }
                let text = value_text(&body["prefix"], "prefix")?;
                let mut terms = self.analyze(&text, "prefix")?;
                if terms.len() != 1 {
                    return Err(Error::invalid_arg("prefix", "prefix must be a single term"));
                }
                vec![TermMatch::Prefix(terms.remove(0))]
            }
            _ => vec![parse_range(as_object(&body["range"], "range")?, datatype)?],
        };

        let mut leaves = terms
            .into_iter()
            .map(|term| {
                let mut leaf = NodeQuery::new(field.clone(), term);
                leaf.attribute = attribute.clone();
                apply_constraints(leaf, body)
            })
            .collect::<Result<Vec<_>>>()?;
        if leaves.len() == 1 {
            return Ok(Query::Node(leaves.remove(0)));
        }
        Ok(Query::Boolean(
            leaves
                .into_iter()
                .fold(BooleanQuery::new(BooleanScope::Node), |query, leaf| query.must(leaf)),
        ))
    }

    fn analyze(&self, text: &str, name: &str) -> Result<Vec<String>> {
        let terms = self.pipeline.normalize(text);
        if terms.is_empty() {
            return Err(Error::invalid_arg(
                name,
                format!("'{text}' does not contain any indexable term"),
            ));
        }
        Ok(terms)
    }

    fn parse_boolean(&self, body: &Object) -> Result<BooleanQuery> {
        let scope = get_str(body, "scope")?
            .map(BooleanScope::from_str)
            .transpose()?
            .unwrap_or_default();
        let mut query = BooleanQuery::new(scope);
        for clause in get_array(body, "clause")?.unwrap_or(&[]) {
            let clause = as_object(clause, "clause")?;
            let (kind, inner) = query_entry(clause)?;
            query = query.with_clause(self.parse_kind(kind, inner)?, occur(clause)?);
        }
        if let Some(minimum) = get_u32(body, "minimum_should_match")? {
            query = query.with_minimum_should_match(minimum as usize);
        }
        Ok(query)
    }

    fn parse_phrase(&self, body: &Object) -> Result<PhraseQuery> {
        let text = match body.get("query") {
            Some(text) => value_text(text, "query")?,
            None => return Err(Error::invalid_arg("phrase", "missing 'query'")),
        };
        let mut query = PhraseQuery::new(self.field(body)?, self.analyze(&text, "query")?)?;
        if let Some(attribute) = get_str(body, "attribute")? {
            query = query.with_attribute(AttributePath::parse(attribute)?);
        }
        if let Some(slop) = get_u32(body, "slop")? {
            query = query.with_slop(slop);
        }
        Ok(query)
    }

    /// A string root matches the object entries labeled with it; an object
    /// root is a node or boolean query document.
    fn parse_twig(&self, body: &Object) -> Result<TwigQuery> {
        let root = match body.get("root") {
            Some(Value::String(label)) => Query::Node(NodeQuery::new(
                self.field(body)?,
                TermMatch::Exact(TermValue::Attribute(label.clone())),
            )),
            Some(root) => self.parse_value(root)?,
            None => return Err(Error::invalid_arg("twig", "missing 'root'")),
        };
        let mut twig = TwigQuery::new(root)?;
        for (key, axis) in [("child", Axis::Child), ("descendant", Axis::Descendant)] {
            for child in get_array(body, key)?.unwrap_or(&[]) {
                twig = twig.with_child(self.parse_twig_child(as_object(child, key)?, axis)?);
            }
        }
        if let Some(minimum) = get_u32(body, "minimum_should_match")? {
            twig = twig.with_minimum_should_match(minimum as usize);
        }
        Ok(twig)
    }

    fn parse_twig_child(&self, child: &Object, axis: Axis) -> Result<TwigChild> {
        let (kind, inner) = query_entry(child)?;
        let mut parsed = TwigChild::new(self.parse_kind(kind, inner)?, occur(child)?)
            .with_axis(axis)
            .with_in_order(get_bool(child, "in_order")?.unwrap_or(false));
        if let Some(slop) = get_u32(child, "slop")? {
            parsed = parsed.with_slop(slop);
        }
        Ok(parsed)
    }
}

/// Parses a query document with the default analysis pipeline and field.
pub fn parse_query(json: &str) -> Result<Query> {
    QueryParser::default().parse(json)
}

fn apply_constraints(mut leaf: NodeQuery, body: &Object) -> Result<NodeQuery> {
    if let Some(level) = get_u32(body, "level")? {
        leaf = leaf.with_level(level as usize);
    }
    if let Some((low, high)) = get_pair(body, "node_range")? {
        leaf = leaf.with_node_range(low, high)?;
    }
    if let Some((low, high)) = get_pair(body, "position_range")? {
        leaf = leaf.with_position_range(low, high)?;
    }
    Ok(leaf)
}

/// `{"gt"|"gte": lower, "lt"|"lte": upper}`. Without an explicit datatype the
/// bounds decide it: integers are longs, other numbers doubles, text strings.
fn parse_range(range: &Object, datatype: Option<Datatype>) -> Result<TermMatch> {
    if let Some(key) = range
        .keys()
        .find(|key| !matches!(key.as_str(), "gt" | "gte" | "lt" | "lte"))
    {
        return Err(Error::invalid_arg("range", format!("unexpected key '{key}'")));
    }
    let datatype = match datatype {
        Some(datatype) => datatype,
        None => range
            .values()
            .map(infer_datatype)
            .reduce(widen)
            .unwrap_or(Datatype::String),
    };
    let bound = |inclusive: &str, exclusive: &str| -> Result<Bound<TermValue>> {
        match (range.get(inclusive), range.get(exclusive)) {
            (Some(_), Some(_)) => Err(Error::invalid_arg(
                "range",
                format!("'{inclusive}' and '{exclusive}' are exclusive"),
            )),
            (Some(value), None) => Ok(Bound::Included(TermValue::parse(
                datatype,
                &value_text(value, inclusive)?,
            )?)),
            (None, Some(value)) => Ok(Bound::Excluded(TermValue::parse(
                datatype,
                &value_text(value, exclusive)?,
            )?)),
            (None, None) => Ok(Bound::Unbounded),
        }
    };
    TermMatch::range(datatype, bound("gte", "gt")?, bound("lte", "lt")?)
}

fn infer_datatype(value: &Value) -> Datatype {
    match value {
        Value::Number(number) if number.is_i64() => Datatype::Long,
        Value::Number(_) => Datatype::Double,
        Value::Bool(_) => Datatype::Boolean,
        _ => Datatype::String,
    }
}

/// Integer and float bounds meet at `Double`. Other mixes keep the first
/// datatype, and the other bound then fails to parse.
fn widen(first: Datatype, second: Datatype) -> Datatype {
    match (first, second) {
        (Datatype::Long, Datatype::Double) | (Datatype::Double, Datatype::Long) => Datatype::Double,
        _ => first,
    }
}

/// The single query-kind key of a query document or clause.
fn query_entry(object: &Object) -> Result<(&str, &Value)> {
    let mut entries = object
        .iter()
        .filter(|(key, _)| QUERY_KINDS.contains(&key.as_str()));
    match (entries.next(), entries.next()) {
        (Some((kind, body)), None) => Ok((kind.as_str(), body)),
        (None, _) => Err(Error::invalid_arg(
            "query",
            format!("expected one of {}", QUERY_KINDS.iter().join(", ")),
        )),
        (Some(_), Some(_)) => Err(Error::invalid_arg(
            "query",
            "more than one query kind in the same object",
        )),
    }
}

/// Clauses without an `occur` key are required.
fn occur(object: &Object) -> Result<Occur> {
    get_str(object, "occur")?
        .map(Occur::from_str)
        .transpose()
        .map(|occur| occur.unwrap_or(Occur::Must))
}

fn as_object<'v>(value: &'v Value, name: &str) -> Result<&'v Object> {
    value
        .as_object()
        .ok_or_else(|| Error::invalid_arg(name, "expected a JSON object"))
}

/// Query text of a primitive JSON value.
fn value_text(value: &Value, name: &str) -> Result<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        _ => Err(Error::invalid_arg(name, "expected a string, number or boolean")),
    }
}

fn get_str<'v>(object: &'v Object, key: &str) -> Result<Option<&'v str>> {
    match object.get(key) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(Error::invalid_arg(key, "expected a string")),
    }
}

fn get_bool(object: &Object, key: &str) -> Result<Option<bool>> {
    match object.get(key) {
        None => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(Error::invalid_arg(key, "expected a boolean")),
    }
}

fn get_u32(object: &Object, key: &str) -> Result<Option<u32>> {
    match object.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| Error::invalid_arg(key, "expected a non-negative integer")),
    }
}

fn get_array<'v>(object: &'v Object, key: &str) -> Result<Option<&'v [Value]>> {
    match object.get(key) {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(Error::invalid_arg(key, "expected an array")),
    }
}

fn get_pair(object: &Object, key: &str) -> Result<Option<(u32, u32)>> {
    let Some(items) = get_array(object, key)? else {
        return Ok(None);
    };
    let bounds = items
        .iter()
        .map(|item| item.as_u64().and_then(|n| u32::try_from(n).ok()))
        .collect::<Option<Vec<_>>>();
    match bounds.as_deref() {
        Some(&[low, high]) => Ok(Some((low, high))),
        _ => Err(Error::invalid_arg(key, "expected [low, high]")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_documents() {
        let query = parse_query(r#"{"node": {"query": "Ada", "attribute": "author.name"}}"#)
            .unwrap();
        let Query::Node(node) = query else {
            panic!("expected a node query");
        };
        assert_eq!(node.field, DEFAULT_FIELD);
        assert_eq!(node.term, TermMatch::Exact(TermValue::String("ada".into())));
        assert_eq!(node.attribute, Some(AttributePath::parse("author.name").unwrap()));

        let query = parse_query(r#"{"node": {"query": 42, "datatype": "long", "level": 1}}"#)
            .unwrap();
        let Query::Node(node) = query else {
            panic!("expected a node query");
        };
        assert_eq!(node.term, TermMatch::Exact(TermValue::Long(42)));
        assert_eq!(node.constraints.level, Some(1));
    }

    #[test]
    fn test_multi_term_text_is_a_node_conjunction() {
        let query = parse_query(r#"{"node": {"query": "Ada Lovelace"}}"#).unwrap();
        let Query::Boolean(boolean) = query else {
            panic!("expected a boolean query");
        };
        assert_eq!(boolean.scope, BooleanScope::Node);
        assert_eq!(boolean.clauses.len(), 2);
        assert!(boolean.clauses.iter().all(|clause| clause.occur == Occur::Must));
    }

    #[test]
    fn test_range_documents() {
        let query = parse_query(r#"{"node": {"range": {"gte": 1800, "lt": 1900}}}"#).unwrap();
        let Query::Node(node) = query else {
            panic!("expected a node query");
        };
        assert_eq!(
            node.term,
            TermMatch::Range {
                datatype: Datatype::Long,
                lower: Bound::Included(TermValue::Long(1800)),
                upper: Bound::Excluded(TermValue::Long(1900)),
            }
        );
        assert!(parse_query(r#"{"node": {"range": {"gt": 1, "gte": 2}}}"#).is_err());

        let query = parse_query(r#"{"node": {"range": {"gte": 1, "lte": 2.5}}}"#).unwrap();
        let Query::Node(node) = query else {
            panic!("expected a node query");
        };
        assert_eq!(
            node.term,
            TermMatch::Range {
                datatype: Datatype::Double,
                lower: Bound::Included(TermValue::Double(1.0)),
                upper: Bound::Included(TermValue::Double(2.5)),
            }
        );
        assert!(parse_query(r#"{"node": {"range": {"gte": 1, "lte": true}}}"#).is_err());
    }

    #[test]
    fn test_twig_document() {
        let query = parse_query(
            r#"{"twig": {
                "root": "author",
                "child": [
                    {"occur": "MUST", "node": {"attribute": "name", "query": "ada"}},
                    {"occur": "should", "in_order": true, "slop": 1, "node": {"query": "x"}}
                ],
                "descendant": [{"occur": "MUST_NOT", "node": {"query": "draft"}}]
            }}"#,
        )
        .unwrap();
        let Query::Twig(twig) = query else {
            panic!("expected a twig query");
        };
        assert_eq!(
            *twig.root,
            Query::Node(NodeQuery::new(
                DEFAULT_FIELD,
                TermMatch::Exact(TermValue::Attribute("author".into()))
            ))
        );
        let shape: Vec<(Occur, Axis, bool, Option<u32>)> = twig
            .children
            .iter()
            .map(|child| (child.occur, child.axis, child.in_order, child.slop))
            .collect();
        assert_eq!(
            shape,
            vec![
                (Occur::Must, Axis::Child, false, None),
                (Occur::Should, Axis::Child, true, Some(1)),
                (Occur::MustNot, Axis::Descendant, false, None),
            ]
        );
    }

    #[test]
    fn test_boolean_and_phrase_documents() {
        let query = parse_query(
            r#"{"boolean": {
                "scope": "node",
                "minimum_should_match": 2,
                "clause": [
                    {"occur": "SHOULD", "node": {"query": "a"}},
                    {"occur": "SHOULD", "phrase": {"query": "b c", "slop": 1}},
                    {"node": {"prefix": "d"}}
                ]
            }}"#,
        )
        .unwrap();
        let Query::Boolean(boolean) = query else {
            panic!("expected a boolean query");
        };
        assert_eq!(boolean.minimum_should_match, Some(2));
        assert_eq!(boolean.clauses[2].occur, Occur::Must);
        let Query::Phrase(phrase) = &boolean.clauses[1].query else {
            panic!("expected a phrase clause");
        };
        assert_eq!(phrase.terms, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(phrase.slop, 1);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(parse_query("not json").is_err());
        assert!(parse_query(r#"{"match": {}}"#).unwrap_err().is_invalid_argument());
        assert!(
            parse_query(r#"{"node": {"query": "x"}, "phrase": {"query": "y"}}"#)
                .unwrap_err()
                .is_invalid_argument()
        );
        assert!(
            parse_query(r#"{"node": {"query": "x", "datatype": "uuid"}}"#)
                .unwrap_err()
                .is_unsupported_configuration()
        );
        assert!(
            parse_query(r#"{"node": {"query": "x", "node_range": [3, 1]}}"#)
                .unwrap_err()
                .is_invalid_argument()
        );
        assert!(
            parse_query(r#"{"twig": {"root": {"phrase": {"query": "a b"}}}}"#)
                .unwrap_err()
                .is_invalid_argument()
        );
        let unknown_occur =
            r#"{"boolean": {"clause": [{"occur": "SOMETIMES", "node": {"query": "x"}}]}}"#;
        assert!(parse_query(unknown_occur).unwrap_err().is_invalid_argument());
    }
}
