//! The query tree.
//!
//! [`Query`] is a closed set of variants composed recursively: leaf
//! [`NodeQuery`]s, [`BooleanQuery`] and [`PhraseQuery`] combinators, and
//! [`TwigQuery`] structural patterns. A query is built once per execution and
//! is never modified while it is being evaluated.

use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use arbor_common::{Result, error::Error, verify_arg};
use arbor_node_index::{Datatype, NodeAddress, TermKey, is_ancestor, is_parent};

/// Field queried when a query document does not name one.
pub const DEFAULT_FIELD: &str = "content";

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Node(NodeQuery),
    Boolean(BooleanQuery),
    Phrase(PhraseQuery),
    Twig(TwigQuery),
}

impl Query {
    pub fn kind(&self) -> &'static str {
        match self {
            Query::Node(_) => "node",
            Query::Boolean(_) => "boolean",
            Query::Phrase(_) => "phrase",
            Query::Twig(_) => "twig",
        }
    }
}

impl From<NodeQuery> for Query {
    fn from(query: NodeQuery) -> Self {
        Query::Node(query)
    }
}

impl From<BooleanQuery> for Query {
    fn from(query: BooleanQuery) -> Self {
        Query::Boolean(query)
    }
}

impl From<PhraseQuery> for Query {
    fn from(query: PhraseQuery) -> Self {
        Query::Phrase(query)
    }
}

impl From<TwigQuery> for Query {
    fn from(query: TwigQuery) -> Self {
        Query::Twig(query)
    }
}

/// Occurrence constraint of a boolean clause or twig child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

impl Occur {
    pub const fn name(&self) -> &'static str {
        match self {
            Occur::Must => "MUST",
            Occur::Should => "SHOULD",
            Occur::MustNot => "MUST_NOT",
        }
    }
}

impl FromStr for Occur {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "MUST" => Ok(Occur::Must),
            "SHOULD" => Ok(Occur::Should),
            "MUST_NOT" => Ok(Occur::MustNot),
            _ => Err(Error::invalid_arg(
                "occur",
                format!("expected MUST, SHOULD or MUST_NOT, got '{name}'"),
            )),
        }
    }
}

impl fmt::Display for Occur {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed term value as written in a query.
#[derive(Debug, Clone, PartialEq)]
pub enum TermValue {
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    /// An attribute label, matching object entries with that key.
    Attribute(String),
}

impl TermValue {
    /// Parses query text as a value of `datatype`.
    pub fn parse(datatype: Datatype, text: &str) -> Result<TermValue> {
        let invalid = || Error::invalid_arg("term", format!("'{text}' is not a valid {datatype}"));
        match datatype {
            Datatype::String => Ok(TermValue::String(text.to_string())),
            Datatype::Attribute => Ok(TermValue::Attribute(text.to_string())),
            Datatype::Long => text.trim().parse().map(TermValue::Long).map_err(|_| invalid()),
            Datatype::Double => text.trim().parse().map(TermValue::Double).map_err(|_| invalid()),
            Datatype::Boolean => text.trim().parse().map(TermValue::Boolean).map_err(|_| invalid()),
        }
    }

    pub fn datatype(&self) -> Datatype {
        match self {
            TermValue::String(_) => Datatype::String,
            TermValue::Long(_) => Datatype::Long,
            TermValue::Double(_) => Datatype::Double,
            TermValue::Boolean(_) => Datatype::Boolean,
            TermValue::Attribute(_) => Datatype::Attribute,
        }
    }

    /// The dictionary key of this value. Label terms are never scoped.
    pub fn to_term(&self, attribute: Option<&str>) -> TermKey {
        let term = match self {
            TermValue::String(value) => TermKey::string(value),
            TermValue::Long(value) => TermKey::long(*value),
            TermValue::Double(value) => TermKey::double(*value),
            TermValue::Boolean(value) => TermKey::boolean(*value),
            TermValue::Attribute(name) => return TermKey::attribute_label(name),
        };
        match attribute {
            Some(attribute) => term.scoped(attribute),
            None => term,
        }
    }
}

/// How a [`NodeQuery`] selects terms from the dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum TermMatch {
    Exact(TermValue),
    /// All string terms starting with the given text.
    Prefix(String),
    /// All terms of `datatype` within the bounds, in dictionary order.
    Range {
        datatype: Datatype,
        lower: Bound<TermValue>,
        upper: Bound<TermValue>,
    },
}

impl TermMatch {
    pub fn datatype(&self) -> Datatype {
        match self {
            TermMatch::Exact(value) => value.datatype(),
            TermMatch::Prefix(_) => Datatype::String,
            TermMatch::Range { datatype, .. } => *datatype,
        }
    }

    /// Range over `datatype`. Bound values of another datatype are rejected.
    pub fn range(
        datatype: Datatype,
        lower: Bound<TermValue>,
        upper: Bound<TermValue>,
    ) -> Result<TermMatch> {
        for bound in [&lower, &upper] {
            if let Bound::Included(value) | Bound::Excluded(value) = bound {
                verify_arg!(range, value.datatype() == datatype);
            }
        }
        Ok(TermMatch::Range {
            datatype,
            lower,
            upper,
        })
    }
}

/// A dotted attribute path such as `author.name`.
///
/// The last segment names the entry that holds the term. The preceding
/// segments must label the ancestors of that entry, nearest last.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    segments: Vec<String>,
}

impl AttributePath {
    pub fn new<I, S>(segments: I) -> Result<AttributePath>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(Error::invalid_arg(
                "attribute",
                format!("empty segment in attribute path '{}'", segments.join(".")),
            ));
        }
        Ok(AttributePath { segments })
    }

    pub fn parse(path: &str) -> Result<AttributePath> {
        AttributePath::new(path.split('.'))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The innermost segment.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The segments above [`AttributePath::name`], outermost first.
    pub fn ancestors(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }
}

impl FromStr for AttributePath {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self> {
        AttributePath::parse(path)
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Structural filters on the addresses a [`NodeQuery`] yields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeConstraints {
    /// Exact depth of the node.
    pub level: Option<usize>,
    /// Inclusive range of the node's ordinal among its siblings.
    pub node_range: Option<(u32, u32)>,
    /// Inclusive range of the position inside the node.
    pub position_range: Option<(u32, u32)>,
}

impl NodeConstraints {
    pub fn is_empty(&self) -> bool {
        self.level.is_none() && self.node_range.is_none() && self.position_range.is_none()
    }

    pub fn matches(&self, address: &NodeAddress) -> bool {
        self.level.is_none_or(|level| address.depth() == level)
            && self.node_range.is_none_or(|(low, high)| {
                address
                    .ordinal()
                    .is_some_and(|ordinal| low <= ordinal && ordinal <= high)
            })
            && self
                .position_range
                .is_none_or(|(low, high)| low <= address.position && address.position <= high)
    }
}

/// Leaf query: the occurrences of one or more terms of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeQuery {
    pub field: String,
    pub term: TermMatch,
    pub attribute: Option<AttributePath>,
    pub constraints: NodeConstraints,
}

impl NodeQuery {
    pub fn new(field: impl Into<String>, term: TermMatch) -> NodeQuery {
        NodeQuery {
            field: field.into(),
            term,
            attribute: None,
            constraints: NodeConstraints::default(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributePath) -> NodeQuery {
        self.attribute = Some(attribute);
        self
    }

    pub fn with_level(mut self, level: usize) -> NodeQuery {
        self.constraints.level = Some(level);
        self
    }

    pub fn with_node_range(mut self, low: u32, high: u32) -> Result<NodeQuery> {
        verify_arg!(node_range, low <= high);
        self.constraints.node_range = Some((low, high));
        Ok(self)
    }

    pub fn with_position_range(mut self, low: u32, high: u32) -> Result<NodeQuery> {
        verify_arg!(position_range, low <= high);
        self.constraints.position_range = Some((low, high));
        Ok(self)
    }

    /// The attribute the term itself is scoped to, if any.
    pub(crate) fn term_scope(&self) -> Option<&str> {
        match self.term.datatype() {
            Datatype::Attribute => None,
            _ => self.attribute.as_ref().map(AttributePath::name),
        }
    }

    /// Labels the ancestors of a matching node must carry, as
    /// `(distance, label)` with distance 1 for the parent.
    pub(crate) fn ancestor_labels(&self) -> Vec<(usize, &str)> {
        let Some(attribute) = &self.attribute else {
            return Vec::new();
        };
        let labels = match self.term.datatype() {
            Datatype::Attribute => attribute.segments(),
            _ => attribute.ancestors(),
        };
        labels
            .iter()
            .rev()
            .enumerate()
            .map(|(i, label)| (i + 1, label.as_str()))
            .collect()
    }
}

/// Builds a leaf query for `term` parsed as `datatype` (string by default),
/// optionally scoped to a dotted attribute path.
pub fn build_node_query(
    field: &str,
    term: &str,
    attribute: Option<&str>,
    datatype: Option<Datatype>,
) -> Result<NodeQuery> {
    let value = TermValue::parse(datatype.unwrap_or(Datatype::String), term)?;
    let mut query = NodeQuery::new(field, TermMatch::Exact(value));
    if let Some(attribute) = attribute {
        query = query.with_attribute(AttributePath::parse(attribute)?);
    }
    Ok(query)
}

/// Granularity at which boolean clauses must coincide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BooleanScope {
    /// Clauses match within the same node; yields the node's first address.
    Node,
    /// Clauses match anywhere in the document; yields the document root.
    #[default]
    Document,
}

impl FromStr for BooleanScope {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "node" => Ok(BooleanScope::Node),
            "document" => Ok(BooleanScope::Document),
            _ => Err(Error::invalid_arg(
                "scope",
                format!("expected 'node' or 'document', got '{name}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanClause {
    pub query: Query,
    pub occur: Occur,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanQuery {
    pub clauses: Vec<BooleanClause>,
    pub scope: BooleanScope,
    pub minimum_should_match: Option<usize>,
}

impl BooleanQuery {
    pub fn new(scope: BooleanScope) -> BooleanQuery {
        BooleanQuery {
            clauses: Vec::new(),
            scope,
            minimum_should_match: None,
        }
    }

    pub fn with_clause(mut self, query: impl Into<Query>, occur: Occur) -> BooleanQuery {
        self.clauses.push(BooleanClause {
            query: query.into(),
            occur,
        });
        self
    }

    pub fn must(self, query: impl Into<Query>) -> BooleanQuery {
        self.with_clause(query, Occur::Must)
    }

    pub fn should(self, query: impl Into<Query>) -> BooleanQuery {
        self.with_clause(query, Occur::Should)
    }

    pub fn must_not(self, query: impl Into<Query>) -> BooleanQuery {
        self.with_clause(query, Occur::MustNot)
    }

    pub fn with_minimum_should_match(mut self, minimum: usize) -> BooleanQuery {
        self.minimum_should_match = Some(minimum);
        self
    }

    /// Number of SHOULD clauses that must match: the configured value, or one
    /// when there is no MUST clause to anchor the match.
    pub fn effective_minimum_should_match(&self) -> usize {
        self.minimum_should_match.unwrap_or_else(|| {
            let has_must = self.clauses.iter().any(|c| c.occur == Occur::Must);
            let has_should = self.clauses.iter().any(|c| c.occur == Occur::Should);
            usize::from(!has_must && has_should)
        })
    }
}

/// All terms inside one node, in order, with at most `slop` extra moves.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseQuery {
    pub field: String,
    pub terms: Vec<String>,
    pub attribute: Option<AttributePath>,
    pub slop: u32,
}

impl PhraseQuery {
    pub fn new<I, S>(field: impl Into<String>, terms: I) -> Result<PhraseQuery>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terms: Vec<String> = terms.into_iter().map(Into::into).collect();
        verify_arg!(terms, !terms.is_empty());
        Ok(PhraseQuery {
            field: field.into(),
            terms,
            attribute: None,
            slop: 0,
        })
    }

    pub fn with_attribute(mut self, attribute: AttributePath) -> PhraseQuery {
        self.attribute = Some(attribute);
        self
    }

    pub fn with_slop(mut self, slop: u32) -> PhraseQuery {
        self.slop = slop;
        self
    }
}

/// Structural relation between a twig root and a child's witnesses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Axis {
    /// The witness is a direct child of the root node.
    #[default]
    Child,
    /// The witness is anywhere below the root node.
    Descendant,
}

impl Axis {
    pub fn accepts(&self, root: &NodeAddress, witness: &NodeAddress) -> bool {
        match self {
            Axis::Child => is_parent(root, witness),
            Axis::Descendant => is_ancestor(root, witness),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TwigChild {
    pub query: Query,
    pub occur: Occur,
    pub axis: Axis,
    /// The witness must not precede the previous positional child's witness.
    pub in_order: bool,
    /// Maximum number of root branches between this child's witness and the
    /// previous positional child's witness.
    pub slop: Option<u32>,
}

impl TwigChild {
    pub fn new(query: impl Into<Query>, occur: Occur) -> TwigChild {
        TwigChild {
            query: query.into(),
            occur,
            axis: Axis::Child,
            in_order: false,
            slop: None,
        }
    }

    pub fn with_axis(mut self, axis: Axis) -> TwigChild {
        self.axis = axis;
        self
    }

    pub fn with_in_order(mut self, in_order: bool) -> TwigChild {
        self.in_order = in_order;
        self
    }

    pub fn with_slop(mut self, slop: u32) -> TwigChild {
        self.slop = Some(slop);
        self
    }

    /// Positional children take part in ordering and slop checks.
    pub fn is_positional(&self) -> bool {
        self.occur != Occur::MustNot && (self.in_order || self.slop.is_some())
    }
}

/// A root query plus typed child constraints on the root node's subtree.
///
/// A twig yields the first address of every root node that satisfies all of
/// its children, so twigs nest as children of other twigs.
#[derive(Debug, Clone, PartialEq)]
pub struct TwigQuery {
    pub root: Box<Query>,
    pub children: Vec<TwigChild>,
    /// SHOULD children that must be witnessed when the twig has any; one by
    /// default.
    pub minimum_should_match: Option<usize>,
}

impl TwigQuery {
    /// The root must be a node or boolean query.
    pub fn new(root: impl Into<Query>) -> Result<TwigQuery> {
        let root = root.into();
        if !matches!(root, Query::Node(_) | Query::Boolean(_)) {
            return Err(Error::invalid_arg(
                "root",
                format!("twig root must be a node or boolean query, got {}", root.kind()),
            ));
        }
        Ok(TwigQuery {
            root: Box::new(root),
            children: Vec::new(),
            minimum_should_match: None,
        })
    }

    pub fn with_child(mut self, child: TwigChild) -> TwigQuery {
        self.children.push(child);
        self
    }

    pub fn with_minimum_should_match(mut self, minimum: usize) -> TwigQuery {
        self.minimum_should_match = Some(minimum);
        self
    }
}

/// `(query, occur, in_order, slop)` of a twig child.
pub type TwigChildSpec = (Query, Occur, Option<bool>, Option<u32>);

/// Builds a twig from a root and children bound directly under the root.
pub fn build_twig_query<I>(root: impl Into<Query>, children: I) -> Result<TwigQuery>
where
    I: IntoIterator<Item = TwigChildSpec>,
{
    let mut twig = TwigQuery::new(root)?;
    for (query, occur, in_order, slop) in children {
        let mut child = TwigChild::new(query, occur).with_in_order(in_order.unwrap_or(false));
        if let Some(slop) = slop {
            child = child.with_slop(slop);
        }
        twig = twig.with_child(child);
    }
    Ok(twig)
}
