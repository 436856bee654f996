//! Structural queries over a node-address index.
//!
//! Queries form a closed recursive tree ([`Query`]): leaf node queries select
//! term occurrences, boolean and phrase queries combine them within a node or
//! a document, and twig queries match a root node whose subtree satisfies
//! typed child constraints. Every query opens a per-segment cursor that
//! yields addresses in the index's address order, so all combinators are
//! merge joins over sorted streams.
//!
//! [`evaluate`] drives a query over a [`Corpus`](arbor_node_index::Corpus)
//! lazily; [`parse_query`] builds a query from a JSON query document.

pub mod evaluate;
pub mod iterators;
pub mod parser;
pub mod query;
pub mod stats;

pub use evaluate::{
    CancellationToken, DocumentMatch, Evaluation, EvaluationOptions, QueryOutcome, evaluate,
};
pub use parser::{QueryParser, parse_query};
pub use query::{
    AttributePath, Axis, BooleanClause, BooleanQuery, BooleanScope, NodeConstraints, NodeQuery,
    Occur, PhraseQuery, Query, TermMatch, TermValue, TwigChild, TwigChildSpec, TwigQuery,
    build_node_query, build_twig_query,
};
pub use stats::EvaluationStats;
