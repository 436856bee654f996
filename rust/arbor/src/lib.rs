//! # Arbor: structural search over tree-shaped documents
//!
//! Arbor indexes JSON documents as trees. Every term occurrence is recorded
//! with its node address (document id, path of sibling ordinals, position in
//! the node), so queries can ask not only whether a document contains a term
//! but where in the tree it occurs relative to other terms.
//!
//! ## Module Organization
//!
//! * [`common`] - Error model and validation macros shared by all crates
//! * [`encodings`] - Integer block codecs used by the postings format
//! * [`node_index`] - Node addresses, postings, segments and the analysis pipeline
//! * [`query`] - Query tree, twig evaluation and the JSON query parser
//!
//! ## Example
//!
//! ```
//! use arbor::node_index::{Corpus, IndexConfig, SegmentWriter, analysis::AnalysisPipeline};
//! use arbor::query::{EvaluationOptions, evaluate, parse_query};
//!
//! let pipeline = AnalysisPipeline::default();
//! let mut writer = SegmentWriter::new(IndexConfig::default());
//! let document = serde_json::json!({ "author": { "name": "Ada Lovelace" } });
//! writer.index_document("content", 0, &document, &pipeline).unwrap();
//! let corpus = Corpus::new().with_segment(writer.seal().unwrap());
//!
//! let query = parse_query(
//!     r#"{"twig": {"root": "author",
//!         "child": [{"occur": "MUST", "node": {"attribute": "name", "query": "ada"}}]}}"#,
//! )
//! .unwrap();
//! let outcome = evaluate(&query, &corpus, EvaluationOptions::default()).run().unwrap();
//! assert_eq!(outcome.doc_ids(), vec![0]);
//! ```

pub use arbor_common as common;
pub use arbor_encodings as encodings;
pub use arbor_node_index as node_index;
pub use arbor_query as query;
