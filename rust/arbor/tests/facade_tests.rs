use arbor::node_index::{Corpus, IndexConfig, SegmentWriter, analysis::AnalysisPipeline};
use arbor::query::{EvaluationOptions, QueryOutcome, evaluate, parse_query};
use serde_json::json;

#[test]
fn test_index_config_drives_indexing() {
    let config = IndexConfig::from_json(r#"{"default_field": {"block_size": 2}}"#).unwrap();
    let pipeline = AnalysisPipeline::default();
    let mut writer = SegmentWriter::new(config);
    for doc_id in 0..5u32 {
        let tag = if doc_id % 2 == 0 { "even" } else { "odd" };
        let document = json!({ "item": { "id": doc_id, "tag": tag } });
        writer
            .index_document("content", doc_id, &document, &pipeline)
            .unwrap();
    }
    let corpus = Corpus::new().with_segment(writer.seal().unwrap());

    let query = parse_query(
        r#"{"twig": {"root": "item", "child": [
            {"occur": "MUST", "node": {"attribute": "tag", "query": "even"}},
            {"occur": "MUST_NOT", "node": {"attribute": "id", "query": 2, "datatype": "long"}}
        ]}}"#,
    )
    .unwrap();
    let outcome = evaluate(&query, &corpus, EvaluationOptions::default())
        .run()
        .unwrap();
    assert_eq!(outcome.doc_ids(), vec![0, 4]);

    let query = parse_query(r#"{"node": {"query": "missing"}}"#).unwrap();
    let outcome = evaluate(&query, &corpus, EvaluationOptions::default())
        .run()
        .unwrap();
    assert_eq!(outcome, QueryOutcome::NoMatch);
}
