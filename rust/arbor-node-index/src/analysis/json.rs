//! JSON documents as node trees.
//!
//! Every object entry is a node. Entries of one object are numbered from zero
//! in the order their keys appear in the document, which `serde_json` keeps
//! with its `preserve_order` feature. An entry node holds its key as an attribute
//! label at position 0 followed by the tokens of its primitive values. Object
//! values contribute child nodes; objects inside arrays become anonymous child
//! nodes labeled with the enclosing key, numbered after the entry's own object
//! children. Nested arrays are flattened.
//!
//! A document that is not an object is treated as the value of an unlabeled
//! entry at path `[0]`.

use serde_json::{Map, Number, Value};

use crate::{
    address::{DocId, NodeAddress},
    term::TermKey,
};

use super::{
    AnalyzedToken,
    tokenizers::{Tokenizer, TokenizerType},
};

/// First position of value tokens in a node; position 0 holds the label.
pub const FIRST_VALUE_POSITION: u32 = 1;

/// Turns JSON documents into address-ordered token streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAnalyzer {
    tokenizer: TokenizerType,
}

impl JsonAnalyzer {
    pub fn new(tokenizer: TokenizerType) -> Self {
        JsonAnalyzer { tokenizer }
    }

    pub fn tokenizer(&self) -> &TokenizerType {
        &self.tokenizer
    }

    /// Emits the tokens of `document`, sorted by address. Value tokens are
    /// scoped to the key of the entry holding them.
    pub fn analyze(&self, doc_id: DocId, document: &Value) -> Vec<AnalyzedToken> {
        let mut walker = TreeWalker {
            tokenizer: &self.tokenizer,
            doc_id,
            raw_position: 0,
            tokens: Vec::new(),
        };
        match document {
            Value::Object(map) => walker.object_entries(&mut Vec::new(), map, &mut 0),
            other => walker.entry(&mut vec![0], None, other),
        }
        walker.tokens
    }
}

struct TreeWalker<'a> {
    tokenizer: &'a TokenizerType,
    doc_id: DocId,
    raw_position: u32,
    tokens: Vec<AnalyzedToken>,
}

impl TreeWalker<'_> {
    fn object_entries(
        &mut self,
        path: &mut Vec<u32>,
        map: &Map<String, Value>,
        next_child: &mut u32,
    ) {
        for (key, value) in map {
            path.push(*next_child);
            *next_child += 1;
            self.entry(path, Some(key.as_str()), value);
            path.pop();
        }
    }

    /// One entry node: label, primitive values, then child nodes.
    fn entry(&mut self, path: &mut Vec<u32>, key: Option<&str>, value: &Value) {
        if let Some(key) = key {
            self.emit(path, 0, TermKey::attribute_label(key));
        }
        let mut position = FIRST_VALUE_POSITION;
        self.primitives(path, key, value, &mut position);
        let mut next_child = 0;
        self.children(path, key, value, &mut next_child);
    }

    fn primitives(&mut self, path: &[u32], key: Option<&str>, value: &Value, position: &mut u32) {
        let term = match value {
            Value::Null | Value::Object(_) => return,
            Value::Array(items) => {
                let mut first = true;
                for item in items {
                    if matches!(item, Value::Null | Value::Object(_)) {
                        continue;
                    }
                    if !first {
                        *position += 1;
                    }
                    first = false;
                    self.primitives(path, key, item, position);
                }
                return;
            }
            Value::String(text) => {
                let tokenizer = self.tokenizer;
                for word in tokenizer.tokenize(text) {
                    self.emit(path, *position, scope(TermKey::string(word), key));
                    *position += 1;
                }
                return;
            }
            Value::Number(number) => number_term(number),
            Value::Bool(flag) => TermKey::boolean(*flag),
        };
        self.emit(path, *position, scope(term, key));
        *position += 1;
    }

    fn children(
        &mut self,
        path: &mut Vec<u32>,
        key: Option<&str>,
        value: &Value,
        next_child: &mut u32,
    ) {
        match value {
            Value::Object(map) => self.object_entries(path, map, next_child),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(_) => {
                            path.push(*next_child);
                            *next_child += 1;
                            self.entry(path, key, item);
                            path.pop();
                        }
                        Value::Array(_) => self.children(path, key, item, next_child),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn emit(&mut self, path: &[u32], position: u32, term: TermKey) {
        self.tokens.push(AnalyzedToken {
            term,
            address: NodeAddress::new(self.doc_id, path, position),
            raw_position: self.raw_position,
        });
        self.raw_position += 1;
    }
}

fn scope(term: TermKey, key: Option<&str>) -> TermKey {
    match key {
        Some(key) => term.scoped(key),
        None => term,
    }
}

fn number_term(number: &Number) -> TermKey {
    match number.as_i64() {
        Some(value) => TermKey::long(value),
        None => TermKey::double(number.as_f64().unwrap_or(f64::NAN)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn analyze(document: Value) -> Vec<(String, String)> {
        JsonAnalyzer::default()
            .analyze(7, &document)
            .into_iter()
            .map(|token| (token.term.to_string(), token.address.to_string()))
            .collect()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(term, address)| (term.to_string(), address.to_string()))
            .collect()
    }

    #[test]
    fn test_nested_objects() {
        let tokens = analyze(json!({ "a": { "b": "x" } }));
        assert_eq!(
            tokens,
            pairs(&[
                ("attribute:a", "7:[0]@0"),
                ("attribute:b", "7:[0.0]@0"),
                ("string:b:x", "7:[0.0]@1"),
            ])
        );
    }

    #[test]
    fn test_siblings_and_datatypes() {
        let tokens = analyze(json!({
            "age": 42, "name": "Ada Lovelace", "ok": true, "pi": 3.5, "z": null
        }));
        assert_eq!(
            tokens,
            pairs(&[
                ("attribute:age", "7:[0]@0"),
                ("long:age:42", "7:[0]@1"),
                ("attribute:name", "7:[1]@0"),
                ("string:name:Ada", "7:[1]@1"),
                ("string:name:Lovelace", "7:[1]@2"),
                ("attribute:ok", "7:[2]@0"),
                ("boolean:ok:true", "7:[2]@1"),
                ("attribute:pi", "7:[3]@0"),
                ("double:pi:3.5", "7:[3]@1"),
                ("attribute:z", "7:[4]@0"),
            ])
        );
    }

    #[test]
    fn test_siblings_in_key_order_of_appearance() {
        let document: Value = serde_json::from_str(r#"{"a": {"q": "x", "p": "y"}}"#).unwrap();
        assert_eq!(
            analyze(document),
            pairs(&[
                ("attribute:a", "7:[0]@0"),
                ("attribute:q", "7:[0.0]@0"),
                ("string:q:x", "7:[0.0]@1"),
                ("attribute:p", "7:[0.1]@0"),
                ("string:p:y", "7:[0.1]@1"),
            ])
        );
    }

    #[test]
    fn test_arrays() {
        let tokens = analyze(json!({ "c": ["p q", { "x": 1 }, ["r"], { "y": 2 }] }));
        assert_eq!(
            tokens,
            pairs(&[
                ("attribute:c", "7:[0]@0"),
                ("string:c:p", "7:[0]@1"),
                ("string:c:q", "7:[0]@2"),
                ("string:c:r", "7:[0]@4"),
                ("attribute:c", "7:[0.0]@0"),
                ("attribute:x", "7:[0.0.0]@0"),
                ("long:x:1", "7:[0.0.0]@1"),
                ("attribute:c", "7:[0.1]@0"),
                ("attribute:y", "7:[0.1.0]@0"),
                ("long:y:2", "7:[0.1.0]@1"),
            ])
        );
    }

    #[test]
    fn test_top_level_primitive() {
        assert_eq!(analyze(json!("hello")), pairs(&[("string:hello", "7:[0]@1")]));
        assert!(analyze(json!({})).is_empty());
    }

    #[test]
    fn test_addresses_sorted_per_term() {
        let document = json!({
            "a": [{ "k": "v" }, "v", { "k": ["v", { "k": "v" }] }],
            "b": { "k": "v" }
        });
        let tokens = JsonAnalyzer::default().analyze(1, &document);
        let mut by_term = std::collections::BTreeMap::<_, Vec<NodeAddress>>::new();
        for token in tokens {
            by_term.entry(token.term).or_default().push(token.address);
        }
        for addresses in by_term.values() {
            assert!(addresses.windows(2).all(|pair| pair[0] < pair[1]), "{addresses:?}");
        }
    }
}
