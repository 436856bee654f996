//! Analysis of JSON documents into `(term, address, raw position)` tokens.
//!
//! An [`AnalysisPipeline`] is a [`JsonAnalyzer`] followed by an explicit,
//! ordered list of [`AnalysisStage`]s. The pipeline is built from an
//! [`AnalysisConfig`] and owned by whoever indexes or parses queries; there is
//! no process-wide default instance.

pub mod json;
pub mod stages;
pub mod tokenizers;

use arbor_common::{Result, error::Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    address::{DocId, NodeAddress},
    term::TermKey,
};

pub use json::JsonAnalyzer;
pub use stages::AnalysisStage;
pub use tokenizers::{Tokenizer, TokenizerKind, TokenizerType, create_tokenizer};

/// One term occurrence produced by analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedToken {
    pub term: TermKey,
    pub address: NodeAddress,
    /// Ordinal of the token within the whole document, in emission order.
    pub raw_position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub tokenizer: String,
    pub lowercase: bool,
    pub max_term_length: Option<usize>,
    pub stopwords: Vec<String>,
    pub concise_attributes: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            tokenizer: TokenizerKind::UnicodeWord.name().to_string(),
            lowercase: true,
            max_term_length: None,
            stopwords: Vec::new(),
            concise_attributes: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    analyzer: JsonAnalyzer,
    stages: Vec<AnalysisStage>,
}

impl AnalysisPipeline {
    /// A pipeline without stages: scoped values only, original case.
    pub fn new(tokenizer: TokenizerType) -> Self {
        AnalysisPipeline {
            analyzer: JsonAnalyzer::new(tokenizer),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: AnalysisStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Stages run in the order `lowercase`, `max_term_length`, `stopwords`,
    /// `concise_attributes`, each only when configured.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let mut pipeline = AnalysisPipeline::new(create_tokenizer(&config.tokenizer)?);
        if config.lowercase {
            pipeline = pipeline.with_stage(AnalysisStage::Lowercase);
        }
        if let Some(max) = config.max_term_length {
            if max == 0 {
                return Err(Error::unsupported_configuration(
                    "max_term_length",
                    "must be positive",
                ));
            }
            pipeline = pipeline.with_stage(AnalysisStage::MaxTermLength(max));
        }
        if !config.stopwords.is_empty() {
            let stopwords = config.stopwords.iter().map(|word| {
                if config.lowercase {
                    word.to_lowercase()
                } else {
                    word.clone()
                }
            });
            pipeline = pipeline.with_stage(AnalysisStage::stopwords(stopwords));
        }
        if config.concise_attributes {
            pipeline = pipeline.with_stage(AnalysisStage::ConciseAttributes);
        }
        Ok(pipeline)
    }

    pub fn stages(&self) -> &[AnalysisStage] {
        &self.stages
    }

    pub fn analyze(&self, doc_id: DocId, document: &Value) -> Vec<AnalyzedToken> {
        let tokens = self.analyzer.analyze(doc_id, document);
        self.stages
            .iter()
            .fold(tokens, |tokens, stage| stage.apply(tokens))
    }

    /// Parses and analyzes a JSON document.
    pub fn analyze_json(&self, doc_id: DocId, json: &str) -> Result<Vec<AnalyzedToken>> {
        let document: Value =
            serde_json::from_str(json).map_err(|e| Error::json(format!("document {doc_id}"), e))?;
        Ok(self.analyze(doc_id, &document))
    }

    /// Runs query text through the tokenizer and the value-normalizing stages,
    /// returning the terms in order.
    pub fn normalize(&self, text: &str) -> Vec<String> {
        let tokens = self
            .analyzer
            .tokenizer()
            .tokenize(text)
            .enumerate()
            .map(|(i, word)| AnalyzedToken {
                term: TermKey::string(word),
                address: NodeAddress::new(0, &[0], i as u32),
                raw_position: i as u32,
            })
            .collect();
        self.stages
            .iter()
            .filter(|stage| stage.normalizes_values())
            .fold(tokens, |tokens, stage| stage.apply(tokens))
            .into_iter()
            .map(|token| String::from_utf8_lossy(&token.term.value).into_owned())
            .collect()
    }
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        AnalysisPipeline::new(TokenizerType::default())
            .with_stage(AnalysisStage::Lowercase)
            .with_stage(AnalysisStage::ConciseAttributes)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_default_pipeline() {
        let tokens = AnalysisPipeline::default().analyze(1, &json!({ "title": "Tree Index" }));
        let terms: Vec<String> = tokens.iter().map(|t| t.term.to_string()).collect();
        assert_eq!(
            terms,
            vec![
                "attribute:title",
                "string:tree",
                "string:title:tree",
                "string:index",
                "string:title:index",
            ]
        );
        assert_eq!(tokens[1].address, tokens[2].address);
        assert_eq!(tokens[1].raw_position, 1);
    }

    #[test]
    fn test_from_config() {
        let config = AnalysisConfig {
            tokenizer: "trivial".to_string(),
            lowercase: true,
            max_term_length: Some(5),
            stopwords: vec!["SKIP".to_string()],
            concise_attributes: false,
        };
        let pipeline = AnalysisPipeline::from_config(&config).unwrap();
        let names: Vec<&str> = pipeline.stages().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["lowercase", "max_term_length", "stopwords"]);

        let tokens = pipeline
            .analyze_json(2, r#"{ "a": "Hello World", "b": "skip" }"#)
            .unwrap();
        let terms: Vec<String> = tokens.iter().map(|t| t.term.to_string()).collect();
        assert_eq!(terms, vec!["attribute:a", "string:a:hello", "attribute:b"]);
    }

    #[test]
    fn test_config_errors() {
        let config = AnalysisConfig {
            tokenizer: "ngram".to_string(),
            ..Default::default()
        };
        assert!(AnalysisPipeline::from_config(&config).unwrap_err().is_unsupported_configuration());

        let config = AnalysisConfig {
            max_term_length: Some(0),
            ..Default::default()
        };
        assert!(AnalysisPipeline::from_config(&config).unwrap_err().is_unsupported_configuration());

        assert!(AnalysisPipeline::default().analyze_json(0, "{ nope").is_err());
    }

    #[test]
    fn test_normalize_query_text() {
        let pipeline = AnalysisPipeline::default().with_stage(AnalysisStage::stopwords(["of"]));
        assert_eq!(pipeline.normalize("Forest OF Trees"), vec!["forest", "trees"]);
    }
}
