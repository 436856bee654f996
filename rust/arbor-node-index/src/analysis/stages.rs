use ahash::AHashSet;

use crate::term::Datatype;

use super::AnalyzedToken;

/// One transform of the analyzed token stream.
///
/// Stages are applied in the configured order, each consuming the output of
/// the previous one. They never reorder tokens, so the address order produced
/// by the analyzer is preserved for every term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisStage {
    /// Lowercases string values. Attribute labels are left untouched.
    Lowercase,
    /// Truncates string values to at most `n` bytes on a character boundary.
    MaxTermLength(usize),
    /// Drops string values contained in the set.
    Stopwords(AHashSet<String>),
    /// Adds an unscoped copy in front of every attribute-scoped value, so the
    /// value matches both with and without an attribute constraint.
    ConciseAttributes,
}

impl AnalysisStage {
    pub fn stopwords<I, S>(words: I) -> AnalysisStage
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnalysisStage::Stopwords(words.into_iter().map(Into::into).collect())
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalysisStage::Lowercase => "lowercase",
            AnalysisStage::MaxTermLength(_) => "max_term_length",
            AnalysisStage::Stopwords(_) => "stopwords",
            AnalysisStage::ConciseAttributes => "concise_attributes",
        }
    }

    /// Whether the stage also applies to query text.
    pub fn normalizes_values(&self) -> bool {
        !matches!(self, AnalysisStage::ConciseAttributes)
    }

    pub fn apply(&self, tokens: Vec<AnalyzedToken>) -> Vec<AnalyzedToken> {
        match self {
            AnalysisStage::Lowercase => tokens
                .into_iter()
                .map(|mut token| {
                    if let Some(value) = string_value(&token) {
                        let lowered = value.to_lowercase();
                        token.term.value = lowered.into_bytes();
                    }
                    token
                })
                .collect(),
            AnalysisStage::MaxTermLength(max) => tokens
                .into_iter()
                .map(|mut token| {
                    if let Some(value) = string_value(&token) {
                        let len = truncate_str(value, *max).len();
                        token.term.value.truncate(len);
                    }
                    token
                })
                .filter(|token| !token.term.value.is_empty())
                .collect(),
            AnalysisStage::Stopwords(words) => tokens
                .into_iter()
                .filter(|token| string_value(token).is_none_or(|value| !words.contains(value)))
                .collect(),
            AnalysisStage::ConciseAttributes => {
                let mut output = Vec::with_capacity(tokens.len() * 2);
                for token in tokens {
                    if token.term.attribute.is_some() {
                        let mut unscoped = token.clone();
                        unscoped.term.attribute = None;
                        output.push(unscoped);
                    }
                    output.push(token);
                }
                output
            }
        }
    }
}

fn string_value(token: &AnalyzedToken) -> Option<&str> {
    match token.term.datatype {
        Datatype::String => std::str::from_utf8(&token.term.value).ok(),
        _ => None,
    }
}

/// Truncates `input` to at most `max_len` bytes at a character boundary.
pub(crate) fn truncate_str(input: &str, max_len: usize) -> &str {
    if input.len() <= max_len {
        return input;
    }
    let mut boundary = max_len;
    while boundary > 0 && !input.is_char_boundary(boundary) {
        boundary -= 1;
    }
    &input[..boundary]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{address::NodeAddress, term::TermKey};

    fn token(term: TermKey, position: u32) -> AnalyzedToken {
        AnalyzedToken {
            term,
            address: NodeAddress::new(0, &[0], position),
            raw_position: position,
        }
    }

    fn values(tokens: &[AnalyzedToken]) -> Vec<String> {
        tokens.iter().map(|t| t.term.to_string()).collect()
    }

    #[test]
    fn test_lowercase_skips_labels() {
        let tokens = vec![
            token(TermKey::attribute_label("Title"), 0),
            token(TermKey::string("Hello").scoped("Title"), 1),
        ];
        let output = AnalysisStage::Lowercase.apply(tokens);
        assert_eq!(values(&output), vec!["attribute:Title", "string:Title:hello"]);
    }

    #[test]
    fn test_max_term_length() {
        let tokens = vec![
            token(TermKey::string("café-au-lait"), 1),
            token(TermKey::long(123456789), 2),
        ];
        let output = AnalysisStage::MaxTermLength(4).apply(tokens);
        assert_eq!(output[0].term.value, "caf".as_bytes());
        assert_eq!(output[1].term, TermKey::long(123456789));
    }

    #[test]
    fn test_stopwords() {
        let tokens = vec![
            token(TermKey::string("the"), 1),
            token(TermKey::string("tree"), 2),
        ];
        let output = AnalysisStage::stopwords(["the", "a"]).apply(tokens);
        assert_eq!(values(&output), vec!["string:tree"]);
        assert_eq!(output[0].address.position, 2);
    }

    #[test]
    fn test_concise_attributes() {
        let tokens = vec![
            token(TermKey::attribute_label("b"), 0),
            token(TermKey::string("x").scoped("b"), 1),
        ];
        let output = AnalysisStage::ConciseAttributes.apply(tokens);
        assert_eq!(
            values(&output),
            vec!["attribute:b", "string:x", "string:b:x"]
        );
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("你好世界", 7), "你好");
        let mixed = "Hello你好Привет";
        let truncated = truncate_str(mixed, 12);
        assert!(truncated.len() <= 12);
        assert!(mixed.is_char_boundary(truncated.len()));
    }
}
