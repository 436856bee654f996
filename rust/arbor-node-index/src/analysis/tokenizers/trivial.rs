use std::iter;

use super::{Tokenizer, TokenizerKind};

/// Returns the whole value as a single term. Suited to identifiers and other
/// values that are only matched exactly or by prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrivialTokenizer;

impl Tokenizer for TrivialTokenizer {
    type TokenIter<'a> = iter::Take<iter::Once<&'a str>>;

    fn tokenize<'a>(&'a self, input: &'a str) -> Self::TokenIter<'a> {
        let take = if input.is_empty() { 0 } else { 1 };
        iter::once(input).take(take)
    }

    fn kind(&self) -> TokenizerKind {
        TokenizerKind::Trivial
    }
}
