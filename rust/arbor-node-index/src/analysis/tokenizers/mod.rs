//! Tokenizers splitting string values into terms.
//!
//! The same tokenizer runs at index time, over the string values of a JSON
//! document, and at query time, over the text of node and phrase queries, so
//! that both sides agree on term boundaries.
//!
//! Tokenizers return iterators of string slices borrowed from the input.

pub mod trivial;
pub mod unicode_word;

use arbor_common::{Result, error::Error};
pub use trivial::TrivialTokenizer;
pub use unicode_word::UnicodeWordTokenizer;

pub trait Tokenizer: Send + Sync {
    type TokenIter<'a>: Iterator<Item = &'a str>
    where
        Self: 'a;

    /// Extracts the terms of `input`. Empty terms are never produced.
    fn tokenize<'a>(&'a self, input: &'a str) -> Self::TokenIter<'a>;

    fn kind(&self) -> TokenizerKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// Creates a tokenizer by its configuration name.
///
/// # Errors
/// `UnsupportedConfiguration` if the name is not recognized.
pub fn create_tokenizer(name: &str) -> Result<TokenizerType> {
    match name.try_into()? {
        TokenizerKind::Trivial => Ok(TokenizerType::Trivial(TrivialTokenizer)),
        TokenizerKind::UnicodeWord => Ok(TokenizerType::UnicodeWord(UnicodeWordTokenizer)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    /// The whole string value is one term.
    Trivial,
    /// Words delimited by Unicode word boundaries (UAX #29).
    UnicodeWord,
}

impl TryFrom<&str> for TokenizerKind {
    type Error = Error;

    fn try_from(name: &str) -> Result<Self> {
        match name {
            "trivial" => Ok(TokenizerKind::Trivial),
            "unicode-word" => Ok(TokenizerKind::UnicodeWord),
            _ => Err(Error::unsupported_configuration(
                "tokenizer",
                format!("unrecognized tokenizer: {name}"),
            )),
        }
    }
}

impl TokenizerKind {
    pub const fn name(&self) -> &'static str {
        match self {
            TokenizerKind::Trivial => "trivial",
            TokenizerKind::UnicodeWord => "unicode-word",
        }
    }
}

/// All available tokenizers behind one type.
#[derive(Debug, Clone, Copy)]
pub enum TokenizerType {
    Trivial(TrivialTokenizer),
    UnicodeWord(UnicodeWordTokenizer),
}

impl Default for TokenizerType {
    fn default() -> Self {
        TokenizerType::UnicodeWord(UnicodeWordTokenizer)
    }
}

impl Tokenizer for TokenizerType {
    type TokenIter<'a> = Box<dyn Iterator<Item = &'a str> + 'a>;

    fn tokenize<'a>(&'a self, input: &'a str) -> Self::TokenIter<'a> {
        match self {
            TokenizerType::Trivial(tokenizer) => Box::new(tokenizer.tokenize(input)),
            TokenizerType::UnicodeWord(tokenizer) => Box::new(tokenizer.tokenize(input)),
        }
    }

    fn kind(&self) -> TokenizerKind {
        match self {
            TokenizerType::Trivial(tokenizer) => tokenizer.kind(),
            TokenizerType::UnicodeWord(tokenizer) => tokenizer.kind(),
        }
    }
}
