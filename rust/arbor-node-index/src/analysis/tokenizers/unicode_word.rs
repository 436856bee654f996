use unicode_segmentation::{UnicodeSegmentation, UnicodeWords};

use super::{Tokenizer, TokenizerKind};

/// Splits text on Unicode word boundaries and keeps the segments that contain
/// alphanumeric characters, dropping punctuation and whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnicodeWordTokenizer;

impl Tokenizer for UnicodeWordTokenizer {
    type TokenIter<'a> = UnicodeWords<'a>;

    fn tokenize<'a>(&'a self, input: &'a str) -> Self::TokenIter<'a> {
        input.unicode_words()
    }

    fn kind(&self) -> TokenizerKind {
        TokenizerKind::UnicodeWord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(input: &str) -> Vec<&str> {
        UnicodeWordTokenizer.tokenize(input).collect()
    }

    #[test]
    fn test_basic_words() {
        assert_eq!(words("The quick (\"brown\") fox"), vec!["The", "quick", "brown", "fox"]);
        assert_eq!(words("  "), Vec::<&str>::new());
        assert_eq!(words(""), Vec::<&str>::new());
    }

    #[test]
    fn test_numbers_and_unicode() {
        assert_eq!(words("version 2.5 released"), vec!["version", "2.5", "released"]);
        assert_eq!(words("Привет мир"), vec!["Привет", "мир"]);
        assert_eq!(words("Schöne Grüße!"), vec!["Schöne", "Grüße"]);
    }
}
