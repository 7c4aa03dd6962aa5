//! Alphanumeric text tokenizer used by bag-of-words features.

use crate::config::TokenizerConfig;
use crate::format::TokenKind;
use std::borrow::Cow;

/// Splits text into lowercase runs of alphanumeric characters.
///
/// Runs shorter than [`TokenizerConfig::MIN_TOKEN_CHARS`] characters are
/// skipped, so `"C.E.O"` yields nothing and `"Don't"` yields `"don"`.
#[derive(Debug, Clone)]
pub struct AlphanumericTokenizer<'a> {
    text: &'a str,
    position: usize,
}

impl<'a> AlphanumericTokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, position: 0 }
    }
}

impl<'a> Iterator for AlphanumericTokenizer<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rest = &self.text[self.position..];
            let start = self.position + rest.find(char::is_alphanumeric)?;
            let run = &self.text[start..];
            let len = run
                .find(|c: char| !c.is_alphanumeric())
                .unwrap_or(run.len());
            self.position = start + len;
            let token = &run[..len];
            if token.chars().count() < TokenizerConfig::MIN_TOKEN_CHARS {
                continue;
            }
            return Some(if token.chars().any(char::is_uppercase) {
                Cow::Owned(token.to_lowercase())
            } else {
                Cow::Borrowed(token)
            });
        }
    }
}

/// Every unigram followed by every bigram of adjacent unigrams.
pub fn tokens(text: &str) -> impl Iterator<Item = TokenKind> + '_ {
    let unigrams: Vec<String> = AlphanumericTokenizer::new(text)
        .map(Cow::into_owned)
        .collect();
    let bigrams: Vec<TokenKind> = unigrams
        .windows(2)
        .map(|pair| TokenKind::Bigram(pair[0].clone(), pair[1].clone()))
        .collect();
    unigrams
        .into_iter()
        .map(TokenKind::Unigram)
        .chain(bigrams)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(text: &str) -> Vec<String> {
        AlphanumericTokenizer::new(text)
            .map(Cow::into_owned)
            .collect()
    }

    #[test]
    fn test_tokenizer_splits_on_punctuation() {
        assert_eq!(tokenize("Don't"), vec!["don"]);
        assert_eq!(tokenize("CEO/Co-founder"), vec!["ceo", "co", "founder"]);
        assert_eq!(tokenize("50_hello"), vec!["50", "hello"]);
        assert_eq!(tokenize("$50"), vec!["50"]);
    }

    #[test]
    fn test_tokenizer_drops_short_runs() {
        assert!(tokenize("C.E.O").is_empty());
        assert!(tokenize("m/f").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenizer_unicode() {
        assert_eq!(tokenize("Ärger über Öl"), vec!["ärger", "über", "öl"]);
    }

    #[test]
    fn test_tokens_include_bigrams() {
        let all: Vec<TokenKind> = tokens("The Little Prince").collect();
        assert_eq!(
            all,
            vec![
                TokenKind::Unigram("the".to_string()),
                TokenKind::Unigram("little".to_string()),
                TokenKind::Unigram("prince".to_string()),
                TokenKind::Bigram("the".to_string(), "little".to_string()),
                TokenKind::Bigram("little".to_string(), "prince".to_string()),
            ]
        );
    }
}
