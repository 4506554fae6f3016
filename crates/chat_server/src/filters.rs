use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use log::info;

use crate::errors::ChatError;
use crate::parsers::word_list_parser;

#[async_trait]
pub trait ProfanityFilter: Send + Sync {
    async fn filter(&self, text: &str) -> Result<String, ChatError>;
}

pub struct PassthroughFilter;

#[async_trait]
impl ProfanityFilter for PassthroughFilter {
    async fn filter(&self, text: &str) -> Result<String, ChatError> {
        Ok(text.to_owned())
    }
}

/// Masks whole words found in a word list, ignoring case.
#[derive(Debug, Clone, Default)]
pub struct WordListProfanityFilter {
    words: HashSet<String>,
}

impl WordListProfanityFilter {
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        WordListProfanityFilter {
            words: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn parse(list: &str) -> Result<Self, ChatError> {
        let (_, words) = word_list_parser(list)
            .map_err(|e| ChatError::Filter(format!("bad word list: {e}")))?;
        Ok(WordListProfanityFilter::from_words(words))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let path = path.as_ref();
        let list = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ChatError::Filter(format!("{}: {e}", path.display())))?;
        let filter = WordListProfanityFilter::parse(&list)?;
        info!("loaded {} filtered words from {}", filter.len(), path.display());
        Ok(filter)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn mask_word(&self, word: &str, out: &mut String) {
        if self.words.contains(&word.to_lowercase()) {
            out.extend(std::iter::repeat_n('*', word.chars().count()));
        } else {
            out.push_str(word);
        }
    }

    pub fn mask(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut word_start = None;
        for (i, c) in text.char_indices() {
            match (c.is_alphanumeric(), word_start) {
                (true, None) => word_start = Some(i),
                (false, Some(start)) => {
                    self.mask_word(&text[start..i], &mut out);
                    word_start = None;
                    out.push(c);
                }
                (false, None) => out.push(c),
                (true, Some(_)) => {}
            }
        }
        if let Some(start) = word_start {
            self.mask_word(&text[start..], &mut out);
        }
        out
    }
}

#[async_trait]
impl ProfanityFilter for WordListProfanityFilter {
    async fn filter(&self, text: &str) -> Result<String, ChatError> {
        Ok(self.mask(text))
    }
}
