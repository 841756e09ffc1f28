// Representative keywords for a cluster.
//
// Frequency mode counts tokens across the cluster's texts, which is
// deterministic for a given member set. TF-IDF mode treats each member as
// a separate document via the `keyword_extraction` crate, so words shared by
// every member are downweighted in favour of distinctive ones.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use keyword_extraction::tf_idf::{TfIdf, TfIdfParams};
use regex_lite::Regex;
use stop_words::{get, LANGUAGE};

/// Default number of keywords kept per cluster.
pub const DEFAULT_MAX_KEYWORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeywordMode {
    /// Most frequent non-stop-word tokens; ties broken alphabetically.
    #[default]
    Frequency,
    TfIdf,
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    // Two or more word characters, like a bag-of-words vectorizer.
    TOKEN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("valid regex"))
}

pub struct KeywordExtractor {
    pub max_keywords: usize,
    pub mode: KeywordMode,
    stop_words: Vec<String>,
    stop_set: HashSet<String>,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEYWORDS, KeywordMode::default())
    }
}

impl KeywordExtractor {
    pub fn new(max_keywords: usize, mode: KeywordMode) -> Self {
        let stop_words: Vec<String> = get(LANGUAGE::English);
        let stop_set = stop_words.iter().cloned().collect();
        Self {
            max_keywords,
            mode,
            stop_words,
            stop_set,
        }
    }

    /// Up to `max_keywords` keywords, best first.
    pub fn extract(&self, texts: &[String]) -> Vec<String> {
        if texts.is_empty() || self.max_keywords == 0 {
            return Vec::new();
        }
        match self.mode {
            KeywordMode::Frequency => self.by_frequency(texts),
            KeywordMode::TfIdf => self.by_tfidf(texts),
        }
    }

    fn by_frequency(&self, texts: &[String]) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for text in texts {
            let lower = text.to_lowercase();
            for token in token_pattern().find_iter(&lower) {
                let word = token.as_str();
                if !self.stop_set.contains(word) {
                    *counts.entry(word.to_string()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(word, _)| word)
            .collect()
    }

    fn by_tfidf(&self, texts: &[String]) -> Vec<String> {
        let params = TfIdfParams::UnprocessedDocuments(texts, &self.stop_words, None);
        let tfidf = TfIdf::new(params);
        tfidf
            .get_ranked_word_scores(self.max_keywords)
            .into_iter()
            .map(|(word, _score)| word)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_frequency_orders_by_count() {
        let extractor = KeywordExtractor::new(3, KeywordMode::Frequency);
        let kws = extractor.extract(&texts(&[
            "vaccine vaccine microchip",
            "vaccine microchip tower",
            "tower vaccine",
        ]));
        assert_eq!(kws, vec!["vaccine", "microchip", "tower"]);
    }

    #[test]
    fn test_frequency_breaks_ties_alphabetically() {
        let extractor = KeywordExtractor::new(10, KeywordMode::Frequency);
        let kws = extractor.extract(&texts(&["zebra apple mango"]));
        assert_eq!(kws, vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn test_frequency_drops_stop_words_and_short_tokens() {
        let extractor = KeywordExtractor::default();
        let kws = extractor.extract(&texts(&["The moon is a hologram and I am x"]));
        assert!(kws.contains(&"moon".to_string()));
        assert!(kws.contains(&"hologram".to_string()));
        assert!(!kws.contains(&"the".to_string()));
        assert!(!kws.contains(&"and".to_string()));
        assert!(!kws.iter().any(|k| k.len() < 2));
    }

    #[test]
    fn test_frequency_caps_keyword_count() {
        let extractor = KeywordExtractor::new(2, KeywordMode::Frequency);
        let kws = extractor.extract(&texts(&["alpha beta gamma delta epsilon"]));
        assert_eq!(kws.len(), 2);
    }

    #[test]
    fn test_frequency_is_case_insensitive() {
        let extractor = KeywordExtractor::new(5, KeywordMode::Frequency);
        let kws = extractor.extract(&texts(&["Flood FLOOD flood warning"]));
        assert_eq!(kws[0], "flood");
    }

    #[test]
    fn test_empty_input() {
        assert!(KeywordExtractor::default().extract(&[]).is_empty());
    }

    #[test]
    fn test_tfidf_returns_keywords() {
        let extractor = KeywordExtractor::new(5, KeywordMode::TfIdf);
        let kws = extractor.extract(&texts(&[
            "chemtrails over the city again today",
            "chemtrails spotted near the airport",
            "planes spraying chemtrails all morning",
        ]));
        assert!(!kws.is_empty());
        assert!(kws.len() <= 5);
    }
}
