//! English tokenizer and Snowball stemmer.
//!
//! Words are split on non-alphanumeric characters, lowercased, filtered
//! against the English stop list, then reduced with the Snowball English
//! (Porter2) algorithm. Non-ASCII words are lowercased but never stemmed.

use once_cell::sync::Lazy;
use rust_stemmers::{Algorithm, Stemmer};

static ENGLISH: Lazy<Stemmer> = Lazy::new(|| Stemmer::create(Algorithm::English));

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

/// Splits text into normalized lexemes, dropping stop words.
pub fn lexemes(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .filter(|token| keep_token(token))
        .map(|token| stem(&token))
        .collect()
}

fn keep_token(token: &str) -> bool {
    if STOP_WORDS.contains(&token) {
        return false;
    }
    token.chars().count() > 1 || token.chars().all(|ch| ch.is_ascii_digit())
}

/// Stems one lowercase word.
pub fn stem(word: &str) -> String {
    if word.len() <= 2 || !word.is_ascii() {
        return word.to_string();
    }
    ENGLISH.stem(word).into_owned()
}

#[cfg(test)]
mod tests {
    use super::{lexemes, stem};

    #[test]
    fn stem_handles_plurals_and_verb_forms() {
        assert_eq!(stem("caresses"), "caress");
        assert_eq!(stem("ponies"), "poni");
        assert_eq!(stem("cats"), "cat");
        assert_eq!(stem("meetings"), "meet");
        assert_eq!(stem("running"), "run");
        assert_eq!(stem("hoped"), "hope");
        assert_eq!(stem("agreed"), "agre");
        assert_eq!(stem("happy"), "happi");
    }

    #[test]
    fn stem_strips_derivational_suffixes() {
        assert_eq!(stem("hopeful"), "hope");
        assert_eq!(stem("goodness"), "good");
        assert_eq!(stem("adjustment"), "adjust");
        assert_eq!(stem("generalization"), "general");
        assert_eq!(stem("quarterly"), "quarter");
    }

    #[test]
    fn related_word_forms_share_a_lexeme() {
        let forms = lexemes("connect connected connecting connection connections");
        assert_eq!(forms.len(), 5);
        assert!(forms.iter().all(|lexeme| lexeme == "connect"));
    }

    #[test]
    fn lexemes_drop_stop_words_and_punctuation() {
        assert_eq!(
            lexemes("The Meetings, and a plan!"),
            vec!["meet".to_string(), "plan".to_string()]
        );
    }

    #[test]
    fn lexemes_keep_single_digits_and_unicode_words() {
        assert_eq!(
            lexemes("v 2 Ünïcode"),
            vec!["2".to_string(), "ünïcode".to_string()]
        );
    }
}
