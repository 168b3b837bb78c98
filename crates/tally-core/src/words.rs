//! Word counting.

use crate::frontmatter;

/// Counts the words of a note's text.
pub trait WordCounter {
    fn count_words(&self, text: &str) -> u64;
}

/// Counts whitespace-separated tokens that contain at least one letter or
/// digit, ignoring front matter and `%% comments %%`.
///
/// Punctuation on its own (`-`, `*`, `#`) is not a word; `don't` and
/// `well-known` are one word each.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleWordCounter;

impl WordCounter for SimpleWordCounter {
    fn count_words(&self, text: &str) -> u64 {
        let body = frontmatter::body(text);
        let mut count = 0;
        let mut in_comment = false;
        for segment in body.split("%%") {
            if !in_comment {
                count += segment
                    .split_whitespace()
                    .filter(|token| token.chars().any(char::is_alphanumeric))
                    .count() as u64;
            }
            in_comment = !in_comment;
        }
        count
    }
}

impl<F> WordCounter for F
where
    F: Fn(&str) -> u64,
{
    fn count_words(&self, text: &str) -> u64 {
        self(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(text: &str) -> u64 {
        SimpleWordCounter.count_words(text)
    }

    #[test]
    fn counts_tokens_with_letters_or_digits() {
        assert_eq!(count("It was a dark and stormy night."), 7);
        assert_eq!(count("# Heading\n\n- one\n- two 3"), 4);
        assert_eq!(count("don't well-known -- * ---"), 2);
        assert_eq!(count(""), 0);
        assert_eq!(count("   \n\t "), 0);
    }

    #[test]
    fn skips_front_matter() {
        let note = "---\ntitle: A long title here\ntags: [a, b]\n---\nThree words here.";
        assert_eq!(count(note), 3);
    }

    #[test]
    fn skips_comments() {
        assert_eq!(count("Before %% hidden note %% after"), 2);
        assert_eq!(count("Open %% never closed"), 1);
    }

    #[test]
    fn closures_are_counters() {
        let fixed = |_: &str| -> u64 { 42 };
        assert_eq!(fixed.count_words("anything"), 42);
    }
}
