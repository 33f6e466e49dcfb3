//! Turns user input (parallel URL and index lists) into a [`Batch`].
//!
//! Everything here runs before any network call, so a rejected submission
//! costs nothing.

use crate::error::{Error, Result};
use crate::{Batch, Job};
use std::num::NonZeroU32;
use url::Url;

pub const LENGTH_MISMATCH: &str = "The number of URLs and the number of indices sets must match.";

/// Parses `"0, 1,2"` into `[0, 1, 2]`.
pub fn parse_selectors(raw: &str) -> Result<Vec<usize>> {
    if raw.trim().is_empty() {
        return Err(Error::validation(format!("empty paragraph index set '{raw}'")));
    }
    raw.split(',')
        .map(str::trim)
        .map(|s| {
            if s.is_empty() {
                return Err(Error::validation(format!("missing paragraph index in '{raw}'")));
            }
            s.parse::<usize>()
                .map_err(|_| Error::validation(format!("'{s}' is not a valid paragraph index")))
        })
        .collect()
}

pub fn parse_word_count(words: u32) -> Result<NonZeroU32> {
    NonZeroU32::new(words).ok_or_else(|| Error::validation("word count must be greater than zero"))
}

/// Builds a batch from parallel lists; job `i` gets ordinal `i`.
pub fn build_batch<U, S>(urls: &[U], selector_sets: &[S], target_word_count: u32) -> Result<Batch>
where
    U: AsRef<str>,
    S: AsRef<str>,
{
    if urls.len() != selector_sets.len() {
        return Err(Error::validation(LENGTH_MISMATCH));
    }
    let target_word_count = parse_word_count(target_word_count)?;

    let jobs = urls
        .iter()
        .zip(selector_sets)
        .enumerate()
        .map(|(ordinal, (url, selectors))| {
            let url = url.as_ref().trim();
            let source = Url::parse(url)
                .map_err(|e| Error::validation(format!("invalid URL '{url}' on line {}: {e}", ordinal + 1)))?;
            Ok(Job::new(ordinal, source, parse_selectors(selectors.as_ref())?))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Batch::new(jobs, target_word_count))
}

/// Same as [`build_batch`], from two newline-separated text blocks.
///
/// Trailing blank lines are ignored so a final newline does not create an
/// extra, empty entry.
pub fn from_lines(urls: &str, selector_sets: &str, target_word_count: u32) -> Result<Batch> {
    let urls = non_trailing_lines(urls);
    let selector_sets = non_trailing_lines(selector_sets);
    build_batch(&urls, &selector_sets, target_word_count)
}

fn non_trailing_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.lines().collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines
}

/// Same as [`build_batch`], from `(url, indices)` pairs as sent to `/generate_blog`.
pub fn from_pairs(urls_and_indices: &[(String, Vec<usize>)], target_word_count: u32) -> Result<Batch> {
    let target_word_count = parse_word_count(target_word_count)?;
    let jobs = urls_and_indices
        .iter()
        .enumerate()
        .map(|(ordinal, (url, indices))| {
            let source = Url::parse(url.trim())
                .map_err(|e| Error::validation(format!("invalid URL '{url}': {e}")))?;
            if indices.is_empty() {
                return Err(Error::validation(format!("empty paragraph index set for {url}")));
            }
            Ok(Job::new(ordinal, source, indices.clone()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Batch::new(jobs, target_word_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_indices() {
        assert_eq!(parse_selectors("0,1,2").unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_selectors(" 3 , 5 ").unwrap(), vec![3, 5]);
    }

    #[test]
    fn rejects_bad_indices() {
        assert!(parse_selectors("1,x").is_err());
        assert!(parse_selectors("-1").is_err());
        assert!(parse_selectors("").is_err());
        assert!(parse_selectors(" , ").is_err());
    }

    #[test]
    fn empty_entries_between_commas_are_rejected() {
        let err = parse_selectors("0,,1").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert!(err.to_string().contains("missing paragraph index"));
        assert!(parse_selectors("0,1,").is_err());
        assert!(parse_selectors("   ").unwrap_err().to_string().contains("empty paragraph index set"));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = build_batch(
            &["https://example.com/a", "https://example.com/b"],
            &["0,1"],
            400,
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert!(err.to_string().contains(LENGTH_MISMATCH));
    }

    #[test]
    fn ordinals_follow_input_position() {
        let batch = build_batch(
            &["https://example.com/a", "https://example.com/b"],
            &["0,1", "5"],
            400,
        )
        .unwrap();
        assert_eq!(batch.target_word_count.get(), 400);
        assert_eq!(batch.jobs[0].ordinal, 0);
        assert_eq!(batch.jobs[0].selectors, vec![0, 1]);
        assert_eq!(batch.jobs[1].ordinal, 1);
        assert_eq!(batch.jobs[1].source.as_str(), "https://example.com/b");
        assert_eq!(batch.jobs[1].selectors, vec![5]);
    }

    #[test]
    fn zero_words_and_bad_urls_are_rejected() {
        assert!(build_batch(&["https://example.com"], &["0"], 0).is_err());
        let err = build_batch(&["not a url"], &["0"], 100).unwrap_err();
        assert!(err.to_string().contains("invalid URL"));
    }

    #[test]
    fn text_areas_ignore_trailing_blank_lines() {
        let batch = from_lines(
            "https://byjus.com/physics/renewable-energy/\nhttps://example.com/x\n\n",
            "0,1,2\n1,2,3\n",
            400,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.jobs[1].selectors, vec![1, 2, 3]);
    }

    #[test]
    fn pairs_keep_their_order() {
        let pairs = vec![
            ("https://example.com/a".to_string(), vec![2]),
            ("https://example.com/b".to_string(), vec![0, 4]),
        ];
        let batch = from_pairs(&pairs, 250).unwrap();
        assert_eq!(batch.jobs[1].ordinal, 1);
        assert_eq!(batch.jobs[1].selectors, vec![0, 4]);

        let empty = vec![("https://example.com/a".to_string(), vec![])];
        assert!(from_pairs(&empty, 250).is_err());
    }
}
