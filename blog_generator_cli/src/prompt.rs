use crate::Prompt;
use std::num::NonZeroU32;

const BLOG_TEMPLATE: &str = "You are a blog writer. Generate a blog within {words} words based on the following content: {content}

Structure:
1. **Introduction**: Briefly introduce the topic.
2. **Main Points**:
   - Discuss the significance.
   - Discuss various perspectives.
   - Discuss practical applications.
3. **Conclusion**: Summarize the main ideas.

Make sure the blog is engaging, informative, and easy to read, avoiding any repetition and ensuring a coherent flow of ideas.
";

/// Renders extracted segments into a generation prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    max_content_chars: Option<usize>,
}

impl PromptBuilder {
    pub fn new(max_content_chars: Option<usize>) -> Self {
        Self { max_content_chars }
    }

    pub fn build(&self, segments: &[String], target_word_count: NonZeroU32) -> Prompt {
        let joined = segments.join(" ");
        let content = match self.max_content_chars {
            Some(limit) => truncate_chars(&joined, limit),
            None => &joined,
        };
        let text = BLOG_TEMPLATE
            .replace("{words}", &target_word_count.to_string())
            .replacen("{content}", content, 1);
        Prompt {
            text,
            target_word_count,
        }
    }
}

fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
