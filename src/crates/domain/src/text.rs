//! Text cleaning and sentence segmentation
//!
//! Content arrives as raw text or HTML; cleaning strips markup and
//! normalizes whitespace before extraction. The default sentence
//! segmenter is regex-based and can be swapped for an NLP-backed one
//! through the `SentenceSegmenter` trait.

use crate::relationship::SentenceSegmenter;
use regex::Regex;

/// Whitespace and control-character normalization
#[derive(Debug, Clone)]
pub struct TextCleaner {
    whitespace: Regex,
}

impl TextCleaner {
    pub fn new() -> Self {
        Self {
            whitespace: Regex::new(r"\s+").expect("static pattern"),
        }
    }

    /// Collapse whitespace runs and trim
    pub fn normalize_text(&self, text: &str) -> String {
        self.whitespace.replace_all(text.trim(), " ").into_owned()
    }
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// Regex-based HTML to text conversion
#[derive(Debug, Clone)]
pub struct HtmlCleaner {
    script: Regex,
    style: Regex,
    tag: Regex,
    cleaner: TextCleaner,
}

impl HtmlCleaner {
    pub fn new() -> Self {
        Self {
            script: Regex::new(r"(?is)<script\b.*?</script>").expect("static pattern"),
            style: Regex::new(r"(?is)<style\b.*?</style>").expect("static pattern"),
            tag: Regex::new(r"(?s)<[^>]+>").expect("static pattern"),
            cleaner: TextCleaner::new(),
        }
    }

    /// Whether the content looks like HTML
    pub fn looks_like_html(content: &str) -> bool {
        content.contains('<') && content.contains('>')
    }

    /// Strip scripts, styles, tags, and common entities, then normalize
    /// whitespace
    pub fn clean_html(&self, html: &str) -> String {
        let without_scripts = self.script.replace_all(html, " ");
        let without_styles = self.style.replace_all(&without_scripts, " ");
        let without_tags = self.tag.replace_all(&without_styles, " ");
        let decoded = without_tags
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'");
        self.cleaner.normalize_text(&decoded)
    }

    /// Clean content of either kind, returning the cleaned text
    pub fn clean(&self, content: &str) -> String {
        if Self::looks_like_html(content) {
            self.clean_html(content)
        } else {
            self.cleaner.normalize_text(content)
        }
    }
}

impl Default for HtmlCleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// Sentence segmentation on terminal punctuation
#[derive(Debug, Clone)]
pub struct RegexSentenceSegmenter {
    boundary: Regex,
}

impl RegexSentenceSegmenter {
    pub fn new() -> Self {
        Self {
            boundary: Regex::new(r"[.!?]+\s+|[.!?]+$").expect("static pattern"),
        }
    }
}

impl Default for RegexSentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSegmenter for RegexSentenceSegmenter {
    fn split(&self, content: &str) -> Vec<String> {
        self.boundary
            .split(content)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
