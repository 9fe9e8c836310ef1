//! Removal of retrieval citation markers from answers.

use std::sync::OnceLock;

use regex::Regex;

use crate::assistants::messages::Text;

// `【4:0†source】` and friends, with the whitespace that precedes them.
fn marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\s*【[^】]*】").expect("marker pattern is valid"))
}

/// The visible text of an answer with every citation marker removed.
///
/// Text without markers comes back exactly as written.
pub fn strip_markers(text: &Text) -> String {
    if text.annotations.is_empty() && !text.value.contains('【') {
        return text.value.clone();
    }
    let mut value = text.value.clone();
    for annotation in &text.annotations {
        if annotation.text.is_empty() {
            continue;
        }
        if let Ok(pattern) = Regex::new(&format!(r"\s*{}", regex::escape(&annotation.text))) {
            value = pattern.replace_all(&value, "").into_owned();
        }
    }
    marker().replace_all(&value, "").trim().to_string()
}

pub fn with_attribution(answer: &str, filename: &str) -> String {
    format!("{answer}\n\nSource: {filename}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistants::messages::{Annotation, FileCitation};

    fn text(value: &str, markers: &[&str]) -> Text {
        Text {
            value: value.to_string(),
            annotations: markers
                .iter()
                .map(|marker| Annotation {
                    kind: "file_citation".to_string(),
                    text: marker.to_string(),
                    start_index: 0,
                    end_index: 0,
                    file_citation: Some(FileCitation {
                        file_id: "file_1".to_string(),
                    }),
                })
                .collect(),
        }
    }

    #[test]
    fn removes_annotated_marker() {
        let text = text("The answer is 5【source:doc1】.", &["【source:doc1】"]);
        assert_eq!(strip_markers(&text), "The answer is 5.");
    }

    #[test]
    fn removes_unannotated_markers_and_leading_space() {
        let text = text("Walks help 【4:0†facts.docx】 a lot 【4:1†facts.docx】", &[]);
        assert_eq!(strip_markers(&text), "Walks help a lot");
    }

    #[test]
    fn plain_text_is_untouched() {
        let plain = text("Hello, friend", &[]);
        assert_eq!(strip_markers(&plain), "Hello, friend");

        let padded = text("  Hello, friend\n", &[]);
        assert_eq!(strip_markers(&padded), "  Hello, friend\n");
    }

    #[test]
    fn attribution_names_the_file() {
        assert_eq!(
            with_attribution("The answer is 5.", "facts.docx"),
            "The answer is 5.\n\nSource: facts.docx"
        );
    }
}
