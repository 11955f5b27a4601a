use spar_core::events::SourceDoc;

/// Assemble the reference-material block handed to every generation task.
/// One numbered section per document, separated by a horizontal rule.
pub fn build_context(sources: &[SourceDoc]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let summary_part = doc
                .summary
                .as_deref()
                .map(|s| format!("\nSUMMARY: {s}"))
                .unwrap_or_default();
            let body = doc.text.as_deref().unwrap_or("No content available");
            format!("[Source {}: {}]{}\n{}", i + 1, doc.title, summary_part, body)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
