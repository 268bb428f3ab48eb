use crate::report::SearchResult;

pub const MEMORY_CONTEXT_HEADER: &str = "## Relevant Memories:";

/// Prompt block listing retrieved memories with their citations, or `None`
/// when there is nothing to inject.
pub fn render_memory_context(results: &[SearchResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let mut out = String::from(MEMORY_CONTEXT_HEADER);
    for r in results {
        out.push_str(&format!("\n- {} (source: {})", r.text.trim(), r.citation()));
    }
    Some(out)
}
