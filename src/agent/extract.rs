// Code block extraction from model replies

const FENCE: &str = "```";

/// Body of the first fenced code block in `reply`.
///
/// The opening fence may carry a language tag. Blocks that are empty or
/// never closed count as absent.
pub fn extract_code(reply: &str) -> Option<String> {
    let mut lines = reply.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with(FENCE) {
            continue;
        }
        let tag = &trimmed[FENCE.len()..];
        if tag.contains(FENCE) {
            // One-line ```code``` span, not a block
            continue;
        }

        let mut body = Vec::new();
        for inner in lines.by_ref() {
            if inner.trim() == FENCE {
                let code = body.join("\n");
                return (!code.trim().is_empty()).then_some(code);
            }
            body.push(inner);
        }
        return None;
    }
    None
}
