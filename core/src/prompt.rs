use crate::generator::GenerationRequest;

/// Base prompt for candidate generation.
///
/// Sections, each skipped when blank except the crafted text:
/// few-shot texture examples, section intent, rough version / outline,
/// crafted text so far, then the continue marker.
pub fn build_base_prompt(request: &GenerationRequest<'_>) -> String {
    let mut parts = Vec::new();

    let fewshot = request.fewshot_examples.trim();
    if !fewshot.is_empty() {
        parts.push(section("FEW-SHOT TEXTURE EXAMPLES", fewshot));
    }

    let intent = request.section_intent.trim();
    if !intent.is_empty() {
        parts.push(section("SECTION INTENT", intent));
    }

    if let Some(draft) = request.rough_draft.map(str::trim).filter(|d| !d.is_empty()) {
        parts.push(section("ROUGH VERSION / OUTLINE", draft));
    }

    parts.push(section("CRAFTED TEXT SO FAR", request.full_text));
    parts.push("[CONTINUE]".to_string());

    parts.join("\n\n")
}

fn section(title: &str, body: &str) -> String {
    format!("[{title}]\n{body}")
}
