use spar_core::persona::{spec_for, PersonaBinding};
use spar_llm::provider::GenerationRequest;

const INPUT_PREFIX: &str = "Analyze this Singapore tax matter: ";
const CONTEXT_HEADER: &str = "\n\nREFERENCE MATERIAL FROM WEB SEARCH:\n";
const CONTEXT_FOOTER: &str = "\n\nUse the above reference material to inform your analysis where relevant. Cite specific sources when applicable.";

/// Assemble the provider call for one persona. The search context, when
/// present, is appended to the persona instructions, never to the input.
pub fn generation_request(
    binding: &PersonaBinding,
    topic: &str,
    context: &str,
) -> GenerationRequest {
    let spec = spec_for(binding.role);
    let mut instructions = spec.instructions.to_string();
    if !context.is_empty() {
        instructions.push_str(CONTEXT_HEADER);
        instructions.push_str(context);
        instructions.push_str(CONTEXT_FOOTER);
    }
    GenerationRequest {
        model: binding.model.clone(),
        instructions,
        input: format!("{INPUT_PREFIX}{topic}"),
    }
}
