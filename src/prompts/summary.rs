//! Bilingual summary prompts.
//!
//! The model is asked for a single JSON object so the response can be
//! machine-parsed; anything else is treated as a malformed response.

/// System prompt for paper summarization.
/// Placeholder: {native_language}
pub const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a research assistant who writes short, accurate summaries of academic papers for a daily digest.

Rules you MUST follow:
- Use ONLY the provided title and abstract. Do NOT invent results, numbers, or claims.
- Summarize in 3-5 sentences: the main contribution, the method, and the key result.
- Write one summary in English and one in {native_language}. Both must say the same thing.
- Output MUST be valid JSON only (no markdown, no extra text), for machine parsing.

Output format (strict JSON):
{
  "summary_en": "English summary",
  "summary_native": "Summary in {native_language}"
}"#;

/// User prompt template for a single paper.
/// Placeholders: {title}, {abstract}
pub const USER_PROMPT_TEMPLATE: &str = r#"Summarize the following research paper.

Title: {title}

Abstract: {abstract}

Output strict JSON only:
{
  "summary_en": "...",
  "summary_native": "..."
}"#;

/// Build the system prompt for the configured native language
pub fn build_system_prompt(native_language: &str) -> String {
    SYSTEM_PROMPT_TEMPLATE.replace("{native_language}", native_language)
}

/// Build user prompt with paper data
pub fn build_user_prompt(title: &str, abstract_text: &str) -> String {
    USER_PROMPT_TEMPLATE
        .replace("{title}", title)
        .replace("{abstract}", abstract_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_user_prompt() {
        let prompt = build_user_prompt("Lattice signatures", "We propose a scheme.");
        assert!(prompt.contains("Title: Lattice signatures"));
        assert!(prompt.contains("Abstract: We propose a scheme."));
    }

    #[test]
    fn test_build_system_prompt() {
        let prompt = build_system_prompt("Chinese");
        assert!(prompt.contains("one in Chinese"));
        assert!(!prompt.contains("{native_language}"));
    }
}
