use crate::models::Settings;

const SYSTEM_INSTRUCTIONS: [&str; 4] = [
    "You are an expert who explains official documentation.",
    "Explain the body of the provided document, adapting to the reader's level and any additional instructions.",
    "Answer in Markdown, using headings, lists and bold text so the structure is easy to follow.",
    "Do not include any preamble, greetings or thanks; output only the explanation itself.",
];

const DOCUMENT_START: &str = "\n--- Document body ---";
const EXPLANATION_START: &str = "--- Begin explanation ---";

/// Audience description for a reader level, `None` for 0 or unknown levels.
pub fn level_description(level: u8) -> Option<&'static str> {
    match level {
        1 => Some("The reader is a complete programming beginner. Avoid jargon and explain from the most basic concepts, carefully."),
        2 => Some("The reader is new to programming. Basic terms are fine, but explain in plain language."),
        3 => Some("The reader is an intermediate programmer who can follow some jargon and abstract concepts."),
        4 => Some("The reader is an advanced programmer who prefers concise, technically precise explanations."),
        5 => Some("The reader is a highly experienced expert who expects detailed technical background and nuance."),
        _ => None,
    }
}

/// Builds the single prompt sent for a first explanation.
pub fn build_explain_prompt(document: &str, settings: &Settings) -> String {
    let mut parts: Vec<String> = SYSTEM_INSTRUCTIONS.iter().map(|s| s.to_string()).collect();

    if let Some(description) = level_description(settings.user_level) {
        parts.push(description.to_string());
    }

    if !settings.user_level_text.is_empty() {
        parts.push(format!(
            "Additional context from the reader about their level: \"{}\"",
            settings.user_level_text
        ));
    }

    if !settings.additional_prompt.is_empty() {
        parts.push(format!(
            "Additional instructions from the reader: \"{}\"",
            settings.additional_prompt
        ));
    }

    parts.push(DOCUMENT_START.to_string());
    parts.push(document.to_string());
    parts.push(EXPLANATION_START.to_string());

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_orders_sections() {
        let settings = Settings {
            user_level: 3,
            user_level_text: "I write Go".into(),
            additional_prompt: "Use tables".into(),
            ..Settings::default()
        };
        let prompt = build_explain_prompt("THE DOC", &settings);

        let level = prompt.find("intermediate").unwrap();
        let level_text = prompt.find("I write Go").unwrap();
        let extra = prompt.find("Use tables").unwrap();
        let doc_marker = prompt.find("--- Document body ---").unwrap();
        let doc = prompt.find("THE DOC").unwrap();
        let end = prompt.find(EXPLANATION_START).unwrap();

        assert!(prompt.starts_with(SYSTEM_INSTRUCTIONS[0]));
        assert!(level < level_text && level_text < extra && extra < doc_marker);
        assert!(doc_marker < doc && doc < end);
        assert!(prompt.ends_with(EXPLANATION_START));
    }

    #[test]
    fn unknown_or_zero_level_adds_nothing() {
        for level in [0, 6, 200] {
            let settings = Settings {
                user_level: level,
                ..Settings::default()
            };
            let prompt = build_explain_prompt("doc", &settings);
            assert!(!prompt.contains("The reader is"), "level {level}");
        }
    }

    #[test]
    fn empty_free_text_is_skipped() {
        let prompt = build_explain_prompt("doc", &Settings::default());
        assert!(!prompt.contains("Additional context"));
        assert!(!prompt.contains("Additional instructions"));
        assert!(prompt.contains(level_description(1).unwrap()));
    }
}
