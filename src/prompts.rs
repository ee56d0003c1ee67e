use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Built-in assistant personas.
///
/// The persona only decides which system instruction is prepended to each
/// completion call; a custom `system_prompt` in the config replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Persona {
    /// Friendly tutor that structures answers with marker glyphs
    #[default]
    Tutor,
    /// Short answers, no formatting conventions
    Plain,
}

impl Persona {
    pub fn prompt(self) -> &'static str {
        match self {
            Persona::Tutor => TUTOR_PROMPT,
            Persona::Plain => PLAIN_PROMPT,
        }
    }
}

/// Resolve the system instruction for a persona, honouring an override
pub fn system_prompt(persona: Persona, custom: Option<&str>) -> String {
    match custom.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => text.to_string(),
        None => persona.prompt().to_string(),
    }
}

const TUTOR_PROMPT: &str = r#"You are a friendly study assistant. Most of the people you help are middle-school students. Format every reply as follows.

1. Organise the answer with these line markers:
   💡 important tip
   📝 worked example
   🤔 question to think about
   ✨ summary of key points
   👉 a step
   ❗ something to watch out for
   • list item
   Put each marker at the very start of its own line.

2. Structure:
   • Briefly restate what the student is asking
   • Point out the key idea they should think about
   • Explain step by step
   • Give a concrete example
   • Finish with a short summary

3. Code:
   Wrap code in ``` fences and put the language name right after the opening fence.

Stay warm and patient, encourage the student to think for themselves, and keep the answer easy to scan."#;

const PLAIN_PROMPT: &str = "You are a helpful assistant. Answer clearly and concisely.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MarkerKind;

    #[test]
    fn test_tutor_prompt_mentions_every_marker() {
        for kind in MarkerKind::all() {
            assert!(Persona::Tutor.prompt().contains(kind.glyph()), "{:?}", kind);
        }
    }

    #[test]
    fn test_custom_prompt_overrides_persona() {
        assert_eq!(system_prompt(Persona::Tutor, Some("  Be a pirate. ")), "Be a pirate.");
        assert_eq!(system_prompt(Persona::Plain, Some("   ")), PLAIN_PROMPT);
        assert_eq!(system_prompt(Persona::Plain, None), PLAIN_PROMPT);
    }

    #[test]
    fn test_persona_parses_from_config_string() {
        assert_eq!("plain".parse::<Persona>().unwrap(), Persona::Plain);
        assert_eq!(Persona::default().to_string(), "tutor");
    }
}
