//! Rephrasing styles: the built-in prompt presets plus user-defined
//! custom styles.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinStyle {
    Standard,
    Formal,
    Casual,
    Concise,
    Creative,
    Professional,
}

impl BuiltinStyle {
    pub const ALL: [BuiltinStyle; 6] = [
        BuiltinStyle::Standard,
        BuiltinStyle::Formal,
        BuiltinStyle::Casual,
        BuiltinStyle::Concise,
        BuiltinStyle::Creative,
        BuiltinStyle::Professional,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Formal => "formal",
            Self::Casual => "casual",
            Self::Concise => "concise",
            Self::Creative => "creative",
            Self::Professional => "professional",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Formal => "Formal",
            Self::Casual => "Casual",
            Self::Concise => "Concise",
            Self::Creative => "Creative",
            Self::Professional => "Professional",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Standard => "Clear and well-structured",
            Self::Formal => "Professional and academic tone",
            Self::Casual => "Relaxed and conversational",
            Self::Concise => "Brief and to the point",
            Self::Creative => "Engaging and expressive",
            Self::Professional => "Business-appropriate language",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Standard => {
                "Please rephrase the following text to make it clearer and more concise while preserving its original meaning. Only return the rephrased text, nothing else:"
            }
            Self::Formal => {
                "Please rephrase the following text in a formal, academic style with sophisticated vocabulary and proper grammar. Maintain the original meaning while making it more professional. Only return the rephrased text, nothing else:"
            }
            Self::Casual => {
                "Please rephrase the following text in a casual, conversational tone that sounds natural and friendly. Keep the original meaning but make it more relaxed. Only return the rephrased text, nothing else:"
            }
            Self::Concise => {
                "Please rephrase the following text to be as brief and concise as possible while retaining all essential information and meaning. Remove any unnecessary words. Only return the rephrased text, nothing else:"
            }
            Self::Creative => {
                "Please rephrase the following text in a creative, engaging way that captures attention while preserving the original meaning. Use vivid language and interesting expressions. Only return the rephrased text, nothing else:"
            }
            Self::Professional => {
                "Please rephrase the following text using professional business language appropriate for workplace communication. Maintain clarity and the original meaning. Only return the rephrased text, nothing else:"
            }
        }
    }
}

impl Default for BuiltinStyle {
    fn default() -> Self {
        Self::Standard
    }
}

/// A user-defined style with its own prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomStyle {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub prompt: String,
}

impl CustomStyle {
    pub fn new(name: &str, description: &str, prompt: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            prompt: prompt.to_string(),
        }
    }
}

/// Either a built-in preset or a custom style. Selection is persisted
/// by the stable id string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleOption {
    Builtin(BuiltinStyle),
    Custom(CustomStyle),
}

impl StyleOption {
    pub fn id(&self) -> String {
        match self {
            Self::Builtin(style) => format!("builtin-{}", style.key()),
            Self::Custom(style) => format!("custom-{}", style.id),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Builtin(style) => style.display_name(),
            Self::Custom(style) => &style.name,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::Builtin(style) => style.prompt(),
            Self::Custom(style) => &style.prompt,
        }
    }
}

impl Default for StyleOption {
    fn default() -> Self {
        Self::Builtin(BuiltinStyle::default())
    }
}

/// All selectable styles: built-ins first, then the given custom styles.
pub fn all_styles(custom: &[CustomStyle]) -> Vec<StyleOption> {
    BuiltinStyle::ALL
        .iter()
        .copied()
        .map(StyleOption::Builtin)
        .chain(custom.iter().cloned().map(StyleOption::Custom))
        .collect()
}

/// Resolves a persisted style id against the built-ins and the given
/// custom styles. Unknown ids fall back to the default style.
pub fn resolve_style(id: &str, custom: &[CustomStyle]) -> StyleOption {
    all_styles(custom)
        .into_iter()
        .find(|option| option.id() == id)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_keys_round_trip_through_serde() {
        for style in BuiltinStyle::ALL {
            let json = serde_json::to_string(&style).unwrap();
            assert_eq!(json, format!("\"{}\"", style.key()));
            let parsed: BuiltinStyle = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, style);
        }
    }

    #[test]
    fn all_builtin_prompts_request_only_the_rephrased_text() {
        for style in BuiltinStyle::ALL {
            assert!(style
                .prompt()
                .ends_with("Only return the rephrased text, nothing else:"));
        }
    }

    #[test]
    fn custom_styles_are_listed_after_builtins() {
        let custom = vec![CustomStyle::new(
            "Pirate",
            "Talk like a pirate",
            "Rephrase the following text as a pirate would say it:",
        )];

        let styles = all_styles(&custom);

        assert_eq!(styles.len(), BuiltinStyle::ALL.len() + 1);
        assert_eq!(styles.last().unwrap().display_name(), "Pirate");
    }

    #[test]
    fn resolve_falls_back_to_standard_for_unknown_id() {
        let resolved = resolve_style("custom-nonexistent", &[]);
        assert_eq!(resolved, StyleOption::Builtin(BuiltinStyle::Standard));
    }

    #[test]
    fn resolve_finds_custom_style_by_id() {
        let custom = vec![CustomStyle::new("Terse", "Very short", "Shorten this:")];
        let id = format!("custom-{}", custom[0].id);

        let resolved = resolve_style(&id, &custom);

        assert_eq!(resolved.display_name(), "Terse");
    }
}
