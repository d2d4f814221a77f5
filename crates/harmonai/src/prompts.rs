//! Instruction templates for the language model.
//!
//! Each template has a single `{...}` slot that is replaced with caller text.

/// Turns a song description into comma-separated audio tags.
pub const PROMPT_GENERATOR_PROMPT: &str = r#"Reformat the following music description into a list of tags that describe the audio, suitable as the prompt for a music generation model.

Use only comma-separated tags. Include genre, mood, instruments, tempo (in BPM) and vocal style when they are implied by the description. Do not write sentences, explanations or lyrics.

Examples:
- "A chill lofi song with rain sounds" -> "lofi, chillhop, mellow, rain, vinyl crackle, jazzy piano, 80 BPM, relaxing"
- "An angry punk song about the city" -> "punk rock, aggressive, distorted guitar, fast drums, male vocals, 180 BPM, raw"

Description: {user_prompt}

Tags:"#;

/// Writes song lyrics with section markers from a description.
pub const LYRICS_GENERATOR_PROMPT: &str = r#"Write the lyrics for a song based on the following description.

Structure the song with section markers on their own lines: [verse], [chorus], [bridge] and optionally [outro]. Each section should have four to eight lines. Output only the lyrics with their markers, with no title, commentary or explanation.

Description: {description}

Lyrics:"#;

/// Asks for 3-5 genre labels, comma separated.
pub const CATEGORIES_PROMPT: &str = "Based on the following music description, list 3-5 relevant genres or categories as a comma-separated list. For example: Pop, Electronic, Sad, 80s. Description: '{description}'";

/// Fill the `{name}` slot of `template` with `value`.
pub fn fill(template: &str, name: &str, value: &str) -> String {
    template.replace(&format!("{{{}}}", name), value)
}

/// Instruction for deriving an audio prompt from a description.
pub fn prompt_instruction(description: &str) -> String {
    fill(PROMPT_GENERATOR_PROMPT, "user_prompt", description)
}

/// Instruction for deriving lyrics from a description.
pub fn lyrics_instruction(description: &str) -> String {
    fill(LYRICS_GENERATOR_PROMPT, "description", description)
}

/// Instruction for deriving genre labels from a description.
pub fn categories_instruction(description: &str) -> String {
    fill(CATEGORIES_PROMPT, "description", description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_slot() {
        assert_eq!(fill("Say {word}!", "word", "hi"), "Say hi!");
    }

    #[test]
    fn test_templates_have_one_slot_each() {
        assert!(PROMPT_GENERATOR_PROMPT.contains("{user_prompt}"));
        assert!(LYRICS_GENERATOR_PROMPT.contains("{description}"));
        assert!(CATEGORIES_PROMPT.contains("{description}"));
    }

    #[test]
    fn test_instructions_embed_description() {
        let desc = "a funky rave track with a disco vibe";
        for instruction in [
            prompt_instruction(desc),
            lyrics_instruction(desc),
            categories_instruction(desc),
        ] {
            assert!(instruction.contains(desc));
            assert!(!instruction.contains("{description}"));
            assert!(!instruction.contains("{user_prompt}"));
        }
    }

    #[test]
    fn test_categories_instruction_quotes_description() {
        let instruction = categories_instruction("sad synthwave");
        assert!(instruction.ends_with("Description: 'sad synthwave'"));
        assert!(instruction.contains("comma-separated"));
    }
}
