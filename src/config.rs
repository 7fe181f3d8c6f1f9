//! Loading agent configuration (prompt templates + tunables) from TOML.
//!
//! See `AgentConfig` and `Prompts` for the expected schema. Everything has
//! a built-in default; the TOML file is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::CefrLevel;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  /// Level reported by a final-evaluation turn when the session has no
  /// user message to measure.
  #[serde(default = "AgentConfig::default_level")]
  pub default_level: CefrLevel,
}

impl AgentConfig {
  pub fn default_level() -> CefrLevel {
    CefrLevel::A1
  }
}

/// Prompt templates used by the generator. Placeholders are filled with
/// `util::fill_template`; overriding them in TOML changes tone/structure
/// without touching code.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  /// First-person greeting for a fresh session. Placeholders:
  /// {character}, {description}, {context}.
  pub initial_talking_template: String,
  /// Ongoing conversation turn. Placeholders: {question}, {difficulty},
  /// {character}, {description}, {word_limit}, {sentence_count},
  /// {vocab_level}, {context}, {chat_history}.
  pub talking_template: String,
  /// Quiz turn. Placeholders: {question_number}, {attempts}, {hints},
  /// {state_directive}, {question_words}, {choice_words}, {vocab_level},
  /// {context}, {chat_history}, {query}.
  pub quiz_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      initial_talking_template: r#"[CHARACTER SETUP]
- You are {character} who is the main character of a children's book
- {description}
- Answer in first person speech ("I" not "he/she")
- NEVER mention that you're an AI
- NEVER mention that you're a character of a book
- Use English only, no markdown

[GREETING TASK]
Greet the student and ask ONE simple question about the story.

RULES:
- Maximum 6 words total

Context: {context}
"#
      .into(),
      talking_template: r#"## STUDENT INPUT
Student wrote: "{question}"
Student's CEFR level: {difficulty}

## CHARACTER IDENTITY
You are {character} from the story. {description}
- Speak in first person ("I").
- Stay in character.
- NEVER mention that you're an AI.
- Use English only, no markdown.

## RESPONSE GUIDELINES
Create a natural, conversational response. The goal is to feel like a real person talking, not a language exercise.

- **Length**: Match the student's word count. Your response should be within {word_limit} words.
- **Complexity**: Match the {difficulty} level.
- **Vocabulary**: Use {vocab_level} vocabulary. Include 1-2 new words and stay within the story's theme.
- **Sentences**: Your response should have approximately {sentence_count} sentences.

## CONVERSATION DYNAMICS
1. Respond naturally to the student's message.
2. Add a related detail from the story.
3. Show your character's personality and emotions.

Story Context: {context}
Previous Conversation: {chat_history}
"#
      .into(),
      quiz_template: r#"- NEVER mention that you're an AI or Chatbot.
- Don't introduce yourself.
- Don't use markdown.
- Answer using English only.
- I'm a student, so please talk to me in easy sentences.
- You are running a 5-question quiz about a children's book.
- Quiz and Choices must be unique.
- Questions should be {question_words} words, each choice {choice_words} words, using {vocab_level}.
- Quizzes 1 to 4 are multiple choice with five numbered choices. Quiz 5 is a narrative question describing the significant events of the story, with no choices.
- We are on Quiz {question_number}. The student has given {attempts} wrong answers and received {hints} hints on it so far.
- {state_directive}
- If you mark the answer correct, start your reply with <CORRECT>, explain why it is correct, then present the next quiz. Example: "<CORRECT>That is correct. Because the farmer wanted to eat the big turnip for breakfast."
- If you give a hint, start your reply with the hint token and ONE short hint. Example: "<HINT1>Let's think about who helped last."
- If you mark the answer wrong and the question is over, start with <NOTCORRECT>, give the correct answer and why, then present the next quiz. Example: "<NOTCORRECT>That is not correct. The mouse pulled last."
- After Quiz 5 is answered, thank the student for their hard work, praise them, and say goodbye. Example: "Thank you for your hard work on the quiz. See you next time."

<Example>
Quiz 1: How did the family finally manage to pull out the big turnip?
Choices:
    1. They used a tractor.
    2. They used a magic spell.
    3. They all pulled together, including the mouse.
    4. They called a neighbor for help.
    5. They gave up and left the turnip in the ground.
</Example>

#Context:
{context}

#Chat History:
{chat_history}

HumanMessage(content='{query}')
"#
      .into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any
/// parsing/IO error, returns None and the built-in defaults apply.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "storytalk_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "storytalk_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "storytalk_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_ship_a1_and_full_templates() {
    let cfg = AgentConfig::default();
    assert_eq!(cfg.default_level, CefrLevel::A1);
    assert!(cfg.prompts.talking_template.contains("{word_limit}"));
    assert!(cfg.prompts.quiz_template.contains("{state_directive}"));
    assert!(cfg.prompts.initial_talking_template.contains("{character}"));
  }

  #[test]
  fn toml_can_override_default_level_only() {
    let cfg: AgentConfig = toml::from_str("default_level = \"B1\"").unwrap();
    assert_eq!(cfg.default_level, CefrLevel::B1);
    assert!(cfg.prompts.quiz_template.contains("<CORRECT>"));
  }
}
