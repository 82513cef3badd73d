//! Prompt Builder
//!
//! Prompt construction for the flashcard and quiz use cases. Every structured
//! prompt ends with an output schema naming the top-level array key that the
//! normalizer looks for.

/// Prompt section types
#[derive(Debug, Clone)]
enum PromptSection {
    Role { expertise: String, task: String },
    Objectives(Vec<String>),
    /// Study material, fenced so the model does not mistake it for instructions
    Material(String),
    Rules(Vec<String>),
    /// JSON output example
    Schema(String),
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    pub fn objectives<S: Into<String>>(mut self, objectives: impl IntoIterator<Item = S>) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn material(mut self, content: &str) -> Self {
        self.sections
            .push(PromptSection::Material(content.trim().to_string()));
        self
    }

    pub fn rules<S: Into<String>>(mut self, rules: impl IntoIterator<Item = S>) -> Self {
        self.sections
            .push(PromptSection::Rules(rules.into_iter().map(Into::into).collect()));
        self
    }

    pub fn schema(mut self, example: &str) -> Self {
        self.sections.push(PromptSection::Schema(example.to_string()));
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n",
                        expertise, task
                    ));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::Material(content) => {
                    prompt.push_str("<MATERIAL>\n");
                    prompt.push_str(&content);
                    prompt.push_str("\n</MATERIAL>\n\n");
                }
                PromptSection::Rules(rules) => {
                    prompt.push_str("<RULES>\n");
                    for rule in rules {
                        prompt.push_str(&format!("- {}\n", rule));
                    }
                    prompt.push_str("</RULES>\n\n");
                }
                PromptSection::Schema(example) => {
                    prompt.push_str("# Output format\n\n");
                    prompt.push_str("Respond with JSON only, exactly in this shape:\n");
                    prompt.push_str("```json\n");
                    prompt.push_str(&example);
                    prompt.push_str("\n```\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

const FLASHCARD_SCHEMA: &str = r#"{
  "flashcards": [
    {
      "question": "string",
      "answer": "string",
      "explanation": "string (optional)",
      "difficulty": "easy | medium | hard",
      "tags": ["string"],
      "confidence": 0.0
    }
  ]
}"#;

const QUIZ_SCHEMA: &str = r#"{
  "questions": [
    {
      "question": "string",
      "type": "multiple_choice | true_false | short_answer",
      "options": ["string"],
      "correct_index": 0,
      "explanation": "string (optional)",
      "points": 1,
      "tags": ["string"],
      "confidence": 0.0
    }
  ]
}"#;

/// Preset prompt templates for the generation use cases
pub struct PromptTemplates;

impl PromptTemplates {
    /// Flashcards answering to the `flashcards` array key
    pub fn flashcards(material: &str, count: usize) -> String {
        PromptBuilder::new()
            .role("educator", "turning study material into flashcards")
            .objectives([
                format!("Write exactly {} flashcards covering the material below", count),
                "Ask about one fact or concept per card".to_string(),
                "Keep answers short enough to recall from memory".to_string(),
            ])
            .material(material)
            .rules([
                "Use ONLY facts stated in the material",
                "Write in the same language as the material",
                "confidence is your certainty that the answer is correct, from 0 to 1",
            ])
            .schema(FLASHCARD_SCHEMA)
            .build()
    }

    /// Quiz questions answering to the `questions` array key
    pub fn quiz(material: &str, count: usize) -> String {
        PromptBuilder::new()
            .role("educator", "writing assessment questions")
            .objectives([
                format!("Write exactly {} quiz questions covering the material below", count),
                "Mix question types when the material allows it".to_string(),
                "Make every distractor plausible but clearly wrong".to_string(),
            ])
            .material(material)
            .rules([
                "Use ONLY facts stated in the material",
                "Write in the same language as the material",
                "correct_index is the zero-based position of the right option",
                "true_false questions use the options [\"True\", \"False\"]",
            ])
            .schema(QUIZ_SCHEMA)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::validation::{ItemSchema, normalize};

    #[test]
    fn test_basic_prompt() {
        let prompt = PromptBuilder::new()
            .role("educator", "biology")
            .objectives(["Summarize", "Quiz"])
            .build();

        assert!(prompt.contains("<ROLE>"));
        assert!(prompt.contains("expert educator specializing in biology"));
        assert!(prompt.contains("1. Summarize"));
        assert!(prompt.contains("2. Quiz"));
    }

    #[test]
    fn test_material_is_fenced_and_trimmed() {
        let prompt = PromptBuilder::new()
            .material("\n  Mitochondria make ATP.  \n")
            .build();
        assert!(prompt.ends_with("<MATERIAL>\nMitochondria make ATP.\n</MATERIAL>"));
    }

    #[test]
    fn test_flashcard_template() {
        let prompt = PromptTemplates::flashcards("Cells divide by mitosis.", 5);
        assert!(prompt.contains("exactly 5 flashcards"));
        assert!(prompt.contains("Cells divide by mitosis."));
        assert!(prompt.contains("\"flashcards\""));
    }

    #[test]
    fn test_quiz_template() {
        let prompt = PromptTemplates::quiz("Water boils at 100C.", 3);
        assert!(prompt.contains("exactly 3 quiz questions"));
        assert!(prompt.contains("\"questions\""));
        assert!(prompt.contains("correct_index"));
    }

    #[test]
    fn test_schemas_match_normalizer_keys() {
        // The example payloads themselves must parse under the matching schema
        let cards = normalize(FLASHCARD_SCHEMA, &ItemSchema::flashcards()).unwrap();
        assert_eq!(cards.items.len(), 1);
        let quiz = normalize(QUIZ_SCHEMA, &ItemSchema::quiz()).unwrap();
        assert_eq!(quiz.items.len(), 1);
    }
}
