//! Generated Item Extraction
//!
//! Turns a repaired JSON payload into typed study items. The caller picks the
//! shape through an [`ItemSchema`]; everything else (repair, aliases, skip
//! policy) is shared between flashcards and quiz questions.
//!
//! Items missing a mandatory field are skipped and counted, never fatal. A
//! payload without the expected top-level array is `MalformedResponse`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use super::json_repair::extract_json_with_repair_status;
use crate::constants::items::{DEFAULT_CONFIDENCE, DEFAULT_POINTS};
use crate::types::{
    ForgeError, Result, json_f64_any, json_string_any, json_string_array_any, json_u64_any,
};

// =============================================================================
// Field Aliases
// =============================================================================

const QUESTION_KEYS: &[&str] = &["question", "pregunta"];
const QUIZ_TEXT_KEYS: &[&str] = &["question", "text", "pregunta", "texto"];
const ANSWER_KEYS: &[&str] = &["answer", "respuesta"];
const EXPLANATION_KEYS: &[&str] = &["explanation", "explicacion", "explicación"];
const DIFFICULTY_KEYS: &[&str] = &["difficulty", "dificultad"];
const TAGS_KEYS: &[&str] = &["tags", "etiquetas"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "confianza"];
const OPTIONS_KEYS: &[&str] = &["options", "opciones"];
const TYPE_KEYS: &[&str] = &["type", "tipo"];
const CORRECT_KEYS: &[&str] = &[
    "correct_index",
    "correctIndex",
    "respuesta_correcta",
    "correct_answer",
    "correctAnswer",
];
const POINTS_KEYS: &[&str] = &["points", "puntos"];

// =============================================================================
// Item Types
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Lenient parse accepting English and Spanish labels
    pub fn parse(label: &str) -> Option<Self> {
        match fold_label(label).as_str() {
            "easy" | "facil" | "basic" | "basico" => Some(Self::Easy),
            "medium" | "media" | "medio" | "intermediate" | "intermedio" => Some(Self::Medium),
            "hard" | "dificil" | "advanced" | "avanzado" => Some(Self::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    pub fn parse(label: &str) -> Option<Self> {
        match fold_label(label).as_str() {
            "multiple_choice" | "multiplechoice" | "opcion_multiple" | "seleccion_multiple" => {
                Some(Self::MultipleChoice)
            }
            "true_false" | "truefalse" | "boolean" | "verdadero_falso" => Some(Self::TrueFalse),
            "short_answer" | "shortanswer" | "open" | "respuesta_corta" => Some(Self::ShortAnswer),
            _ => None,
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleChoice => write!(f, "multiple_choice"),
            Self::TrueFalse => write!(f, "true_false"),
            Self::ShortAnswer => write!(f, "short_answer"),
        }
    }
}

/// Lowercase, fold Spanish accents and unify separators
fn fold_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' => 'u',
            '-' | ' ' | '/' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Correct answer of a quiz question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectAnswer {
    /// Zero-based index into `options`
    Index(usize),
    /// Free-text answer that matched no option
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFlashcard {
    pub question: String,
    pub answer: String,
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuizQuestion {
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub correct: Option<CorrectAnswer>,
    pub explanation: Option<String>,
    pub points: u32,
    pub tags: Vec<String>,
    pub confidence: f64,
}

/// One extracted study item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedItem {
    Flashcard(GeneratedFlashcard),
    Quiz(GeneratedQuizQuestion),
}

impl ParsedItem {
    pub fn as_flashcard(&self) -> Option<&GeneratedFlashcard> {
        match self {
            Self::Flashcard(card) => Some(card),
            Self::Quiz(_) => None,
        }
    }

    pub fn as_quiz(&self) -> Option<&GeneratedQuizQuestion> {
        match self {
            Self::Quiz(question) => Some(question),
            Self::Flashcard(_) => None,
        }
    }
}

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Flashcard,
    Quiz,
}

/// Expected payload shape: item kind plus the top-level array key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSchema {
    pub kind: ItemKind,
    pub array_key: String,
}

impl ItemSchema {
    pub fn flashcards() -> Self {
        Self {
            kind: ItemKind::Flashcard,
            array_key: "flashcards".to_string(),
        }
    }

    pub fn quiz() -> Self {
        Self {
            kind: ItemKind::Quiz,
            array_key: "questions".to_string(),
        }
    }

    pub fn with_array_key(mut self, key: impl Into<String>) -> Self {
        self.array_key = key.into();
        self
    }

    /// Declared key first, then the kind's Spanish alias
    fn array_keys(&self) -> Vec<&str> {
        let alias = match self.kind {
            ItemKind::Flashcard => "tarjetas",
            ItemKind::Quiz => "preguntas",
        };
        let mut keys = vec![self.array_key.as_str()];
        if alias != self.array_key {
            keys.push(alias);
        }
        keys
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Items that survived extraction
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub items: Vec<ParsedItem>,
    /// Entries dropped for a missing mandatory field
    pub skipped: usize,
    /// Whether JSON repair was needed
    pub repaired: bool,
}

/// Parse `raw` into items of `schema`'s kind.
///
/// An empty item list is still `Ok`; callers decide whether zero items is a
/// failure for their use case.
pub fn normalize(raw: &str, schema: &ItemSchema) -> Result<NormalizedBatch> {
    let (value, repaired) = extract_json_with_repair_status(raw)?;

    let keys = schema.array_keys();
    let entries = keys
        .iter()
        .find_map(|key| value.get(*key))
        .ok_or_else(|| {
            ForgeError::MalformedResponse(format!(
                "response has no \"{}\" array",
                schema.array_key
            ))
        })?
        .as_array()
        .ok_or_else(|| {
            ForgeError::MalformedResponse(format!("\"{}\" is not an array", schema.array_key))
        })?;

    let mut batch = NormalizedBatch {
        items: Vec::with_capacity(entries.len()),
        skipped: 0,
        repaired,
    };

    for (index, entry) in entries.iter().enumerate() {
        let parsed = match schema.kind {
            ItemKind::Flashcard => parse_flashcard(entry).map(ParsedItem::Flashcard),
            ItemKind::Quiz => parse_quiz_question(entry).map(ParsedItem::Quiz),
        };
        match parsed {
            Ok(item) => batch.items.push(item),
            Err(reason) => {
                warn!(index, reason, "Skipping generated item");
                batch.skipped += 1;
            }
        }
    }

    debug!(
        kind = ?schema.kind,
        parsed = batch.items.len(),
        skipped = batch.skipped,
        "Normalized generated items"
    );
    Ok(batch)
}

fn parse_flashcard(entry: &Value) -> std::result::Result<GeneratedFlashcard, &'static str> {
    if !entry.is_object() {
        return Err("entry is not an object");
    }
    let question = json_string_any(entry, QUESTION_KEYS).ok_or("missing question")?;
    let answer = json_string_any(entry, ANSWER_KEYS).ok_or("missing answer")?;

    Ok(GeneratedFlashcard {
        question,
        answer,
        explanation: json_string_any(entry, EXPLANATION_KEYS),
        difficulty: parse_difficulty(entry),
        tags: json_string_array_any(entry, TAGS_KEYS),
        confidence: parse_confidence(entry),
    })
}

fn parse_quiz_question(entry: &Value) -> std::result::Result<GeneratedQuizQuestion, &'static str> {
    if !entry.is_object() {
        return Err("entry is not an object");
    }
    let text = json_string_any(entry, QUIZ_TEXT_KEYS).ok_or("missing question text")?;
    let question_type = json_string_any(entry, TYPE_KEYS)
        .and_then(|label| QuestionType::parse(&label))
        .unwrap_or_default();

    let mut options = json_string_array_any(entry, OPTIONS_KEYS);
    if options.is_empty() && question_type == QuestionType::TrueFalse {
        options = vec!["True".to_string(), "False".to_string()];
    }
    if options.is_empty() {
        return Err("missing options");
    }

    let points = json_u64_any(entry, POINTS_KEYS)
        .filter(|p| *p > 0)
        .map_or(DEFAULT_POINTS, |p| u32::try_from(p).unwrap_or(u32::MAX));

    Ok(GeneratedQuizQuestion {
        correct: parse_correct(entry, &options),
        text,
        question_type,
        options,
        explanation: json_string_any(entry, EXPLANATION_KEYS),
        points,
        tags: json_string_array_any(entry, TAGS_KEYS),
        confidence: parse_confidence(entry),
    })
}

fn parse_difficulty(entry: &Value) -> Difficulty {
    json_string_any(entry, DIFFICULTY_KEYS)
        .and_then(|label| Difficulty::parse(&label))
        .unwrap_or_default()
}

fn parse_confidence(entry: &Value) -> f64 {
    json_f64_any(entry, CONFIDENCE_KEYS)
        .filter(|c| c.is_finite())
        .map_or(DEFAULT_CONFIDENCE, |c| c.clamp(0.0, 1.0))
}

/// Resolve the correct answer against `options`.
///
/// Numbers are indices; strings match an option (case-insensitive), then a
/// letter `A`.., then a numeric index, and otherwise stay free text.
fn parse_correct(entry: &Value, options: &[String]) -> Option<CorrectAnswer> {
    let raw = CORRECT_KEYS
        .iter()
        .chain(ANSWER_KEYS)
        .find_map(|key| entry.get(*key).filter(|v| !v.is_null()))?;

    if let Value::Number(n) = raw {
        let index = usize::try_from(n.as_u64()?).ok()?;
        return (index < options.len()).then_some(CorrectAnswer::Index(index));
    }

    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }

    if let Some(index) = options.iter().position(|o| o.eq_ignore_ascii_case(&text)) {
        return Some(CorrectAnswer::Index(index));
    }

    let mut chars = text.chars();
    if let (Some(letter), None) = (chars.next(), chars.next())
        && letter.is_ascii_alphabetic()
    {
        let index = usize::from(letter.to_ascii_uppercase() as u8 - b'A');
        if index < options.len() {
            return Some(CorrectAnswer::Index(index));
        }
    }

    if let Ok(index) = text.parse::<usize>()
        && index < options.len()
    {
        return Some(CorrectAnswer::Index(index));
    }

    Some(CorrectAnswer::Text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flashcard(item: &ParsedItem) -> &GeneratedFlashcard {
        item.as_flashcard().unwrap()
    }

    fn quiz(item: &ParsedItem) -> &GeneratedQuizQuestion {
        item.as_quiz().unwrap()
    }

    #[test]
    fn test_fenced_truncated_spanish_flashcard() {
        let raw = "```json\n{\"flashcards\": [{\"pregunta\":\"Q\",\"respuesta\":\"A\"}]";
        let batch = normalize(raw, &ItemSchema::flashcards()).unwrap();
        assert!(batch.repaired);
        assert_eq!(batch.items.len(), 1);
        let card = flashcard(&batch.items[0]);
        assert_eq!(card.question, "Q");
        assert_eq!(card.answer, "A");
    }

    #[test]
    fn test_invalid_item_skipped_not_fatal() {
        let raw = r#"{"flashcards": [
            {"question": "What is Rust?", "answer": "A language"},
            {"question": "Missing answer"}
        ]}"#;
        let batch = normalize(raw, &ItemSchema::flashcards()).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.skipped, 1);
        assert!(!batch.repaired);
    }

    #[test]
    fn test_blank_and_non_object_entries_skipped() {
        let raw = r#"{"flashcards": [{"question": "  ", "answer": "A"}, "text", 3]}"#;
        let batch = normalize(raw, &ItemSchema::flashcards()).unwrap();
        assert!(batch.items.is_empty());
        assert_eq!(batch.skipped, 3);
    }

    #[test]
    fn test_missing_array_key_is_malformed() {
        let err = normalize(r#"{"cards": []}"#, &ItemSchema::flashcards()).unwrap_err();
        assert!(matches!(err, ForgeError::MalformedResponse(ref m) if m.contains("flashcards")));

        let err = normalize(r#"{"flashcards": {}}"#, &ItemSchema::flashcards()).unwrap_err();
        assert!(matches!(err, ForgeError::MalformedResponse(_)));
    }

    #[test]
    fn test_empty_array_is_successful_parse() {
        let batch = normalize(r#"{"questions": []}"#, &ItemSchema::quiz()).unwrap();
        assert!(batch.items.is_empty());
        assert_eq!(batch.skipped, 0);
    }

    #[test]
    fn test_spanish_array_and_field_aliases() {
        let raw = r#"{"tarjetas": [{
            "pregunta": "¿Qué es ATP?",
            "respuesta": "Moneda energética",
            "explicacion": "Se hidroliza",
            "dificultad": "difícil",
            "etiquetas": "biología, energía",
            "confianza": 1.7
        }]}"#;
        let batch = normalize(raw, &ItemSchema::flashcards()).unwrap();
        let card = flashcard(&batch.items[0]);
        assert_eq!(card.explanation.as_deref(), Some("Se hidroliza"));
        assert_eq!(card.difficulty, Difficulty::Hard);
        assert_eq!(card.tags, vec!["biología", "energía"]);
        assert_eq!(card.confidence, 1.0);
    }

    #[test]
    fn test_flashcard_defaults() {
        let raw = r#"{"flashcards": [{"question": "Q", "answer": "A", "difficulty": "weird"}]}"#;
        let batch = normalize(raw, &ItemSchema::flashcards()).unwrap();
        let card = flashcard(&batch.items[0]);
        assert_eq!(card.difficulty, Difficulty::Medium);
        assert_eq!(card.confidence, DEFAULT_CONFIDENCE);
        assert!(card.tags.is_empty());
        assert!(card.explanation.is_none());
    }

    #[test]
    fn test_quiz_question_parsing() {
        let raw = r#"{"questions": [
            {"question": "2+2?", "options": ["3", "4"], "correct_index": 1, "points": 2},
            {"pregunta": "Capital?", "opciones": ["Lima", "Quito"], "respuesta_correcta": "quito"},
            {"question": "Pick", "options": ["x", "y", "z"], "correctAnswer": "C"},
            {"question": "Explain", "type": "short-answer", "options": ["n/a"], "answer": "Because"},
            {"question": "No options"}
        ]}"#;
        let batch = normalize(raw, &ItemSchema::quiz()).unwrap();
        assert_eq!(batch.items.len(), 4);
        assert_eq!(batch.skipped, 1);

        let first = quiz(&batch.items[0]);
        assert_eq!(first.correct, Some(CorrectAnswer::Index(1)));
        assert_eq!(first.points, 2);
        assert_eq!(first.question_type, QuestionType::MultipleChoice);

        assert_eq!(quiz(&batch.items[1]).correct, Some(CorrectAnswer::Index(1)));
        assert_eq!(quiz(&batch.items[1]).points, DEFAULT_POINTS);
        assert_eq!(quiz(&batch.items[2]).correct, Some(CorrectAnswer::Index(2)));

        let fourth = quiz(&batch.items[3]);
        assert_eq!(fourth.question_type, QuestionType::ShortAnswer);
        assert_eq!(fourth.correct, Some(CorrectAnswer::Text("Because".into())));
    }

    #[test]
    fn test_true_false_gets_default_options() {
        let raw = r#"{"questions": [{"texto": "Water boils at 100C", "tipo": "verdadero/falso", "correct_answer": true}]}"#;
        let batch = normalize(raw, &ItemSchema::quiz()).unwrap();
        let question = quiz(&batch.items[0]);
        assert_eq!(question.question_type, QuestionType::TrueFalse);
        assert_eq!(question.options, vec!["True", "False"]);
        assert_eq!(question.correct, Some(CorrectAnswer::Index(0)));
    }

    #[test]
    fn test_out_of_range_index_dropped() {
        let raw = r#"{"questions": [{"question": "Q", "options": ["a"], "correct_index": 5}]}"#;
        let batch = normalize(raw, &ItemSchema::quiz()).unwrap();
        assert_eq!(quiz(&batch.items[0]).correct, None);
    }

    #[test]
    fn test_custom_array_key() {
        let schema = ItemSchema::quiz().with_array_key("items");
        let raw = r#"{"items": [{"question": "Q", "options": ["a", "b"]}]}"#;
        assert_eq!(normalize(raw, &schema).unwrap().items.len(), 1);
        // Spanish alias of the kind still applies
        let raw = r#"{"preguntas": [{"question": "Q", "options": ["a", "b"]}]}"#;
        assert_eq!(normalize(raw, &schema).unwrap().items.len(), 1);
    }

    #[test]
    fn test_parsed_item_serializes_with_kind_tag() {
        let item = ParsedItem::Quiz(GeneratedQuizQuestion {
            text: "Q".into(),
            question_type: QuestionType::TrueFalse,
            options: vec!["True".into(), "False".into()],
            correct: Some(CorrectAnswer::Index(1)),
            explanation: None,
            points: 1,
            tags: vec![],
            confidence: 0.8,
        });
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["kind"], "quiz");
        assert_eq!(value["type"], "true_false");
        assert_eq!(value["correct"]["index"], 1);
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!(Difficulty::parse(" Fácil "), Some(Difficulty::Easy));
        assert_eq!(Difficulty::parse("MEDIA"), Some(Difficulty::Medium));
        assert_eq!(QuestionType::parse("Multiple Choice"), Some(QuestionType::MultipleChoice));
        assert_eq!(QuestionType::parse("essay"), None);
    }
}
