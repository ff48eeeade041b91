use crate::llm::{GenerativeModel, Part};
use crate::taxonomy::catalog::CategoryCatalog;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const DESCRIPTION_PROMPT_LIMIT: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Unknown labels read as `Medium`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySelection {
    pub category: String,
    pub confidence: Confidence,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no candidate categories")]
    NoCandidates,
    #[error("model call failed: {0}")]
    Model(String),
    #[error("unparsable model response: {0}")]
    Parse(String),
    #[error("model picked {number}, expected 1..={len}")]
    OutOfRange { number: i64, len: usize },
}

/// Title families that hint at a product kind when no keyword matches, each
/// paired with the leaf fragments that kind lives under. Checked in order.
const HEURISTICS: &[(&[&str], &[&str])] = &[
    (
        &["png", "svg", "pdf", "jpeg", "jpg", "eps", "psd"],
        &["digital", "template", "clip art", "graphic"],
    ),
    (&["template", "printable"], &["template", "design"]),
    (&["logo", "graphic", "design"], &["logo", "graphic", "design"]),
    (&["clipart", "clip art", "image"], &["clip art", "image"]),
];

const GENERIC_DIGITAL: &[&str] = &["digital", "template", "clip art", "graphic design", "file"];

/// Picks one leaf category for a product: keyword pre-filter over the leaf
/// set, then a numbered-candidate question to the model, then a safe
/// fallback to the top candidate when the answer cannot be used.
pub struct CategorySelector {
    catalog: Arc<CategoryCatalog>,
    lowered_leaves: Vec<String>,
    model: Arc<dyn GenerativeModel>,
    candidate_limit: usize,
}

impl CategorySelector {
    pub fn new(
        catalog: Arc<CategoryCatalog>,
        model: Arc<dyn GenerativeModel>,
        candidate_limit: usize,
    ) -> Self {
        let lowered_leaves = catalog.leaves().iter().map(|leaf| leaf.to_lowercase()).collect();
        Self {
            catalog,
            lowered_leaves,
            model,
            candidate_limit: candidate_limit.max(1),
        }
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// Never fails: any problem with the model answer degrades to the top
    /// candidate with `Confidence::Low` and the error recorded.
    pub async fn select_category(&self, title: &str, description: &str) -> CategorySelection {
        let candidates = self.candidates(title);
        match self.try_select(title, description, &candidates).await {
            Ok(selection) => selection,
            Err(err) => {
                warn!(target = "forge.taxonomy", title = %title, error = %err, "category_selection_fallback");
                let category = candidates
                    .first()
                    .or_else(|| self.catalog.leaves().first())
                    .cloned()
                    .unwrap_or_default();
                CategorySelection {
                    category,
                    confidence: Confidence::Low,
                    reasoning: format!("fallback after error: {err}"),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Candidate leaves for a title, best first, at most `candidate_limit`.
    /// Only empty when the catalog itself has no leaves.
    pub fn candidates(&self, title: &str) -> Vec<String> {
        let scored = self.keyword_candidates(title);
        if !scored.is_empty() {
            return scored;
        }
        let heuristic = self.heuristic_candidates(title);
        if !heuristic.is_empty() {
            return heuristic;
        }
        debug!(target = "forge.taxonomy", title = %title, "category_random_sample");
        self.catalog
            .leaves()
            .choose_multiple(&mut rand::rng(), self.candidate_limit)
            .cloned()
            .collect()
    }

    /// Leaves scored by how many title keywords (longer than two chars) they
    /// contain, highest first; equal scores keep catalog order.
    pub fn keyword_candidates(&self, title: &str) -> Vec<String> {
        let lowered_title = title.to_lowercase();
        let keywords: Vec<&str> = lowered_title
            .split_whitespace()
            .filter(|word| word.chars().count() > 2)
            .collect();
        if keywords.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .lowered_leaves
            .iter()
            .enumerate()
            .filter_map(|(idx, leaf)| {
                let score = keywords.iter().filter(|kw| leaf.contains(**kw)).count();
                (score > 0).then_some((idx, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
            .into_iter()
            .take(self.candidate_limit)
            .map(|(idx, _)| self.catalog.leaves()[idx].clone())
            .collect()
    }

    fn heuristic_candidates(&self, title: &str) -> Vec<String> {
        let lowered_title = title.to_lowercase();
        for (hints, fragments) in HEURISTICS {
            let hinted = hints.iter().any(|hint| lowered_title.contains(hint))
                || (fragments.contains(&"digital") && has_token(&lowered_title, "ai"));
            if !hinted {
                continue;
            }
            let found = self.leaves_containing(fragments);
            if !found.is_empty() {
                return found;
            }
        }
        self.leaves_containing(GENERIC_DIGITAL)
    }

    fn leaves_containing(&self, fragments: &[&str]) -> Vec<String> {
        self.lowered_leaves
            .iter()
            .enumerate()
            .filter(|(_, leaf)| fragments.iter().any(|fragment| leaf.contains(fragment)))
            .take(self.candidate_limit)
            .map(|(idx, _)| self.catalog.leaves()[idx].clone())
            .collect()
    }

    async fn try_select(
        &self,
        title: &str,
        description: &str,
        candidates: &[String],
    ) -> Result<CategorySelection, SelectionError> {
        if candidates.is_empty() {
            return Err(SelectionError::NoCandidates);
        }
        let prompt = build_prompt(title, description, candidates);
        let response = self
            .model
            .generate(vec![Part::Text(prompt)])
            .await
            .map_err(|err| SelectionError::Model(err.to_string()))?;
        let pick = parse_pick(&response.text)?;
        let index = pick
            .number
            .checked_sub(1)
            .and_then(|idx| usize::try_from(idx).ok())
            .filter(|idx| *idx < candidates.len())
            .ok_or(SelectionError::OutOfRange {
                number: pick.number,
                len: candidates.len(),
            })?;
        Ok(CategorySelection {
            category: candidates[index].clone(),
            confidence: pick.confidence,
            reasoning: pick.reasoning,
            error: None,
        })
    }
}

fn has_token(haystack: &str, token: &str) -> bool {
    haystack
        .split(|ch: char| !ch.is_alphanumeric())
        .any(|word| word == token)
}

pub fn build_prompt(title: &str, description: &str, candidates: &[String]) -> String {
    let numbered = candidates
        .iter()
        .enumerate()
        .map(|(idx, category)| format!("{}. {}", idx + 1, category))
        .collect::<Vec<_>>()
        .join("\n");
    let description_line = if description.trim().is_empty() {
        String::new()
    } else {
        let clipped: String = description.chars().take(DESCRIPTION_PROMPT_LIMIT).collect();
        format!("Description: \"{}\"\n", clipped.trim())
    };
    format!(
        r#"You categorise marketplace listings.

RULES:
1. The start of the title names the main product; weigh it first.
2. Never choose a category from a secondary detail alone (material, colour, style).
3. Choose the single MOST SPECIFIC category that fits the main product.

PRODUCT:
Title: "{title}"
{description_line}
CANDIDATE CATEGORIES (all are final, specific categories):
{numbered}

Answer with JSON only, exactly:
{{"number": <1-{count}>, "confidence": "high|medium|low", "reasoning": "short explanation"}}"#,
        count = candidates.len(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPick {
    pub number: i64,
    pub confidence: Confidence,
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawPick {
    number: Option<RawNumber>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    fn as_int(&self) -> Option<i64> {
        match self {
            RawNumber::Int(value) => Some(*value),
            RawNumber::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            RawNumber::Float(_) => None,
            RawNumber::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Reads the model's `{number, confidence, reasoning}` answer, tolerating a
/// Markdown fence or prose around the JSON object.
pub fn parse_pick(text: &str) -> Result<CategoryPick, SelectionError> {
    let cleaned = strip_markdown_fence(text);
    let raw: RawPick = serde_json::from_str(&cleaned)
        .or_else(|first_err| {
            embedded_object(&cleaned)
                .ok_or(first_err)
                .and_then(serde_json::from_str)
        })
        .map_err(|err| SelectionError::Parse(err.to_string()))?;
    let number = raw
        .number
        .as_ref()
        .ok_or_else(|| SelectionError::Parse("missing `number`".into()))?
        .as_int()
        .ok_or_else(|| SelectionError::Parse("`number` is not an integer".into()))?;
    Ok(CategoryPick {
        number,
        confidence: raw
            .confidence
            .as_deref()
            .map(Confidence::from_label)
            .unwrap_or(Confidence::Medium),
        reasoning: raw
            .reasoning
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "selected by model".into()),
    })
}

pub(crate) fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body = Vec::new();
    for line in trimmed.lines().skip(1) {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}

fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, LlmResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        reply: Result<String, String>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, parts: Vec<Part>) -> Result<LlmResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(Part::Text(prompt)) = parts.first() {
                self.prompts.lock().expect("lock").push(prompt.clone());
            }
            match &self.reply {
                Ok(text) => Ok(LlmResponse {
                    text: text.clone(),
                    usage: None,
                }),
                Err(message) => Err(LlmError::Http(message.clone())),
            }
        }
    }

    fn catalog() -> Arc<CategoryCatalog> {
        Arc::new(
            CategoryCatalog::new(
                [
                    "Home & Living",
                    "Home & Living > Bathroom > Faucets",
                    "Home & Living > Kitchen > Faucets",
                    "Home & Living > Bathroom > Mirrors",
                    "Jewelry > Necklaces > Pendants",
                    "Jewelry > Bracelets > Cuffs",
                    "Craft Supplies > Digital > Clip Art",
                    "Paper & Party > Templates",
                ],
                " > ",
            )
            .expect("catalog"),
        )
    }

    fn selector(model: Arc<ScriptedModel>, limit: usize) -> CategorySelector {
        CategorySelector::new(catalog(), model, limit)
    }

    #[test]
    fn keyword_scores_rank_and_keep_catalog_order_on_ties() {
        let selector = selector(ScriptedModel::replying("{}"), 30);
        let candidates = selector.keyword_candidates("Black Bathroom Faucet");
        assert_eq!(
            candidates,
            vec![
                "Home & Living > Bathroom > Faucets".to_string(),
                "Home & Living > Kitchen > Faucets".to_string(),
                "Home & Living > Bathroom > Mirrors".to_string(),
            ]
        );
    }

    #[test]
    fn short_words_are_ignored_and_limit_applies() {
        let selector = selector(ScriptedModel::replying("{}"), 1);
        assert!(selector.keyword_candidates("a to of").is_empty());
        assert_eq!(selector.keyword_candidates("faucet").len(), 1);
    }

    #[test]
    fn heuristics_cover_unmatched_titles() {
        let selector = selector(ScriptedModel::replying("{}"), 30);
        assert_eq!(
            selector.candidates("Wedding SVG bundle"),
            vec![
                "Craft Supplies > Digital > Clip Art".to_string(),
                "Paper & Party > Templates".to_string(),
            ]
        );
        assert_eq!(
            selector.candidates("Printable planner"),
            vec!["Paper & Party > Templates".to_string()]
        );
        // "ai" only counts as a whole word
        assert_eq!(
            selector.heuristic_candidates("Retro AI file"),
            selector.leaves_containing(&["digital", "template", "clip art", "graphic"])
        );
    }

    #[test]
    fn random_sample_is_bounded_and_from_leaves() {
        let catalog = Arc::new(CategoryCatalog::new(["Toys > Kites", "Toys > Yo-yos", "Books"], " > ").expect("catalog"));
        let selector = CategorySelector::new(catalog.clone(), ScriptedModel::replying("{}"), 2);
        let sample = selector.candidates("zzz qqq");
        assert_eq!(sample.len(), 2);
        assert!(sample.iter().all(|c| catalog.leaves().contains(c)));
    }

    #[tokio::test]
    async fn model_pick_is_resolved_by_number() {
        let model = ScriptedModel::replying(
            "```json\n{\"number\": 1, \"confidence\": \"high\", \"reasoning\": \"kitchen tap\"}\n```",
        );
        let selector = selector(model.clone(), 30);
        let selection = selector.select_category("Kitchen Faucet", "Pull-down sprayer").await;
        assert_eq!(selection.category, "Home & Living > Kitchen > Faucets");
        assert_eq!(selection.confidence, Confidence::High);
        assert!(selection.error.is_none());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        let prompts = model.prompts.lock().expect("lock");
        assert!(prompts[0].contains("1. Home & Living > Kitchen > Faucets"));
        assert!(prompts[0].contains("Description: \"Pull-down sprayer\""));
    }

    #[tokio::test]
    async fn unusable_answers_fall_back_to_top_candidate() {
        for reply in [
            "I think it's a faucet",
            "{\"confidence\": \"high\"}",
            "{\"number\": 9}",
            "{\"number\": 0}",
            "{\"number\": -9223372036854775808, \"confidence\": \"high\"}",
        ] {
            let selector = selector(ScriptedModel::replying(reply), 30);
            let selection = selector.select_category("Bathroom Faucet", "").await;
            assert_eq!(selection.category, "Home & Living > Bathroom > Faucets", "{reply}");
            assert_eq!(selection.confidence, Confidence::Low);
            assert!(selection.error.is_some());
        }
    }

    #[tokio::test]
    async fn model_errors_fall_back_too() {
        let selector = selector(ScriptedModel::failing("quota"), 30);
        let selection = selector.select_category("qqq zzz", "").await;
        assert!(!selection.category.is_empty());
        assert_eq!(selection.confidence, Confidence::Low);
    }

    #[test]
    fn pick_parsing_is_lenient() {
        let pick = parse_pick("Sure! {\"number\": \"3\", \"confidence\": \"MEDIUM\"} hope that helps")
            .expect("pick");
        assert_eq!(pick.number, 3);
        assert_eq!(pick.confidence, Confidence::Medium);
        assert_eq!(pick.reasoning, "selected by model");

        let pick = parse_pick("{\"number\": 4.0, \"confidence\": \"sure\"}").expect("pick");
        assert_eq!(pick.number, 4);
        assert_eq!(pick.confidence, Confidence::Medium);

        assert!(parse_pick("{\"number\": 1.5}").is_err());
    }
}
