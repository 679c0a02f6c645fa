use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;

use crate::{
    db::Ledger,
    error::{AppError, AppResult},
    models::{
        EntityKind, FeedbackHistoryEntry, RecommendationRecord, SimilarityCandidate,
        SourceItemMetadata,
    },
    services::providers::LanguageModel,
};

/// Produces and persists new recommendation records for one request
///
/// Two strategies: a model-assisted path when a language model capability is
/// configured, and a deterministic fallback ranker over the supplied
/// similarity candidates when it is not. Model absence is a normal
/// configuration state, not an error.
pub struct Synthesizer {
    ledger: Arc<dyn Ledger>,
    model: Option<Arc<dyn LanguageModel>>,
}

/// One suggestion as emitted by the model
///
/// Fields are lenient at the serde level; per-entry validation decides what
/// gets kept. The array shape itself is strict.
#[derive(Debug, Deserialize)]
struct ModelSuggestion {
    #[serde(default)]
    name: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: f64,
}

impl Synthesizer {
    pub fn new(ledger: Arc<dyn Ledger>, model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { ledger, model }
    }

    /// Generates up to `amount` new recommendations anchored at the source
    /// item, excluding anything the user has already judged, persists them
    /// and returns the batch
    ///
    /// Zero eligible candidates is a valid outcome: the batch is simply
    /// empty and nothing is written.
    #[instrument(skip_all, fields(user_id = %user_id, source = %source.id, amount = amount))]
    pub async fn generate(
        &self,
        user_id: &str,
        source: &SourceItemMetadata,
        similar_artists: &[SimilarityCandidate],
        similar_recordings: &[SimilarityCandidate],
        similar_release_groups: &[SimilarityCandidate],
        amount: i64,
    ) -> AppResult<Vec<RecommendationRecord>> {
        if user_id.trim().is_empty() {
            return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
        }
        if source.id.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "source item metadata is missing an id".to_string(),
            ));
        }
        if amount <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".to_string()));
        }
        let amount = amount as usize;

        let history = self.ledger.feedback_history(user_id).await?;
        let excluded: HashSet<&str> = history
            .iter()
            .map(|entry| entry.recommended_item.as_str())
            .collect();

        let candidates = [
            (EntityKind::Artist, similar_artists),
            (EntityKind::Recording, similar_recordings),
            (EntityKind::ReleaseGroup, similar_release_groups),
        ];

        let records = match &self.model {
            Some(model) => {
                let prompt = build_prompt(source, &candidates, &history);
                let raw = model.complete(&prompt).await?;
                let suggestions = parse_model_output(&raw)?;
                accept_suggestions(user_id, source, suggestions, &excluded, amount)
            }
            None => rank_fallback(user_id, source, &candidates, &excluded, amount),
        };

        self.ledger.insert_batch(&records).await?;
        tracing::info!(generated = records.len(), "Persisted recommendation batch");
        Ok(records)
    }
}

/// Renders the single generation prompt: source identity, genre/tag names,
/// every similarity candidate grouped by kind, and the user's judged history
/// as short exemplars
fn build_prompt(
    source: &SourceItemMetadata,
    candidates: &[(EntityKind, &[SimilarityCandidate]); 3],
    history: &[FeedbackHistoryEntry],
) -> String {
    let mut prompt = String::new();

    writeln!(
        prompt,
        "You recommend music related to one {} entity.",
        source.kind
    )
    .ok();
    write!(prompt, "Source: {} (id {})", source.display_name, source.id).ok();
    if let Some(disambiguation) = &source.disambiguation {
        write!(prompt, " [{disambiguation}]").ok();
    }
    prompt.push('\n');
    if let Some(description) = &source.description {
        writeln!(prompt, "Description: {description}").ok();
    }
    if !source.genres.is_empty() {
        let genres: Vec<&str> = source.genres.iter().map(|g| g.name.as_str()).collect();
        writeln!(prompt, "Genres: {}", genres.join(", ")).ok();
    }
    if !source.tags.is_empty() {
        let tags: Vec<&str> = source.tags.iter().map(|t| t.name.as_str()).collect();
        writeln!(prompt, "Tags: {}", tags.join(", ")).ok();
    }

    for (kind, list) in candidates {
        if list.is_empty() {
            continue;
        }
        writeln!(prompt, "\nSimilar {kind}s:").ok();
        for candidate in *list {
            writeln!(
                prompt,
                "- {} (id {}, similarity {})",
                candidate.display_name, candidate.id, candidate.score
            )
            .ok();
        }
    }

    if !history.is_empty() {
        writeln!(prompt, "\nThe user has already judged these items:").ok();
        for entry in history {
            writeln!(
                prompt,
                "- {} about item {}: {}",
                entry.feedback.as_str(),
                entry.recommended_item,
                entry.reasoning
            )
            .ok();
        }
        writeln!(prompt, "Never suggest a judged item again.").ok();
    }

    writeln!(
        prompt,
        "\nRespond with a JSON array of objects with keys \
         \"name\", \"id\", \"reasoning\" and \"confidence\" (0 to 1). \
         Only use ids from the similar lists above."
    )
    .ok();

    prompt
}

/// Parses the model completion into suggestions
///
/// Exactly two serializations are accepted: raw JSON text, or JSON inside a
/// markdown fenced block. Anything else is a hard parse failure with no
/// fallback substitution.
fn parse_model_output(raw: &str) -> AppResult<Vec<ModelSuggestion>> {
    let trimmed = raw.trim();

    let body = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let inner = rest.strip_suffix("```").ok_or_else(|| {
            AppError::GenerationParse("unterminated fenced code block".to_string())
        })?;
        inner.trim()
    } else {
        trimmed
    };

    serde_json::from_str::<Vec<ModelSuggestion>>(body).map_err(|e| {
        AppError::GenerationParse(format!("expected a JSON array of suggestions: {e}"))
    })
}

/// Walks model suggestions in order, dropping invalid entries silently and
/// stopping once `amount` have been accepted
fn accept_suggestions(
    user_id: &str,
    source: &SourceItemMetadata,
    suggestions: Vec<ModelSuggestion>,
    excluded: &HashSet<&str>,
    amount: usize,
) -> Vec<RecommendationRecord> {
    let mut records = Vec::new();

    for suggestion in suggestions {
        if records.len() >= amount {
            break;
        }
        if suggestion.id.is_empty()
            || suggestion.id == source.id
            || excluded.contains(suggestion.id.as_str())
        {
            tracing::debug!(id = %suggestion.id, "Dropped invalid model suggestion");
            continue;
        }
        records.push(RecommendationRecord::new(
            user_id,
            &source.id,
            &suggestion.id,
            &suggestion.name,
            &suggestion.reasoning,
            suggestion.confidence,
        ));
    }

    records
}

/// Deterministic ranker used when no model capability is configured
///
/// Flattens the candidate lists into one pool tagged by kind, removes the
/// source item and everything already judged, sorts by provider score
/// descending and accepts unique ids up to `amount`. Provider scores are on
/// a 0-100 scale.
fn rank_fallback(
    user_id: &str,
    source: &SourceItemMetadata,
    candidates: &[(EntityKind, &[SimilarityCandidate]); 3],
    excluded: &HashSet<&str>,
    amount: usize,
) -> Vec<RecommendationRecord> {
    let mut pool: Vec<(EntityKind, &SimilarityCandidate)> = candidates
        .iter()
        .flat_map(|(kind, list)| list.iter().map(move |candidate| (*kind, candidate)))
        .filter(|(_, c)| c.id != source.id && !excluded.contains(c.id.as_str()))
        .collect();

    pool.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen: HashSet<&str> = HashSet::new();
    let mut records = Vec::new();

    for (kind, candidate) in pool {
        if records.len() >= amount {
            break;
        }
        if !seen.insert(candidate.id.as_str()) {
            continue;
        }
        let reasoning = format!(
            "{} is a {} closely related to {}.",
            candidate.display_name, kind, source.display_name
        );
        records.push(RecommendationRecord::new(
            user_id,
            &source.id,
            &candidate.id,
            &candidate.display_name,
            &reasoning,
            candidate.score / 100.0,
        ));
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryLedger;
    use crate::models::Feedback;
    use crate::services::providers::MockLanguageModel;

    fn source() -> SourceItemMetadata {
        SourceItemMetadata {
            id: "src-1".to_string(),
            display_name: "The Source".to_string(),
            kind: EntityKind::Artist,
            disambiguation: None,
            description: None,
            genres: vec![],
            tags: vec![],
        }
    }

    fn candidate(id: &str, score: f64) -> SimilarityCandidate {
        SimilarityCandidate {
            id: id.to_string(),
            display_name: format!("Name of {id}"),
            score,
            shared_attributes: vec![],
        }
    }

    fn fallback_synthesizer() -> (Synthesizer, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        (Synthesizer::new(ledger.clone(), None), ledger)
    }

    #[tokio::test]
    async fn test_empty_user_id_is_invalid_input() {
        let (synth, ledger) = fallback_synthesizer();
        let result = synth
            .generate("  ", &source(), &[candidate("b", 90.0)], &[], &[], 2)
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        // No side effects
        assert!(ledger.find_incident("  ", "src-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_invalid_input() {
        let (synth, _) = fallback_synthesizer();
        let result = synth.generate("u1", &source(), &[], &[], &[], 0).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        let result = synth.generate("u1", &source(), &[], &[], &[], -3).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_missing_source_id_is_invalid_input() {
        let (synth, _) = fallback_synthesizer();
        let mut src = source();
        src.id = "".to_string();
        let result = synth.generate("u1", &src, &[], &[], &[], 2).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_fallback_ranks_by_score_and_scales_confidence() {
        let (synth, _) = fallback_synthesizer();
        let artists = vec![candidate("c", 70.0), candidate("b", 90.0)];
        let records = synth
            .generate("u1", &source(), &artists, &[], &[], 2)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].recommended_item, "b");
        assert_eq!(records[0].confidence, 0.9);
        assert_eq!(records[1].recommended_item, "c");
        assert_eq!(records[1].confidence, 0.7);
        assert!(records.iter().all(|r| r.feedback == Feedback::Unset));
        assert!(records[0].reasoning.contains("artist"));
    }

    #[tokio::test]
    async fn test_fallback_flattens_kinds_and_dedupes() {
        let (synth, _) = fallback_synthesizer();
        let artists = vec![candidate("b", 50.0)];
        let recordings = vec![candidate("b", 80.0), candidate("c", 60.0)];
        let records = synth
            .generate("u1", &source(), &artists, &recordings, &[], 5)
            .await
            .unwrap();

        // "b" appears once, at its higher recording score
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].recommended_item, "b");
        assert_eq!(records[0].confidence, 0.8);
        assert!(records[0].reasoning.contains("recording"));
        assert_eq!(records[1].recommended_item, "c");
    }

    #[tokio::test]
    async fn test_fallback_excludes_source_and_judged_items() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_batch(&[RecommendationRecord::new(
                "u1", "other", "judged", "Judged", "r", 0.5,
            )])
            .await
            .unwrap();
        ledger
            .update_feedback("u1", "judged", Feedback::Negative)
            .await
            .unwrap();

        let synth = Synthesizer::new(ledger, None);
        let artists = vec![
            candidate("src-1", 99.0),
            candidate("judged", 95.0),
            candidate("ok", 40.0),
        ];
        let records = synth
            .generate("u1", &source(), &artists, &[], &[], 5)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].recommended_item, "ok");
    }

    #[tokio::test]
    async fn test_fallback_with_no_candidates_is_empty_not_error() {
        let (synth, _) = fallback_synthesizer();
        let records = synth
            .generate("u1", &source(), &[], &[], &[], 3)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_accepts_raw_json() {
        let raw = r#"[{"name": "A", "id": "x", "reasoning": "because", "confidence": 0.8}]"#;
        let suggestions = parse_model_output(raw).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].id, "x");
    }

    #[test]
    fn test_parse_accepts_fenced_json() {
        let raw = "```json\n[{\"name\": \"A\", \"id\": \"x\", \"reasoning\": \"r\", \"confidence\": 0.8}]\n```";
        let suggestions = parse_model_output(raw).unwrap();
        assert_eq!(suggestions.len(), 1);

        // Bare fence without a language tag works too
        let raw = "```\n[]\n```";
        assert!(parse_model_output(raw).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_everything_else() {
        assert!(matches!(
            parse_model_output("here are your recommendations!"),
            Err(AppError::GenerationParse(_))
        ));
        assert!(matches!(
            parse_model_output("{\"name\": \"not an array\"}"),
            Err(AppError::GenerationParse(_))
        ));
        assert!(matches!(
            parse_model_output("```json\n[]"),
            Err(AppError::GenerationParse(_))
        ));
    }

    #[tokio::test]
    async fn test_model_path_drops_invalid_entries_and_caps_amount() {
        let mut model = MockLanguageModel::new();
        model.expect_complete().times(1).returning(|_| {
            Ok(r#"[
                {"name": "Self", "id": "src-1", "reasoning": "self edge", "confidence": 0.9},
                {"name": "NoId", "reasoning": "missing id", "confidence": 0.9},
                {"name": "B", "id": "b", "reasoning": "good", "confidence": 1.7},
                {"name": "C", "id": "c", "reasoning": "good", "confidence": 0.4},
                {"name": "D", "id": "d", "reasoning": "past the cap", "confidence": 0.9}
            ]"#
            .to_string())
        });

        let ledger = Arc::new(MemoryLedger::new());
        let synth = Synthesizer::new(ledger.clone(), Some(Arc::new(model)));
        let records = synth
            .generate("u1", &source(), &[], &[], &[], 2)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].recommended_item, "b");
        // Out-of-range confidence is clamped before persisting
        assert_eq!(records[0].confidence, 1.0);
        assert_eq!(records[1].recommended_item, "c");

        // Batch was persisted
        assert_eq!(ledger.find_incident("u1", "src-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_model_path_excludes_judged_items() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_batch(&[RecommendationRecord::new(
                "u1", "other", "liked", "Liked", "r", 0.5,
            )])
            .await
            .unwrap();
        ledger
            .update_feedback("u1", "liked", Feedback::Positive)
            .await
            .unwrap();

        let mut model = MockLanguageModel::new();
        model.expect_complete().times(1).returning(|_| {
            Ok(r#"[
                {"name": "Liked", "id": "liked", "reasoning": "r", "confidence": 0.9},
                {"name": "B", "id": "b", "reasoning": "r", "confidence": 0.5}
            ]"#
            .to_string())
        });

        let synth = Synthesizer::new(ledger, Some(Arc::new(model)));
        let records = synth
            .generate("u1", &source(), &[], &[], &[], 5)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].recommended_item, "b");
    }

    #[tokio::test]
    async fn test_parse_failure_persists_nothing_and_skips_fallback() {
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .times(1)
            .returning(|_| Ok("sorry, I cannot help with that".to_string()));

        let ledger = Arc::new(MemoryLedger::new());
        let synth = Synthesizer::new(ledger.clone(), Some(Arc::new(model)));
        let result = synth
            .generate("u1", &source(), &[candidate("b", 90.0)], &[], &[], 2)
            .await;

        assert!(matches!(result, Err(AppError::GenerationParse(_))));
        assert!(ledger.find_incident("u1", "src-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_contains_candidates_and_history() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_batch(&[RecommendationRecord::new(
                "u1", "src-1", "old", "Old", "was close", 0.5,
            )])
            .await
            .unwrap();
        ledger
            .update_feedback("u1", "old", Feedback::Negative)
            .await
            .unwrap();

        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .withf(|prompt: &str| {
                prompt.contains("The Source")
                    && prompt.contains("Name of b")
                    && prompt.contains("negative about item old")
            })
            .times(1)
            .returning(|_| Ok("[]".to_string()));

        let synth = Synthesizer::new(ledger, Some(Arc::new(model)));
        let records = synth
            .generate("u1", &source(), &[candidate("b", 90.0)], &[], &[], 2)
            .await
            .unwrap();
        assert!(records.is_empty());
    }
}
