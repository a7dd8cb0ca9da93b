//! Maps a free-text description onto the caller's category taxonomy.

use tracing::{debug, warn};

use crate::classifier::{Classifier, Prompt};
use crate::models::TransactionKind;

fn categorize_prompt(
    description: &str,
    kind: TransactionKind,
    categories: &[String],
    max_tokens: u32,
) -> Prompt {
    Prompt::new(
        format!(
            "Categorize the {kind} description into one of these categories: {}. \
             Return only the category name.",
            categories.join(", ")
        ),
        format!("Categorize this {kind}: \"{description}\""),
    )
    .max_tokens(max_tokens)
}

/// Picks a category name for `description`.
///
/// A non-empty `explicit` choice is returned untouched. Otherwise the
/// classifier is asked once; any failure, including an empty answer, lands
/// on the kind's fallback category. This never fails.
pub async fn resolve_category(
    classifier: &dyn Classifier,
    description: &str,
    kind: TransactionKind,
    explicit: Option<&str>,
    categories: &[String],
    max_tokens: u32,
) -> String {
    if let Some(explicit) = explicit.filter(|name| !name.trim().is_empty()) {
        return explicit.to_string();
    }

    let prompt = categorize_prompt(description, kind, categories, max_tokens);
    match classifier.complete(&prompt).await {
        Ok(answer) if !answer.trim().is_empty() => {
            let category = answer.trim().to_string();
            debug!(%kind, %category, "classified description");
            category
        }
        Ok(_) => {
            warn!(%kind, "classifier returned an empty category, using fallback");
            kind.fallback_category().to_string()
        }
        Err(err) => {
            warn!(%kind, error = %err, "categorization failed, using fallback");
            kind.fallback_category().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::ScriptedClassifier;

    fn taxonomy() -> Vec<String> {
        vec!["Food & Dining".to_string(), "Travel".to_string(), "Other".to_string()]
    }

    #[rocket::async_test]
    async fn explicit_category_skips_classification() {
        let classifier = ScriptedClassifier::answering("Travel");
        let category = resolve_category(
            &classifier,
            "Train to Berlin",
            TransactionKind::Expense,
            Some("Pets"),
            &taxonomy(),
            20,
        )
        .await;
        assert_eq!(category, "Pets");
        assert_eq!(classifier.calls(), 0);
    }

    #[rocket::async_test]
    async fn blank_explicit_category_is_ignored() {
        let classifier = ScriptedClassifier::answering("  Travel\n");
        let category = resolve_category(
            &classifier,
            "Train to Berlin",
            TransactionKind::Expense,
            Some("  "),
            &taxonomy(),
            20,
        )
        .await;
        assert_eq!(category, "Travel");
        assert_eq!(classifier.calls(), 1);
    }

    async fn classify(
        classifier: &ScriptedClassifier,
        description: &str,
        kind: TransactionKind,
        categories: &[String],
    ) -> String {
        resolve_category(classifier, description, kind, None, categories, 20).await
    }

    #[rocket::async_test]
    async fn prompt_lists_the_taxonomy() {
        let classifier = ScriptedClassifier::answering("Food & Dining");
        classify(&classifier, "Pizza", TransactionKind::Expense, &taxonomy()).await;
        let prompt = classifier.last_prompt().unwrap();
        assert!(prompt.system.contains("Food & Dining, Travel, Other"));
        assert_eq!(prompt.user, "Categorize this expense: \"Pizza\"");
        assert_eq!(prompt.max_tokens, Some(20));
    }

    #[rocket::async_test]
    async fn classifier_answer_is_used_verbatim() {
        let classifier = ScriptedClassifier::answering("Space Travel");
        let category =
            classify(&classifier, "Moon trip", TransactionKind::Expense, &taxonomy()).await;
        assert_eq!(category, "Space Travel");
    }

    #[rocket::async_test]
    async fn failures_fall_back_per_kind() {
        let classifier = ScriptedClassifier::failing();
        let expense = classify(&classifier, "Pizza", TransactionKind::Expense, &taxonomy()).await;
        assert_eq!(expense, "Other");

        let classifier = ScriptedClassifier::failing();
        let income = classify(&classifier, "Payday", TransactionKind::Income, &[]).await;
        assert_eq!(income, "Other Income");
        assert_eq!(classifier.calls(), 1);
    }

    #[rocket::async_test]
    async fn empty_answers_fall_back() {
        let classifier = ScriptedClassifier::answering("   ");
        let category = classify(&classifier, "???", TransactionKind::Income, &taxonomy()).await;
        assert_eq!(category, "Other Income");
    }
}
