use std::sync::Arc;

use async_trait::async_trait;
use ragbench_cache::{Cache, CacheKey, Namespace};
use tracing::debug;

use crate::{
    error::RagResult,
    generation::{Completion, Generator},
    passage::Passage,
};

const PROMPT_KIND: &str = "instruction_v3";
const MAX_TOKENS: usize = 500;
const CHAT_TEMPLATE_TOKENS: &[&str] = &["<s>", "</s>", "[INST]", "[/INST]"];

/// Fixed reply the model is told to give when the documents lack an answer.
pub const NO_ANSWER: &str = "Nie udało mi się odnaleźć odpowiedzi na pytanie";

/// Answers strictly from the retrieved passages with a short Polish reply.
/// Answers are cached per (query, context, prompt kind, model).
pub struct InstructionGenerator {
    model: Arc<dyn Completion>,
    cache: Arc<Cache>,
}

impl InstructionGenerator {
    pub fn new(model: Arc<dyn Completion>, cache: Arc<Cache>) -> Self {
        Self { model, cache }
    }

    pub fn prompt(query: &str, context: &str) -> String {
        format!(
            "Odpowiedz na pytanie użytkownika wykorzystując wyłącznie informacje z dostarczonych \
             dokumentów. Udziel krótkiej, precyzyjnej odpowiedzi w języku polskim bez dodatkowych \
             komentarzy. Jeżeli w dokumentach nie ma informacji potrzebnych do odpowiedzi, napisz \
             tylko: \"{NO_ANSWER}\".\n\n\
             ### Dokumenty:\n{context}\n\n\
             ### Pytanie:\n{query}\n\n\
             ### Odpowiedź (tylko sama odpowiedź bez wyjaśnień):"
        )
    }

    fn cache_key(&self, query: &str, context: &str) -> String {
        CacheKey::new(Namespace::Generator)
            .field("query", query)
            .field("context", context)
            .field("prompt", PROMPT_KIND)
            .field("model", self.model.model_name())
            .build()
    }

    async fn generate_single_answer(&self, query: &str, context: &str) -> RagResult<String> {
        let raw = self
            .model
            .complete(&Self::prompt(query, context), MAX_TOKENS)
            .await?;
        let stripped = CHAT_TEMPLATE_TOKENS
            .iter()
            .fold(raw, |text, token| text.replace(token, ""));
        Ok(clean_text(stripped.trim()))
    }
}

#[async_trait]
impl Generator for InstructionGenerator {
    async fn generate_answer(&self, query: &str, passages: &[Passage]) -> RagResult<String> {
        let context = passages
            .iter()
            .map(|passage| passage.context.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .replace('\n', " ");

        let key = self.cache_key(query, &context);
        if let Some(answer) = self.cache.get::<String>(&key).await? {
            return Ok(answer);
        }

        let answer = self.generate_single_answer(query, &context).await?;
        debug!(model = self.model.model_name(), passages = passages.len(), "Generated answer");
        self.cache.set(&key, &answer).await?;
        Ok(answer)
    }
}

/// Lowercase and drop ASCII punctuation.
pub fn clean_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    struct ScriptedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Completion for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: &str, max_tokens: usize) -> RagResult<String> {
            assert_eq!(max_tokens, MAX_TOKENS);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn model(reply: &str) -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn clean_text_strips_punctuation() {
        assert_eq!(clean_text("Warszawa, Kraków!"), "warszawa kraków");
        assert_eq!(clean_text("Łódź (1423)."), "łódź 1423");
    }

    #[tokio::test]
    async fn strips_template_tokens_and_caches() {
        let model = model("<s>[INST] Warszawa. [/INST]</s>");
        let generator = InstructionGenerator::new(model.clone(), Arc::new(Cache::in_memory()));
        let passages = vec![
            Passage::new("1", "", "Stolicą Polski\njest Warszawa.", 0, "d", "k"),
            Passage::new("2", "", "Kraków był stolicą.", 0, "d", "k"),
        ];

        let answer = generator
            .generate_answer("Jaka jest stolica Polski?", &passages)
            .await
            .unwrap();
        assert_eq!(answer, "warszawa");

        let again = generator
            .generate_answer("Jaka jest stolica Polski?", &passages)
            .await
            .unwrap();
        assert_eq!(again, answer);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        let prompt = model.prompts.lock()[0].clone();
        assert!(prompt.contains("Stolicą Polski jest Warszawa. Kraków był stolicą."));
        assert!(prompt.contains("### Pytanie:\nJaka jest stolica Polski?"));
        assert!(prompt.contains(NO_ANSWER));
    }
}
