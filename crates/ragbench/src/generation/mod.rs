//! Answer generation from retrieved passages.

use async_trait::async_trait;

use crate::{error::RagResult, passage::Passage};

pub use self::{
    completion::{Completion, HttpCompletion},
    extractive::{
        word_windows, AnswerSpan, ExtractiveGenerator, HttpSpanExtractor, SpanExtractor,
        QUESTION_ANSWERING_KIND,
    },
    instruction::{clean_text, InstructionGenerator, NO_ANSWER},
};

mod completion;
mod extractive;
mod instruction;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate_answer(&self, query: &str, passages: &[Passage]) -> RagResult<String>;
}
