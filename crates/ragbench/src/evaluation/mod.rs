//! Ranking, answer and composite RAG quality metrics.

pub use self::{
    qa::QaEvaluator,
    ragas::{RagasEvaluator, RagasScore},
    retrieval::RetrievalEvaluator,
    run::{EvaluationInput, EvaluationReport, EvaluationRun, QueryEvaluation},
};

mod qa;
mod ragas;
mod retrieval;
mod run;
