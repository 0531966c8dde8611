//! Recursive multi-pass map-reduce over split chunks.
//!
//! Each pass splits the working text, runs one completion call per chunk in
//! batches of at most [`MAX_CONCURRENT_CALLS`], joins the outputs, and either
//! finishes with a terminal final-prompt call or feeds the joined output into
//! the next pass. A pass guard bounds pathological input that never shrinks.

use anyhow::{bail, Result};
use shared::error::CompletionClient;
use shared::settings::ChunkingSettings;
use tracing::debug;

use crate::prompts;
use crate::splitter::split_text;

/// Upper bound on completion calls in flight within one batch. Batches run
/// strictly sequentially relative to each other.
pub const MAX_CONCURRENT_CALLS: usize = 3;

/// Hard cap on reduction passes over one task.
pub const MAX_REDUCTION_PASSES: usize = 8;

/// The user-facing long-document operations.
#[derive(Debug, Clone)]
pub enum Operation {
    Summarize,
    Highlights,
    Instruction { instruction: String },
}

impl Operation {
    /// Prompt for one chunk during the fan-out phase.
    fn map_prompt(&self, chunk: &str) -> String {
        match self {
            Operation::Summarize => prompts::summarize_chunk(chunk),
            Operation::Highlights => prompts::highlights(chunk, false),
            Operation::Instruction { instruction } => prompts::instruction(instruction, chunk),
        }
    }

    /// Terminal prompt. The input may be a concatenation of partial results,
    /// so this variant instructs the model to merge and re-cap its output.
    fn final_prompt(&self, text: &str) -> String {
        match self {
            Operation::Summarize => prompts::summarize_final(text),
            Operation::Highlights => prompts::highlights(text, true),
            Operation::Instruction { instruction } => prompts::instruction(instruction, text),
        }
    }
}

/// One long-document reduction invocation.
#[derive(Debug, Clone)]
pub struct ReductionTask {
    pub source: String,
    pub operation: Operation,
    pub max_output_tokens: u32,
    pub policy: ChunkingSettings,
}

/// Reduce `task.source` to a single result that fits the chunk-size bound.
///
/// Any individual completion failure aborts the whole call; there is no
/// partial-result recovery here, and retry policy belongs to the client
/// implementation.
pub async fn reduce(client: &dyn CompletionClient, task: &ReductionTask) -> Result<String> {
    let mut text = task.source.clone();

    for pass in 0..MAX_REDUCTION_PASSES {
        let chunks = split_text(&text, &task.policy);

        if chunks.len() == 1 {
            let prompt = task.operation.final_prompt(&chunks[0]);
            return Ok(client.complete(&prompt, task.max_output_tokens).await?);
        }

        debug!(pass, chunks = chunks.len(), "reduction fan-out");
        let mut outputs: Vec<String> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(MAX_CONCURRENT_CALLS) {
            // Issue every call in the batch before awaiting any of them; the
            // next batch does not start until this one has fully settled.
            let prompts: Vec<String> = batch
                .iter()
                .map(|chunk| task.operation.map_prompt(chunk))
                .collect();
            let calls = prompts
                .iter()
                .map(|prompt| client.complete(prompt, task.max_output_tokens));
            let results = futures::future::try_join_all(calls).await?;
            outputs.extend(results);
        }

        let combined = outputs.join("\n");
        if combined.chars().count() <= task.policy.chunk_size {
            let prompt = task.operation.final_prompt(&combined);
            return Ok(client.complete(&prompt, task.max_output_tokens).await?);
        }

        text = combined;
    }

    bail!(
        "reduction did not converge after {} passes; output is not shrinking",
        MAX_REDUCTION_PASSES
    )
}
