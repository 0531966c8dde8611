//! Prompt templates for the reduction operations and one-shot helpers.
//!
//! The map prompts ask for output much shorter than their input and the
//! final-pass prompts cap the result at a fixed item/word limit; the
//! reducer's convergence leans on that.

/// Word cap for the terminal summarization pass.
pub const FINAL_SUMMARY_MAX_WORDS: usize = 200;

/// Item cap for highlight extraction.
pub const MAX_HIGHLIGHTS: usize = 5;

/// Map-phase summarization prompt for one chunk of source content.
pub fn summarize_chunk(content: &str) -> String {
    format!(
        r#"<|begin_of_text|>
<|start_header_id|>system<|end_header_id|>
Use the context below and answer the user question. Use only relevant context information.<|eot_id|>
<|start_header_id|>user<|end_header_id|>
Context: {content}

User question: Summarize the following content without omitting any important details. The summary should not be more than {FINAL_SUMMARY_MAX_WORDS} words. In addition to the headings below, carefully review the content and identify any other important details. Create appropriate headings for these details. Reference speaker or author name if available. Return the summary in markdown and do not use # or ## for headings. Title can be in ###.

Possible headings (include only if relevant information is found in the content):
- Key Findings
- Action Items
- Issues Discussed
- Deadlines
- Timelines
- Potential solutions, if any and their limitations

{content}<|eot_id|>
<|start_header_id|>assistant<|end_header_id|>"#
    )
}

/// Terminal summarization prompt. The input may already be a concatenation of
/// partial summaries; the model is told to merge, not append.
pub fn summarize_final(content: &str) -> String {
    format!(
        r#"<|begin_of_text|>
<|start_header_id|>system<|end_header_id|>
You are an advanced summarization model.
Your task is to analyze the content and summarize without omitting any important details. The content may already consist of several partial summaries; combine them into one coherent summary. The summary should not be more than {FINAL_SUMMARY_MAX_WORDS} words and must be returned in markdown.

Formatting rules:
- Never use # or ## for headings
- Only use ### or #### for headings
- Format example: ### Section Title
- All headings must start with ### or ####
<|eot_id|>
<|start_header_id|>user<|end_header_id|>
{content}<|eot_id|>
<|start_header_id|>assistant<|end_header_id|>"#
    )
}

/// Highlight-extraction prompt. `combined` marks the terminal pass, where the
/// input may already contain extracted highlights that must be narrowed back
/// down to the item cap.
pub fn highlights(content: &str, combined: bool) -> String {
    let combined_clause = if combined {
        format!(
            "- If the transcript already contains highlights, you are combining \
             highlights: there may be more than {MAX_HIGHLIGHTS}, so keep only \
             the most important {MAX_HIGHLIGHTS}.\n"
        )
    } else {
        String::new()
    };
    format!(
        r######"You are an advanced AI assistant tasked with extracting only the most significant highlights from a transcript, focusing on impactful technical decisions, architectural changes, or critical business impacts.

Key Criteria for a Significant Highlight:
- Must involve a technical decision that affects the system architecture
- Changes that impact multiple services or teams
- Business decisions with measurable impact
- Major process changes or workflow updates
- Breaking changes or backward-incompatible updates
- Security or performance-related decisions

Avoid including:
- General discussions without concrete decisions
- Questions or clarifications
- Minor updates or routine changes
- Individual opinions without team consensus
- Process explanations without decisions
- Debug or troubleshooting discussions

Format Requirements:
- Start with "### Highlights"
- Each highlight must:
  - Begin with "#####" for the title
  - Include timestamp on the next line (e.g., MM:SS - MM:SS)
  - Provide a concise description focusing on the decision and its impact
- Separate each highlight with one blank line
- Return a MAXIMUM of {MAX_HIGHLIGHTS} highlights, only if they meet the significance criteria
{combined_clause}
Analyze the transcript and extract the most significant highlights:
```
{content}
```"######
    )
}

/// Generic-instruction prompt: apply a caller-supplied instruction to one
/// chunk of content.
pub fn instruction(instruction: &str, content: &str) -> String {
    format!(
        r#"You are an advanced AI assistant. Your task is to analyze the content based on the provided instruction.

### Instruction:
{instruction}

### Content:
```
{content}
```"#
    )
}

/// History-aware general question prompt (no retrieval grounding).
pub fn general_question(question: &str, history: &str) -> String {
    let history_block = if history.is_empty() {
        String::new()
    } else {
        format!("### Previous Conversation:\n{history}\n\n")
    };
    format!(
        r#"<|begin_of_text|>
<|start_header_id|>system<|end_header_id|>
You are an AI assistant. Your task is to answer the user's question in a concise and direct manner, taking into account the conversation history.<|eot_id|>
<|start_header_id|>user<|end_header_id|>
{history_block}User question: {question}

### Important Instructions:
- Prioritize finding an answer from the provided context.
- If using information from other tabs, cite the source URL.
- If the question cannot be answered from the context, say: "The answer is not available from the provided context, but based on general knowledge, here is the answer"
- When providing a timestamp or time reference, format it as "X minutes and Y seconds".
- Only include speaker name or timestamp if explicitly asked.
- Do not repeat information from previous answers. Focus on providing new information.
- Return the response in markdown format.
- Do not use H1 or H2 headings. Use H3 or smaller for headings.
- When citing content from other tabs, use the format: [Source: URL]
- Fix grammatical errors and transcription mistakes silently - do not explain the corrections.
- Keep responses clear, concise, and free of contradictions.
- Focus on accurately conveying what was actually said, even if it means stating "No" or "This wasn't mentioned".
- For technical terms, ensure correct spelling and capitalization.
<|eot_id|>
<|start_header_id|>assistant<|end_header_id|>"#
    )
}

/// Ten-word conversation title from the opening exchange.
pub fn chat_title(user_message: &str, ai_response: &str) -> String {
    format!(
        r#"<|begin_of_text|>
<|start_header_id|>system<|end_header_id|>
You are an AI assistant. Your task is to generate a very short title (max 10 words) for a chat conversation, summarizing the main topic.<|eot_id|>
<|start_header_id|>user<|end_header_id|>
User message: {user_message}
AI response: {ai_response}

### Important Instructions:
- Return only the title, without any extra text or markdown.
- The title should be very concise and capture the essence of the conversation.
<|eot_id|>
<|start_header_id|>assistant<|end_header_id|>"#
    )
}

/// Fallback title when the model call fails: the truncated user message.
pub fn fallback_title(user_message: &str) -> String {
    let truncated: String = user_message.chars().take(30).collect();
    if user_message.chars().count() > 30 {
        format!("{truncated}...")
    } else {
        truncated
    }
}
