//! Instructions and message templates for the document-LLM workflow.
//!
//! Kept in one place so the wording can be inspected by unit tests without
//! calling a model.

/// Base instruction for query and run-prompt usages.
pub const DEFAULT_INSTRUCTION: &str =
    "You are a helpful bot answering the user with their question to the best of your ability.";

/// Base instruction for the run-functions usage.
pub const FUNCTIONS_INSTRUCTION: &str = "You are a helpful bot answering the user with their question to the best of your ability using the provided functions.";

/// Separator placed between per-chunk answers when they are joined.
pub const ANSWER_SEPARATOR: &str = "\n\n";

/// Instruction for answering a query from one chunk of a document.
pub fn query_instruction() -> String {
    format!(
        "{DEFAULT_INSTRUCTION}\nAnswer using only the document excerpt provided by the user. \
         If the excerpt does not contain the answer, say so briefly."
    )
}

/// User message carrying a query and the excerpt to answer it from.
pub fn query_message(query: &str, chunk: &str) -> String {
    format!("Document excerpt:\n\"\"\"{chunk}\"\"\"\n\nQuestion: {query}")
}

/// User message asking the model to merge partial answers into one.
pub fn combine_message(query: &str, partial_answers: &[String]) -> String {
    let mut s = format!(
        "The question \"{query}\" was answered separately from each part of a document. \
         Combine the partial answers below into one complete answer. \
         Drop parts that say the excerpt did not contain the answer.\n"
    );
    for (i, answer) in partial_answers.iter().enumerate() {
        s.push_str(&format!("\nPartial answer {}:\n{}\n", i + 1, answer));
    }
    s
}

/// Instruction for running a user prompt on a chunk.
pub fn prompt_instruction(prompt: &str) -> String {
    format!("{DEFAULT_INSTRUCTION}\n{prompt}")
}

/// Instruction for the run-functions usage, embedding the function schemas.
///
/// The model must reply with exactly one JSON object
/// `{"name": ..., "arguments": {...}}`.
pub fn functions_instruction(functions_json: &str) -> String {
    format!(
        "{FUNCTIONS_INSTRUCTION}\n\nAvailable functions (JSON schema):\n{functions_json}\n\n\
         Reply with exactly one JSON object of the form \
         {{\"name\": <function name>, \"arguments\": {{...}}}} and nothing else."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_share_the_base_sentence() {
        assert!(FUNCTIONS_INSTRUCTION.starts_with(&DEFAULT_INSTRUCTION[..DEFAULT_INSTRUCTION.len() - 1]));
        assert!(query_instruction().starts_with(DEFAULT_INSTRUCTION));
        assert_eq!(
            prompt_instruction("Summarise."),
            format!("{DEFAULT_INSTRUCTION}\nSummarise.")
        );
    }

    #[test]
    fn combine_lists_every_partial_answer() {
        let msg = combine_message("who?", &["Alice".into(), "Bob".into()]);
        assert!(msg.contains("Partial answer 1:\nAlice"));
        assert!(msg.contains("Partial answer 2:\nBob"));
        assert!(msg.contains("\"who?\""));
    }

    #[test]
    fn functions_instruction_embeds_schema() {
        let s = functions_instruction(r#"[{"name":"extract"}]"#);
        assert!(s.contains(r#"[{"name":"extract"}]"#));
        assert!(s.contains("\"arguments\""));
    }
}
