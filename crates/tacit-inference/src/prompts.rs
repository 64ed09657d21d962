//! Prompt templates for knowledge enrichment.

/// System prompt shared by all enrichment calls.
pub const SYSTEM_PROMPT: &str = "You turn team chat conversations into concise knowledge base \
entries. Answer only with the requested output, no preamble.";

/// Prompt asking for a short summary of a conversation.
pub fn summary_prompt(title: &str, text: &str) -> String {
    format!(
        "Summarize the following conversation in 2-4 sentences. Focus on decisions, \
         answers and open questions.\n\nTitle: {}\n\nConversation:\n{}",
        title, text
    )
}

/// Prompt asking for action items as a JSON array.
pub fn action_items_prompt(text: &str) -> String {
    format!(
        "List the action items in the conversation below as a JSON array. Each element is \
         an object with \"description\" (string), \"assignee\" (string or null) and \
         \"due_date\" (string or null). Return [] when there are none.\n\n\
         Conversation:\n{}",
        text
    )
}
