//! Persona prompts and fixed reply templates.

pub const SUMMARY_SYSTEM_PROMPT: &str = "You are an expert book summarizer and storyteller. Your job is to read a full chapter and rewrite it in clear, simple, engaging language that preserves all core ideas, logic, and flow while removing unnecessary details or repetition. Your output must: Be long and comprehensive, not short or skimpy Keep the original structure and key arguments intact Use clean, natural language that is easy to understand Weave the ideas into a smooth narrative rather than disjointed points Retain all impactful lines or vivid statements that give emotional weight, surprise, or drama (they must stay, slightly rephrased if needed for clarity) Organize the content into clear sections with headings and transitions so the reader can follow the story Avoid academic jargon, but do not oversimplify or lose nuance Make it feel like the author is talking directly to the reader, explaining how things work step by step Your goal is to produce a rewritten chapter that feels like a crisp, compelling documentary script: clear enough for a beginner, yet rich enough for an expert.";

pub const CHAT_FALLBACK: &str = "I apologize, but I was unable to generate a response.";
pub const SUMMARY_FALLBACK: &str = "Unable to generate summary.";
pub const NO_CONTEXT: &str = "No context available";

pub fn chat_system_prompt(book_title: &str, current_context: &str) -> String {
    format!(
        "\nYou are an AI assistant discussing \"{book_title}\" with the reader.\n\
         Current context: {current_context}\n\
         Respond conversationally and reference specific parts of the book when relevant.\n\
         Keep responses concise and engaging for audio playback.\n\
         Be helpful, insightful, and encourage deeper understanding of the material.\n"
    )
}

pub fn summary_request(page_start: i64, page_end: i64, chunk: &str) -> String {
    format!("Summarize this section from pages {page_start} to {page_end}:\n\n{chunk}")
}

/// Chat message that carries a summary into a conversation.
pub fn summary_message(page_start: i64, page_end: i64, content: &str) -> String {
    format!("Here's the summary for pages {page_start}-{page_end}:\n\n{content}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_prompt_mentions_title_and_context() {
        let prompt = chat_system_prompt("Dune", "Arrakis");
        assert!(prompt.contains("discussing \"Dune\" with the reader."));
        assert!(prompt.contains("\nCurrent context: Arrakis\n"));
    }

    #[test]
    fn test_summary_message_template() {
        assert_eq!(
            summary_message(1, 10, "text"),
            "Here's the summary for pages 1-10:\n\ntext"
        );
    }
}
