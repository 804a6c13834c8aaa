//! Prompt rendering

use super::types::{MessageRole, PromptHistory};

/// Renders a system prompt plus conversation into the model's input text
pub trait PromptFormatter: Send + Sync {
    fn format(&self, system_prompt: &str, history: &PromptHistory) -> String;
}

/// ChatML, as used by the Qwen2 family
#[derive(Debug, Default, Clone, Copy)]
pub struct ChatMlFormatter;

impl ChatMlFormatter {
    fn push_turn(prompt: &mut String, role: &str, content: &str) {
        prompt.push_str("<|im_start|>");
        prompt.push_str(role);
        prompt.push('\n');
        prompt.push_str(content);
        prompt.push_str("<|im_end|>\n");
    }
}

impl PromptFormatter for ChatMlFormatter {
    fn format(&self, system_prompt: &str, history: &PromptHistory) -> String {
        let mut prompt = String::new();

        if !system_prompt.is_empty() {
            Self::push_turn(&mut prompt, "system", system_prompt);
        }

        for msg in history.messages() {
            let role = match msg.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            Self::push_turn(&mut prompt, role, &msg.content);
        }

        // Generation prompt
        prompt.push_str("<|im_start|>assistant\n");
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn test_chatml_layout() {
        let history = PromptHistory::new(vec![
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
            ChatMessage::user("Summarize this"),
        ]);

        let prompt = ChatMlFormatter.format("Be brief.", &history);
        assert_eq!(
            prompt,
            "<|im_start|>system\nBe brief.<|im_end|>\n\
             <|im_start|>user\nHi<|im_end|>\n\
             <|im_start|>assistant\nHello<|im_end|>\n\
             <|im_start|>user\nSummarize this<|im_end|>\n\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_empty_system_prompt_omitted() {
        let prompt = ChatMlFormatter.format("", &PromptHistory::single_user("x"));
        assert!(prompt.starts_with("<|im_start|>user\n"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }
}
