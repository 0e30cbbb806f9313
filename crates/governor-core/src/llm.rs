use crate::ContentBlock;

/// A completed (non-streaming view of a) model turn. The real interface is a
/// stream of `{text chunk | usage}` events; consumers collapse the stream to
/// this fully assembled result before handing it back.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: String,
    pub output_tokens: u64,
    pub total_cost: f64,
}

/// The LLM client boundary (out of scope — consumed only), mirroring
/// `ToolHost`'s "pin as a trait, implement nowhere in this crate" shape.
pub trait LlmClient {
    fn count_tokens(&self, blocks: &[ContentBlock]) -> u64;
    fn create_message(&self, system_prompt: &str, messages: &[crate::TranscriptMessage]) -> LlmResponse;
}
