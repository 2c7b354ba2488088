mod anthropic;

pub use anthropic::AnthropicRunner;
