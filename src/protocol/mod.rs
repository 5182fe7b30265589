pub mod accumulate;
pub mod anthropic;
pub mod canonical;
pub mod gemini;
pub mod kiro;
pub mod mapping;
pub mod openai_chat;
pub mod sanitize;
pub mod thinking;
