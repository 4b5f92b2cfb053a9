//! External service providers
//!
//! Available providers:
//! - Gemini for conversation turns and speech synthesis

mod gemini;

pub use gemini::GeminiClient;
