use tiktoken_rs::{CoreBPE, cl100k_base};

#[derive(Debug)]
pub enum TokenError {
    EncoderInit(String),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::EncoderInit(e) => write!(f, "Failed to initialize encoder: {e}"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Estimates how many model tokens a bundle costs (cl100k encoding)
pub struct TokenCounter {
    encoder: CoreBPE,
}

impl TokenCounter {
    pub fn new() -> Result<Self, TokenError> {
        let encoder = cl100k_base().map_err(|e| TokenError::EncoderInit(e.to_string()))?;
        Ok(Self { encoder })
    }

    pub fn count(&self, text: &str) -> usize {
        self.encoder.encode_with_special_tokens(text).len()
    }
}
