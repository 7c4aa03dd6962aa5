//! Model identifiers.
//!
//! Every model file carries a 128-bit id. It is rendered as 32 lowercase hex
//! digits, which is what bindings hand back from `model_id`.

use crate::error::TabulaError;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A 128-bit model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(Uuid);

impl ModelId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The canonical 32-hex-digit form.
    pub fn as_hex(&self) -> String {
        self.0.simple().to_string()
    }
}

impl FromStr for ModelId {
    type Err = TabulaError;

    /// Accepts the 32-hex-digit form as well as the hyphenated UUID form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s.trim())
            .map(ModelId)
            .map_err(|_| TabulaError::InvalidModelId(s.to_string()))
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
