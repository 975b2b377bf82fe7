//! Bufferization pass options.

use crate::error::OptionsError;
use serde::Deserialize;
use std::num::NonZeroU32;

/// Options shared by all the bufferization passes.
///
/// Can be deserialized (see [`from_json`](Self::from_json)), with every
/// field being optional, and unknown fields rejected.
#[derive(Clone, Default, PartialEq, Eq, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferizationOptions {
    /// Alignment (in bytes) of globals created for constants, or `None`
    /// (also spelled `0`) for the natural alignment. Must be a power of two.
    pub alignment: Option<u32>,

    /// Allow operands produced by ops without a bufferization model (or by
    /// function parameters), by materializing a `bufferization.to_memref`
    /// for them, instead of leaving their users untouched.
    pub allow_unknown_ops: bool,

    /// Memory space for newly created buffers.
    pub default_memory_space: u32,
}

impl BufferizationOptions {
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        match self.alignment {
            Some(alignment) if alignment != 0 && !alignment.is_power_of_two() => {
                Err(OptionsError::InvalidAlignment(alignment))
            }
            _ => Ok(()),
        }
    }

    /// The validated alignment, as stored on globals (`0` becoming `None`).
    pub fn global_alignment(&self) -> Result<Option<NonZeroU32>, OptionsError> {
        self.validate()?;
        Ok(self.alignment.and_then(NonZeroU32::new))
    }
}
