//! Configuration types for DIMSE services

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{DimseError, Result};
use crate::types::MAX_AE_TITLE_LEN;

/// Configuration of one DIMSE service instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseConfig {
    /// Local Application Entity Title
    #[serde(default = "default_local_aet")]
    pub local_aet: String,

    /// Application Entity Title of the peer
    #[serde(default = "default_peer_aet")]
    pub peer_aet: String,

    /// First message ID handed out by the allocator
    #[serde(default = "default_first_message_id")]
    pub first_message_id: u16,

    /// Presentation contexts accepted during association negotiation.
    /// When empty, every abstract syntax is allowed.
    #[serde(default)]
    pub presentation_contexts: Vec<PresentationContext>,
}

/// A negotiated abstract syntax and the transfer syntax agreed for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationContext {
    pub abstract_syntax: String,
    #[serde(default = "default_transfer_syntax")]
    pub transfer_syntax: String,
}

impl PresentationContext {
    pub fn new(abstract_syntax: impl Into<String>, transfer_syntax: impl Into<String>) -> Self {
        Self {
            abstract_syntax: abstract_syntax.into(),
            transfer_syntax: transfer_syntax.into(),
        }
    }
}

impl Default for DimseConfig {
    fn default() -> Self {
        Self {
            local_aet: default_local_aet(),
            peer_aet: default_peer_aet(),
            first_message_id: default_first_message_id(),
            presentation_contexts: Vec::new(),
        }
    }
}

impl DimseConfig {
    /// Add a presentation context
    pub fn with_presentation_context(
        mut self,
        abstract_syntax: impl Into<String>,
        transfer_syntax: impl Into<String>,
    ) -> Self {
        self.presentation_contexts
            .push(PresentationContext::new(abstract_syntax, transfer_syntax));
        self
    }

    /// Transfer syntax negotiated for `abstract_syntax`
    pub fn transfer_syntax(&self, abstract_syntax: &str) -> Option<&str> {
        self.presentation_contexts
            .iter()
            .find(|pc| pc.abstract_syntax == abstract_syntax)
            .map(|pc| pc.transfer_syntax.as_str())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (what, aet) in [("Local", &self.local_aet), ("Peer", &self.peer_aet)] {
            let trimmed = aet.trim();
            if trimmed.is_empty() || trimmed.len() > MAX_AE_TITLE_LEN {
                return Err(DimseError::config(format!(
                    "{} AE title must be 1-{} characters",
                    what, MAX_AE_TITLE_LEN
                )));
            }
        }

        if self.first_message_id == 0 {
            return Err(DimseError::config("First message ID must be greater than 0"));
        }

        let mut seen = HashSet::new();
        for pc in &self.presentation_contexts {
            if pc.abstract_syntax.trim().is_empty() || pc.transfer_syntax.trim().is_empty() {
                return Err(DimseError::config(
                    "Presentation contexts need an abstract and a transfer syntax",
                ));
            }
            if !seen.insert(pc.abstract_syntax.as_str()) {
                return Err(DimseError::config(format!(
                    "Abstract syntax {} is listed twice",
                    pc.abstract_syntax
                )));
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_local_aet() -> String {
    "DIMSE_SCU".to_string()
}

fn default_peer_aet() -> String {
    "ANY-SCP".to_string()
}

fn default_first_message_id() -> u16 {
    1
}

fn default_transfer_syntax() -> String {
    "1.2.840.10008.1.2".to_string() // Implicit VR Little Endian
}
