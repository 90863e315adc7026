//! Tag-reader collaborator boundary.
//!
//! The core only needs one thing from the proximity-card hardware: the raw tag
//! id of a discovered card. Tag-technology selection and the reader's
//! connect/close lifecycle stay on the hardware side of this seam.

use crate::session::SessionOrchestrator;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HardwareReadError {
    #[error("tag read aborted: {0}")]
    ReadAborted(String),
    #[error("reader stopped")]
    ReaderStopped,
}

/// Source of discovered proximity-card tags.
#[async_trait]
pub trait TagReader: Send + Sync {
    /// Wait for the next tag and return its raw id bytes.
    async fn next_tag(&self) -> Result<Vec<u8>, HardwareReadError>;
}

/// Encode a raw card id the way the wire format expects it: uppercase hex,
/// no separators (e.g. `04A1B2C3`).
pub fn encode_card_uid(raw_id: &[u8]) -> String {
    hex::encode_upper(raw_id)
}

/// Pump tags from a reader into the orchestrator until the reader stops.
///
/// Read failures are reported to the UI but never tear down an active call;
/// a misread card is not fatal.
pub async fn drive_tag_reader(reader: Arc<dyn TagReader>, orchestrator: Arc<SessionOrchestrator>) {
    loop {
        match reader.next_tag().await {
            Ok(raw_id) => orchestrator.tag_discovered(&raw_id).await,
            Err(HardwareReadError::ReaderStopped) => return,
            Err(e) => {
                warn!(target: "Hardware", "Tag read failed: {e}");
                orchestrator.report_hardware_error(e.to_string()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_uid_is_uppercase_hex_without_separators() {
        assert_eq!(encode_card_uid(&[0x04, 0xA1, 0xB2, 0xC3]), "04A1B2C3");
        assert_eq!(encode_card_uid(&[0x00, 0x0F]), "000F");
        assert_eq!(encode_card_uid(&[]), "");
    }
}
