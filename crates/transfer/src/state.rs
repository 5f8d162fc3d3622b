//! Per-file resumable transfer state.
//!
//! A [`ResumableTransfer`] is a plain value owned by whoever drives the
//! file. It only ever moves its offset to values the server acknowledged,
//! and refuses transitions that would break that.

use crate::TransferError;

/// Lifecycle of one resumable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    NotStarted,
    /// The server created the upload and returned its URL.
    Started,
    /// At least one write was attempted.
    Transferring,
    /// Every byte is acknowledged.
    Finished,
    Aborted,
}

/// State of one file's resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumableTransfer {
    upload_url: Option<String>,
    offset: u64,
    total_length: u64,
    phase: TransferPhase,
}

impl ResumableTransfer {
    pub fn new(total_length: u64) -> Self {
        Self {
            upload_url: None,
            offset: 0,
            total_length,
            phase: TransferPhase::NotStarted,
        }
    }

    pub fn upload_url(&self) -> Option<&str> {
        self.upload_url.as_deref()
    }

    /// Last offset the server acknowledged.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn remaining(&self) -> u64 {
        self.total_length - self.offset
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.offset == self.total_length
    }

    /// Records the upload URL returned by the creation request.
    pub fn start(&mut self, upload_url: impl Into<String>) -> Result<(), TransferError> {
        self.expect_phase(&[TransferPhase::NotStarted], "start")?;
        self.upload_url = Some(upload_url.into());
        self.offset = 0;
        self.phase = TransferPhase::Started;
        Ok(())
    }

    /// Marks the first write attempt. Idempotent while transferring.
    pub fn begin_writes(&mut self) -> Result<(), TransferError> {
        self.expect_phase(
            &[TransferPhase::Started, TransferPhase::Transferring],
            "write to",
        )?;
        self.phase = TransferPhase::Transferring;
        Ok(())
    }

    /// Moves the offset to a value the server acknowledged.
    ///
    /// Returns the number of newly acknowledged bytes. The offset never
    /// moves backwards and never passes the total length.
    pub fn acknowledge(&mut self, server_offset: u64) -> Result<u64, TransferError> {
        self.expect_phase(
            &[TransferPhase::Started, TransferPhase::Transferring],
            "acknowledge",
        )?;
        if server_offset < self.offset {
            return Err(TransferError::OffsetRegressed {
                acknowledged: self.offset,
                reported: server_offset,
            });
        }
        if server_offset > self.total_length {
            return Err(TransferError::OffsetBeyondLength {
                reported: server_offset,
                total: self.total_length,
            });
        }
        let delta = server_offset - self.offset;
        self.offset = server_offset;
        Ok(delta)
    }

    /// Completes the transfer once every byte is acknowledged.
    pub fn finish(&mut self) -> Result<(), TransferError> {
        self.expect_phase(
            &[TransferPhase::Started, TransferPhase::Transferring],
            "finish",
        )?;
        if !self.is_complete() {
            return Err(TransferError::Incomplete {
                offset: self.offset,
                total: self.total_length,
            });
        }
        self.phase = TransferPhase::Finished;
        Ok(())
    }

    /// Terminal failure. Only a started transfer can abort; the offset is kept
    /// so the failure can report the last known-good position.
    pub fn abort(&mut self) {
        if matches!(
            self.phase,
            TransferPhase::Started | TransferPhase::Transferring
        ) {
            self.phase = TransferPhase::Aborted;
        }
    }

    fn expect_phase(
        &self,
        allowed: &[TransferPhase],
        action: &'static str,
    ) -> Result<(), TransferError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(TransferError::InvalidTransition {
                phase: self.phase,
                action,
            })
        }
    }
}
