//! Export helpers for finished calibration sessions.
//!
//! - [`write_transcript`] / [`parse_transcript`]: human-readable text form of a
//!   [`CalibrationResult`](calib_capture_core::CalibrationResult). Every value is
//!   printed with Rust's shortest round-trip formatting, so parsing a
//!   transcript reproduces the result exactly.
//! - [`write_archive`] / [`save_archive`]: zip package with the transcript, a
//!   JSON copy of the result and one PNG per accepted sample.

mod archive;
mod transcript;

pub use archive::{
    archive_file_name, sample_entry_name, save_archive, write_archive, ExportError,
    RESULTS_JSON_ENTRY, RESULTS_TXT_ENTRY, SAMPLES_DIR,
};
pub use transcript::{parse_transcript, write_transcript, TranscriptError};
