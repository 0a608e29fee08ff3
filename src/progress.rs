//! Progress-callback trait for processing-stage events.
//!
//! Attach an [`Arc<dyn ProcessProgressCallback>`] with
//! [`crate::process::Pipeline::with_progress`] to be told when each document
//! starts and finishes acquisition and when extraction runs. The CLI drives
//! its spinner from these events.
//!
//! # Example
//!
//! ```rust
//! use g28_autofill::{DocumentRole, ProcessProgressCallback, TextSource};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     acquired: AtomicUsize,
//! }
//!
//! impl ProcessProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, role: DocumentRole, source: TextSource, chars: usize) {
//!         self.acquired.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{role}: {chars} characters via {source:?}");
//!     }
//! }
//! ```

use crate::pipeline::acquire::TextSource;
use crate::pipeline::input::DocumentRole;
use std::sync::Arc;

/// Called by the processing pipeline at stage boundaries.
///
/// Both documents are acquired concurrently, so the per-document methods may
/// be called from different tasks at the same time. All methods default to
/// no-ops.
pub trait ProcessProgressCallback: Send + Sync {
    /// Called once before acquisition starts.
    fn on_process_start(&self) {}

    fn on_document_start(&self, role: DocumentRole, name: &str) {
        let _ = (role, name);
    }

    /// Called when a document's text has been acquired.
    ///
    /// # Arguments
    /// * `source` — strategy that produced the text
    /// * `chars`  — length of the text in characters
    fn on_document_complete(&self, role: DocumentRole, source: TextSource, chars: usize) {
        let _ = (role, source, chars);
    }

    /// Called when acquisition of a document fails. The run stops after this.
    fn on_document_error(&self, role: DocumentRole, error: &str) {
        let _ = (role, error);
    }

    /// Called just before the joint extraction request is sent.
    fn on_extraction_start(&self, model: &str) {
        let _ = model;
    }

    /// Called after extraction and mapping.
    ///
    /// # Arguments
    /// * `mapped_fields` — number of non-empty text fields ready to fill
    fn on_process_complete(&self, mapped_fields: usize, elapsed_ms: u64) {
        let _ = (mapped_fields, elapsed_ms);
    }
}

/// Used when no callback is attached.
pub struct NoopProgressCallback;

impl ProcessProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn ProcessProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        completes: AtomicUsize,
        errors: AtomicUsize,
        chars: AtomicUsize,
    }

    impl ProcessProgressCallback for TrackingCallback {
        fn on_document_complete(&self, _role: DocumentRole, _source: TextSource, chars: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.chars.fetch_add(chars, Ordering::SeqCst);
        }

        fn on_document_error(&self, _role: DocumentRole, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_accepts_every_event() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_process_start();
        cb.on_document_start(DocumentRole::Passport, "passport.pdf");
        cb.on_document_complete(DocumentRole::Passport, TextSource::Embedded, 120);
        cb.on_document_error(DocumentRole::Representation, "no text");
        cb.on_extraction_start("gemini-2.0-flash");
        cb.on_process_complete(20, 1500);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let tracker = TrackingCallback::default();
        tracker.on_document_complete(DocumentRole::Passport, TextSource::Optical, 80);
        tracker.on_document_complete(DocumentRole::Representation, TextSource::Embedded, 900);
        tracker.on_document_error(DocumentRole::Representation, "unreadable");
        tracker.on_extraction_start("ignored");

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.chars.load(Ordering::SeqCst), 980);
    }
}
