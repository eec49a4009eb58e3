//! Technology detection over captured bytes and rendered markup.
//!
//! Matching is pure ([`scan_text`], [`scan_markup_signals`]); the
//! [`TechnologyDetector`] only decodes content and forwards each hit to the
//! session, which keeps the first observation of every name.

pub mod markup;
pub mod signatures;

use tracing::warn;

use crate::session::SessionHandle;
use crate::types::ResourceKind;

pub use markup::scan_markup_signals;
pub use signatures::{ContentScope, Signature, SCRIPT_SIGNATURES, STYLESHEET_SIGNATURES};

/// Names of every signature in `table` with at least one pattern in `text`.
pub fn scan_text(table: &[Signature], text: &str) -> Vec<&'static str> {
    table
        .iter()
        .filter(|sig| sig.patterns.iter().any(|p| text.contains(p)))
        .map(|sig| sig.name)
        .collect()
}

/// Table that applies to a resource kind, if its content is scanned at all.
pub fn scope_for(kind: ResourceKind) -> Option<ContentScope> {
    match kind {
        ResourceKind::Script | ResourceKind::Document => Some(ContentScope::Script),
        ResourceKind::Stylesheet => Some(ContentScope::Stylesheet),
        _ => None,
    }
}

/// Reports detected technologies to the session.
#[derive(Clone)]
pub struct TechnologyDetector {
    session: SessionHandle,
}

impl TechnologyDetector {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    /// Scan a captured textual resource. Returns the names matched in it,
    /// whether or not they were already known.
    pub async fn scan_textual(&self, url: &str, bytes: &[u8], kind: ResourceKind) -> Vec<&'static str> {
        let Some(scope) = scope_for(kind) else {
            return Vec::new();
        };

        let names = {
            let text = String::from_utf8_lossy(bytes);
            scan_text(scope.table(), &text)
        };
        for name in &names {
            self.report(name, url).await;
        }
        names
    }

    /// Scan rendered markup for structural signals.
    pub async fn scan_markup(&self, url: &str, html: &str) -> Vec<String> {
        let labels = scan_markup_signals(html);
        for label in &labels {
            self.report(label, url).await;
        }
        labels
    }

    async fn report(&self, name: &str, url: &str) {
        if let Err(e) = self.session.report_technology(name, url).await {
            warn!("could not report technology {name}: {e}");
        }
    }
}
