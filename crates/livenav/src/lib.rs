//! Live navigation capture.
//!
//! Observes a browser session the operator drives by hand, captures the
//! resources it loads into a categorized dump, fingerprints the front-end
//! technologies in use, snapshots every page the operator reaches and writes
//! a JSON report when the session ends.
//!
//! The browser itself sits behind [`browser::BrowserSession`]; the
//! `livenav-runtime` crate provides the Chromium implementation and the CLI.

pub mod browser;
pub mod classify;
pub mod controller;
pub mod detect;
pub mod events;
pub mod filter;
pub mod history;
pub mod navigation;
pub mod persist;
pub mod session;
pub mod types;

pub use browser::{BrowserEvent, BrowserLauncher, BrowserSession, ConsoleLevel, RequestInfo, ResponseInfo};
pub use controller::{run_session, SessionConfig, SessionController, SessionPhase};
pub use events::{EventBus, LiveNavEvent};
pub use persist::{ArtifactWriter, FsWriter, MemoryWriter, OutputLayout};
pub use session::{FinalReport, SessionAggregator, SessionHandle};
pub use types::{
    BrowserPreference, CaptureEntry, Category, LiveNavError, LiveNavResult, ResourceKind,
    SessionState,
};
