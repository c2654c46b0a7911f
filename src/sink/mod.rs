// src/sink/mod.rs

//! The display sink boundary.
//!
//! The pipeline shows command output on an interactive surface it does not
//! own. Everything it needs from that surface is expressed by the [`Sink`]
//! trait below, so the production terminal adapter ([`term::TermSink`]) and
//! the recording double used in tests are interchangeable.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::errors::Result;

pub mod term;

pub use term::TermSink;

/// A text region of the sink surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// The title bar.
    Tag,
    /// The main content area; writes append.
    Body,
    /// Content-replace marker: a write here replaces the current selection
    /// in the content area, so an empty write with everything selected
    /// clears it.
    Data,
}

/// Out-of-band instructions to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Associate a working directory with this surface.
    SetWorkingDirHint(PathBuf),
    /// Record the invocation so the host can restore it later.
    RecordInvocation(String),
    /// Mark the surface content as clean.
    MarkClean,
    /// Delete the surface. The adapter ends its event stream in response.
    Delete,
    /// Move the selection to a textual address such as `","` or `"#0"`.
    SetSelectionToAddress(String),
    /// Scroll the current selection into view.
    ShowSelection,
}

/// Kind of a user interaction reported by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// The user asked to execute some text.
    Execute,
    /// The user asked to look something up.
    Look,
    /// Anything else the surface reports.
    Other,
}

/// One user interaction on the sink surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub text: String,
}

/// Narrow capability interface to the display surface.
///
/// Write and control failures are fatal to the pipeline: once the display
/// boundary is broken there is nowhere left to report to.
pub trait Sink: Send + Sync {
    /// Set the displayed title.
    fn set_title(&self, name: &str) -> Result<()>;

    /// Issue a control directive.
    fn control(&self, directive: Directive) -> Result<()>;

    /// Write bytes to a region, returning how many were accepted.
    fn write_region(&self, region: Region, bytes: &[u8]) -> Result<usize>;

    /// Read the current contents of a region.
    fn read_region(&self, region: Region) -> Result<Vec<u8>>;

    /// Current selection as `(start, end)` byte offsets into the body.
    fn read_selection(&self) -> Result<(usize, usize)>;

    /// Take the interaction event stream. Can be taken exactly once; the
    /// stream ends when the surface is deleted or closed.
    fn events(&self) -> Result<mpsc::UnboundedReceiver<InteractionEvent>>;

    /// Hand an interaction event back to the surface unchanged.
    fn forward_event(&self, event: InteractionEvent) -> Result<()>;
}
