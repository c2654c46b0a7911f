// src/sink/term.rs

//! Terminal adapter for the [`Sink`] interface.
//!
//! Body writes stream to stdout; a content-replace that empties the body
//! clears the screen when stdout is a terminal. Interaction events come
//! from stdin: every non-empty line is delivered as an `Execute` event, so
//! typing `Get` re-runs the command and `Del` shuts the pipeline down, the
//! same words the editor surface of the original tool used.
//!
//! The stdin reader runs on a plain blocking thread and hands lines into
//! the async world over an unbounded channel. The sender half lives inside
//! the sink state, not in the thread, so `Delete` can end the event stream
//! immediately even while the thread is still blocked in `read_line`.

use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{Result, WatchrunError};

use super::{Directive, InteractionEvent, InteractionKind, Region, Sink};

struct TermState {
    title: String,
    tag: Vec<u8>,
    body: Vec<u8>,
    selection: (usize, usize),
    event_tx: Option<mpsc::UnboundedSender<InteractionEvent>>,
    event_rx: Option<mpsc::UnboundedReceiver<InteractionEvent>>,
}

/// Sink implementation backed by the controlling terminal.
pub struct TermSink {
    state: Mutex<TermState>,
    is_tty: bool,
}

impl TermSink {
    /// Open the terminal surface and start the stdin interaction reader.
    pub fn open() -> Result<Arc<Self>> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let sink = Arc::new(Self {
            state: Mutex::new(TermState {
                title: String::new(),
                tag: Vec::new(),
                body: Vec::new(),
                selection: (0, 0),
                event_tx: Some(event_tx),
                event_rx: Some(event_rx),
            }),
            is_tty: std::io::stdout().is_terminal(),
        });

        let reader_sink = Arc::clone(&sink);
        std::thread::Builder::new()
            .name("watchrun-stdin".to_string())
            .spawn(move || reader_sink.read_interactions())?;

        Ok(sink)
    }

    /// Blocking stdin loop feeding the interaction event stream.
    fn read_interactions(&self) {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    self.end_events();
                    return;
                }
                Ok(_) => {
                    let text = line.trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    let event = InteractionEvent {
                        kind: InteractionKind::Execute,
                        text,
                    };
                    if !self.deliver(event) {
                        return;
                    }
                }
            }
        }
    }

    /// Send an event into the stream; false once the stream has ended.
    fn deliver(&self, event: InteractionEvent) -> bool {
        match self.lock() {
            Ok(state) => match &state.event_tx {
                Some(tx) => tx.send(event).is_ok(),
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Drop the sender half, ending the interaction event stream.
    fn end_events(&self) {
        if let Ok(mut state) = self.lock() {
            state.event_tx = None;
        }
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, TermState>, WatchrunError> {
        self.state
            .lock()
            .map_err(|_| WatchrunError::SinkIo("sink state mutex poisoned".to_string()))
    }

    fn flush_stdout(&self, bytes: &[u8]) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(bytes)
            .and_then(|()| stdout.flush())
            .map_err(|err| WatchrunError::SinkIo(err.to_string()))
    }

    /// Resolve a textual address against the current body.
    fn resolve_address(addr: &str, body_len: usize) -> Result<(usize, usize)> {
        if addr == "," {
            return Ok((0, body_len));
        }
        if addr == "$" {
            return Ok((body_len, body_len));
        }
        if let Some(rest) = addr.strip_prefix('#') {
            let offset: usize = rest
                .parse()
                .map_err(|_| WatchrunError::SinkIo(format!("bad address {addr:?}")))?;
            let offset = offset.min(body_len);
            return Ok((offset, offset));
        }
        Err(WatchrunError::SinkIo(format!("bad address {addr:?}")))
    }
}

impl Sink for TermSink {
    fn set_title(&self, name: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.title = name.to_string();
        drop(state);
        if self.is_tty {
            // OSC 0 sets the terminal window title.
            self.flush_stdout(format!("\x1b]0;{name}\x07").as_bytes())?;
        }
        Ok(())
    }

    fn control(&self, directive: Directive) -> Result<()> {
        debug!(?directive, "sink control");
        match directive {
            Directive::SetWorkingDirHint(_) | Directive::RecordInvocation(_) => {
                // The terminal has no session-restore facility.
                Ok(())
            }
            Directive::MarkClean => Ok(()),
            Directive::Delete => {
                self.end_events();
                Ok(())
            }
            Directive::SetSelectionToAddress(addr) => {
                let mut state = self.lock()?;
                state.selection = Self::resolve_address(&addr, state.body.len())?;
                Ok(())
            }
            Directive::ShowSelection => {
                // Stdout already shows the most recent output.
                Ok(())
            }
        }
    }

    fn write_region(&self, region: Region, bytes: &[u8]) -> Result<usize> {
        match region {
            Region::Tag => {
                let mut state = self.lock()?;
                state.tag.extend_from_slice(bytes);
                Ok(bytes.len())
            }
            Region::Body => {
                let mut state = self.lock()?;
                state.body.extend_from_slice(bytes);
                drop(state);
                self.flush_stdout(bytes)?;
                Ok(bytes.len())
            }
            Region::Data => {
                let mut state = self.lock()?;
                let (start, end) = state.selection;
                let end = end.min(state.body.len());
                let start = start.min(end);
                state.body.splice(start..end, bytes.iter().copied());
                state.selection = (start, start + bytes.len());
                let cleared = state.body.is_empty();
                drop(state);
                if cleared && self.is_tty {
                    self.flush_stdout(b"\x1b[2J\x1b[H")?;
                }
                Ok(bytes.len())
            }
        }
    }

    fn read_region(&self, region: Region) -> Result<Vec<u8>> {
        let state = self.lock()?;
        match region {
            Region::Tag => Ok(state.tag.clone()),
            Region::Body | Region::Data => Ok(state.body.clone()),
        }
    }

    fn read_selection(&self) -> Result<(usize, usize)> {
        Ok(self.lock()?.selection)
    }

    fn events(&self) -> Result<mpsc::UnboundedReceiver<InteractionEvent>> {
        self.lock()?
            .event_rx
            .take()
            .ok_or_else(|| WatchrunError::SinkIo("event stream already taken".to_string()))
    }

    fn forward_event(&self, event: InteractionEvent) -> Result<()> {
        // Nothing behind the terminal to hand events back to.
        debug!(?event, "dropping forwarded event");
        Ok(())
    }
}
