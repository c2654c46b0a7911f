#![allow(dead_code)]

use std::sync::Mutex;

use tokio::sync::mpsc;

use watchrun::errors::{Result, WatchrunError};
use watchrun::sink::{Directive, InteractionEvent, Region, Sink};

/// One recorded call on the sink interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    SetTitle(String),
    Control(Directive),
    Write { region: Region, bytes: Vec<u8> },
    Forward(InteractionEvent),
}

/// A sink double that:
/// - records every call made on the interface
/// - keeps tag/body/selection state with the same replace semantics as the
///   production adapter
/// - replays a scripted interaction event stream via [`push_event`] /
///   [`close_events`]
///
/// [`push_event`]: RecordingSink::push_event
/// [`close_events`]: RecordingSink::close_events
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    tag: Mutex<Vec<u8>>,
    body: Mutex<Vec<u8>>,
    selection: Mutex<(usize, usize)>,
    /// Cap on how many bytes a single body write accepts. Lets tests
    /// exercise partial-write handling.
    write_cap: Option<usize>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<InteractionEvent>>>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<InteractionEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::with_write_cap(None)
    }

    /// A sink whose body writes accept at most `cap` bytes per call.
    pub fn with_write_cap(cap: Option<usize>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            calls: Mutex::new(Vec::new()),
            tag: Mutex::new(Vec::new()),
            body: Mutex::new(Vec::new()),
            selection: Mutex::new((0, 0)),
            write_cap: cap,
            event_tx: Mutex::new(Some(event_tx)),
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Script one interaction event. Panics if the stream has ended.
    pub fn push_event(&self, event: InteractionEvent) {
        let guard = self.event_tx.lock().unwrap();
        let tx = guard.as_ref().expect("event stream already closed");
        tx.send(event).expect("event stream receiver dropped");
    }

    /// End the interaction event stream, as the surface does on close.
    pub fn close_events(&self) {
        self.event_tx.lock().unwrap().take();
    }

    /// Snapshot of every call made so far.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Current body contents as a lossy string.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body.lock().unwrap()).into_owned()
    }

    /// All directives issued so far, in order.
    pub fn directives(&self) -> Vec<Directive> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Control(directive) => Some(directive),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }

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
            return Ok((offset.min(body_len), offset.min(body_len)));
        }
        Err(WatchrunError::SinkIo(format!("bad address {addr:?}")))
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for RecordingSink {
    fn set_title(&self, name: &str) -> Result<()> {
        self.record(SinkCall::SetTitle(name.to_string()));
        Ok(())
    }

    fn control(&self, directive: Directive) -> Result<()> {
        self.record(SinkCall::Control(directive.clone()));
        match directive {
            Directive::Delete => {
                self.close_events();
                Ok(())
            }
            Directive::SetSelectionToAddress(addr) => {
                let body_len = self.body.lock().unwrap().len();
                *self.selection.lock().unwrap() = Self::resolve_address(&addr, body_len)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn write_region(&self, region: Region, bytes: &[u8]) -> Result<usize> {
        match region {
            Region::Tag => {
                self.record(SinkCall::Write {
                    region,
                    bytes: bytes.to_vec(),
                });
                self.tag.lock().unwrap().extend_from_slice(bytes);
                Ok(bytes.len())
            }
            Region::Body => {
                let accepted = match self.write_cap {
                    Some(cap) => bytes.len().min(cap),
                    None => bytes.len(),
                };
                self.record(SinkCall::Write {
                    region,
                    bytes: bytes[..accepted].to_vec(),
                });
                self.body.lock().unwrap().extend_from_slice(&bytes[..accepted]);
                Ok(accepted)
            }
            Region::Data => {
                self.record(SinkCall::Write {
                    region,
                    bytes: bytes.to_vec(),
                });
                let mut body = self.body.lock().unwrap();
                let (start, end) = *self.selection.lock().unwrap();
                let end = end.min(body.len());
                let start = start.min(end);
                body.splice(start..end, bytes.iter().copied());
                *self.selection.lock().unwrap() = (start, start + bytes.len());
                Ok(bytes.len())
            }
        }
    }

    fn read_region(&self, region: Region) -> Result<Vec<u8>> {
        match region {
            Region::Tag => Ok(self.tag.lock().unwrap().clone()),
            Region::Body | Region::Data => Ok(self.body.lock().unwrap().clone()),
        }
    }

    fn read_selection(&self) -> Result<(usize, usize)> {
        Ok(*self.selection.lock().unwrap())
    }

    fn events(&self) -> Result<mpsc::UnboundedReceiver<InteractionEvent>> {
        self.event_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| WatchrunError::SinkIo("event stream already taken".to_string()))
    }

    fn forward_event(&self, event: InteractionEvent) -> Result<()> {
        self.record(SinkCall::Forward(event));
        Ok(())
    }
}
