// src/run/dispatcher.rs

//! Sink interaction event dispatch.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::sink::{Directive, InteractionEvent, InteractionKind, Sink};

use super::{RunRequest, submit_request};

/// Consume the sink's interaction events until the stream ends.
///
/// - An `Execute` of the word `Get` becomes an acknowledged run request and
///   is swallowed; it has been fully handled here.
/// - An `Execute` of the word `Del` requests deletion of the surface.
/// - Everything else is handed back to the surface unchanged, so unrelated
///   interactions keep working.
///
/// Returning `Ok` means the surface closed its stream; the process should
/// shut down cleanly.
pub async fn dispatch_events(
    sink: Arc<dyn Sink>,
    mut events: mpsc::UnboundedReceiver<InteractionEvent>,
    request_tx: mpsc::Sender<RunRequest>,
) -> Result<()> {
    while let Some(event) = events.recv().await {
        if event.kind == InteractionKind::Execute {
            if event.text == "Get" {
                debug!("manual run trigger");
                if !submit_request(&request_tx, Instant::now()).await {
                    break;
                }
                continue;
            }
            if event.text == "Del" {
                info!("deletion requested");
                sink.control(Directive::Delete)?;
            }
        }
        sink.forward_event(event)?;
    }

    info!("sink event stream ended");
    Ok(())
}
