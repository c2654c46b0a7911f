// tests/dispatcher_events.rs

//! Event dispatcher behaviour against a scripted sink.

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;

use tokio::sync::mpsc;

use watchrun::run::{RunRequest, dispatch_events};
use watchrun::sink::{Directive, InteractionEvent, InteractionKind, Sink};
use watchrun_test_utils::recording_sink::{RecordingSink, SinkCall};

type TestResult = Result<(), Box<dyn Error>>;

fn execute(text: &str) -> InteractionEvent {
    InteractionEvent {
        kind: InteractionKind::Execute,
        text: text.to_string(),
    }
}

#[tokio::test]
async fn get_becomes_an_acknowledged_run_request_and_is_swallowed() -> TestResult {
    with_timeout(async {
        init_tracing();

        let sink = Arc::new(RecordingSink::new());
        let events = sink.events()?;
        let (request_tx, mut request_rx) = mpsc::channel::<RunRequest>(1);
        let handle = tokio::spawn(dispatch_events(sink.clone(), events, request_tx));

        sink.push_event(execute("Get"));
        let request = request_rx.recv().await.expect("one run request");
        let _ = request.done.send(());

        sink.close_events();
        handle.await??;

        let forwarded_get = sink.calls().into_iter().any(
            |call| matches!(call, SinkCall::Forward(event) if event.text == "Get"),
        );
        assert!(!forwarded_get, "handled Get must not be forwarded");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn del_requests_deletion_then_forwards() -> TestResult {
    with_timeout(async {
        init_tracing();

        let sink = Arc::new(RecordingSink::new());
        let events = sink.events()?;
        let (request_tx, _request_rx) = mpsc::channel::<RunRequest>(1);
        let handle = tokio::spawn(dispatch_events(sink.clone(), events, request_tx));

        // Deleting the surface ends the event stream, so the dispatcher
        // exits on its own afterwards.
        sink.push_event(execute("Del"));
        handle.await??;

        assert!(sink.directives().contains(&Directive::Delete));
        let forwarded_del = sink.calls().into_iter().any(
            |call| matches!(call, SinkCall::Forward(event) if event.text == "Del"),
        );
        assert!(forwarded_del, "Del is still handed back to the surface");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn unrelated_events_pass_through_unmodified() -> TestResult {
    with_timeout(async {
        init_tracing();

        let sink = Arc::new(RecordingSink::new());
        let events = sink.events()?;
        let (request_tx, mut request_rx) = mpsc::channel::<RunRequest>(1);
        let handle = tokio::spawn(dispatch_events(sink.clone(), events, request_tx));

        let unrelated = InteractionEvent {
            kind: InteractionKind::Look,
            text: "README.md".to_string(),
        };
        sink.push_event(unrelated.clone());
        sink.push_event(execute("Put"));
        sink.close_events();
        handle.await??;

        let forwards: Vec<InteractionEvent> = sink
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Forward(event) => Some(event),
                _ => None,
            })
            .collect();
        assert_eq!(forwards, vec![unrelated, execute("Put")]);
        assert!(request_rx.try_recv().is_err(), "no run requests were made");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn dispatcher_exits_cleanly_when_stream_closes() -> TestResult {
    with_timeout(async {
        init_tracing();

        let sink = Arc::new(RecordingSink::new());
        let events = sink.events()?;
        let (request_tx, _request_rx) = mpsc::channel::<RunRequest>(1);
        let handle = tokio::spawn(dispatch_events(sink.clone(), events, request_tx));

        sink.close_events();
        handle.await??;
        Ok(())
    })
    .await
}
