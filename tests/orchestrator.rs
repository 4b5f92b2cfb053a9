//! Conversation flow integration tests
//!
//! Drives the orchestrator end to end against mock retrieval, generation and
//! audio devices.

use std::sync::atomic::Ordering;

use webvoice::generator::{RESPOND_APOLOGY, SUMMARY_APOLOGY};
use webvoice::{Error, IgnoreReason, PlaybackEvent, SessionState, Speaker, SubmitOutcome};

mod common;
use common::{EXAMPLE_TEXT, Gate, Harness, ScriptedBackend, StaticRetriever, cite, reply};

const URL: &str = "https://example.com";

#[tokio::test]
async fn test_example_domain_conversation() {
    let h = Harness::example(vec![]);
    let mut events = h.orchestrator.playback().subscribe();

    let opening = h.orchestrator.start(URL).await.unwrap().unwrap();

    assert_eq!(
        opening.text,
        "I've analyzed the content of Example Domain. What would you like to know?"
    );
    assert_eq!(opening.speaker, Speaker::Assistant);
    assert!(opening.citations.is_empty());
    assert_eq!(h.orchestrator.state(), SessionState::Conversing);

    let session = h.orchestrator.snapshot();
    assert_eq!(session.title.as_deref(), Some("Example Domain"));
    assert_eq!(session.context.as_deref(), Some(EXAMPLE_TEXT));
    assert_eq!(session.source_url.as_deref(), Some(URL));
    assert!(!session.grounding_active());

    // No summary needed when the page was read
    assert_eq!(h.backend.request_count(), 0);

    assert_eq!(h.output.starts(), 1);
    assert!(h.orchestrator.is_speaking());
    let started = events.recv().await.unwrap();
    let PlaybackEvent::Started(id) = started else {
        panic!("expected Started, got {started:?}");
    };

    h.output.complete(0);
    assert_eq!(events.recv().await.unwrap(), PlaybackEvent::Completed(id));
    assert!(!h.orchestrator.is_speaking());
    assert_eq!(h.synth.spoken(), vec![opening.text]);
}

#[tokio::test]
async fn test_unreadable_page_falls_back_to_summary() {
    let h = Harness::new(
        StaticRetriever::unreachable(URL),
        ScriptedBackend::new(vec![Ok(reply(
            "Example.com is a reserved domain for documentation.",
            vec![
                cite(Some("https://www.iana.org/domains/example"), Some("IANA")),
                cite(Some("https://no-title.example"), None),
                cite(None, Some("No URI")),
            ],
        ))]),
    );

    let opening = h.orchestrator.start(URL).await.unwrap().unwrap();

    assert_eq!(opening.text, "Example.com is a reserved domain for documentation.");
    assert_eq!(opening.citations.len(), 1);
    assert_eq!(opening.citations[0].label, "IANA");
    assert_eq!(h.orchestrator.state(), SessionState::Conversing);

    let session = h.orchestrator.snapshot();
    assert!(session.context.is_none());
    assert!(session.grounding_active());
    assert_eq!(session.title.as_deref(), Some(URL));
    assert_eq!(session.transcript.len(), 1);

    let requests = h.backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].search);
    assert!(requests[0].prompt.contains(URL));
}

#[tokio::test]
async fn test_grounded_follow_up_names_the_page() {
    let h = Harness::new(
        StaticRetriever::unreachable(URL),
        ScriptedBackend::new(vec![
            Ok(reply("Example.com is a reserved domain.", vec![])),
            Ok(reply("IANA maintains it.", vec![])),
        ]),
    );

    h.orchestrator.start(URL).await.unwrap().unwrap();
    h.orchestrator.submit("Who maintains it?").await;

    let requests = h.backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].system_instruction.contains(URL));
    assert_eq!(requests[1].prompt, "Who maintains it?");
}

#[tokio::test]
async fn test_recoverable_summary_failure_apologizes() {
    let h = Harness::new(
        StaticRetriever::unreachable(URL),
        ScriptedBackend::new(vec![Err(Error::Generation("503".into()))]),
    );

    let opening = h.orchestrator.start(URL).await.unwrap().unwrap();

    assert_eq!(opening.text, SUMMARY_APOLOGY);
    assert!(opening.citations.is_empty());
    assert_eq!(h.orchestrator.state(), SessionState::Conversing);
}

#[tokio::test]
async fn test_missing_credentials_return_to_idle() {
    let h = Harness::new(
        StaticRetriever::unreachable(URL),
        ScriptedBackend::new(vec![Err(Error::MissingCredential("GEMINI_API_KEY"))]),
    );

    let result = h.orchestrator.start(URL).await;

    assert!(matches!(result, Err(Error::MissingCredential("GEMINI_API_KEY"))));
    assert_eq!(h.orchestrator.state(), SessionState::Idle);

    let session = h.orchestrator.snapshot();
    assert!(session.transcript.is_empty());
    assert!(session.source_url.is_none());
    assert_eq!(h.output.starts(), 0);

    // A fresh attempt is allowed afterwards
    assert!(h.orchestrator.start(URL).await.is_ok());
}

#[tokio::test]
async fn test_start_rejections() {
    let h = Harness::example(vec![]);

    assert!(matches!(h.orchestrator.start("   ").await, Err(Error::InvalidUrl(_))));
    assert_eq!(h.orchestrator.state(), SessionState::Idle);

    h.orchestrator.start(URL).await.unwrap();
    assert!(matches!(
        h.orchestrator.start("https://other.example").await,
        Err(Error::InvalidState(_))
    ));
    assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.orchestrator.snapshot().source_url.as_deref(), Some(URL));
}

#[tokio::test]
async fn test_submit_appends_turns_in_order() {
    let h = Harness::example(vec![Ok(reply(
        "It is a placeholder page.",
        vec![cite(Some("https://example.com"), Some("Example Domain"))],
    ))]);
    h.orchestrator.start(URL).await.unwrap();

    let outcome = h.orchestrator.submit("  What is this page?  ").await;

    let SubmitOutcome::Replied(turn) = outcome else {
        panic!("expected a reply, got {outcome:?}");
    };
    assert_eq!(turn.text, "It is a placeholder page.");
    assert_eq!(turn.citations.len(), 1);

    let session = h.orchestrator.snapshot();
    let speakers: Vec<_> = session.transcript.iter().map(|t| t.speaker).collect();
    assert_eq!(speakers, [Speaker::Assistant, Speaker::User, Speaker::Assistant]);
    assert_eq!(session.transcript[1].text, "What is this page?");
    assert!(session.transcript[1].citations.is_empty());
    assert!(!session.processing);

    // The new question is the prompt, not part of the history
    let requests = h.backend.requests.lock().unwrap();
    assert_eq!(requests[0].prompt, "What is this page?");
    assert_eq!(requests[0].history.len(), 1);
    assert_eq!(requests[0].history[0].speaker, Speaker::Assistant);
    assert!(requests[0].system_instruction.contains(EXAMPLE_TEXT));

    // Opening and reply were both spoken; the reply interrupted the opening
    assert_eq!(h.output.starts(), 2);
    assert!(h.output.stops() >= 1);
}

#[tokio::test]
async fn test_generation_failure_is_spoken_apology() {
    let h = Harness::example(vec![Err(Error::Generation("quota".into()))]);
    h.orchestrator.start(URL).await.unwrap();

    let outcome = h.orchestrator.submit("Hello?").await;

    let SubmitOutcome::Replied(turn) = outcome else {
        panic!("expected a reply, got {outcome:?}");
    };
    assert_eq!(turn.text, RESPOND_APOLOGY);
    assert!(turn.citations.is_empty());
    assert_eq!(h.orchestrator.state(), SessionState::Conversing);
    assert!(!h.orchestrator.is_processing());
    assert_eq!(h.synth.spoken().last().map(String::as_str), Some(RESPOND_APOLOGY));
}

#[tokio::test]
async fn test_blank_and_early_input_is_ignored() {
    let h = Harness::example(vec![]);

    assert_eq!(
        h.orchestrator.submit("hello").await,
        SubmitOutcome::Ignored(IgnoreReason::NotConversing)
    );

    h.orchestrator.start(URL).await.unwrap();
    assert_eq!(
        h.orchestrator.submit("  \n ").await,
        SubmitOutcome::Ignored(IgnoreReason::Empty)
    );

    assert_eq!(h.orchestrator.snapshot().transcript.len(), 1);
    assert_eq!(h.backend.request_count(), 0);
}

#[tokio::test]
async fn test_submit_while_processing_is_ignored() {
    let gate = Gate::new();
    let h = Harness::new(
        StaticRetriever::page(EXAMPLE_TEXT, "Example Domain"),
        ScriptedBackend::gated(vec![Ok(reply("First answer.", vec![]))], gate.clone()),
    );
    h.orchestrator.start(URL).await.unwrap();

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.submit("first").await });
    gate.entered().await;

    assert!(h.orchestrator.is_processing());
    assert_eq!(
        h.orchestrator.submit("second").await,
        SubmitOutcome::Ignored(IgnoreReason::Busy)
    );
    assert_eq!(h.orchestrator.snapshot().transcript.len(), 2);
    assert_eq!(h.backend.request_count(), 1);

    gate.open(1);
    let outcome = first.await.unwrap();

    assert!(matches!(outcome, SubmitOutcome::Replied(ref t) if t.text == "First answer."));
    let texts: Vec<_> = h
        .orchestrator
        .snapshot()
        .transcript
        .into_iter()
        .map(|t| t.text)
        .collect();
    assert_eq!(texts[1..], ["first", "First answer."]);
    assert_eq!(h.backend.request_count(), 1);
}

#[tokio::test]
async fn test_reset_while_speaking() {
    let h = Harness::example(vec![]);
    let mut events = h.orchestrator.playback().subscribe();
    h.orchestrator.start(URL).await.unwrap();
    assert!(h.orchestrator.is_speaking());
    let PlaybackEvent::Started(id) = events.recv().await.unwrap() else {
        panic!("expected Started");
    };

    h.orchestrator.reset();

    assert_eq!(events.recv().await.unwrap(), PlaybackEvent::Cancelled(id));
    assert_eq!(h.output.stops(), 1);
    assert!(!h.orchestrator.is_speaking());
    assert_eq!(h.orchestrator.state(), SessionState::Idle);

    let session = h.orchestrator.snapshot();
    assert!(session.transcript.is_empty());
    assert!(session.source_url.is_none());
    assert!(session.title.is_none());
    assert!(session.context.is_none());

    // Device finishing after the reset changes nothing
    h.output.complete(0);
    tokio::task::yield_now().await;
    assert!(events.try_recv().is_err());

    // Reset is harmless when repeated
    h.orchestrator.reset();
    assert_eq!(h.output.stops(), 1);
}

#[tokio::test]
async fn test_reply_after_reset_is_discarded() {
    let gate = Gate::new();
    let h = Harness::new(
        StaticRetriever::page(EXAMPLE_TEXT, "Example Domain"),
        ScriptedBackend::gated(vec![Ok(reply("Too late.", vec![]))], gate.clone()),
    );
    h.orchestrator.start(URL).await.unwrap();

    let orchestrator = h.orchestrator.clone();
    let pending = tokio::spawn(async move { orchestrator.submit("question").await });
    gate.entered().await;

    h.orchestrator.reset();
    gate.open(1);

    assert_eq!(pending.await.unwrap(), SubmitOutcome::Ignored(IgnoreReason::Stale));
    assert_eq!(h.orchestrator.state(), SessionState::Idle);
    assert!(h.orchestrator.snapshot().transcript.is_empty());
    assert!(!h.orchestrator.is_processing());
    // Only the opening turn was ever spoken
    assert_eq!(h.synth.spoken().len(), 1);

    // And the next page starts cleanly
    let opening = h.orchestrator.start(URL).await.unwrap();
    assert!(opening.is_some());
    assert_eq!(h.orchestrator.snapshot().transcript.len(), 1);
}

#[tokio::test]
async fn test_reset_during_acquisition() {
    let gate = Gate::new();
    let h = Harness::new(
        StaticRetriever::gated(EXAMPLE_TEXT, "Example Domain", gate.clone()),
        ScriptedBackend::new(vec![]),
    );

    let orchestrator = h.orchestrator.clone();
    let pending = tokio::spawn(async move { orchestrator.start(URL).await });
    gate.entered().await;
    assert_eq!(h.orchestrator.state(), SessionState::AcquiringContext);

    h.orchestrator.reset();
    assert_eq!(h.orchestrator.state(), SessionState::Idle);
    gate.open(1);

    assert!(pending.await.unwrap().unwrap().is_none());
    assert_eq!(h.orchestrator.state(), SessionState::Idle);
    assert!(h.orchestrator.snapshot().transcript.is_empty());
    assert_eq!(h.output.starts(), 0);
}
