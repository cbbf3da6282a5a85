//! Integration tests for the program supervisor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use teashell_core::{ColorProfile, Msg, SessionId, SessionPhase, WindowSize};
use teashell_middleware::testing::{MockBehavior, MockProgram, TestSession};
use teashell_middleware::{
    chain, handler_fn, middleware_with_color_profile, negotiated_profile, Command, Handler, Model,
    ModelHandler, Program, ProgramHandler, ProgramMiddleware, ProgramOptions, Session,
    SessionRegistry,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn counting_next(calls: &Arc<AtomicUsize>) -> Arc<dyn Handler> {
    let calls = Arc::clone(calls);
    handler_fn(move |_session: Arc<dyn Session>| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
        }
    })
}

fn mock_middleware(program: &Arc<MockProgram>, builds: &Arc<AtomicUsize>) -> ProgramMiddleware {
    let program = Arc::clone(program);
    let builds = Arc::clone(builds);
    ProgramMiddleware::new(ProgramHandler::new(move |_session: &Arc<dyn Session>| {
        builds.fetch_add(1, Ordering::SeqCst);
        let program: Arc<dyn Program> = program.clone();
        Some(program)
    }))
}

fn declining_middleware(builds: &Arc<AtomicUsize>) -> ProgramMiddleware {
    let builds = Arc::clone(builds);
    ProgramMiddleware::new(ProgramHandler::new(move |_session: &Arc<dyn Session>| {
        builds.fetch_add(1, Ordering::SeqCst);
        None
    }))
}

async fn wait_for_output(output: impl Fn() -> String, needle: &str) {
    tokio::time::timeout(TIMEOUT, async {
        while !output().contains(needle) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("output never contained {needle:?}"));
}

#[tokio::test]
async fn test_no_pty_falls_through() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::UntilStopped);
    let handler = mock_middleware(&program, &builds).wrap(counting_next(&next_calls));

    let (session, client) = TestSession::builder().build();
    handler.handle(session).await;

    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
    assert_eq!(program.run_count(), 0);
    assert!(client.output().is_empty());
}

#[tokio::test]
async fn test_decline_starts_nothing() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let handler = declining_middleware(&builds).wrap(counting_next(&next_calls));

    let (session, client) = TestSession::builder()
        .pty("xterm-256color", WindowSize::new(80, 24))
        .build();
    handler.handle(Arc::clone(&session) as Arc<dyn Session>).await;

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
    // The terminal is still there for whoever handles the session next
    assert!(!client.resize_feed_closed());
    assert!(session.window_changes().is_some());
}

#[tokio::test]
async fn test_decline_passes_terminal_to_next_supervisor() {
    let outer_builds = Arc::new(AtomicUsize::new(0));
    let inner_builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::AfterMessages(1));

    let handler = chain(
        counting_next(&next_calls),
        vec![
            mock_middleware(&program, &inner_builds).into_middleware(),
            declining_middleware(&outer_builds).into_middleware(),
        ],
    );

    let (session, client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .build();
    let task = tokio::spawn(async move { handler.handle(session).await });
    tokio::time::timeout(TIMEOUT, program.wait_started())
        .await
        .unwrap();

    assert!(client.resize(100, 30).await);
    tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

    assert_eq!(outer_builds.load(Ordering::SeqCst), 1);
    assert_eq!(inner_builds.load(Ordering::SeqCst), 1);
    assert_eq!(program.run_count(), 1);
    assert_eq!(program.window_sizes(), [WindowSize::new(100, 30)]);
    assert_eq!(program.kill_count(), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_claimed_feed_is_not_supervised_twice() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::UntilStopped);
    let handler = mock_middleware(&program, &builds).wrap(counting_next(&next_calls));

    let (session, _client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .build();
    let _claimed = session.window_changes();
    handler.handle(session).await;

    // Built but never started
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(program.run_count(), 0);
    assert_eq!(program.kill_count(), 0);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resizes_delivered_in_order() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::UntilStopped);
    let handler = mock_middleware(&program, &builds).wrap(counting_next(&next_calls));

    let (session, client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .build();
    let task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { handler.handle(session).await }
    });
    program.wait_started().await;

    let sizes: Vec<WindowSize> = (1..=10).map(|i| WindowSize::new(80 + i, 24 + i)).collect();
    for size in &sizes {
        assert!(client.resize(size.width, size.height).await);
    }
    tokio::time::timeout(TIMEOUT, program.wait_for_messages(sizes.len()))
        .await
        .unwrap();

    session.context().cancel();
    tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

    assert_eq!(program.window_sizes(), sizes);
    assert_eq!(program.late_sends(), 0);
    assert_eq!(program.kill_count(), 1);
    assert_eq!(program.quit_count(), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_program_exit_stops_relay() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::AfterMessages(2));
    let handler = mock_middleware(&program, &builds).wrap(counting_next(&next_calls));

    let (session, client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .build();
    let task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { handler.handle(session).await }
    });
    program.wait_started().await;

    assert!(client.resize(90, 30).await);
    assert!(client.resize(100, 40).await);
    tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

    // The relay is gone, so later resizes reach nobody
    assert!(!client.resize(120, 50).await);
    assert_eq!(program.window_sizes().len(), 2);
    assert_eq!(program.late_sends(), 0);
    assert_eq!(program.kill_count(), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_kill_after_error() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::Fail("boom".to_string()));
    let handler = mock_middleware(&program, &builds).wrap(counting_next(&next_calls));

    let (session, _client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .build();
    tokio::time::timeout(TIMEOUT, handler.handle(session))
        .await
        .unwrap();

    assert_eq!(program.run_count(), 1);
    assert_eq!(program.kill_count(), 1);
    assert_eq!(program.quit_count(), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_kill_after_panic() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::Panic("program blew up".to_string()));
    let registry = Arc::new(SessionRegistry::new());
    let handler = mock_middleware(&program, &builds)
        .registry(Arc::clone(&registry))
        .wrap(counting_next(&next_calls));

    let (session, _client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .build();
    tokio::time::timeout(TIMEOUT, handler.handle(session))
        .await
        .unwrap();

    assert_eq!(program.kill_count(), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.session_count(), 0);
}

#[tokio::test]
async fn test_external_cancellation_cleans_up() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::UntilStopped);
    let registry = Arc::new(SessionRegistry::new());
    let handler = mock_middleware(&program, &builds)
        .registry(Arc::clone(&registry))
        .wrap(counting_next(&next_calls));

    let (session, _client) = TestSession::builder()
        .pty("xterm-256color", WindowSize::new(80, 24))
        .build();
    let session_id = session.id();
    let task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { handler.handle(session).await }
    });
    program.wait_started().await;

    let info = registry.get(&session_id).unwrap();
    assert_eq!(info.phase, SessionPhase::Running);
    assert_eq!(info.profile, Some(ColorProfile::Ansi256));

    session.context().cancel();
    tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

    assert_eq!(program.quit_count(), 1);
    assert_eq!(program.kill_count(), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.session_count(), 0);
}

#[tokio::test]
async fn test_aborted_supervisor_still_kills() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::UntilStopped);
    let registry = Arc::new(SessionRegistry::new());
    let handler = mock_middleware(&program, &builds)
        .registry(Arc::clone(&registry))
        .wrap(counting_next(&next_calls));

    let (session, _client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .build();
    let task = tokio::spawn(async move { handler.handle(session).await });
    program.wait_started().await;

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(program.kill_count(), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 0);
    assert_eq!(registry.session_count(), 0);
}

#[tokio::test]
async fn test_session_limit_falls_through() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::UntilStopped);
    let registry = Arc::new(SessionRegistry::with_max_sessions(1));
    registry.register(SessionId::new()).unwrap();
    let handler = mock_middleware(&program, &builds)
        .registry(Arc::clone(&registry))
        .wrap(counting_next(&next_calls));

    let (session, client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .build();
    handler.handle(Arc::clone(&session) as Arc<dyn Session>).await;

    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
    assert!(client.output().contains("Too many active sessions"));
    assert_eq!(registry.session_count(), 1);
    assert!(!client.resize_feed_closed());
    assert!(session.window_changes().is_some());
}

#[tokio::test]
async fn test_broken_output_does_not_stop_startup() {
    let builds = Arc::new(AtomicUsize::new(0));
    let next_calls = Arc::new(AtomicUsize::new(0));
    let program = MockProgram::new(MockBehavior::Fail("done".to_string()));
    let handler = mock_middleware(&program, &builds)
        .color_profile(ColorProfile::Ascii)
        .wrap(counting_next(&next_calls));

    let (session, _client) = TestSession::builder()
        .pty("xterm-256color", WindowSize::new(80, 24))
        .broken_output()
        .build();
    handler.handle(session).await;

    assert_eq!(program.run_count(), 1);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
}

async fn wait_for_phase(registry: &SessionRegistry, id: SessionId, phase: SessionPhase) {
    tokio::time::timeout(TIMEOUT, async {
        while registry.get(&id).map(|info| info.phase) != Some(phase) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("session never reached {phase}"));
}

#[tokio::test]
async fn test_cancel_with_stalled_client_output() {
    let next_calls = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(SessionRegistry::new());
    let handler = ProgramMiddleware::new(ModelHandler::new(|_session: &Arc<dyn Session>| {
        Some((SizeView { size: None }, ProgramOptions::new()))
    }))
    .registry(Arc::clone(&registry))
    .wrap(counting_next(&next_calls));

    let (session, _client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .stalled_output()
        .build();
    let session_id = session.id();
    let task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { handler.handle(session).await }
    });
    wait_for_phase(&registry, session_id, SessionPhase::Running).await;

    session.context().cancel();
    tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.session_count(), 0);
}

#[tokio::test]
async fn test_cancel_during_stalled_color_warning() {
    let next_calls = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(SessionRegistry::new());
    let handler = ProgramMiddleware::new(ModelHandler::new(|_session: &Arc<dyn Session>| {
        Some((SizeView { size: None }, ProgramOptions::new()))
    }))
    .color_profile(ColorProfile::Ascii)
    .registry(Arc::clone(&registry))
    .wrap(counting_next(&next_calls));

    let (session, _client) = TestSession::builder()
        .pty("xterm-256color", WindowSize::new(80, 24))
        .stalled_output()
        .build();
    let session_id = session.id();
    let task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { handler.handle(session).await }
    });
    wait_for_phase(&registry, session_id, SessionPhase::Negotiating).await;

    session.context().cancel();
    tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

    assert_eq!(negotiated_profile(session.as_ref()), ColorProfile::Ascii);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.session_count(), 0);
}

/// Shows the last window size; quits on 'q'.
struct SizeView {
    size: Option<WindowSize>,
}

impl Model for SizeView {
    fn update(&mut self, msg: &Msg) -> Command {
        match msg {
            Msg::WindowSize(size) => {
                self.size = Some(*size);
                Command::None
            }
            Msg::Input(bytes) if bytes.contains(&b'q') => Command::Quit,
            _ => Command::None,
        }
    }

    fn view(&self) -> String {
        match self.size {
            Some(size) => format!("size={size}"),
            None => "size=unknown".to_string(),
        }
    }
}

#[tokio::test]
async fn test_downgrade_warning_then_program() {
    let next_calls = Arc::new(AtomicUsize::new(0));
    let seen_profile = Arc::new(Mutex::new(None));

    let handler = chain(
        counting_next(&next_calls),
        vec![middleware_with_color_profile(
            {
                let seen_profile = Arc::clone(&seen_profile);
                move |session: &Arc<dyn Session>| {
                    *seen_profile.lock().unwrap() = Some(negotiated_profile(session.as_ref()));
                    Some((SizeView { size: None }, ProgramOptions::new()))
                }
            },
            ColorProfile::Ansi,
        )],
    );

    let (session, mut client) = TestSession::builder()
        .pty("xterm-256color", WindowSize::new(80, 24))
        .env("COLORTERM", "truecolor")
        .build();
    let task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { handler.handle(session).await }
    });

    wait_for_output(|| client.output(), "size=80x24").await;
    assert!(client.resize(100, 30).await);
    wait_for_output(|| client.output(), "size=100x30").await;

    client.type_input(b"q").await;
    tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();

    let warning = "Warning: Client's terminal is \"TrueColor\", forcing \"ANSI\"\r\n";
    let output = client.output();
    assert!(output.starts_with(warning));
    assert_eq!(output.matches("Warning:").count(), 1);
    assert_eq!(*seen_profile.lock().unwrap(), Some(ColorProfile::Ansi));
    assert_eq!(negotiated_profile(session.as_ref()), ColorProfile::Ansi);
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_warning_within_ceiling() {
    let next_calls = Arc::new(AtomicUsize::new(0));
    let handler = chain(
        counting_next(&next_calls),
        vec![middleware_with_color_profile(
            |_session: &Arc<dyn Session>| Some((SizeView { size: None }, ProgramOptions::new())),
            ColorProfile::TrueColor,
        )],
    );

    let (session, mut client) = TestSession::builder()
        .pty("xterm", WindowSize::new(80, 24))
        .build();
    client.type_input(b"q").await;
    tokio::time::timeout(TIMEOUT, handler.handle(session))
        .await
        .unwrap();

    assert!(!client.output().contains("Warning:"));
    assert_eq!(next_calls.load(Ordering::SeqCst), 1);
}
