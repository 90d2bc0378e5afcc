use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use engine_session::headless::{Call, HeadlessAudio, HeadlessDisplay, HeadlessWindow, Journal};
use engine_session::{
    Caveat, ConfigurationCandidate, DeviceError, Engine, EngineContext, EngineControl, EngineHost,
    EngineSession, EngineSetupError, Error, ExitStatus, GameEvent, InputEvent, InputEventType,
    ProgrammingError, RenderableTypes, ScalingOption, SessionConfig, SessionConfigRef, SessionPhase,
    ShaderKind, SurfaceChange, SurfaceTypes,
};

type Ctx<'a> = EngineContext<'a, HeadlessDisplay, HeadlessAudio>;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Pause(bool),
    TouchpadMode(bool),
    Zoning(bool),
    Save(i32, bool),
    Load(i32),
    AutoLoadSlot(i32),
    Input(InputEvent),
    Game(GameEvent),
    Bitmap(String, Vec<u8>),
    Shader(ShaderKind, Vec<u8>),
}

#[derive(Default)]
struct RecordingControl {
    commands: Mutex<Vec<Command>>,
    quit: AtomicBool,
}

impl RecordingControl {
    fn record(&self, command: Command) {
        self.commands.lock().unwrap().push(command);
    }

    fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }
}

impl EngineControl for RecordingControl {
    fn set_pause(&self, paused: bool) {
        self.record(Command::Pause(paused));
    }

    fn set_touchpad_mode(&self, enabled: bool) {
        self.record(Command::TouchpadMode(enabled));
    }

    fn enable_zoning(&self, enabled: bool) {
        self.record(Command::Zoning(enabled));
    }

    fn save_game(&self, slot: i32, force: bool) {
        self.record(Command::Save(slot, force));
    }

    fn load_game(&self, slot: i32) {
        self.record(Command::Load(slot));
    }

    fn check_load_conditions(&self) -> bool {
        true
    }

    fn set_auto_load_slot(&self, slot: i32) {
        self.record(Command::AutoLoadSlot(slot));
    }

    fn push_event(&self, event: InputEvent) {
        if event.kind == InputEventType::Quit {
            self.quit.store(true, Ordering::SeqCst);
        }
        self.record(Command::Input(event));
    }

    fn game_event(&self, event: GameEvent) {
        self.record(Command::Game(event));
    }

    fn add_bitmap_resource(&self, name: &str, bitmap: &[u8]) {
        self.record(Command::Bitmap(name.to_owned(), bitmap.to_vec()));
    }

    fn add_shader_source(&self, kind: ShaderKind, source: &[u8]) {
        self.record(Command::Shader(kind, source.to_vec()));
    }
}

#[derive(Debug, Default)]
struct Observed {
    created: bool,
    destroyed: bool,
    args: Vec<String>,
    sample_rate: u32,
    buffer_size: u32,
    chosen: Option<ConfigurationCandidate>,
    surface_size: (u32, u32),
    changes: Vec<SurfaceChange>,
}

enum Behavior {
    Exit(i32),
    RunUntilQuit,
    /// Only looks at surface changes once asked to quit
    PollOnQuit,
    ReportEvent(GameEvent),
    Panic,
}

struct TestEngine {
    control: Arc<RecordingControl>,
    observed: Arc<Mutex<Observed>>,
    behavior: Behavior,
}

impl TestEngine {
    fn new(behavior: Behavior) -> Self {
        Self {
            control: Arc::default(),
            observed: Arc::default(),
            behavior,
        }
    }
}

impl Engine<HeadlessDisplay, HeadlessAudio> for TestEngine {
    fn control(&self) -> Arc<dyn EngineControl> {
        self.control.clone()
    }

    fn create(&mut self, ctx: &mut Ctx<'_>) {
        let mut observed = self.observed.lock().unwrap();
        observed.created = true;
        observed.sample_rate = ctx.sample_rate();
        observed.buffer_size = ctx.buffer_size();
        observed.chosen = ctx.chosen_candidate().copied();
        observed.surface_size = ctx.surface_size();
    }

    fn run(&mut self, ctx: &mut Ctx<'_>) -> i32 {
        self.observed.lock().unwrap().args = ctx.args().to_vec();
        match self.behavior {
            Behavior::Exit(status) => status,
            Behavior::ReportEvent(event) => {
                ctx.host().on_game_event(event);
                0
            }
            Behavior::Panic => panic!("engine blew up"),
            Behavior::RunUntilQuit => {
                while !self.control.quit.load(Ordering::SeqCst) {
                    let observed = self.observed.clone();
                    let polled = ctx.poll_surface_events(|change| {
                        observed.lock().unwrap().changes.push(change);
                    });
                    if polled.is_err() {
                        return -1;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                0
            }
            Behavior::PollOnQuit => {
                while !self.control.quit.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
                let observed = self.observed.clone();
                let polled = ctx.poll_surface_events(|change| {
                    observed.lock().unwrap().changes.push(change);
                });
                if polled.is_err() {
                    return -1;
                }
                0
            }
        }
    }

    fn destroy(&mut self) {
        self.observed.lock().unwrap().destroyed = true;
    }
}

#[derive(Default)]
struct TestHost {
    messages: Mutex<Vec<String>>,
    events: Mutex<Vec<GameEvent>>,
}

impl EngineHost for TestHost {
    fn dpi(&self) -> (f32, f32) {
        (240.0, 240.0)
    }

    fn display_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_owned());
    }

    fn set_window_caption(&self, _caption: &str) {}

    fn plugin_directories(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn show_virtual_keyboard(&self, _visible: bool) {}

    fn on_game_event(&self, event: GameEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct Harness {
    journal: Journal,
    config: SessionConfigRef,
    host: Arc<TestHost>,
    session: EngineSession<HeadlessWindow>,
    completions: mpsc::Receiver<ExitStatus>,
}

impl Harness {
    fn new(config: SessionConfig) -> Self {
        init_logger();
        let config = SessionConfigRef::new(config);
        let host = Arc::new(TestHost::default());
        let mut session = EngineSession::new(config.clone(), host.clone());
        let (tx, completions) = mpsc::channel();
        session.set_on_completion_listener(move |status| {
            let _ = tx.send(status);
        });
        Self {
            journal: Journal::default(),
            config,
            host,
            session,
            completions,
        }
    }

    fn start(&mut self, display: HeadlessDisplay, audio: HeadlessAudio, engine: TestEngine) {
        self.session
            .start(display, audio, engine, vec!["scummvm".to_owned(), "--fullscreen".to_owned()])
            .unwrap();
    }

    fn start_default(&mut self, engine: TestEngine) {
        let display = HeadlessDisplay::new(self.journal.clone());
        let audio = HeadlessAudio::new(self.journal.clone());
        self.start(display, audio, engine);
    }

    fn wait_until_running(&self) {
        wait_for("the engine to run", || self.session.phase() == SessionPhase::Running);
    }

    fn join(&mut self) -> Result<ExitStatus, EngineSetupError> {
        self.session.join().expect("session was started")
    }
}

#[test]
fn setup_and_teardown_are_ordered() {
    let mut harness = Harness::new(SessionConfig::default());
    let engine = TestEngine::new(Behavior::Exit(0));
    let observed = engine.observed.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);

    assert_eq!(harness.join().unwrap(), ExitStatus::Exited(0));
    assert_eq!(
        harness.journal.calls(),
        vec![
            Call::QueryAudioCaps,
            Call::OpenAudioStream {
                sample_rate: 44100,
                buffer_size: 8192
            },
            Call::OpenDisplay,
            Call::QueryConfigs,
            Call::CreateContext {
                config_id: 3,
                api_version: 2
            },
            Call::BindWindow { window: 1 },
            Call::Unbind { surface: Some(1) },
            Call::DestroyContext,
            Call::TerminateDisplay,
            Call::CloseAudioStream,
        ]
    );

    let observed = observed.lock().unwrap();
    assert!(observed.created);
    assert!(observed.destroyed);
    assert_eq!(observed.args, vec!["scummvm", "--fullscreen"]);
    assert_eq!((observed.sample_rate, observed.buffer_size), (44100, 8192));
    assert_eq!(observed.surface_size, (800, 480));

    assert_eq!(harness.completions.try_recv(), Ok(ExitStatus::Exited(0)));
    assert_eq!(harness.session.phase(), SessionPhase::Completed);
}

#[test]
fn exit_status_is_reported_not_interpreted() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.start_default(TestEngine::new(Behavior::Exit(3)));
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);

    let status = harness.join().unwrap();
    assert_eq!(status, ExitStatus::Exited(3));
    assert!(!status.success());
    assert_eq!(harness.journal.calls().last(), Some(&Call::CloseAudioStream));
}

#[test]
fn audio_failure_never_opens_the_display() {
    let mut harness = Harness::new(SessionConfig::default());
    let engine = TestEngine::new(Behavior::Exit(0));
    let observed = engine.observed.clone();
    let display = HeadlessDisplay::new(harness.journal.clone());
    let audio = HeadlessAudio::new(harness.journal.clone()).fail_query();
    harness.start(display, audio, engine);

    let err = harness.join().unwrap_err();
    assert!(matches!(
        err,
        EngineSetupError::Audio(Error::Device(DeviceError::Audio(_)))
    ));
    assert_eq!(harness.journal.calls(), vec![Call::QueryAudioCaps]);
    assert!(!observed.lock().unwrap().created);
    assert_eq!(harness.session.phase(), SessionPhase::Failed);
    assert!(harness.completions.try_recv().is_err());
}

#[test]
fn uninitialized_audio_is_released_before_failing() {
    let mut harness = Harness::new(SessionConfig::default());
    let display = HeadlessDisplay::new(harness.journal.clone());
    let audio = HeadlessAudio::new(harness.journal.clone()).uninitialized(0);
    harness.start(display, audio, TestEngine::new(Behavior::Exit(0)));

    let err = harness.join().unwrap_err();
    assert!(matches!(
        err,
        EngineSetupError::Audio(Error::Device(DeviceError::AudioNotInitialized { state: 0 }))
    ));
    assert!(!harness.journal.contains(|call| *call == Call::OpenDisplay));
    assert_eq!(harness.journal.calls().last(), Some(&Call::CloseAudioStream));
}

#[test]
fn graphics_failure_releases_display_then_audio() {
    let mut harness = Harness::new(SessionConfig::default());
    let display = HeadlessDisplay::new(harness.journal.clone()).fail_create_context();
    let audio = HeadlessAudio::new(harness.journal.clone());
    harness.start(display, audio, TestEngine::new(Behavior::Exit(0)));

    let err = harness.join().unwrap_err();
    assert!(matches!(
        err,
        EngineSetupError::Graphics(Error::Device(DeviceError::Context(_)))
    ));
    let calls = harness.journal.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &[Call::TerminateDisplay, Call::CloseAudioStream]
    );
}

#[test]
fn surface_failure_tears_down_the_run() {
    let mut harness = Harness::new(SessionConfig::default());
    let display = HeadlessDisplay::new(harness.journal.clone()).fail_bind_window();
    let audio = HeadlessAudio::new(harness.journal.clone());
    let engine = TestEngine::new(Behavior::Exit(0));
    let observed = engine.observed.clone();
    harness.start(display, audio, engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(5), 800, 480);

    let err = harness.join().unwrap_err();
    assert!(matches!(
        err,
        EngineSetupError::Graphics(Error::Device(DeviceError::Surface(_)))
    ));
    assert!(!observed.lock().unwrap().created);
    assert_eq!(harness.journal.calls().last(), Some(&Call::CloseAudioStream));
}

#[test]
fn exact_fit_config_beats_richer_one() {
    let mut harness = Harness::new(SessionConfig::default());
    let usable = ConfigurationCandidate {
        surface_types: SurfaceTypes::WINDOW,
        renderable_types: RenderableTypes::OPENGL_ES2,
        caveat: Caveat::None,
        ..Default::default()
    };
    let rich = ConfigurationCandidate {
        id: 10,
        red_bits: 8,
        green_bits: 8,
        blue_bits: 8,
        alpha_bits: 8,
        depth_bits: 24,
        stencil_bits: 8,
        ..usable
    };
    let exact = ConfigurationCandidate {
        id: 20,
        red_bits: 5,
        green_bits: 6,
        blue_bits: 5,
        depth_bits: 16,
        ..usable
    };
    let display = HeadlessDisplay::new(harness.journal.clone()).with_candidates(vec![rich, exact]);
    let audio = HeadlessAudio::new(harness.journal.clone());
    let engine = TestEngine::new(Behavior::Exit(0));
    let observed = engine.observed.clone();
    harness.start(display, audio, engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);

    harness.join().unwrap();
    assert!(harness.journal.contains(|call| *call
        == Call::CreateContext {
            config_id: 20,
            api_version: 2
        }));
    assert_eq!(observed.lock().unwrap().chosen.map(|c| c.id), Some(20));
}

#[test]
fn worker_blocks_until_a_surface_is_published() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.start_default(TestEngine::new(Behavior::Exit(0)));

    wait_for("the context to be created", || {
        harness
            .journal
            .contains(|call| matches!(call, Call::CreateContext { .. }))
    });
    thread::sleep(Duration::from_millis(100));
    assert!(!harness.session.is_finished());
    assert_eq!(harness.session.phase(), SessionPhase::Starting);
    assert!(!harness
        .journal
        .contains(|call| matches!(call, Call::BindWindow { .. })));

    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(4), 1280, 720);
    assert_eq!(harness.join().unwrap(), ExitStatus::Exited(0));
    assert!(harness
        .journal
        .contains(|call| *call == Call::BindWindow { window: 4 }));
}

#[test]
fn aborting_startup_releases_the_waiting_worker() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.start_default(TestEngine::new(Behavior::Exit(0)));

    wait_for("the context to be created", || {
        harness
            .journal
            .contains(|call| matches!(call, Call::CreateContext { .. }))
    });
    harness.session.abort_startup();

    let err = harness.join().unwrap_err();
    assert!(matches!(err, EngineSetupError::SurfaceWaitCancelled));
    let calls = harness.journal.calls();
    assert_eq!(
        &calls[calls.len() - 4..],
        &[
            Call::Unbind { surface: None },
            Call::DestroyContext,
            Call::TerminateDisplay,
            Call::CloseAudioStream,
        ]
    );
    assert!(harness.completions.try_recv().is_err());
}

#[test]
fn commands_require_a_running_engine() {
    let mut harness = Harness::new(SessionConfig::default());
    assert_eq!(
        harness.session.set_pause(true),
        Err(Error::Programming(ProgrammingError::NotRunning {
            operation: "set_pause",
            phase: SessionPhase::Idle,
        }))
    );

    harness.start_default(TestEngine::new(Behavior::Exit(0)));
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.join().unwrap();

    assert_eq!(
        harness.session.save_game(1, true),
        Err(Error::Programming(ProgrammingError::NotRunning {
            operation: "save_game",
            phase: SessionPhase::Completed,
        }))
    );
    assert!(harness.session.check_load_conditions().is_err());
}

#[test]
fn starting_twice_is_rejected() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.start_default(TestEngine::new(Behavior::Exit(0)));

    let again = harness.session.start(
        HeadlessDisplay::new(harness.journal.clone()),
        HeadlessAudio::new(harness.journal.clone()),
        TestEngine::new(Behavior::Exit(0)),
        Vec::new(),
    );
    assert_eq!(again, Err(Error::Programming(ProgrammingError::AlreadyStarted)));

    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.join().unwrap();
    assert_eq!(
        harness
            .journal
            .calls()
            .iter()
            .filter(|call| **call == Call::OpenDisplay)
            .count(),
        1
    );
}

#[test]
fn commands_reach_the_running_engine() {
    let mut harness = Harness::new(SessionConfig {
        shader_tested: true,
        ..Default::default()
    });
    let engine = TestEngine::new(Behavior::RunUntilQuit);
    let control = engine.control.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.wait_until_running();

    let session = &harness.session;
    session.set_pause(true).unwrap();
    session.set_pause(false).unwrap();
    session.set_touchpad_mode(true).unwrap();
    session.enable_zoning(false).unwrap();
    session.save_game(2, false).unwrap();
    session.load_game(3).unwrap();
    session.set_auto_load_slot(4).unwrap();
    assert_eq!(session.check_load_conditions(), Ok(true));
    let tap = InputEvent::new(InputEventType::Tap, [100, 200, 0, 0, 0]);
    session.push_event(tap).unwrap();
    session.quit().unwrap();

    assert_eq!(harness.join().unwrap(), ExitStatus::Exited(0));
    assert_eq!(
        control.commands(),
        vec![
            Command::Pause(true),
            Command::Pause(false),
            Command::TouchpadMode(true),
            Command::Zoning(false),
            Command::Save(2, false),
            Command::Load(3),
            Command::AutoLoadSlot(4),
            Command::Input(tap),
            Command::Input(InputEvent::quit()),
        ]
    );
}

#[test]
fn surface_changes_are_applied_on_the_worker() {
    let mut harness = Harness::new(SessionConfig::default());
    let engine = TestEngine::new(Behavior::RunUntilQuit);
    let observed = engine.observed.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.wait_until_running();

    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(2), 1024, 600);
    wait_for("the resize to be applied", || {
        !observed.lock().unwrap().changes.is_empty()
    });
    harness.session.notify_surface_destroyed();
    wait_for("the destroy to be applied", || {
        observed.lock().unwrap().changes.len() == 2
    });
    harness.session.quit().unwrap();
    harness.join().unwrap();

    assert_eq!(
        observed.lock().unwrap().changes,
        vec![
            SurfaceChange::Resized {
                width: 1024,
                height: 600
            },
            SurfaceChange::Lost,
        ]
    );
    let calls = harness.journal.calls();
    let rebind = harness
        .journal
        .position(|call| *call == Call::BindWindow { window: 2 })
        .unwrap();
    assert_eq!(calls[rebind - 1], Call::Unbind { surface: Some(1) });
    assert_eq!(calls[rebind + 1], Call::Unbind { surface: Some(2) });
    // Nothing left to unbind at teardown
    assert_eq!(calls[rebind + 2], Call::Unbind { surface: None });
}

#[test]
fn restarting_suppresses_surface_teardown() {
    let mut harness = Harness::new(SessionConfig::default());
    let engine = TestEngine::new(Behavior::RunUntilQuit);
    let observed = engine.observed.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.wait_until_running();

    harness.session.set_restarting();
    harness.session.notify_surface_destroyed();
    thread::sleep(Duration::from_millis(50));
    harness.session.quit().unwrap();
    harness.join().unwrap();

    assert!(observed.lock().unwrap().changes.is_empty());
    let unbinds: Vec<Call> = harness
        .journal
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Unbind { .. }))
        .collect();
    // Only the final teardown unbinds, with the original surface still bound
    assert_eq!(unbinds, vec![Call::Unbind { surface: Some(1) }]);
}

#[test]
fn restarting_suppresses_surface_rebind() {
    let mut harness = Harness::new(SessionConfig::default());
    let engine = TestEngine::new(Behavior::RunUntilQuit);
    let observed = engine.observed.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.wait_until_running();

    harness.session.set_restarting();
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(2), 1024, 600);
    thread::sleep(Duration::from_millis(50));
    harness.session.quit().unwrap();
    harness.join().unwrap();

    assert!(observed.lock().unwrap().changes.is_empty());
    assert!(!harness
        .journal
        .contains(|call| *call == Call::BindWindow { window: 2 }));
    assert_eq!(
        harness
            .journal
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Unbind { .. }))
            .collect::<Vec<_>>(),
        vec![Call::Unbind { surface: Some(1) }]
    );
}

#[test]
fn destroy_queued_before_restarting_is_still_applied() {
    let mut harness = Harness::new(SessionConfig::default());
    let engine = TestEngine::new(Behavior::PollOnQuit);
    let observed = engine.observed.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.wait_until_running();

    // The engine hasn't polled yet when the restart begins
    harness.session.notify_surface_destroyed();
    harness.session.set_restarting();
    harness.session.quit().unwrap();
    harness.join().unwrap();

    assert_eq!(observed.lock().unwrap().changes, vec![SurfaceChange::Lost]);
    let unbinds: Vec<Call> = harness
        .journal
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Unbind { .. }))
        .collect();
    // The destroyed surface is released before teardown, which finds nothing bound
    assert_eq!(
        unbinds,
        vec![Call::Unbind { surface: Some(1) }, Call::Unbind { surface: None }]
    );
}

#[test]
fn portrait_surfaces_are_ignored_when_landscape_only() {
    let mut harness = Harness::new(SessionConfig {
        landscape_only: true,
        ..Default::default()
    });
    let engine = TestEngine::new(Behavior::Exit(0));
    let observed = engine.observed.clone();
    harness.start_default(engine);

    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 480, 800);
    thread::sleep(Duration::from_millis(50));
    assert!(!harness.session.is_finished());

    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(2), 800, 480);
    harness.join().unwrap();

    assert!(!harness
        .journal
        .contains(|call| *call == Call::BindWindow { window: 1 }));
    assert!(harness
        .journal
        .contains(|call| *call == Call::BindWindow { window: 2 }));
    assert_eq!(observed.lock().unwrap().surface_size, (800, 480));
}

#[test]
fn engine_panic_still_tears_down_in_order() {
    let mut harness = Harness::new(SessionConfig::default());
    let engine = TestEngine::new(Behavior::Panic);
    let observed = engine.observed.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);

    assert_eq!(harness.join().unwrap(), ExitStatus::Panicked);
    assert!(observed.lock().unwrap().destroyed);
    let calls = harness.journal.calls();
    assert_eq!(
        &calls[calls.len() - 4..],
        &[
            Call::Unbind { surface: Some(1) },
            Call::DestroyContext,
            Call::TerminateDisplay,
            Call::CloseAudioStream,
        ]
    );
    assert_eq!(harness.completions.try_recv(), Ok(ExitStatus::Panicked));
    assert_eq!(harness.session.phase(), SessionPhase::Completed);
}

fn temp_shader(name: &str, source: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("engine-session-{}-{name}", std::process::id()));
    std::fs::write(&path, source).unwrap();
    path
}

#[test]
fn engine_is_prepared_before_running() {
    let vertex = temp_shader("prepared.vert", "void main() {}");
    let mut harness = Harness::new(SessionConfig {
        ultra_mode_supported: true,
        shader_sources: vec![(ShaderKind::Vertex, vertex.clone())],
        ..Default::default()
    });
    let engine = TestEngine::new(Behavior::Exit(0));
    let control = engine.control.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.join().unwrap();
    let _ = std::fs::remove_file(vertex);

    assert_eq!(
        control.commands(),
        vec![
            Command::Game(GameEvent::ShouldTestShader),
            Command::Game(GameEvent::UseUltraMode),
            Command::Shader(ShaderKind::Vertex, b"void main() {}".to_vec()),
        ]
    );
    assert_eq!(harness.host.messages.lock().unwrap().len(), 1);
}

#[test]
fn bitmaps_are_handed_over_before_shaders() {
    let skip = temp_shader("skip.png", "png:skip");
    let cursor = temp_shader("cursor.png", "png:cursor");
    let fragment = temp_shader("bitmaps.frag", "void main() {}");
    let mut harness = Harness::new(SessionConfig {
        shader_tested: true,
        bitmap_resources: vec![
            ("skip.png".to_owned(), skip.clone()),
            ("cursor.png".to_owned(), cursor.clone()),
        ],
        shader_sources: vec![(ShaderKind::Fragment, fragment.clone())],
        ..Default::default()
    });
    let engine = TestEngine::new(Behavior::Exit(0));
    let control = engine.control.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.join().unwrap();
    for path in [skip, cursor, fragment] {
        let _ = std::fs::remove_file(path);
    }

    assert_eq!(
        control.commands(),
        vec![
            Command::Bitmap("skip.png".to_owned(), b"png:skip".to_vec()),
            Command::Bitmap("cursor.png".to_owned(), b"png:cursor".to_vec()),
            Command::Shader(ShaderKind::Fragment, b"void main() {}".to_vec()),
        ]
    );
}

#[test]
fn missing_bitmap_aborts_setup() {
    let missing = std::env::temp_dir().join("engine-session-does-not-exist.png");
    let mut harness = Harness::new(SessionConfig {
        bitmap_resources: vec![("menu.png".to_owned(), missing.clone())],
        ..Default::default()
    });
    let engine = TestEngine::new(Behavior::Exit(0));
    let observed = engine.observed.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);

    match harness.join() {
        Err(EngineSetupError::Assets { path, .. }) => assert_eq!(path, missing),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!observed.lock().unwrap().created);
    assert_eq!(harness.session.phase(), SessionPhase::Failed);
    assert_eq!(harness.journal.calls().last(), Some(&Call::CloseAudioStream));
}

#[test]
fn tested_shader_and_soft_scaling_skip_preparation() {
    let mut harness = Harness::new(SessionConfig {
        scaling_option: ScalingOption::Soft,
        ultra_mode_supported: true,
        ..Default::default()
    });
    let engine = TestEngine::new(Behavior::Exit(0));
    let control = engine.control.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.join().unwrap();

    assert!(control.commands().is_empty());
    assert!(harness.host.messages.lock().unwrap().is_empty());
}

#[test]
fn missing_shader_source_aborts_setup() {
    let missing = std::env::temp_dir().join("engine-session-does-not-exist.frag");
    let mut harness = Harness::new(SessionConfig {
        shader_sources: vec![(ShaderKind::Fragment, missing.clone())],
        ..Default::default()
    });
    let engine = TestEngine::new(Behavior::Exit(0));
    let observed = engine.observed.clone();
    harness.start_default(engine);
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);

    match harness.join() {
        Err(EngineSetupError::Assets { path, .. }) => assert_eq!(path, missing),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!observed.lock().unwrap().created);
    let calls = harness.journal.calls();
    assert_eq!(
        &calls[calls.len() - 4..],
        &[
            Call::Unbind { surface: Some(1) },
            Call::DestroyContext,
            Call::TerminateDisplay,
            Call::CloseAudioStream,
        ]
    );
}

#[test]
fn engine_fallback_is_recorded_in_config() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.start_default(TestEngine::new(Behavior::ReportEvent(GameEvent::ScalerFallback)));
    harness
        .session
        .notify_surface_changed(HeadlessWindow::new(1), 800, 480);
    harness.join().unwrap();

    assert_eq!(harness.config.scaling_option(), ScalingOption::Soft);
    assert!(harness.config.shader_tested());
    assert_eq!(
        *harness.host.events.lock().unwrap(),
        vec![GameEvent::ScalerFallback]
    );
}
