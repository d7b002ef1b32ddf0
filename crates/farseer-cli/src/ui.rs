use farseer::engine::progress::{Progress, ProgressCallback};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    Log(String),
}

/// Owns the terminal while a command runs: progress events and log lines
/// arrive over one channel and are drawn by a single task.
pub struct UiManager {
    mp: Arc<MultiProgress>,
    state: PhaseState,
    event_receiver: mpsc::Receiver<UiEvent>,
    shutdown_receiver: watch::Receiver<bool>,
    _sentinel_bar: ProgressBar,
}

#[derive(Default)]
struct PhaseState {
    active_bar: Option<ProgressBar>,
    phase: String,
    started: Option<Instant>,
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, event_receiver) = mpsc::channel(1024);
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let mp = Arc::new(MultiProgress::new());
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        let _sentinel_bar = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            state: PhaseState::default(),
            event_receiver,
            shutdown_receiver,
            _sentinel_bar,
        };

        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.event_receiver.recv() => {
                    self.handle_event(event);
                }
                result = self.shutdown_receiver.changed() => {
                    if result.is_err() || *self.shutdown_receiver.borrow() {
                        break;
                    }
                }
            }
        }
        while let Ok(event) = self.event_receiver.try_recv() {
            self.handle_event(event);
        }
        if let Some(bar) = self.state.active_bar.take() {
            bar.finish_and_clear();
        }
        self._sentinel_bar.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => {
                self.mp.println(msg).ok();
            }
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }

                let pb = self.mp.add(ProgressBar::new_spinner());
                pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                pb.set_style(Self::spinner_style());
                pb.set_message(name.clone());

                self.state = PhaseState {
                    active_bar: Some(pb),
                    phase: name,
                    started: Some(Instant::now()),
                };
            }
            Progress::PhaseFinish => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }
                let elapsed = self
                    .state
                    .started
                    .take()
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or_default();
                self.mp
                    .println(format!("✓ {} ({elapsed:.1}s)", self.state.phase))
                    .ok();
                self.state.phase.clear();
            }
            Progress::TaskStart { total } => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.disable_steady_tick();
                    bar.set_style(Self::bar_style());
                    bar.set_length(total);
                    bar.set_position(0);
                }
            }
            Progress::TaskIncrement { amount } => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.inc(amount);
                }
            }
            Progress::TaskFinish => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    if let Some(len) = bar.length() {
                        bar.set_position(len);
                    }
                    bar.finish();
                }
            }
            Progress::StatusUpdate { text } => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.set_message(format!("{} ({})", self.state.phase, text));
                }
            }
            Progress::Message(msg) => {
                self.mp.println(format!("  {msg}")).ok();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<45} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
            })
            .progress_chars("━╸ ")
    }
}

#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<UiEvent>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let sender = self.sender.clone();
        Box::new(move |progress: Progress| {
            if let Err(e) = sender.try_send(UiEvent::Progress(progress)) {
                warn!("Failed to send progress update to UI channel: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_manager() -> UiManager {
        let (manager, _sender, _shutdown) = UiManager::new();
        manager.mp.set_draw_target(ProgressDrawTarget::hidden());
        manager
    }

    fn start(manager: &mut UiManager, name: &str) {
        manager.handle_event(UiEvent::Progress(Progress::PhaseStart { name: name.into() }));
    }

    #[test]
    fn phase_start_creates_spinner_and_records_phase() {
        let mut manager = setup_manager();
        assert!(manager.state.active_bar.is_none());

        start(&mut manager, "Reconciliation");

        let bar = manager.state.active_bar.as_ref().unwrap();
        assert_eq!(bar.message(), "Reconciliation");
        assert_eq!(manager.state.phase, "Reconciliation");
        assert!(manager.state.started.is_some());
    }

    #[test]
    fn phase_start_replaces_existing_bar() {
        let mut manager = setup_manager();
        start(&mut manager, "Validation");
        start(&mut manager, "Reconciliation");

        assert_eq!(manager.state.active_bar.as_ref().unwrap().message(), "Reconciliation");
        assert_eq!(manager.state.phase, "Reconciliation");
    }

    #[test]
    fn phase_finish_clears_state() {
        let mut manager = setup_manager();
        start(&mut manager, "Validation");

        manager.handle_event(UiEvent::Progress(Progress::PhaseFinish));

        assert!(manager.state.active_bar.is_none());
        assert!(manager.state.phase.is_empty());
        assert!(manager.state.started.is_none());
    }

    #[test]
    fn task_events_drive_the_bar() {
        let mut manager = setup_manager();
        start(&mut manager, "Backbone calculations");

        manager.handle_event(UiEvent::Progress(Progress::TaskStart { total: 12 }));
        {
            let bar = manager.state.active_bar.as_ref().unwrap();
            assert_eq!(bar.length(), Some(12));
            assert_eq!(bar.position(), 0);
        }

        manager.handle_event(UiEvent::Progress(Progress::TaskIncrement { amount: 5 }));
        assert_eq!(manager.state.active_bar.as_ref().unwrap().position(), 5);

        manager.handle_event(UiEvent::Progress(Progress::TaskFinish));
        let bar = manager.state.active_bar.as_ref().unwrap();
        assert!(bar.is_finished());
        assert_eq!(bar.position(), 12);
    }

    #[test]
    fn status_update_annotates_phase() {
        let mut manager = setup_manager();
        start(&mut manager, "Backbone calculations");

        manager.handle_event(UiEvent::Progress(Progress::StatusUpdate {
            text: "cond1_dia_wt".into(),
        }));

        let bar = manager.state.active_bar.as_ref().unwrap();
        assert_eq!(bar.message(), "Backbone calculations (cond1_dia_wt)");
    }

    #[test]
    fn log_and_message_events_print_without_a_phase() {
        let mut manager = setup_manager();
        manager.handle_event(UiEvent::Log("WARN residue 12 lost".to_string()));
        manager.handle_event(UiEvent::Progress(Progress::Message("wrote 40 tables".to_string())));
        assert!(manager.state.active_bar.is_none());
    }

    #[tokio::test]
    async fn progress_handler_forwards_events() {
        let (sender, mut receiver) = mpsc::channel(1);
        let handler = CliProgressHandler::new(sender);
        let callback = handler.get_callback();

        callback(Progress::PhaseStart {
            name: "Validation".into(),
        });

        match receiver.recv().await.unwrap() {
            UiEvent::Progress(Progress::PhaseStart { name }) => assert_eq!(name, "Validation"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
