use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::TryRecvError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::app::{CancelToken, ProgressEvent, ProgressSink};
use crate::error::KiraError;
use crate::summary::Tally;

const EVENTS_MAX: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Discover,
    Process,
    Done,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Discover => "Discover",
            Phase::Process => "Process",
            Phase::Done => "Done",
        }
    }
}

#[derive(Debug)]
struct ViewState {
    phase: Phase,
    status: String,
    tally: Tally,
    events: VecDeque<String>,
    started: Instant,
    stopping: bool,
}

impl ViewState {
    fn new() -> Self {
        Self {
            phase: Phase::Discover,
            status: "starting".to_string(),
            tally: Tally::default(),
            events: VecDeque::new(),
            started: Instant::now(),
            stopping: false,
        }
    }
}

pub struct Tui {
    state: Arc<Mutex<ViewState>>,
    cancel: CancelToken,
}

struct TuiProgress {
    state: Arc<Mutex<ViewState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            match parse_phase(&message) {
                Some(("Discover", payload)) => {
                    state.phase = Phase::Discover;
                    state.status = payload.to_string();
                }
                Some(("Done", payload)) => {
                    state.phase = Phase::Done;
                    state.status = payload.to_string();
                }
                Some((_, payload)) => {
                    state.phase = Phase::Process;
                    if !state.stopping {
                        state.status = payload.to_string();
                    }
                }
                None => state.status = message.clone(),
            }
            if let Some(tally) = event.tally {
                state.tally = tally;
            }
            push_event(
                &mut state.events,
                format!("[{}] {message}", Local::now().format("%H:%M:%S")),
            );
        }
    }
}

impl Tui {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            state: Arc::new(Mutex::new(ViewState::new())),
            cancel,
        }
    }

    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, KiraError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        let result = loop {
            if let Ok(state) = self.state.lock() {
                let drawn = terminal.draw(|frame| draw_ui(frame, &state, tick));
                if let Err(err) = drawn {
                    drop(state);
                    restore_terminal()?;
                    return Err(err).into_diagnostic();
                }
            }

            match rx.try_recv() {
                Ok(result) => break result,
                Err(TryRecvError::Disconnected) => {
                    restore_terminal()?;
                    return Err(miette::Report::msg("run stopped unexpectedly"));
                }
                Err(TryRecvError::Empty) => {}
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    self.handle_key(key);
                }
            }

            tick = tick.wrapping_add(1);
        };

        restore_terminal()?;
        handle.join().ok();
        result.map_err(miette::Report::new)
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let stop = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => true,
            KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
            _ => false,
        };
        if !stop {
            return;
        }
        self.cancel.cancel();
        if let Ok(mut state) = self.state.lock() {
            if !state.stopping {
                state.stopping = true;
                state.status = "stopping: waiting for in-flight groups".to_string();
            }
        }
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout().execute(LeaveAlternateScreen).into_diagnostic()?;
    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, state: &ViewState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(4),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let hb = if tick % 2 == 0 { "*" } else { " " };
    let phase_color = match (state.phase, state.stopping) {
        (Phase::Done, _) => Color::Green,
        (_, true) => Color::Yellow,
        _ => Color::Cyan,
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "KIRA-SRA",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Phase: "),
        Span::styled(state.phase.label(), Style::default().fg(phase_color)),
        Span::raw(format!("   Elapsed: {}   ", format_elapsed(state.started.elapsed()))),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]))
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, chunks[0]);

    let tally = state.tally;
    let ratio = if tally.groups_total == 0 {
        0.0
    } else {
        (tally.groups_done as f64 / tally.groups_total as f64).clamp(0.0, 1.0)
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" groups "))
        .gauge_style(Style::default().fg(phase_color))
        .ratio(ratio)
        .label(format!("{}/{}", tally.groups_done, tally.groups_total));
    frame.render_widget(gauge, chunks[1]);

    let counters = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Status:   ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
        Line::from(vec![
            Span::styled("Accepted: ", Style::default().fg(Color::Gray)),
            Span::styled(tally.accepted.to_string(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::styled("Rejected: ", Style::default().fg(Color::Gray)),
            Span::styled(tally.rejected.to_string(), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::styled("Errors:   ", Style::default().fg(Color::Gray)),
            Span::styled(tally.errors.to_string(), Style::default().fg(Color::Red)),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title(" run "));
    frame.render_widget(counters, chunks[2]);

    let events: Vec<Line> = state
        .events
        .iter()
        .map(|event| Line::from(Span::styled(event.clone(), Style::default().fg(Color::Gray))))
        .collect();
    let events = Paragraph::new(events)
        .block(Block::default().borders(Borders::ALL).title(" events "))
        .wrap(Wrap { trim: true });
    frame.render_widget(events, chunks[3]);

    let footer = Paragraph::new(Line::from(Span::styled(
        "q / Esc / Ctrl-C: stop after in-flight groups",
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(footer, chunks[4]);
}

fn parse_phase(message: &str) -> Option<(&str, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (phase, payload) = rest.split_once(';')?;
    Some((phase.trim(), payload.trim()))
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
