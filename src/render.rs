/// file: src/render.rs
/// description: render targets for dashboard views; the terminal redraw and an in-memory capture
use crate::{
    alerts::{Alert, AlertBoard},
    formatter::{Colors, OutputFormat, ViewFormatter},
    pipeline::DashboardView,
};
use chrono::Utc;
use std::{
    io::{self, Stdout, Write},
    time::Duration,
};
use tokio::time::Instant;
use tracing::warn;

/// Sink for render passes. Every pass is a full replacement of the previous one.
pub trait Renderer {
    fn render(&mut self, view: &DashboardView);

    fn alert(&mut self, _alert: &Alert) {}

    fn status(&mut self, _status: &str, _message: &str) {}

    /// Earliest moment an on-screen alert should disappear.
    fn next_expiry(&self) -> Option<Instant> {
        None
    }

    /// Drops alerts whose time is up and returns how many went.
    fn dismiss_expired(&mut self, _now: Instant) -> usize {
        0
    }
}

/// Keeps every frame, alert and status line in memory.
#[derive(Debug, Default)]
pub struct CaptureRenderer {
    pub frames: Vec<DashboardView>,
    pub alerts: Vec<Alert>,
    pub statuses: Vec<(String, String)>,
}

impl CaptureRenderer {
    pub fn last_frame(&self) -> Option<&DashboardView> {
        self.frames.last()
    }
}

impl Renderer for CaptureRenderer {
    fn render(&mut self, view: &DashboardView) {
        self.frames.push(view.clone());
    }

    fn alert(&mut self, alert: &Alert) {
        self.alerts.push(alert.clone());
    }

    fn status(&mut self, status: &str, message: &str) {
        self.statuses.push((status.to_string(), message.to_string()));
    }
}

pub struct TerminalRenderer<W: Write = Stdout> {
    out: W,
    formatter: ViewFormatter,
    board: AlertBoard,
    status_line: Option<String>,
    quiet: bool,
    clear_screen: bool,
}

impl TerminalRenderer<Stdout> {
    pub fn stdout(format: OutputFormat, colored: bool, quiet: bool, alert_ttl: Duration) -> Self {
        let mut renderer = Self::new(io::stdout(), ViewFormatter::new(format, colored), alert_ttl);
        renderer.quiet = quiet;
        renderer.clear_screen = colored && format == OutputFormat::Table;
        renderer
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, formatter: ViewFormatter, alert_ttl: Duration) -> Self {
        Self {
            out,
            formatter,
            board: AlertBoard::new(alert_ttl),
            status_line: None,
            quiet: false,
            clear_screen: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn board(&self) -> &AlertBoard {
        &self.board
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    fn is_table(&self) -> bool {
        self.formatter.format() == OutputFormat::Table
    }

    fn write_frame(&mut self, view: &DashboardView) -> io::Result<()> {
        let frame = self.formatter.format_view(view, Utc::now());

        if !self.is_table() {
            self.out.write_all(frame.as_bytes())?;
            return self.out.flush();
        }

        if self.clear_screen {
            self.out.write_all(Colors::CLEAR_SCREEN.as_bytes())?;
        }
        if let Some(status) = &self.status_line {
            writeln!(self.out, "{}", status)?;
        }
        for alert in self.board.active() {
            writeln!(self.out, "{}", self.formatter.format_alert(alert))?;
        }
        self.out.write_all(frame.as_bytes())?;
        self.out.flush()
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render(&mut self, view: &DashboardView) {
        self.board.prune(Instant::now());
        if let Err(e) = self.write_frame(view) {
            warn!("Failed to write dashboard frame: {}", e);
        }
    }

    fn alert(&mut self, alert: &Alert) {
        self.board.push(alert.clone(), Instant::now());
        // csv/json/minimal stdout stays machine readable
        if !self.is_table() {
            eprintln!("{}", self.formatter.format_alert(alert));
        }
    }

    fn status(&mut self, status: &str, message: &str) {
        if self.quiet && status != "ERROR" {
            return;
        }

        let line = self.formatter.format_status(status, message);
        if self.is_table() {
            let written = writeln!(self.out, "{}", line).and_then(|_| self.out.flush());
            if let Err(e) = written {
                warn!("Failed to write status line: {}", e);
            }
            self.status_line = Some(line);
        } else {
            eprintln!("{}", line);
        }
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.board.next_expiry()
    }

    fn dismiss_expired(&mut self, now: Instant) -> usize {
        self.board.prune(now)
    }
}
