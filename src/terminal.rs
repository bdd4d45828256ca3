// SPDX-License-Identifier: GPL-3.0-only

//! Terminal front-end
//!
//! Two screens on top of the [`Launcher`] model: the launcher itself, showing
//! the last scanned value and any notice, and the scan screen, rendering the
//! live preview with Unicode half-block characters. The permission rationale
//! is shown as a dialog over the scan screen.

use crate::backends::camera::{CameraFrame, PixelFormat, PreviewReceiver, PreviewSurface};
use crate::backends::permission::{RationaleChoice, RationalePrompt};
use crate::constants::timing;
use crate::fl;
use crate::launcher::{Launcher, SessionFactory};
use crate::scanner::{ScanStatus, SessionState};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Text},
    widgets::{Block, Clear, Paragraph, Widget, Wrap},
};
use std::io::{self, stdout};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Run the terminal scanner until the user quits
pub fn run(factory: SessionFactory) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("scanner-worker")
        .build()?;

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = TerminalApp::new(factory, &runtime);
    let result = app.run_loop(&mut terminal);
    app.shutdown();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Rationale prompt answered from the terminal UI thread
///
/// The session sends a responder; the UI shows the dialog and answers through
/// it. A dropped responder or a closed UI counts as a decline.
#[derive(Debug, Clone)]
pub struct TerminalPrompt {
    requests: mpsc::UnboundedSender<oneshot::Sender<RationaleChoice>>,
}

impl TerminalPrompt {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<oneshot::Sender<RationaleChoice>>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (Self { requests }, rx)
    }
}

impl RationalePrompt for TerminalPrompt {
    async fn explain(&self) -> RationaleChoice {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(tx).is_err() {
            return RationaleChoice::Decline;
        }
        rx.await.unwrap_or(RationaleChoice::Decline)
    }
}

struct TerminalApp<'rt> {
    runtime: &'rt Runtime,
    factory: SessionFactory,
    launcher: Launcher,
    prompt: TerminalPrompt,
    prompt_requests: mpsc::UnboundedReceiver<oneshot::Sender<RationaleChoice>>,
    rationale: Option<oneshot::Sender<RationaleChoice>>,
    preview: Option<PreviewReceiver>,
    mirror: bool,
}

impl<'rt> TerminalApp<'rt> {
    fn new(factory: SessionFactory, runtime: &'rt Runtime) -> Self {
        let (prompt, prompt_requests) = TerminalPrompt::channel();
        let mirror = factory.config().mirror_preview;
        Self {
            runtime,
            factory,
            launcher: Launcher::new(),
            prompt,
            prompt_requests,
            rationale: None,
            preview: None,
            mirror,
        }
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            self.poll_session();

            terminal.draw(|f| self.render(f.area(), f.buffer_mut()))?;

            if event::poll(timing::UI_POLL_INTERVAL)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
                && self.handle_key(key) == Flow::Quit
            {
                break;
            }
        }

        Ok(())
    }

    fn poll_session(&mut self) {
        while let Ok(responder) = self.prompt_requests.try_recv() {
            self.rationale = Some(responder);
        }

        if let Some(status) = self.launcher.poll() {
            info!(%status, "Scan finished");
            self.rationale = None;
            self.preview = None;
        }
    }

    fn start_scan(&mut self) {
        let (surface, receiver) = PreviewSurface::channel();
        let _guard = self.runtime.enter();
        let prompt = self.prompt.clone();
        let factory = &self.factory;
        if self.launcher.activate(|| factory.start(prompt, Some(surface))) {
            self.preview = Some(receiver);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Flow::Quit;
        }

        if let Some(responder) = self.rationale.take() {
            let choice = match key.code {
                KeyCode::Char('y') | KeyCode::Enter => RationaleChoice::Continue,
                KeyCode::Char('n') | KeyCode::Esc => RationaleChoice::Decline,
                _ => {
                    self.rationale = Some(responder);
                    return Flow::Continue;
                }
            };
            debug!(?choice, "Rationale answered");
            let _ = responder.send(choice);
            return Flow::Continue;
        }

        if self.launcher.is_scanning() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Backspace) {
                self.launcher.cancel_scan();
            }
            return Flow::Continue;
        }

        match key.code {
            KeyCode::Enter | KeyCode::Char(' ') => self.start_scan(),
            KeyCode::Char('q') => return Flow::Quit,
            _ => {}
        }
        Flow::Continue
    }

    /// Cancel a running session and wait for the camera to be released
    fn shutdown(&mut self) {
        if !self.launcher.is_scanning() {
            return;
        }
        self.rationale = None;
        self.launcher.cancel_scan();
        let wait = Duration::from_secs(timing::STOP_TIMEOUT_SECS);
        let launcher = &mut self.launcher;
        let finished = self
            .runtime
            .block_on(async { tokio::time::timeout(wait, launcher.wait()).await });
        match finished {
            Ok(status) => debug!(?status, "Session finished on quit"),
            Err(_) => warn!("Session did not finish before quitting"),
        }
    }

    fn render(&self, area: Rect, buf: &mut Buffer) {
        let [main, status_area] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(area);

        if self.launcher.is_scanning() {
            let state = self.launcher.session_state();
            let [label_area, camera_area] =
                Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(main);

            Paragraph::new(state_label(state))
                .alignment(Alignment::Center)
                .style(Style::default().add_modifier(Modifier::BOLD))
                .render(label_area, buf);

            let frame = self.preview.as_ref().and_then(|rx| rx.borrow().clone());
            FrameWidget::new(frame, self.mirror).render(camera_area, buf);

            StatusBar {
                message: &fl!("scan-help"),
            }
            .render(status_area, buf);

            if self.rationale.is_some() {
                render_rationale(main, buf);
            }
        } else {
            self.render_launcher(main, buf);
            StatusBar {
                message: &fl!("launcher-help"),
            }
            .render(status_area, buf);
        }
    }

    fn render_launcher(&self, area: Rect, buf: &mut Buffer) {
        let mut lines = vec![
            Line::styled(fl!("app-title"), Style::default().add_modifier(Modifier::BOLD)),
            Line::default(),
        ];

        match (self.launcher.displayed_value(), self.launcher.displayed_type()) {
            (Some(value), Some(value_type)) => {
                lines.push(Line::from(format!("{}:", fl!("launcher-last-value"))));
                lines.push(Line::styled(
                    value.to_string(),
                    Style::default().fg(Color::Cyan),
                ));
                lines.push(Line::from(format!(
                    "{}: {}",
                    fl!("launcher-value-type"),
                    value_type.label()
                )));
            }
            _ => lines.push(Line::from(fl!("launcher-no-value"))),
        }

        lines.push(Line::default());
        lines.push(Line::from(fl!("launcher-scan-action")));

        if let Some(notice) = self.launcher.notice(Instant::now()) {
            lines.push(Line::default());
            lines.push(Line::styled(
                notice.to_string(),
                Style::default().fg(Color::Black).bg(Color::Yellow),
            ));
        }

        let height = (lines.len() as u16).min(area.height);
        let y = area.y + area.height.saturating_sub(height) / 2;
        Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false })
            .render(
                Rect {
                    x: area.x,
                    y,
                    width: area.width,
                    height: area.height.saturating_sub(y - area.y),
                },
                buf,
            );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn state_label(state: Option<SessionState>) -> String {
    match state {
        Some(SessionState::RequestingPermission) => fl!("scan-state-requesting-permission"),
        Some(SessionState::CapturingPreview) | None => fl!("scan-state-capturing-preview"),
        Some(SessionState::AnalyzingFrames) => fl!("scan-state-analyzing"),
        Some(SessionState::Resolved(ScanStatus::Error)) => fl!("scan-failed"),
        Some(SessionState::Resolved(_)) => fl!("scan-state-resolved"),
    }
}

fn render_rationale(area: Rect, buf: &mut Buffer) {
    let width = area.width.min(60);
    let height = area.height.min(8);
    let dialog = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };

    Clear.render(dialog, buf);
    let text = Text::from(vec![
        Line::from(fl!("app-needs-camera-permission")),
        Line::default(),
        Line::styled(
            fl!("rationale-choices"),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ]);
    Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(Block::bordered().title(fl!("camera-permission-needed")))
        .render(dialog, buf);
}

/// Widget that renders a camera frame using half-block characters
struct FrameWidget {
    frame: Option<CameraFrame>,
    mirror: bool,
}

impl FrameWidget {
    fn new(frame: Option<CameraFrame>, mirror: bool) -> Self {
        Self { frame, mirror }
    }
}

impl Widget for FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.filter(|f| f.width > 0 && f.height > 0) else {
            let msg = fl!("waiting-for-camera");
            let x = area.x + area.width.saturating_sub(msg.chars().count() as u16) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };
        if area.width == 0 || area.height == 0 {
            return;
        }

        // Each cell shows two vertical pixels
        let frame_aspect = frame.width as f64 / frame.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height as u32 * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            ((term_height * frame_aspect) as u16, area.height)
        } else {
            (area.width, ((term_width / frame_aspect) / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width - display_width) / 2;
        let y_offset = area.y + (area.height - display_height) / 2;
        let x_scale = frame.width as f64 / display_width as f64;
        let y_scale = frame.height as f64 / (display_height as u32 * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let column = if self.mirror {
                    display_width - 1 - tx
                } else {
                    tx
                };
                let src_x = (column as f64 * x_scale) as u32;
                let src_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let (r, g, b) = sample_pixel_rgb(&frame, src_x, src_top);
                let top = Color::Rgb(r, g, b);
                let (r, g, b) = sample_pixel_rgb(&frame, src_x, src_bottom);
                let bottom = Color::Rgb(r, g, b);

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(top);
                    cell.set_bg(bottom);
                }
            }
        }
    }
}

fn sample_pixel_rgb(frame: &CameraFrame, x: u32, y: u32) -> (u8, u8, u8) {
    let Some(row) = frame.row(y.min(frame.height.saturating_sub(1))) else {
        return (0, 0, 0);
    };
    let bpp = frame.format.bytes_per_pixel() as usize;
    let i = x.min(frame.width.saturating_sub(1)) as usize * bpp;

    let pixel = match frame.format {
        PixelFormat::RGBA | PixelFormat::RGB24 => row.get(i..i + 3).map(|p| (p[0], p[1], p[2])),
        PixelFormat::BGRA => row.get(i..i + 3).map(|p| (p[2], p[1], p[0])),
        PixelFormat::Gray8 => row.get(i).map(|&v| (v, v, v)),
    };
    pixel.unwrap_or((0, 0, 0))
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = Style::default().fg(Color::White).bg(Color::DarkGray);
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }
        buf.set_stringn(area.x, area.y, self.message, area.width as usize, style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_pixel_formats() {
        let rgba = CameraFrame::packed(1, 1, PixelFormat::RGBA, vec![10, 20, 30, 255]);
        assert_eq!(sample_pixel_rgb(&rgba, 0, 0), (10, 20, 30));

        let bgra = CameraFrame::packed(1, 1, PixelFormat::BGRA, vec![10, 20, 30, 255]);
        assert_eq!(sample_pixel_rgb(&bgra, 0, 0), (30, 20, 10));

        let gray = CameraFrame::packed(2, 1, PixelFormat::Gray8, vec![5, 9]);
        assert_eq!(sample_pixel_rgb(&gray, 1, 0), (9, 9, 9));
        // Out of range coordinates clamp to the edge
        assert_eq!(sample_pixel_rgb(&gray, 7, 3), (9, 9, 9));
    }

    #[test]
    fn test_frame_widget_mirrors() {
        // Left pixel red, right pixel blue, two rows
        let data = vec![
            255, 0, 0, 255, 0, 0, 255, 255, //
            255, 0, 0, 255, 0, 0, 255, 255,
        ];
        let frame = CameraFrame::packed(2, 2, PixelFormat::RGBA, data);
        let area = Rect::new(0, 0, 2, 1);

        let mut buf = Buffer::empty(area);
        FrameWidget::new(Some(frame.clone()), false).render(area, &mut buf);
        assert_eq!(buf[(0, 0)].fg, Color::Rgb(255, 0, 0));

        let mut buf = Buffer::empty(area);
        FrameWidget::new(Some(frame), true).render(area, &mut buf);
        assert_eq!(buf[(0, 0)].fg, Color::Rgb(0, 0, 255));
    }

    #[tokio::test]
    async fn test_prompt_without_ui_declines() {
        let (prompt, rx) = TerminalPrompt::channel();
        drop(rx);
        assert_eq!(prompt.explain().await, RationaleChoice::Decline);
    }

    #[tokio::test]
    async fn test_prompt_forwards_answer() {
        let (prompt, mut rx) = TerminalPrompt::channel();
        let answer = tokio::spawn(async move { prompt.explain().await });
        let responder = rx.recv().await.expect("rationale request");
        responder.send(RationaleChoice::Continue).expect("prompt waiting");
        assert_eq!(answer.await.expect("join"), RationaleChoice::Continue);
    }
}
