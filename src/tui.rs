use crate::{AcquisitionController, PreviewFrame, RateMeter, SessionEvent, SessionState};
use anyhow::Result;
use crossbeam_channel::{tick, Receiver};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use log::{debug, info};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Stylize,
    symbols::border,
    text::{Line, Text},
    widgets::{Block, Paragraph, Widget},
    DefaultTerminal, Frame,
};
use std::path::PathBuf;
use std::time::Duration;

/// Terminal dashboard driving an [`AcquisitionController`].
pub struct Status {
    pub controller: AcquisitionController,
    events: Receiver<SessionEvent>,
    pub meter: RateMeter,
    pub current_file: Option<PathBuf>,
    pub files_sealed: usize,
    pub preview: Option<PreviewFrame>,
    pub message: String,
    shown_fault: Option<String>,
    exit: bool,
}

impl Status {
    pub fn new(controller: AcquisitionController, events: Receiver<SessionEvent>) -> Self {
        Self {
            controller,
            events,
            meter: RateMeter::default(),
            current_file: None,
            files_sealed: 0,
            preview: None,
            message: "Press <A> to arm".to_string(),
            shown_fault: None,
            exit: false,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        let ticker = tick(Duration::from_millis(250));

        while !self.exit {
            let _ = ticker.recv();

            while let Ok(ev) = self.events.try_recv() {
                self.apply_event(ev);
            }
            self.refresh();
            self.handle_events()?;

            terminal.draw(|f| self.draw(f))?;
        }

        if self.controller.state() == SessionState::Streaming {
            self.controller.stop()?;
        }
        Ok(())
    }

    /// Collect a run that ended on its own so the title and message follow it.
    pub fn refresh(&mut self) {
        let status = self.controller.status();
        if let Some(fault) = status.last_fault {
            if self.shown_fault.as_ref() != Some(&fault) {
                self.message = fault.clone();
                self.shown_fault = Some(fault);
            }
        }
    }

    pub fn apply_event(&mut self, ev: SessionEvent) {
        match ev {
            SessionEvent::StateChanged(state) => {
                if state == SessionState::Streaming {
                    self.meter.restart();
                    self.files_sealed = 0;
                    self.shown_fault = None;
                }
            }
            SessionEvent::FileOpened(path) => self.current_file = Some(path),
            SessionEvent::FileSealed(_) => self.files_sealed += 1,
            SessionEvent::ChunkWritten { bytes, .. } => self.meter.record(bytes),
            SessionEvent::Preview(frame) => self.preview = Some(frame),
            SessionEvent::Fault(msg) => self.message = msg,
        }
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                    self.handle_key_event(key_event)
                }
                _ => {}
            };
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) {
        match key_event.code {
            KeyCode::Char('q') => self.exit = true,
            KeyCode::Char('a') => self.arm(),
            KeyCode::Char('d') => {
                self.message = match self.controller.disarm() {
                    Ok(()) => "Disarmed".to_string(),
                    Err(e) => e.to_string(),
                };
            }
            KeyCode::Char('s') => self.toggle_streaming(),
            KeyCode::Char('w') => {
                let on = !self.controller.preview();
                self.controller.set_preview(on);
                if !on {
                    self.preview = None;
                }
            }
            _ => {}
        }
    }

    fn arm(&mut self) {
        self.message = match self.controller.arm() {
            Ok(p) => format!(
                "Armed: {} Hz, {} bit, {} samples",
                p.sample_rate, p.resolution_bits, p.record_length
            ),
            Err(e) => e.to_string(),
        };
    }

    fn toggle_streaming(&mut self) {
        let result = if self.controller.state() == SessionState::Streaming {
            self.controller.stop().map(|report| {
                format!(
                    "Stopped after {} chunks in {} file(s)",
                    report.chunks,
                    report.files.len()
                )
            })
        } else {
            self.controller.start().map(|_| "Streaming".to_string())
        };
        self.message = result.unwrap_or_else(|e| e.to_string());
        info!("{}", self.message);
    }
}

impl Widget for &Status {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let state = self.controller.state();
        let title = Line::from(format!(" Scope stream: {state} ").bold());
        let instructions = Line::from(vec![
            " Arm ".into(),
            "<A>".blue().bold(),
            " Disarm ".into(),
            "<D>".blue().bold(),
            " Start/Stop ".into(),
            "<S>".blue().bold(),
            " Watch ".into(),
            "<W>".blue().bold(),
            " Quit ".into(),
            "<Q> ".blue().bold(),
        ]);
        let block = Block::bordered()
            .title(title.centered())
            .title_bottom(instructions.centered())
            .border_set(border::THICK);

        let device = match self.controller.device_kind() {
            Some(kind) => format!("{:?}", kind.serials()),
            None => "none".to_string(),
        };
        let file = self
            .current_file
            .as_ref()
            .map_or_else(|| "-".to_string(), |p| p.display().to_string());

        let mut lines = vec![
            Line::from(vec![
                "Device: ".into(),
                device.yellow(),
                " Elapsed time: ".into(),
                self.meter.since.elapsed().as_secs().to_string().yellow(),
                " s".into(),
            ]),
            Line::from(vec!["File: ".into(), file.yellow()]),
            Line::from(vec![
                "Chunks: ".into(),
                self.meter.chunks_total.to_string().yellow(),
                " Files sealed: ".into(),
                self.files_sealed.to_string().yellow(),
                " Data rate: ".into(),
                format!("{:.2}", self.meter.recent_rate()).yellow(),
                " MB/s (mean ".into(),
                format!("{:.2}", self.meter.mean_rate()).yellow(),
                ")".into(),
            ]),
        ];
        if let Some(frame) = &self.preview {
            debug!("Rendering preview of chunk {}", frame.sequence_number);
            lines.extend(
                frame
                    .traces
                    .iter()
                    .map(|t| Line::from(t.range_label().green())),
            );
        }
        lines.push(Line::from(self.message.clone().italic()));

        Paragraph::new(Text::from(lines))
            .centered()
            .block(block)
            .render(area, buf);
    }
}
