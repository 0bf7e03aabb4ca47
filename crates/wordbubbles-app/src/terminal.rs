//! Terminal renderer for the bubble simulation: a fixed-timestep event loop
//! that advances the engine, draws the bubble field as a glyph grid, and
//! forwards pause/speed/search/hit-test interactions back into the core.

use std::fs;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
};
use tracing::info;
use wordbubbles_core::{
    AnimationSpeed, COORD_MAX, Particle, SimulationLoop, SimulationSettings, TimeRange, Viewport,
};

use crate::sample;

const UI_TICK_MILLIS: u64 = 50;
const HEADLESS_FRAMES: usize = 120;
const HEADLESS_FRAME_MILLIS: u64 = 16;
/// Nominal pixel size of one terminal cell, used to derive the viewport the
/// responsive size table keys on.
const CELL_PX_W: f32 = 10.0;
const CELL_PX_H: f32 = 20.0;

pub fn run(sim: SimulationLoop, feed_path: Option<PathBuf>, time_range: TimeRange) -> Result<()> {
    if std::env::var_os("WORDBUBBLES_TERMINAL_HEADLESS").is_some() {
        return run_headless(sim);
    }

    let mut stdout = io::stdout();
    enable_raw_mode().context("failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to build terminal backend")?;
    terminal.hide_cursor().ok();

    let result = run_event_loop(&mut terminal, sim, feed_path, time_range);

    terminal.show_cursor().ok();
    if let Err(err) = disable_raw_mode() {
        tracing::error!(?err, "failed to disable raw mode");
    }
    if let Err(err) = execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    ) {
        tracing::error!(?err, "failed to leave alternate screen");
    }

    result
}

/// CI mode: advance a fixed frame budget without touching the terminal.
fn run_headless(mut sim: SimulationLoop) -> Result<()> {
    sim.start();
    let mut ticks = 0usize;
    for _ in 0..HEADLESS_FRAMES {
        std::thread::sleep(Duration::from_millis(HEADLESS_FRAME_MILLIS));
        ticks += sim.advance(Instant::now());
    }
    info!(
        frames = HEADLESS_FRAMES,
        ticks,
        final_tick = sim.engine().tick().0,
        particles = sim.engine().store().len(),
        "Headless run completed"
    );
    Ok(())
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    sim: SimulationLoop,
    feed_path: Option<PathBuf>,
    time_range: TimeRange,
) -> Result<()> {
    let mut app = BubbleApp::new(sim, feed_path, time_range);

    let size = terminal.size()?;
    app.apply_viewport(size.width, size.height);
    app.sim.start();

    loop {
        let now = Instant::now();
        app.sim.advance(now);

        if now.duration_since(app.last_draw) >= app.draw_interval {
            terminal.draw(|frame| app.draw(frame))?;
            app.last_draw = now;
        }

        let timeout = app
            .draw_interval
            .saturating_sub(Instant::now().duration_since(now));
        if event::poll(timeout).unwrap_or(false) {
            match event::read()? {
                Event::Key(key) => {
                    if app.handle_key(key) {
                        return Ok(());
                    }
                }
                Event::Mouse(mouse) => app.handle_mouse(mouse),
                Event::Resize(width, height) => app.apply_viewport(width, height),
                _ => {}
            }
        }
    }
}

struct BubbleApp {
    sim: SimulationLoop,
    feed_path: Option<PathBuf>,
    time_range: TimeRange,
    search: String,
    searching: bool,
    selected: Option<String>,
    /// Inner rect of the bubble field from the last draw, for mouse mapping.
    map_area: Rect,
    draw_interval: Duration,
    last_draw: Instant,
}

impl BubbleApp {
    fn new(sim: SimulationLoop, feed_path: Option<PathBuf>, time_range: TimeRange) -> Self {
        Self {
            sim,
            feed_path,
            time_range,
            search: String::new(),
            searching: false,
            selected: None,
            map_area: Rect::default(),
            draw_interval: Duration::from_millis(UI_TICK_MILLIS),
            last_draw: Instant::now(),
        }
    }

    /// Feed the terminal geometry to the responsive layout policy.
    fn apply_viewport(&mut self, cols: u16, rows: u16) {
        let viewport = Viewport {
            width: f32::from(cols) * CELL_PX_W,
            height: f32::from(rows) * CELL_PX_H,
        };
        let settings = self.sim.engine().settings().clone();
        self.sim.engine_mut().reconfigure(viewport, settings);
    }

    fn reconfigure_settings(&mut self, mutate: impl FnOnce(&mut SimulationSettings)) {
        let mut settings = self.sim.engine().settings().clone();
        mutate(&mut settings);
        let viewport = self.sim.engine().viewport();
        self.sim.engine_mut().reconfigure(viewport, settings);
    }

    fn reload_feed(&mut self) {
        let payload = match &self.feed_path {
            Some(path) => match fs::read_to_string(path) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(?err, path = %path.display(), "feed reload failed");
                    return;
                }
            },
            None => sample::payload(self.time_range).to_owned(),
        };
        self.sim.engine_mut().load_feed(&payload);
        self.selected = None;
    }

    /// Returns true when the app should quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if self.searching {
            match key.code {
                KeyCode::Esc => {
                    self.searching = false;
                    self.search.clear();
                }
                KeyCode::Enter => self.searching = false,
                KeyCode::Backspace => {
                    self.search.pop();
                }
                KeyCode::Char(c) => self.search.push(c),
                _ => {}
            }
            return false;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char(' ') => {
                if self.sim.is_running() {
                    self.sim.stop();
                } else {
                    self.sim.start();
                }
            }
            KeyCode::Char('n') => {
                self.sim.step_once();
            }
            KeyCode::Char('s') => {
                self.reconfigure_settings(|settings| {
                    settings.animation_speed = match settings.animation_speed {
                        AnimationSpeed::Slow => AnimationSpeed::Normal,
                        AnimationSpeed::Normal => AnimationSpeed::Fast,
                        AnimationSpeed::Fast => AnimationSpeed::Slow,
                    };
                });
            }
            KeyCode::Char('m') => {
                self.reconfigure_settings(|settings| {
                    settings.reduced_motion = !settings.reduced_motion;
                });
            }
            KeyCode::Char('c') => {
                self.reconfigure_settings(|settings| {
                    settings.collisions_enabled = !settings.collisions_enabled;
                });
            }
            KeyCode::Char('l') => {
                self.reconfigure_settings(|settings| {
                    settings.show_labels = !settings.show_labels;
                });
            }
            KeyCode::Char('t') => {
                if self.feed_path.is_none() {
                    self.time_range = self.time_range.cycled();
                    self.reload_feed();
                }
            }
            KeyCode::Char('r') => self.reload_feed(),
            KeyCode::Char('/') => {
                self.searching = true;
                self.search.clear();
            }
            _ => {}
        }
        false
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
            return;
        }
        let area = self.map_area;
        if area.width == 0
            || area.height == 0
            || mouse.column < area.x
            || mouse.column >= area.x + area.width
            || mouse.row < area.y
            || mouse.row >= area.y + area.height
        {
            return;
        }
        let px = (f32::from(mouse.column - area.x) + 0.5) / f32::from(area.width) * COORD_MAX;
        let py = (f32::from(mouse.row - area.y) + 0.5) / f32::from(area.height) * COORD_MAX;
        self.selected = self
            .sim
            .engine()
            .hit_test(px, py)
            .and_then(|id| self.sim.engine().store().get(id))
            .map(|particle| format!("{} ({})", particle.label, particle.count));
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(frame.area());

        self.draw_header(frame, outer[0]);
        self.draw_bubbles(frame, outer[1]);
        self.draw_footer(frame, outer[2]);
    }

    fn draw_header(&self, frame: &mut Frame<'_>, area: Rect) {
        let engine = self.sim.engine();
        let settings = engine.settings();
        let mut spans = vec![
            Span::styled(
                " wordbubbles ",
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "tick {} | {} bubbles | range {} | speed {:?}",
                engine.tick().0,
                engine.store().len(),
                self.time_range.label(),
                settings.animation_speed,
            )),
        ];
        if !self.sim.is_running() {
            spans.push(Span::styled(
                " PAUSED ",
                Style::default().fg(Color::Black).bg(Color::Yellow),
            ));
        }
        if settings.reduced_motion {
            spans.push(Span::styled(
                " REDUCED MOTION ",
                Style::default().fg(Color::Black).bg(Color::Cyan),
            ));
        }
        if let Some(selected) = &self.selected {
            spans.push(Span::raw(format!(" | selected: {selected}")));
        }
        let block = Block::default().borders(Borders::ALL);
        frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
    }

    fn draw_bubbles(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default().title("Flagged words").borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.map_area = inner;

        if inner.width < 2 || inner.height < 2 {
            return;
        }

        let width = inner.width as usize;
        let height = inner.height as usize;
        let mut grid: Vec<(char, Style)> = vec![(' ', Style::default()); width * height];

        let needle = self.search.to_lowercase();
        let show_labels = self.sim.engine().settings().show_labels;
        let bounds_max = wordbubbles_core::size_bounds(self.sim.engine().viewport().width).max;

        for particle in self.sim.engine().snapshot() {
            let matches = particle.label.to_lowercase().contains(needle.as_str());
            let x = (particle.position.x / COORD_MAX * width as f32)
                .floor()
                .clamp(0.0, (width - 1) as f32) as usize;
            let y = (particle.position.y / COORD_MAX * height as f32)
                .floor()
                .clamp(0.0, (height - 1) as f32) as usize;

            let style = if matches {
                Style::default().fg(hex_to_color(&particle.color))
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let glyph = bubble_glyph(&particle, bounds_max);
            grid[y * width + x] = (glyph, style);

            if show_labels && matches {
                stamp_label(&mut grid, width, height, x, y, &particle.label, style);
            }
        }

        let mut lines = Vec::with_capacity(height);
        for y in 0..height {
            let mut spans = Vec::with_capacity(width);
            for x in 0..width {
                let (ch, style) = grid[y * width + x];
                spans.push(Span::styled(ch.to_string(), style));
            }
            lines.push(Line::from(spans));
        }
        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }

    fn draw_footer(&self, frame: &mut Frame<'_>, area: Rect) {
        let text = if self.searching {
            format!("search: {}_  (Enter keep, Esc clear)", self.search)
        } else if self.search.is_empty() {
            "space pause | n step | s speed | m motion | c collide | l labels | t range | r reload | / search | q quit".to_owned()
        } else {
            format!(
                "filter \"{}\" ({} match) | / edit",
                self.search,
                self.sim.engine().filter_by_label(&self.search).len()
            )
        };
        let block = Block::default().borders(Borders::ALL);
        frame.render_widget(Paragraph::new(text).block(block), area);
    }
}

/// Glyph size follows the radius relative to the current size ceiling.
fn bubble_glyph(particle: &Particle, max_radius: f32) -> char {
    let ratio = (particle.radius / max_radius.max(1.0)).clamp(0.0, 1.0);
    if ratio >= 0.8 {
        '●'
    } else if ratio >= 0.5 {
        'o'
    } else {
        '·'
    }
}

/// Write the label to the right of the bubble when it fits on the row.
fn stamp_label(
    grid: &mut [(char, Style)],
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    label: &str,
    style: Style,
) {
    if y >= height {
        return;
    }
    let mut col = x + 2;
    for ch in label.chars() {
        if col >= width {
            break;
        }
        let cell = &mut grid[y * width + col];
        if cell.0 == ' ' {
            *cell = (ch, style);
        }
        col += 1;
    }
}

/// Parse `#rrggbb` into a terminal color, falling back to green.
fn hex_to_color(hex: &str) -> Color {
    let raw = hex.strip_prefix('#').unwrap_or(hex);
    if raw.len() != 6 || !raw.is_ascii() {
        return Color::Green;
    }
    let parse = |range: std::ops::Range<usize>| u8::from_str_radix(&raw[range], 16).ok();
    match (parse(0..2), parse(2..4), parse(4..6)) {
        (Some(r), Some(g), Some(b)) => Color::Rgb(r, g, b),
        _ => Color::Green,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing_handles_good_and_bad_input() {
        assert_eq!(hex_to_color("#4caf50"), Color::Rgb(0x4c, 0xaf, 0x50));
        assert_eq!(hex_to_color("not-a-color"), Color::Green);
    }

    #[test]
    fn glyphs_grow_with_radius() {
        let make = |radius: f32| Particle {
            label: "x".into(),
            count: 1.0,
            category: None,
            severity: None,
            position: wordbubbles_core::Vec2::default(),
            velocity: wordbubbles_core::Vec2::default(),
            radius,
            color: "#ffffff".into(),
        };
        assert_eq!(bubble_glyph(&make(100.0), 100.0), '●');
        assert_eq!(bubble_glyph(&make(60.0), 100.0), 'o');
        assert_eq!(bubble_glyph(&make(41.0), 100.0), '·');
    }
}
