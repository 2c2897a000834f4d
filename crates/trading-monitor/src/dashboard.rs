//! TUI Dashboard using ratatui.

use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use rust_decimal::Decimal;
use std::io;
use std::time::Duration;
use tracing::debug;
use trading_core::types::{GateStatus, SessionPhase, VerificationReport};
use trading_engine::EngineStatus;

/// TUI Dashboard over engine status snapshots.
pub struct Dashboard {
    refresh_ms: u64,
}

impl Dashboard {
    /// Create a new dashboard.
    pub fn new(refresh_ms: u64) -> Self {
        Self { refresh_ms }
    }

    /// Run until 'q', Esc or Ctrl-C is pressed. Blocks the calling thread.
    pub fn run<F>(&self, mut get_status: F) -> io::Result<()>
    where
        F: FnMut() -> EngineStatus,
    {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let res = self.run_loop(&mut terminal, &mut get_status);

        // Restore terminal
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        debug!("Dashboard closed");

        res
    }

    fn run_loop<B, F>(&self, terminal: &mut Terminal<B>, get_status: &mut F) -> io::Result<()>
    where
        B: Backend,
        F: FnMut() -> EngineStatus,
    {
        loop {
            let status = get_status();
            terminal.draw(|f| self.ui(f, &status))?;

            if event::poll(Duration::from_millis(self.refresh_ms))? {
                if let Event::Key(key) = event::read()? {
                    let interrupt =
                        key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
                    if interrupt || key.code == KeyCode::Char('q') || key.code == KeyCode::Esc {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn ui(&self, frame: &mut Frame, status: &EngineStatus) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Length(4), // Gates
                Constraint::Length(5), // Stats
                Constraint::Min(6),    // Positions
                Constraint::Length(7), // Exits
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0], status);
        self.render_gates(frame, chunks[1], status);
        self.render_stats(frame, chunks[2], status);
        self.render_positions(frame, chunks[3], status);
        self.render_exits(frame, chunks[4], status);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect, status: &EngineStatus) {
        let health = &status.health;
        let phase_color = match health.phase {
            SessionPhase::Running => Color::Green,
            SessionPhase::Failed => Color::Red,
            SessionPhase::Starting | SessionPhase::Stopping => Color::Yellow,
            _ => Color::Gray,
        };
        let (feed, feed_color) = if health.feed_connected {
            ("feed up", Color::Green)
        } else {
            ("feed down", Color::Red)
        };

        let mut spans = vec![
            Span::styled("Session", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" | "),
            Span::styled(health.mode.to_string(), Style::default().fg(Color::Cyan)),
            Span::raw(format!(" {} | ", health.universe)),
            Span::styled(health.phase.to_string(), Style::default().fg(phase_color)),
            Span::raw(format!(" ({}) | ", health.startup)),
            Span::styled(feed, Style::default().fg(feed_color)),
        ];
        if let Some(reason) = &health.stop_reason {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled(reason.clone(), Style::default().fg(Color::Red)));
        }
        spans.push(Span::raw(" | Press 'q' to quit"));

        let header = Paragraph::new(Line::from(spans))
            .block(Block::default().borders(Borders::ALL).title("System"));
        frame.render_widget(header, area);
    }

    fn render_gates(&self, frame: &mut Frame, area: Rect, status: &EngineStatus) {
        let lines = match &status.health.last_verification {
            Some(report) => gate_lines(report),
            None => vec![Line::from("Not verified yet")],
        };
        let gates = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Startup gates"));
        frame.render_widget(gates, area);
    }

    fn render_stats(&self, frame: &mut Frame, area: Rect, status: &EngineStatus) {
        let stats = &status.stats;
        let health = &status.health;
        let pnl_color = if stats.realized_pnl >= Decimal::ZERO {
            Color::Green
        } else {
            Color::Red
        };

        let lines = vec![
            Line::from(vec![
                Span::raw("Realized P&L: "),
                Span::styled(
                    format!("{:.2}", stats.realized_pnl),
                    Style::default().fg(pnl_color).add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!(
                    "  |  Win rate: {:.1}%  |  Profit factor: {}",
                    stats.win_rate_pct, stats.profit_factor
                )),
            ]),
            Line::from(format!(
                "Open: {}  |  Opened: {}  |  Closed: {}  |  Signals: {}  |  Rejected at entry: {}  |  by risk: {}",
                status.open_positions.len(),
                stats.positions_opened,
                stats.positions_closed,
                stats.signals_emitted,
                stats.entry_rejections,
                stats.risk_rejections,
            )),
            Line::from(format!(
                "Prices: {}/{}  |  Candles: {}/{}  |  Ratchets: {}  |  Consecutive errors: {}",
                health.symbols_with_prices,
                health.symbols_total,
                health.symbols_with_candles,
                health.symbols_total,
                stats.stop_ratchets,
                health.consecutive_errors,
            )),
        ];
        let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Statistics"));
        frame.render_widget(paragraph, area);
    }

    fn render_positions(&self, frame: &mut Frame, area: Rect, status: &EngineStatus) {
        let header_cells = ["Symbol", "Side", "Qty", "Entry", "Stop", "Target", "Best", "Ratchets"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
        let header = Row::new(header_cells).height(1);

        let rows = status.open_positions.iter().map(|pos| {
            let moved = pos.stop_loss() != pos.initial_stop;
            Row::new(vec![
                Cell::from(pos.symbol.clone()),
                Cell::from(pos.direction.to_string()),
                Cell::from(pos.quantity.to_string()),
                Cell::from(format!("{:.2}", pos.entry_price)),
                Cell::from(format!("{:.2}", pos.stop_loss()))
                    .style(Style::default().fg(if moved { Color::Green } else { Color::White })),
                Cell::from(format!("{:.2}", pos.target)),
                Cell::from(format!("{:.2}", pos.best_price)),
                Cell::from(pos.ratchet_count.to_string()),
            ])
        });

        let table = Table::new(
            rows,
            [
                Constraint::Percentage(16),
                Constraint::Percentage(8),
                Constraint::Percentage(10),
                Constraint::Percentage(13),
                Constraint::Percentage(13),
                Constraint::Percentage(13),
                Constraint::Percentage(13),
                Constraint::Percentage(14),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Positions"));

        frame.render_widget(table, area);
    }

    fn render_exits(&self, frame: &mut Frame, area: Rect, status: &EngineStatus) {
        let lines: Vec<Line> = status
            .closed_positions
            .iter()
            .rev()
            .take(5)
            .map(|c| {
                let color = if c.realized_pnl >= Decimal::ZERO {
                    Color::Green
                } else {
                    Color::Red
                };
                Line::from(vec![
                    Span::raw(format!(
                        "{} {} {} @ {:.2} ",
                        c.closed_at.format("%H:%M:%S"),
                        c.position.symbol,
                        c.exit_reason,
                        c.exit_price
                    )),
                    Span::styled(format!("{:.2}", c.realized_pnl), Style::default().fg(color)),
                ])
            })
            .collect();

        let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Recent exits"));
        frame.render_widget(paragraph, area);
    }
}

fn gate_lines(report: &VerificationReport) -> Vec<Line<'static>> {
    let gate = |name: &'static str, status: GateStatus| {
        let color = match status {
            GateStatus::Passed => Color::Green,
            GateStatus::Failed => Color::Red,
            GateStatus::Waived => Color::Yellow,
        };
        vec![
            Span::raw(format!("{}: ", name)),
            Span::styled(status.to_string(), Style::default().fg(color)),
            Span::raw("  "),
        ]
    };

    let mut first = Vec::new();
    first.extend(gate("feed", report.feed_connected));
    first.extend(gate("live price", report.live_price));
    first.extend(gate("candles", report.candle_coverage));
    first.extend(gate("tokens", report.tokens_resolved));

    vec![
        Line::from(first),
        Line::from(format!(
            "coverage {:.0}% (min {:.0}%) checked {}",
            report.coverage_ratio * 100.0,
            report.min_coverage * 100.0,
            report.checked_at.format("%H:%M:%S")
        )),
    ]
}
