use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::text::Line;
use ratatui::widgets::Paragraph;
use tokio_util::sync::CancellationToken;

use crate::state::{EngineShared, FileSnapshot, UploadStatus};

const TICK: Duration = Duration::from_millis(500);
const EVENT_POLL: Duration = Duration::from_millis(100);

const SPINNER_FRAMES: [&str; 8] = ["⣾", "⣷", "⣯", "⣟", "⡿", "⢿", "⣻", "⣽"];

/// Runs the cooperative status table on the current (blocking) thread.
///
/// Redraws on a 500 ms tick; Ctrl-C, Esc or Ctrl-D raise cancellation and
/// report a manual quit. Returns `true` if the user quit.
pub(crate) fn run_interactive(
    shared: Arc<EngineShared>,
    finished: CancellationToken,
) -> std::io::Result<bool> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = event_loop(&shared, &finished, &mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn event_loop(
    shared: &EngineShared,
    finished: &CancellationToken,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> std::io::Result<bool> {
    let mut spinner_idx = 0usize;
    draw(shared, terminal, spinner_idx)?;
    let mut last_draw = Instant::now();

    loop {
        if last_draw.elapsed() >= TICK {
            spinner_idx = (spinner_idx + 1) % SPINNER_FRAMES.len();
            draw(shared, terminal, spinner_idx)?;
            last_draw = Instant::now();
        }

        if event::poll(EVENT_POLL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && is_quit_key(key.code, key.modifiers) {
                    shared.cancel.cancel();
                    return Ok(true);
                }
            }
        }

        if finished.is_cancelled() {
            draw(shared, terminal, spinner_idx)?;
            return Ok(false);
        }
    }
}

fn is_quit_key(code: KeyCode, modifiers: KeyModifiers) -> bool {
    match code {
        KeyCode::Esc => true,
        KeyCode::Char('c') | KeyCode::Char('d') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn draw(
    shared: &EngineShared,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    spinner_idx: usize,
) -> std::io::Result<()> {
    let snapshots: Vec<FileSnapshot> = shared
        .set
        .entries_in_order()
        .iter()
        .map(|entry| entry.snapshot())
        .collect();
    let spinner = SPINNER_FRAMES[spinner_idx];

    terminal.draw(|frame| {
        let width = frame.area().width as usize;
        let mut lines = vec![Line::from("Upload Status:")];
        for snapshot in &snapshots {
            lines.push(Line::from(render_row(snapshot, spinner, width)));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(render_summary(&snapshots)));
        frame.render_widget(Paragraph::new(lines), frame.area());
    })?;
    Ok(())
}

fn render_row(snapshot: &FileSnapshot, spinner: &str, width: usize) -> String {
    let path = &snapshot.display_path;
    match snapshot.status {
        UploadStatus::Unprocessed => format!("{path}: Preparing for upload {spinner}"),
        UploadStatus::CalculatingSha256 => format!("{path}: Calculating sha256 {spinner}"),
        UploadStatus::PreviouslyUploaded => {
            format!("{path}: Previously uploaded, skipping")
        }
        UploadStatus::WaitingForUpload => format!("{path}: Waiting for upload"),
        UploadStatus::UploadCompleted => format!("{path}: Upload completed"),
        UploadStatus::MultipartCompletionInProgress => {
            format!("{path}: Completing multipart upload {spinner}")
        }
        UploadStatus::UploadFailed => format!("{path}: Upload failed"),
        UploadStatus::UploadInProgress => {
            let progress = upload_progress(snapshot);
            let bar_width = width.saturating_sub(path.len() + 12).max(10);
            let filled =
                ((progress * bar_width as f64 / 100.0) as usize).min(bar_width);
            format!(
                "{path}: [{}{}] {progress:6.2}%",
                "█".repeat(filled),
                "-".repeat(bar_width - filled)
            )
        }
    }
}

fn upload_progress(snapshot: &FileSnapshot) -> f64 {
    if snapshot.size == 0 {
        return 100.0;
    }
    (snapshot.uploaded.max(0) as f64 * 100.0 / snapshot.size as f64).min(100.0)
}

fn render_summary(snapshots: &[FileSnapshot]) -> String {
    let skipped = snapshots
        .iter()
        .filter(|s| s.status == UploadStatus::PreviouslyUploaded)
        .count();
    let success = snapshots
        .iter()
        .filter(|s| s.status == UploadStatus::UploadCompleted)
        .count();
    let total = snapshots.len();
    let mut summary = format!("Total: {total}, Skipped: {skipped}, Success: {success}");
    if success + skipped < total {
        summary.push_str(&format!(", Remaining: {}", total - success - skipped));
    }
    summary
}
