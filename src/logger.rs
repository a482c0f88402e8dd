//! Terminal output: the `log!` macro and a progress line for template generation.
//!
//! ```ignore
//! log!("compile"; "compiling {} views", count);
//!
//! if let Some(progress) = Progress::start("generate", templates.len()) {
//!     progress.inc();
//! }
//! ```
//!
//! While a progress line is active, `log` prints above it and redraws it, so
//! parallel workers can log without tearing the bar.

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType, size},
};
use std::{
    io::{IsTerminal, Write, stdout},
    sync::{
        Mutex, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

static TERMINAL_WIDTH: OnceLock<u16> = OnceLock::new();

/// Set while a [`Progress`] line occupies the last terminal row.
static PROGRESS_ACTIVE: AtomicBool = AtomicBool::new(false);

const MIN_BAR_WIDTH: usize = 10;
const MAX_BAR_WIDTH: usize = 40;

fn terminal_width() -> usize {
    *TERMINAL_WIDTH.get_or_init(|| size().map(|(w, _)| w).unwrap_or(120)) as usize
}

/// `[module] ` display width.
const fn prefix_len(module: &str) -> usize {
    module.len() + 3
}

// ============================================================================
// Log Macro
// ============================================================================

/// Log a message with a colored module prefix.
///
/// ```ignore
/// log!("warn"; "manifest `{}` not found", path.display());
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Print one log line. Single-line messages are cut to the terminal width;
/// multi-line diagnostic reports are printed in full.
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    let mut stdout = stdout().lock();

    let progress = PROGRESS_ACTIVE.load(Ordering::Acquire);
    if progress {
        execute!(stdout, Clear(ClearType::CurrentLine)).ok();
        write!(stdout, "\r").ok();
    }

    if message.contains('\n') {
        writeln!(stdout, "{prefix} {message}").ok();
    } else {
        let max_len = terminal_width().saturating_sub(prefix_len(module));
        writeln!(stdout, "{prefix} {}", truncate_str(message, max_len)).ok();
    }
    stdout.flush().ok();
}

fn colorize_prefix(module: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "runtime" => prefix.bright_blue().bold(),
        "done" => prefix.bright_green().bold(),
        "warn" => prefix.bright_magenta().bold(),
        "error" => prefix.bright_red().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}

/// Cut `s` to at most `max_len` bytes on a character boundary.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// Progress
// ============================================================================

/// In-place progress line: `[generate] [████░░░░] 42/100`.
///
/// Safe to advance from rayon workers; redraws are serialized.
pub struct Progress {
    module: &'static str,
    prefix: ColoredString,
    total: usize,
    current: AtomicUsize,
    lock: Mutex<()>,
}

impl Progress {
    /// Start a progress line, or `None` when stdout is not a terminal or there
    /// is at most one item (tests and redirected output get plain logs).
    pub fn start(module: &'static str, total: usize) -> Option<Self> {
        if total <= 1 || !stdout().is_terminal() {
            return None;
        }
        PROGRESS_ACTIVE.store(true, Ordering::Release);
        Some(Self {
            module,
            prefix: colorize_prefix(module),
            total,
            current: AtomicUsize::new(0),
            lock: Mutex::new(()),
        })
    }

    pub fn inc(&self) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.draw(current);
    }

    fn draw(&self, current: usize) {
        let _guard = self.lock.lock().ok();

        let count = format!("{current}/{}", self.total);
        let width = bar_width(terminal_width(), prefix_len(self.module), count.len());
        let filled = (current.min(self.total) * width) / self.total;
        let bar = "█".repeat(filled) + &"░".repeat(width - filled);

        let mut stdout = stdout().lock();
        execute!(stdout, Clear(ClearType::CurrentLine)).ok();
        write!(stdout, "\r{} [{bar}] {count}", self.prefix).ok();
        stdout.flush().ok();
    }

    /// Erase the progress line.
    pub fn finish(&self) {
        if !PROGRESS_ACTIVE.swap(false, Ordering::AcqRel) {
            return;
        }
        let _guard = self.lock.lock().ok();
        let mut stdout = stdout().lock();
        execute!(stdout, Clear(ClearType::CurrentLine), cursor::MoveToColumn(0)).ok();
        stdout.flush().ok();
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Bar width left after `[module] `, ` []`, and ` n/total`.
fn bar_width(terminal: usize, prefix: usize, count: usize) -> usize {
    terminal
        .saturating_sub(prefix + 3 + 1 + count)
        .clamp(MIN_BAR_WIDTH, MAX_BAR_WIDTH)
}
