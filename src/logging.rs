//! Line-oriented logging for the engines and the web server.
//!
//! Every line produced by [`alog!`] has the shape
//!
//! ```text
//! 20260211T21:33:12.000 - src/social.rs:42 - social: Follow u-u1 -> u-u2
//! ```
//!
//! Output goes to stderr until [`set_writer`] installs another sink.  On a
//! terminal the timestamp and location are dimmed and ids are tinted by a
//! hash of their text, so the same user keeps the same colour across lines.

use std::io::{self, IsTerminal, Write};
use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

struct Sink {
    out: Box<dyn Write + Send>,
    colour: bool,
}

static SINK: LazyLock<Mutex<Sink>> = LazyLock::new(|| {
    Mutex::new(Sink {
        out: Box::new(io::stderr()),
        colour: false,
    })
});

fn sink() -> MutexGuard<'static, Sink> {
    match SINK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Turn on colour when stderr is a terminal.  Call once at startup.
pub fn init() {
    let mut s = sink();
    s.colour = io::stderr().is_terminal();
}

/// Send all further output to `w`, without colour.
pub fn set_writer(w: Box<dyn Write + Send>) {
    let mut s = sink();
    s.out = w;
    s.colour = false;
}

pub fn colour_enabled() -> bool {
    sink().colour
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

const TINTS: [&str; 6] = [
    "\x1b[91m", "\x1b[92m", "\x1b[93m", "\x1b[94m", "\x1b[95m", "\x1b[96m",
];

fn tint_for(id: &str) -> &'static str {
    let h = id
        .bytes()
        .fold(5381u32, |acc, b| acc.wrapping_mul(33) ^ u32::from(b));
    TINTS[h as usize % TINTS.len()]
}

/// Ids longer than this are cut on a char boundary.
const SHORT_ID: usize = 7;

fn shorten(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID) {
        Some((i, _)) => &id[..i],
        None => id,
    }
}

fn tagged(prefix: char, shown: &str, tint: &str) -> String {
    if colour_enabled() {
        format!("{tint}{prefix}-{shown}{RESET}")
    } else {
        format!("{prefix}-{shown}")
    }
}

/// `u-` plus the first seven characters of a user id.
pub fn user_id(id: &str) -> String {
    tagged('u', shorten(id), tint_for(id))
}

/// `t-` plus the full thread id; two user ids would not survive truncation.
pub fn thread_id(id: &str) -> String {
    tagged('t', id, "\x1b[93m")
}

/// A store path, `/` for the root.
pub fn path(p: &str) -> String {
    let shown = if p.is_empty() { "/" } else { p };
    if colour_enabled() {
        format!("{DIM}{shown}{RESET}")
    } else {
        shown.to_string()
    }
}

/// Gregorian (year, month, day) for a day count since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// `YYYYMMDDTHH:MM:SS.mmm` in UTC.
pub fn format_time(at: SystemTime) -> String {
    let since = at.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = since.as_secs();
    let (y, m, d) = civil_from_days((secs / 86_400) as i64);
    let of_day = secs % 86_400;
    format!(
        "{y:04}{m:02}{d:02}T{:02}:{:02}:{:02}.{:03}",
        of_day / 3600,
        of_day % 3600 / 60,
        of_day % 60,
        since.subsec_millis()
    )
}

/// Write one line.  Used by [`alog!`].
pub fn emit(file: &str, line: u32, msg: &str) {
    let ts = format_time(SystemTime::now());
    let mut s = sink();
    let text = if s.colour {
        format!("{DIM}{ts}{RESET} {DIM}{file}:{line}{RESET} {msg}")
    } else {
        format!("{ts} - {file}:{line} - {msg}")
    };
    let _ = writeln!(s.out, "{text}");
}

/// Log a formatted line with timestamp and call site.
///
/// ```ignore
/// alog!("messaging: {} posted to {}", logging::user_id(&a), logging::thread_id(&t));
/// ```
#[macro_export]
macro_rules! alog {
    ($($arg:tt)*) => {{
        $crate::logging::emit(file!(), line!(), &format!($($arg)*));
    }};
}
