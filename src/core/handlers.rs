//! Purpose: GEOS notice/error message handlers and their printf-style rendering.
//! Exports: `notice_handler`, `error_handler`, `render_message`, `substitute`, `FormatMismatch`.
//! Role: Sink between GEOS's message channels and `tracing`.
//! Invariants: Handlers are plain `extern "C" fn` items, so their addresses never move.
//! Invariants: A format that cannot take the argument is logged verbatim; handlers never fail.
//! Invariants: Notices log at warn, errors at error, both under the `lgeos::geos` target.
use std::ffi::CStr;
use std::fmt;

use libc::c_char;

pub const LOG_TARGET: &str = "lgeos::geos";

/// Why a format/argument pair could not be combined.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FormatMismatch {
    Incomplete,
    NeedsMapping,
    NeedsNumber(char),
    BadChar,
    Unsupported(char),
    NotEnoughArguments,
    NotAllConverted,
}

impl fmt::Display for FormatMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatMismatch::Incomplete => f.write_str("incomplete format"),
            FormatMismatch::NeedsMapping => f.write_str("format requires a mapping"),
            FormatMismatch::NeedsNumber(conv) => write!(f, "%{conv} format requires a number"),
            FormatMismatch::BadChar => f.write_str("%c requires a single character"),
            FormatMismatch::Unsupported(conv) => write!(f, "unsupported format character {conv:?}"),
            FormatMismatch::NotEnoughArguments => f.write_str("not enough arguments for format"),
            FormatMismatch::NotAllConverted => {
                f.write_str("not all arguments converted during formatting")
            }
        }
    }
}

#[derive(Default)]
struct Conversion {
    left: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Substitutes the single string argument into a printf-style format.
///
/// Supports `%s`, `%r`/`%a`, `%c` and `%%` with `-` alignment, width and
/// precision. Numeric conversions cannot take a string and are mismatches, as
/// is a format that consumes zero or more than one argument.
pub fn substitute(format: &str, arg: &str) -> Result<String, FormatMismatch> {
    let mut out = String::with_capacity(format.len() + arg.len());
    let mut chars = format.chars().peekable();
    let mut consumed = false;

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }

        let mut spec = Conversion::default();
        if chars.peek() == Some(&'(') {
            return Err(FormatMismatch::NeedsMapping);
        }
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '+' | ' ' | '#' | '0' => {}
                _ => break,
            }
            chars.next();
        }
        spec.width = read_count(&mut chars)?;
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(read_count(&mut chars)?.unwrap_or(0));
        }
        while matches!(chars.peek(), Some('h' | 'l' | 'L')) {
            chars.next();
        }

        let conv = chars.next().ok_or(FormatMismatch::Incomplete)?;
        let text = match conv {
            '%' => {
                out.push('%');
                continue;
            }
            's' | 'r' | 'a' | 'c' => {
                if consumed {
                    return Err(FormatMismatch::NotEnoughArguments);
                }
                consumed = true;
                match conv {
                    's' => arg.to_string(),
                    'c' => {
                        let mut it = arg.chars();
                        match (it.next(), it.next()) {
                            (Some(only), None) => only.to_string(),
                            _ => return Err(FormatMismatch::BadChar),
                        }
                    }
                    'r' => quote(arg, false),
                    _ => quote(arg, true),
                }
            }
            'd' | 'i' | 'u' | 'o' | 'x' | 'X' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
                if consumed {
                    return Err(FormatMismatch::NotEnoughArguments);
                }
                return Err(FormatMismatch::NeedsNumber(conv));
            }
            other => return Err(FormatMismatch::Unsupported(other)),
        };
        pad_into(&mut out, &text, &spec);
    }

    if !consumed {
        return Err(FormatMismatch::NotAllConverted);
    }
    Ok(out)
}

fn read_count(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<Option<usize>, FormatMismatch> {
    if chars.peek() == Some(&'*') {
        // `*` wants an integer argument and there is only a string.
        return Err(FormatMismatch::NeedsNumber('*'));
    }
    let mut value: Option<usize> = None;
    while let Some(digit) = chars.peek().and_then(|ch| ch.to_digit(10)) {
        chars.next();
        value = Some(
            value
                .unwrap_or(0)
                .saturating_mul(10)
                .saturating_add(digit as usize),
        );
    }
    Ok(value)
}

fn pad_into(out: &mut String, text: &str, spec: &Conversion) {
    let text: String = match spec.precision {
        Some(precision) => text.chars().take(precision).collect(),
        None => text.to_string(),
    };
    let len = text.chars().count();
    let pad = spec.width.map_or(0, |width| width.saturating_sub(len));
    if spec.left {
        out.push_str(&text);
        out.extend(std::iter::repeat_n(' ', pad));
    } else {
        out.extend(std::iter::repeat_n(' ', pad));
        out.push_str(&text);
    }
}

/// Python-style `repr` quoting. With `ascii_only`, every non-ASCII character
/// is escaped as well (`%a`).
fn quote(text: &str, ascii_only: bool) -> String {
    let delim = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(delim);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch == delim => {
                out.push('\\');
                out.push(ch);
            }
            ch if !is_printable(ch) || (ascii_only && !ch.is_ascii()) => {
                push_escape(&mut out, ch);
            }
            ch => out.push(ch),
        }
    }
    out.push(delim);
    out
}

fn push_escape(out: &mut String, ch: char) {
    let code = ch as u32;
    let escaped = if code <= 0xff {
        format!("\\x{code:02x}")
    } else if code <= 0xffff {
        format!("\\u{code:04x}")
    } else {
        format!("\\U{code:08x}")
    };
    out.push_str(&escaped);
}

/// Mirrors `str.isprintable`: control, format, separator (other than space),
/// private-use and noncharacter code points are escaped. Unassigned code
/// points cannot be told apart without a Unicode table and print verbatim.
fn is_printable(ch: char) -> bool {
    if ch == ' ' {
        return true;
    }
    if ch.is_control() || ch.is_whitespace() {
        return false;
    }
    let code = ch as u32;
    let format = matches!(
        code,
        0xad | 0x600..=0x605
            | 0x61c
            | 0x6dd
            | 0x70f
            | 0x890..=0x891
            | 0x8e2
            | 0x180e
            | 0x200b..=0x200f
            | 0x202a..=0x202e
            | 0x2060..=0x2064
            | 0x2066..=0x206f
            | 0xfeff
            | 0xfff9..=0xfffb
            | 0x110bd
            | 0x110cd
            | 0x13430..=0x1343f
            | 0x1bca0..=0x1bca3
            | 0x1d173..=0x1d17a
            | 0xe0001
            | 0xe0020..=0xe007f
    );
    let private_use = matches!(code, 0xe000..=0xf8ff | 0xf0000..=0xffffd | 0x100000..=0x10fffd);
    let noncharacter = matches!(code, 0xfdd0..=0xfdef) || code & 0xfffe == 0xfffe;
    !(format || private_use || noncharacter)
}

/// Best-effort rendering: the substituted text, or the format verbatim.
pub fn render_message(format: &str, arg: &str) -> String {
    match substitute(format, arg) {
        Ok(text) => text,
        Err(_) => format.to_string(),
    }
}

unsafe fn decode(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

pub(crate) fn log_notice(format: &str, arg: &str) {
    let message = render_message(format, arg);
    tracing::warn!(target: LOG_TARGET, "GEOS_NOTICE: {message}");
}

pub(crate) fn log_error(format: &str, arg: &str) {
    let message = render_message(format, arg);
    tracing::error!(target: LOG_TARGET, "GEOS_ERROR: {message}");
}

/// Installed as GEOS's notice channel.
///
/// # Safety
/// Both pointers must be null or point at NUL-terminated strings.
pub unsafe extern "C" fn notice_handler(fmt: *const c_char, arg: *const c_char) {
    let (format, arg) = unsafe { (decode(fmt), decode(arg)) };
    log_notice(&format, &arg);
}

/// Installed as GEOS's error channel.
///
/// # Safety
/// Both pointers must be null or point at NUL-terminated strings.
pub unsafe extern "C" fn error_handler(fmt: *const c_char, arg: *const c_char) {
    let (format, arg) = unsafe { (decode(fmt), decode(arg)) };
    log_error(&format, &arg);
}

#[cfg(test)]
pub(crate) mod capture {
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Runs `f` with a plain-text subscriber and returns everything it logged.
    pub(crate) fn capture_logs(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        buffer.contents()
    }
}
