//! Opt-in buffer of advisory messages, flushed once at the end of a run.

use std::io::Write;
use std::sync::Mutex;

use once_cell::sync::Lazy;

static CONSOLE: Lazy<Mutex<Console>> = Lazy::new(|| Mutex::new(Console::default()));

#[derive(Default)]
struct Console {
    enabled: bool,
    messages: Vec<String>,
}

fn with_console<R>(f: impl FnOnce(&mut Console) -> R) -> R {
    let mut console = CONSOLE.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut console)
}

pub fn enable() {
    with_console(|c| c.enabled = true);
}

pub fn is_enabled() -> bool {
    with_console(|c| c.enabled)
}

pub fn info(msg: impl AsRef<str>) {
    push("INFO", msg.as_ref());
}

pub fn warn(msg: impl AsRef<str>) {
    push("WARN", msg.as_ref());
}

fn push(level: &str, msg: &str) {
    with_console(|c| {
        if c.enabled {
            c.messages.push(format!("[{level}] {msg}"));
        }
    });
}

/// Write out and clear every buffered message.
pub fn flush(out: &mut dyn Write) -> std::io::Result<()> {
    let messages = with_console(|c| std::mem::take(&mut c.messages));
    for msg in messages {
        writeln!(out, "{msg}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_flushes_once() {
        enable();
        warn("attached advisory");
        let mut out = Vec::new();
        flush(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[WARN] attached advisory"));

        let mut again = Vec::new();
        flush(&mut again).unwrap();
        assert!(!String::from_utf8(again).unwrap().contains("attached advisory"));
    }
}
