//! Panic containment for spawned work.
//!
//! Converts an unwinding panic into [`Error::Fault`] carrying the panic
//! message and a stack trace with the containment machinery's own frames
//! trimmed away, so a fault inside one unit of work never tears down the
//! process.

use log::error;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{Error, Result};

/// Marker inserted where containment frames were removed from a trace.
const TRIM_MARKER: &str = "[ ... containment frames trimmed ... ]";

/// Run `f`, converting an unwinding panic into [`Error::Fault`].
///
/// When `log_faults` is set, the contained panic is also reported through
/// the `log` facade at error level.
pub(crate) fn contain_with<F>(f: F, log_faults: bool) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let stack = trimmed_stack();
            if log_faults {
                error!("Contained panic: {}\n{}", message, stack);
            }
            Err(Error::Fault { message, stack })
        }
    }
}

/// Render a panic payload as text.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<unknown panic>".to_string()
    }
}

/// Capture the current stack without the containment machinery's frames.
fn trimmed_stack() -> String {
    trim_stack(&Backtrace::force_capture().to_string())
}

/// Everything above (and including) this module's last frame describes the
/// containment plumbing, not the contained work; drop it.
fn trim_stack(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let mut last_own_frame = None;
    for (i, line) in lines.iter().enumerate() {
        if line.contains("parwork::fault::") {
            last_own_frame = Some(i);
        }
    }

    match last_own_frame {
        Some(i) => {
            // Skip that frame's trailing "at file:line" location too.
            let mut start = i + 1;
            if start < lines.len() && lines[start].trim_start().starts_with("at ") {
                start += 1;
            }
            let mut kept = vec![TRIM_MARKER];
            kept.extend_from_slice(&lines[start..]);
            kept.join("\n")
        }
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contain_passes_results_through() {
        assert_eq!(contain_with(|| Ok(()), false), Ok(()));
        assert_eq!(
            contain_with(|| Err(Error::work("deliberate")), false),
            Err(Error::work("deliberate"))
        );
    }

    #[test]
    fn test_contain_converts_panic() {
        let err = contain_with(|| panic!("boom"), false).unwrap_err();
        match err {
            Error::Fault { message, .. } => assert!(message.contains("boom")),
            other => panic!("expected a fault, got {:?}", other),
        }
    }

    #[test]
    fn test_contain_formats_panic_arguments() {
        let err = contain_with(|| panic!("boom {}", 42), false).unwrap_err();
        match err {
            Error::Fault { message, .. } => assert_eq!(message, "boom 42"),
            other => panic!("expected a fault, got {:?}", other),
        }
    }

    #[test]
    fn test_non_string_payload_gets_fallback_message() {
        let err = contain_with(|| std::panic::panic_any(42_u32), false).unwrap_err();
        match err {
            Error::Fault { message, .. } => assert_eq!(message, "<unknown panic>"),
            other => panic!("expected a fault, got {:?}", other),
        }
    }

    #[test]
    fn test_trim_drops_containment_frames() {
        let raw = concat!(
            "   0: std::backtrace::Backtrace::force_capture\n",
            "             at backtrace.rs:10\n",
            "   1: parwork::fault::trimmed_stack\n",
            "             at src/fault.rs:52\n",
            "   2: parwork::fault::contain_with\n",
            "             at src/fault.rs:28\n",
            "   3: my_app::do_work\n",
            "             at src/main.rs:5",
        );
        let trimmed = trim_stack(raw);
        assert!(trimmed.starts_with(TRIM_MARKER));
        assert!(trimmed.contains("my_app::do_work"));
        assert!(!trimmed.contains("contain_with"));
    }

    #[test]
    fn test_trim_keeps_unrecognized_traces() {
        let raw = "somewhere else entirely";
        assert_eq!(trim_stack(raw), raw);
    }
}
