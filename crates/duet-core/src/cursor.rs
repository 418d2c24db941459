//! Shared, forward-only cursor over a [`Script`].
//!
//! Both reply agents hold the same cursor. Whichever asks first gets the next
//! line; no line is ever handed out twice.

use crate::scenario::Script;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A line taken from the cursor, with its position in the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub index: usize,
    pub text: String,
}

/// Hands out script lines exactly once, in order, across tasks.
#[derive(Debug)]
pub struct ScriptCursor {
    lines: Vec<String>,
    next: AtomicUsize,
}

impl ScriptCursor {
    pub fn new(script: Script) -> Self {
        Self {
            lines: script.into_lines(),
            next: AtomicUsize::new(0),
        }
    }

    /// Takes the next unconsumed line, or `None` once the script is exhausted.
    pub fn next_line(&self) -> Option<ScriptLine> {
        let len = self.lines.len();
        // Never advance past `len`, so `consumed()` stays exact after exhaustion.
        let index = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| (i < len).then_some(i + 1))
            .ok()?;

        Some(ScriptLine {
            index,
            text: self.lines[index].clone(),
        })
    }

    /// Number of lines handed out so far.
    pub fn consumed(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.lines.len() - self.consumed()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn cursor(lines: &[&str]) -> ScriptCursor {
        ScriptCursor::new(Script::new(
            Some(1),
            lines.iter().map(|s| (*s).to_string()).collect(),
        ))
    }

    #[test]
    fn test_lines_come_out_in_order() {
        let c = cursor(&["a", "b", "c"]);
        assert_eq!(c.next_line().unwrap().text, "a");
        assert_eq!(c.next_line().unwrap().text, "b");
        let last = c.next_line().unwrap();
        assert_eq!(last.index, 2);
        assert_eq!(last.text, "c");
        assert!(c.next_line().is_none());
    }

    #[test]
    fn test_exhaustion_is_sticky() {
        let c = cursor(&["only"]);
        assert!(c.next_line().is_some());
        for _ in 0..5 {
            assert!(c.next_line().is_none());
        }
        assert_eq!(c.consumed(), 1);
        assert_eq!(c.remaining(), 0);
        assert!(c.is_exhausted());
    }

    #[test]
    fn test_empty_script_is_immediately_exhausted() {
        let c = cursor(&[]);
        assert!(c.is_empty());
        assert!(c.is_exhausted());
        assert!(c.next_line().is_none());
    }

    #[test]
    fn test_concurrent_callers_never_share_a_line() {
        let lines: Vec<String> = (0..500).map(|i| format!("line {i}")).collect();
        let c = Arc::new(ScriptCursor::new(Script::new(Some(1), lines)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(line) = c.next_line() {
                        taken.push(line.index);
                    }
                    taken
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for index in handle.join().unwrap() {
                assert!(seen.insert(index), "line {index} handed out twice");
            }
        }
        assert_eq!(seen.len(), 500);
        assert!(c.is_exhausted());
    }
}
