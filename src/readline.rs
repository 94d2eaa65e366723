//! Where input lines come from.
//!
//! The interpreter only needs "the next line, or end of input". Interactive use goes
//! through [`Editor`], a thin wrapper around `rustyline` with history and completion
//! of built-in names; scripted use goes through [`ScriptedLines`].

use crate::builtin::BUILTINS;
use anyhow::Result;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::collections::VecDeque;

/// A source of complete input lines.
pub trait LineSource {
    /// Return the next line without its terminator, or `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Interactive line editor with in-memory history.
pub struct Editor {
    inner: rustyline::Editor<BuiltinCompleter, DefaultHistory>,
}

impl Editor {
    pub fn new() -> Result<Self> {
        let mut inner = rustyline::Editor::new()?;
        inner.set_helper(Some(BuiltinCompleter));
        Ok(Self { inner })
    }
}

impl LineSource for Editor {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.inner.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.inner.add_history_entry(line.as_str())?;
                }
                Ok(Some(line))
            }
            // Ctrl-C abandons the current line only.
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Pre-recorded lines, consumed in order.
#[derive(Debug, Default)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
}

impl ScriptedLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for ScriptedLines {
    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// Tab completion of built-in names in command position.
pub struct BuiltinCompleter;

impl BuiltinCompleter {
    /// Candidates for the word ending at `pos`, and the byte offset where it starts.
    ///
    /// Only the first word of the line is completed; each candidate carries a
    /// trailing space.
    pub fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        let before = &line[..pos];
        let start = before.len() - before.trim_start().len();
        let word = &before[start..];
        if word.contains(char::is_whitespace) {
            return (pos, Vec::new());
        }

        let mut matches: Vec<String> = BUILTINS
            .iter()
            .filter(|name| name.starts_with(word))
            .map(|name| format!("{name} "))
            .collect();
        matches.sort();
        (start, matches)
    }
}

impl Completer for BuiltinCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok(self.candidates(line, pos))
    }
}

impl Hinter for BuiltinCompleter {
    type Hint = String;
}

impl Highlighter for BuiltinCompleter {}

impl Validator for BuiltinCompleter {}

impl Helper for BuiltinCompleter {}
