//! Lexical analysis of a single input line into shell words.
//!
//! Words are separated by unquoted spaces. Single quotes preserve everything
//! literally, double quotes preserve everything except `\"` and `\\`, and an unquoted
//! backslash takes the following character verbatim. Quoted and unquoted runs with no
//! space between them form one word. Tabs are ordinary characters.

/// Quoting context the FSM is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Unquoted,
    SingleQuoted,
    DoubleQuoted,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
}

impl LexingFSM {
    /// Creates a new instance of the lexical analysis Finite State Machine.
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Unquoted,
            buffer: String::new(),
        }
    }

    /// Runs the FSM over the whole input and returns the words found.
    ///
    /// An unterminated quote is closed implicitly at the end of the line, so this never
    /// fails: whatever was accumulated is flushed as the last word.
    fn make_tokens(&mut self) -> Vec<String> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Unquoted => self.handle_unquoted(ch, &mut out),
                LexingState::SingleQuoted => self.handle_single_quote(ch),
                LexingState::DoubleQuoted => self.handle_double_quote(ch),
            }
        }

        self.flush_word(&mut out);
        out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_unquoted(&mut self, ch: char, out: &mut Vec<String>) {
        match ch {
            ' ' => self.flush_word(out),
            '\'' => self.state = LexingState::SingleQuoted,
            '"' => self.state = LexingState::DoubleQuoted,
            '\\' => {
                // A trailing backslash has nothing to escape and is dropped.
                if let Some(escaped) = self.read_char() {
                    self.buffer.push(escaped);
                }
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::Unquoted,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::Unquoted,
            '\\' => match self.peek_char() {
                Some(escaped @ ('"' | '\\')) => {
                    self.read_char();
                    self.buffer.push(escaped);
                }
                _ => self.buffer.push('\\'),
            },
            c => self.buffer.push(c),
        }
    }

    fn flush_word(&mut self, out: &mut Vec<String>) {
        if !self.buffer.is_empty() {
            out.push(std::mem::take(&mut self.buffer));
        }
    }
}

/// The main entry point function to perform lexical analysis.
///
/// Splits `line` into words following the quoting rules described in the module
/// documentation. The result never contains an empty string.
pub fn split_into_tokens(line: &str) -> Vec<String> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}
