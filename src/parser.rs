use crate::redirect::{OpenMode, Redirect, Redirections, Stream};

/// A single command ready for dispatch.
///
/// `argv[0]` is the command name. Redirection operators and their targets never
/// appear in `argv`; they are collected in `redirections`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Command name followed by its arguments.
    pub argv: Vec<String>,
    /// Output destinations requested on the command line.
    pub redirections: Redirections,
}

impl Invocation {
    /// Command name, if the line named one.
    pub fn name(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Arguments after the command name.
    pub fn args(&self) -> Vec<&str> {
        self.argv.iter().skip(1).map(String::as_str).collect()
    }
}

/// Map a whole token onto the redirection it denotes, if any.
fn redirect_operator(token: &str) -> Option<(Stream, OpenMode)> {
    match token {
        ">" | "1>" => Some((Stream::Stdout, OpenMode::Truncate)),
        ">>" | "1>>" => Some((Stream::Stdout, OpenMode::Append)),
        "2>" => Some((Stream::Stderr, OpenMode::Truncate)),
        "2>>" => Some((Stream::Stderr, OpenMode::Append)),
        _ => None,
    }
}

/// Separates redirections from the argument vector.
///
/// Tokens are scanned left to right. An operator followed by another token consumes
/// that token as its target; a later operator for the same stream replaces an earlier
/// one. An operator with nothing after it stays in `argv` as a literal argument.
/// Targets are not opened here.
pub fn extract_redirections(tokens: Vec<String>) -> Invocation {
    let mut invocation = Invocation::default();
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        match redirect_operator(&token) {
            Some((stream, mode)) if tokens.peek().is_some() => {
                if let Some(target) = tokens.next() {
                    invocation
                        .redirections
                        .set(stream, Redirect::new(target, mode));
                }
            }
            _ => invocation.argv.push(token),
        }
    }

    invocation
}
