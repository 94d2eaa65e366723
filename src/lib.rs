//! A minimal interactive shell.
//!
//! Each input line is split into words honoring single quotes, double quotes and
//! backslash escapes, stripped of its output redirections (`>`, `>>`, `2>`, `2>>`),
//! and dispatched to either a built-in running in the shell process or a program
//! found on `PATH`, which is run in a forked child.
//!
//! The main entry point is [`Interpreter`], which can execute single lines or drive a
//! read-evaluate loop over any [`readline::LineSource`]. The public modules expose the
//! pipeline stages on their own: [`lexer`] and [`parser`] for turning text into an
//! [`parser::Invocation`], [`external`] for path resolution and process execution,
//! and [`redirect`] for descriptor plumbing.

pub mod builtin;
pub mod command;
pub mod env;
pub mod external;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod readline;
pub mod redirect;

#[cfg(test)]
mod test_support;

pub use interpreter::{CommandNotFound, Interpreter};
