use crate::command::{CommandFactory, ExitCode};
use crate::env::Environment;
use crate::lexer;
use crate::parser;
use crate::readline::{Editor, LineSource};
use crate::redirect::Redirections;
use log::debug;
use std::io::{self, Write};

/// Factory allows creating instances of ExecutableCommand.
///
/// Only support commands defined in this crate: builtins and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// No factory recognized the command name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}: command not found")]
pub struct CommandNotFound(pub String);

/// A minimal shell-like interpreter that can execute built-in and external commands.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried in order to create commands by name. See [`Default`] for the
/// factories included out of the box: built-ins come first, so they shadow programs
/// of the same name on the search path.
///
/// Example
/// ```
/// use minish::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run("echo", &["hello", "world"]).unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
        }
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Whether `exit` has been executed.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Run a single command invocation by name with arguments.
    ///
    /// Returns the command's exit code or an error if the command cannot be created
    /// or fails to execute.
    pub fn run(&mut self, name: &str, args: &[&str]) -> anyhow::Result<ExitCode> {
        self.run_with_redirections(name, args, &Redirections::default())
    }

    /// Like [`run`](Self::run), with standard output/error sent to the given targets.
    pub fn run_with_redirections(
        &mut self,
        name: &str,
        args: &[&str],
        redirections: &Redirections,
    ) -> anyhow::Result<ExitCode> {
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, name, args) {
                return cmd.execute(redirections, &mut self.env);
            }
        }
        Err(CommandNotFound(name.to_string()).into())
    }

    /// Tokenize, extract redirections from, and dispatch one input line.
    ///
    /// A line without a command name is a no-op returning 0.
    pub fn execute_line(&mut self, line: &str) -> anyhow::Result<ExitCode> {
        let tokens = lexer::split_into_tokens(line);
        debug!("tokens = {:?}", tokens);
        let invocation = parser::extract_redirections(tokens);
        debug!("invocation = {:?}", invocation);

        let Some(name) = invocation.name() else {
            return Ok(0);
        };
        let args = invocation.args();
        self.run_with_redirections(name, &args, &invocation.redirections)
    }

    /// Read-evaluate loop over `source`.
    ///
    /// Stops after `exit` or at end of input. Failures of individual lines are
    /// reported on standard error and do not stop the loop; exit codes of commands
    /// are discarded.
    pub fn run_loop(&mut self, source: &mut dyn LineSource, prompt: &str) -> anyhow::Result<()> {
        while !self.env.should_exit {
            let Some(line) = source.read_line(prompt)? else {
                debug!("end of input");
                break;
            };
            if let Err(err) = self.execute_line(&line) {
                report_error(&mut io::stderr(), &err);
            }
        }
        Ok(())
    }

    /// Interactive Read-Eval-Print Loop on the terminal.
    pub fn repl(&mut self, prompt: &str) -> anyhow::Result<()> {
        let mut editor = Editor::new()?;
        self.run_loop(&mut editor, prompt)
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - built-ins: `exit`, `echo`, `cd`, `pwd`, `type`
    /// - external command launcher
    fn default() -> Self {
        use crate::builtin::*;
        use crate::external::ExternalCommand;
        Self::new(vec![
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Type>::default()),
            Box::new(Factory::<ExternalCommand>::default()),
        ])
    }
}

/// Print a one-line diagnostic for a failed command line.
fn report_error(out: &mut dyn Write, err: &anyhow::Error) {
    let _ = if err.is::<CommandNotFound>() {
        writeln!(out, "{}", err)
    } else {
        writeln!(out, "minish: {:#}", err)
    };
    let _ = out.flush();
}
