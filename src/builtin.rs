use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::external::find_command_path;
use crate::interpreter::Factory;
use crate::redirect::{Redirections, StdioGuard};
use anyhow::{Result, anyhow};
use argh::{EarlyExit, FromArgs};
use log::debug;
use std::env;
use std::io::{self, Write};
use std::path::Path;

/// Names of all commands implemented inside the shell process.
pub const BUILTINS: &[&str] = &["echo", "exit", "cd", "pwd", "type"];

/// Whether `name` is handled in-process rather than looked up on the search path.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins run in-process without spawning a child. `pwd` is parsed with [`argh`]
/// (`FromArgs`); the others take their operands verbatim, so a leading `-` is never
/// mistaken for an option.
pub trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Build the command from its arguments (the command name excluded).
    fn parse(args: &[&str]) -> Result<Self, EarlyExit>;

    /// Executes the command, writing its regular output to `stdout`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    /// An `Err` is printed as a one-line diagnostic on standard error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        redirections: &Redirections,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let guard = StdioGuard::install(redirections)?;
        let mut stdout = io::stdout().lock();
        let code = match <T as BuiltinCommand>::execute(*self, &mut stdout, env) {
            Ok(x) => x,
            Err(e) => {
                writeln!(io::stderr(), "{e:#}")?;
                1
            }
        };
        stdout.flush()?;
        drop(stdout);
        guard.restore();
        Ok(code)
    }
}

/// Usage text or argument error produced by `argh` instead of a command.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        redirections: &Redirections,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let _guard = StdioGuard::install(redirections)?;
        if self.is_error {
            writeln!(io::stderr(), "{}", self.output)?;
            Ok(1)
        } else {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", self.output)?;
            stdout.flush()?;
            Ok(0)
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::parse(args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Self::from_args(&[Self::name()], args)
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let cwd = env::current_dir().map_err(|e| anyhow!("pwd: {}", e))?;
        writeln!(stdout, "{}", cwd.display())?;
        Ok(0)
    }
}

/// Change the current working directory.
///
/// With no operand, or `~`, changes to $HOME. Operands after the first are ignored and
/// none of them is treated as an option, so `cd -dir` tries the directory `-dir`.
pub struct Cd {
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Cd {
            target: args.first().map(|s| s.to_string()),
        })
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match self.target.as_deref() {
            None | Some("~") => env.home().ok_or_else(|| anyhow!("cd: HOME not set"))?,
            Some(t) => t.to_string(),
        };

        env::set_current_dir(&target)
            .map_err(|_| anyhow!("cd: {}: No such file or directory", target))?;
        Ok(0)
    }
}

/// Exit the shell. The shell always terminates with status 0.
///
/// Arguments are ignored and redirections are never applied: the loop ends even when
/// a redirection target cannot be opened.
pub struct Exit;

impl ExecutableCommand for Exit {
    fn execute(
        self: Box<Self>,
        _redirections: &Redirections,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        debug!("exit requested");
        env.should_exit = true;
        Ok(0)
    }
}

impl CommandFactory for Factory<Exit> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        _args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        (name == "exit").then(|| Box::new(Exit) as Box<dyn ExecutableCommand>)
    }
}

/// Write the arguments to standard output, separated by single spaces and followed
/// by a newline. Arguments are never treated as options.
pub struct Echo {
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Echo {
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}

/// Describe how each name would be interpreted as a command.
pub struct Type {
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Type {
            names: args.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let mut code = 0;
        for name in &self.names {
            if is_builtin(name) {
                writeln!(stdout, "{} is a shell builtin", name)?;
            } else if let Some(path) = find_command_path(&env.path_table(), Path::new(name)) {
                writeln!(stdout, "{} is {}", name, path.display())?;
            } else {
                writeln!(stdout, "{}: not found", name)?;
                code = 1;
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redirect::{OpenMode, Redirect, Stream};
    use crate::test_support::lock_process_state;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn run<T: BuiltinCommand>(args: &[&str], env: &mut Environment) -> (Result<ExitCode>, String) {
        let cmd = T::parse(args).unwrap_or_else(|e| panic!("bad args: {}", e.output));
        let mut out = Vec::new();
        let res = BuiltinCommand::execute(cmd, &mut out, env);
        (res, String::from_utf8(out).unwrap())
    }

    fn env_with_path(path: &str) -> Environment {
        let mut env = Environment::new();
        env.set_var("PATH", path);
        env
    }

    #[test]
    fn test_builtin_names() {
        for name in ["echo", "exit", "cd", "pwd", "type"] {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("ls"));
        assert!(!is_builtin("Echo"));
    }

    #[test]
    fn test_echo_joins_with_single_spaces() {
        let mut env = Environment::new();
        let (res, out) = run::<Echo>(&["hello", "world"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "hello world\n");
    }

    #[test]
    fn test_echo_without_args_prints_newline() {
        let mut env = Environment::new();
        let (_, out) = run::<Echo>(&[], &mut env);
        assert_eq!(out, "\n");
    }

    #[test]
    fn test_echo_prints_option_like_args_verbatim() {
        let mut env = Environment::new();
        let (_, out) = run::<Echo>(&["-n", "--help", "x  y"], &mut env);
        assert_eq!(out, "-n --help x  y\n");
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let _lock = lock_process_state();
        let cur = env::current_dir().unwrap();
        let mut env = Environment::new();

        let (res, out) = run::<Pwd>(&[], &mut env);

        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, format!("{}\n", cur.display()));
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_process_state();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = env::current_dir().unwrap();
        let mut env = Environment::new();

        let target = canonical_temp.to_string_lossy().to_string();
        let (res, _) = run::<Cd>(&[&target], &mut env);

        let new_cwd = fs::canonicalize(env::current_dir().unwrap()).unwrap();
        env::set_current_dir(&orig).expect("failed to restore cwd");
        assert_eq!(res.unwrap(), 0);
        assert_eq!(new_cwd, canonical_temp);
    }

    #[test]
    fn test_cd_relative_path() {
        let _lock = lock_process_state();
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("child")).unwrap();
        let orig = env::current_dir().unwrap();
        env::set_current_dir(temp.path()).unwrap();
        let mut env = Environment::new();

        let (res, _) = run::<Cd>(&["child"], &mut env);

        let new_cwd = fs::canonicalize(env::current_dir().unwrap()).unwrap();
        env::set_current_dir(&orig).expect("failed to restore cwd");
        assert_eq!(res.unwrap(), 0);
        assert_eq!(new_cwd, fs::canonicalize(temp.path().join("child")).unwrap());
    }

    #[test]
    fn test_cd_to_home_when_none_or_tilde() {
        let _lock = lock_process_state();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = env::current_dir().unwrap();
        let mut env = Environment::new();
        env.set_var("HOME", canonical_temp.to_string_lossy().to_string());

        for args in [&[][..], &["~"][..]] {
            env::set_current_dir(&orig).unwrap();
            let (res, _) = run::<Cd>(args, &mut env);
            let new_cwd = fs::canonicalize(env::current_dir().unwrap()).unwrap();
            assert_eq!(res.unwrap(), 0);
            assert_eq!(new_cwd, canonical_temp);
        }

        env::set_current_dir(&orig).expect("failed to restore cwd");
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = lock_process_state();
        let orig = env::current_dir().unwrap();
        let mut env = Environment::new();

        let name = format!("nonexistent_dir_for_cd_test_{}", std::process::id());
        let (res, _) = run::<Cd>(&[&name], &mut env);

        let err = res.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("cd: {}: No such file or directory", name)
        );
        assert_eq!(env::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_cd_uses_first_operand_only() {
        let Ok(cd) = Cd::parse(&["a", "b"]) else {
            panic!("cd rejected its operands");
        };
        assert_eq!(cd.target.as_deref(), Some("a"));
    }

    #[test]
    fn test_cd_into_directory_named_like_an_option() {
        let _lock = lock_process_state();
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("-dir")).unwrap();
        let orig = env::current_dir().unwrap();
        env::set_current_dir(temp.path()).unwrap();
        let mut env = Environment::new();

        let (res, _) = run::<Cd>(&["-dir"], &mut env);

        let new_cwd = fs::canonicalize(env::current_dir().unwrap()).unwrap();
        env::set_current_dir(&orig).expect("failed to restore cwd");
        assert_eq!(res.unwrap(), 0);
        assert_eq!(new_cwd, fs::canonicalize(temp.path().join("-dir")).unwrap());
    }

    #[test]
    fn test_exit_sets_flag_whatever_the_arguments() {
        for args in [&[][..], &["0"][..], &["-1"][..], &["--help"][..]] {
            let mut env = Environment::new();
            let cmd = Factory::<Exit>::default()
                .try_create(&env, "exit", args)
                .expect("exit is always created");
            let res = cmd.execute(&Redirections::default(), &mut env);
            assert_eq!(res.unwrap(), 0);
            assert!(env.should_exit, "exit {:?} did not end the loop", args);
        }
    }

    #[test]
    fn test_exit_ignores_unopenable_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("f");
        let mut redirections = Redirections::default();
        redirections.set(Stream::Stdout, Redirect::new(&target, OpenMode::Truncate));
        let mut env = Environment::new();

        let res = Box::new(Exit).execute(&redirections, &mut env);

        assert_eq!(res.unwrap(), 0);
        assert!(env.should_exit);
        assert!(!target.exists());
    }

    #[test]
    fn test_type_reports_builtins() {
        let mut env = env_with_path("");
        let (res, out) = run::<Type>(&["echo", "type"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "echo is a shell builtin\ntype is a shell builtin\n");
    }

    #[test]
    fn test_type_builtin_shadows_executable() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("pwd");
        fs::write(&fake, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();
        let mut env = env_with_path(&dir.path().to_string_lossy());

        let (_, out) = run::<Type>(&["pwd"], &mut env);
        assert_eq!(out, "pwd is a shell builtin\n");
    }

    #[test]
    fn test_type_reports_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        let mut env = env_with_path(&dir.path().to_string_lossy());

        let (res, out) = run::<Type>(&["tool"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, format!("tool is {}\n", tool.display()));
    }

    #[test]
    fn test_type_reports_not_found() {
        let mut env = env_with_path("");
        let (res, out) = run::<Type>(&["no_such_cmd_xyz"], &mut env);
        assert_eq!(res.unwrap(), 1);
        assert_eq!(out, "no_such_cmd_xyz: not found\n");
    }

    #[test]
    fn test_type_looks_up_option_like_names() {
        let mut env = env_with_path("");
        let (res, out) = run::<Type>(&["-x", "echo"], &mut env);
        assert_eq!(res.unwrap(), 1);
        assert_eq!(out, "-x: not found\necho is a shell builtin\n");
    }

    #[test]
    fn test_type_without_names_is_a_quiet_no_op() {
        // bare `type` prints nothing and succeeds
        let mut env = Environment::new();
        let (res, out) = run::<Type>(&[], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_factory_matches_only_its_name() {
        let env = Environment::new();
        let factory = Factory::<Echo>::default();
        assert!(factory.try_create(&env, "echo", &["x"]).is_some());
        assert!(factory.try_create(&env, "ls", &[]).is_none());
    }

    #[test]
    fn test_factory_turns_bad_args_into_invalid_args() {
        let env = Environment::new();
        let factory = Factory::<Pwd>::default();
        assert!(Pwd::parse(&["--bogus"]).is_err());
        assert!(factory.try_create(&env, "pwd", &["--bogus"]).is_some());
    }
}
