use argh::FromArgs;
use log::debug;
use minish::Interpreter;
use minish::readline::ScriptedLines;

#[derive(FromArgs)]
/// A minimal interactive shell.
struct Args {
    /// run a single command line and exit.
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// prompt printed before each line.
    #[argh(option, default = "String::from(\"$ \")")]
    prompt: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args: Args = argh::from_env();

    let mut sh = Interpreter::default();
    match args.command {
        Some(line) => {
            debug!("running single line {:?}", line);
            sh.run_loop(&mut ScriptedLines::new([line]), &args.prompt)
        }
        None => sh.repl(&args.prompt),
    }
}
