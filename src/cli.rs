use std::fmt;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use monkey::runtime::vm_bc::{MAX_FRAMES, STACK_SIZE};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Compile to bytecode and run it on the VM
    #[default]
    Vm,
    /// Walk the syntax tree directly
    Eval,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Vm => write!(f, "vm"),
            Engine::Eval => write!(f, "eval"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "monkey", bin_name = "monkey")]
#[command(about = "Monkey language compiler, bytecode VM and REPL")]
#[command(after_help = r#"EXAMPLES:
  monkey                      Start the REPL
  monkey fib.mk               Run a script
  monkey --bc fib.mk          Show the compiled bytecode
  monkey --emit fib.bc fib.mk Compile to a file
  monkey --load fib.bc        Run a compiled file
  monkey --bench 30           Time fib(30)"#)]
pub struct Cli {
    /// Script to run; without one the REPL starts
    pub file: Option<PathBuf>,

    /// Execution engine
    #[arg(long, value_enum, default_value_t = Engine::Vm)]
    pub engine: Engine,

    /// Print the tokens of FILE and exit
    #[arg(long)]
    pub tokens: bool,

    /// Disable ANSI colors in --tokens output
    #[arg(long)]
    pub no_color: bool,

    /// Print the syntax tree of FILE and exit
    #[arg(long)]
    pub ast: bool,

    /// Print the compiled bytecode and exit
    #[arg(long)]
    pub bc: bool,

    /// Write the compiled bytecode to PATH instead of running it
    #[arg(long, value_name = "PATH")]
    pub emit: Option<PathBuf>,

    /// Run bytecode written earlier with --emit
    #[arg(long, value_name = "PATH", conflicts_with = "file")]
    pub load: Option<PathBuf>,

    /// Maximum call depth, the top level included
    #[arg(long, value_name = "N", default_value_t = MAX_FRAMES)]
    pub max_frames: usize,

    /// Operand stack slots
    #[arg(long, value_name = "N", default_value_t = STACK_SIZE)]
    pub stack_size: usize,

    /// Time a recursive fib(N) on the selected engine
    #[arg(long, value_name = "N", conflicts_with_all = ["file", "load"])]
    pub bench: Option<u32>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["monkey"]).unwrap();
        assert_eq!(cli.engine, Engine::Vm);
        assert_eq!(cli.max_frames, MAX_FRAMES);
        assert!(cli.file.is_none());
    }

    #[test]
    fn test_engine_and_file() {
        let cli = Cli::try_parse_from(["monkey", "--engine", "eval", "--ast", "a.mk"]).unwrap();
        assert_eq!(cli.engine, Engine::Eval);
        assert!(cli.ast);
        assert_eq!(cli.file, Some(PathBuf::from("a.mk")));
    }

    #[test]
    fn test_bench_conflicts_with_file() {
        assert!(Cli::try_parse_from(["monkey", "--bench", "10", "a.mk"]).is_err());
    }
}
