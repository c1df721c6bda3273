mod cli;

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser as _;
use rustyline::error::ReadlineError;

use crate::cli::{Cli, Engine};
use monkey::bytecode::compile::Compiler;
use monkey::bytecode::disasm::print_bytecode;
use monkey::bytecode::ir::Bytecode;
use monkey::frontend;
use monkey::frontend::lexer::Lexer;
use monkey::frontend::token_dumper::TokenDumper;
use monkey::lang::builtins::BUILTINS;
use monkey::lang::program::Program;
use monkey::lang::value::Value;
use monkey::runtime::session::{Session, SessionError};
use monkey::runtime::vm_ast::Evaluator;
use monkey::runtime::vm_bc::{Vm, VmConfig};

const PROMPT: &str = ">> ";

const FIB_TEMPLATE: &str = r#"
let fib = fn(x) {
    if (x == 0) {
        0
    } else {
        if (x == 1) {
            1
        } else {
            fib(x - 1) + fib(x - 2)
        }
    }
};
fib({n})
"#;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = VmConfig {
        stack_size: cli.stack_size,
        max_frames: cli.max_frames,
    };

    if let Some(n) = cli.bench {
        return bench(n, cli.engine, config);
    }

    if let Some(path) = &cli.load {
        let bytecode = load_bytecode(path)?;
        if cli.bc {
            print_bytecode(&bytecode);
            return Ok(());
        }
        return run_bytecode(bytecode, config);
    }

    match &cli.file {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("could not read {}", path.display()))?;
            run_source(&cli, &source, config)
        }
        None => {
            if cli.tokens || cli.ast || cli.bc || cli.emit.is_some() {
                bail!("--tokens, --ast, --bc and --emit need a FILE");
            }
            repl(cli.engine, config)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

// Scripts

fn run_source(cli: &Cli, source: &str, config: VmConfig) -> Result<()> {
    if cli.tokens {
        dump_tokens(source, cli.no_color)?;
        return Ok(());
    }

    let program = frontend::parse(source)?;

    if cli.ast {
        println!("{:#?}", program);
        return Ok(());
    }

    match cli.engine {
        Engine::Eval => {
            Evaluator::with_max_frames(config.max_frames)
                .eval_program(&program)
                .map_err(|err| anyhow!("Woops! Evaluation failed: {}", err))?;
            Ok(())
        }
        Engine::Vm => {
            let bytecode = compile(&program)?;

            if cli.bc {
                print_bytecode(&bytecode);
                return Ok(());
            }

            if let Some(path) = &cli.emit {
                let bytes = bytecode
                    .to_bytes()
                    .map_err(|err| anyhow!("could not encode bytecode: {}", err))?;
                fs::write(path, &bytes)
                    .with_context(|| format!("could not write {}", path.display()))?;
                log::info!("wrote {} bytes to {}", bytes.len(), path.display());
                return Ok(());
            }

            run_bytecode(bytecode, config)
        }
    }
}

fn dump_tokens(source: &str, no_color: bool) -> Result<()> {
    let tokens = Lexer::new(source).tokenize()?;

    let mut dumper = TokenDumper::new().pretty();
    if no_color {
        dumper = dumper.no_color();
    }
    dumper.dump(&tokens);
    Ok(())
}

fn compile(program: &Program) -> Result<Bytecode> {
    let mut compiler = Compiler::new();
    if let Err(err) = compiler.compile(program) {
        if let Some(hint) = err.hint() {
            eprintln!("hint: {}", hint);
        }
        bail!("Woops! Compilation failed: {}", err);
    }
    Ok(compiler.bytecode())
}

fn load_bytecode(path: &Path) -> Result<Bytecode> {
    let bytes = fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    Bytecode::from_bytes(&bytes)
        .map_err(|err| anyhow!("{} is not valid bytecode: {}", path.display(), err))
}

fn run_bytecode(bytecode: Bytecode, config: VmConfig) -> Result<()> {
    let mut vm = Vm::with_config(bytecode, Vec::new(), config, BUILTINS);
    vm.run()
        .map_err(|err| anyhow!("Woops! Executing bytecode failed: {}", err))
}

// REPL

fn repl(engine: Engine, config: VmConfig) -> Result<()> {
    println!("This is the Monkey programming language!");
    println!("Feel free to type in commands");

    let mut editor = rustyline::DefaultEditor::new()?;
    let mut session = Session::with_config(config.clone());
    let mut evaluator = Evaluator::with_max_frames(config.max_frames);

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        match engine {
            Engine::Vm => match session.eval(&line) {
                Ok(value) => println!("{}", value),
                Err(SessionError::Syntax(err)) => println!("{}", err),
                Err(SessionError::Compile(err)) => println!("Woops! Compilation failed: {}", err),
                Err(SessionError::Runtime(err)) => {
                    println!("Woops! Executing bytecode failed: {}", err)
                }
            },
            Engine::Eval => match frontend::parse(&line) {
                Ok(program) => match evaluator.eval_program(&program) {
                    Ok(value) => println!("{}", value),
                    Err(err) => println!("Woops! Evaluation failed: {}", err),
                },
                Err(err) => println!("{}", err),
            },
        }
    }

    Ok(())
}

// Benchmark

fn bench(n: u32, engine: Engine, config: VmConfig) -> Result<()> {
    let source = FIB_TEMPLATE.replace("{n}", &n.to_string());
    let program = frontend::parse(&source)?;

    let start = Instant::now();
    let result: Value = match engine {
        Engine::Vm => {
            let mut compiler = Compiler::new();
            compiler
                .compile(&program)
                .map_err(|err| anyhow!("compiler error: {}", err))?;
            let mut vm = Vm::with_config(compiler.bytecode(), Vec::new(), config, BUILTINS);
            vm.run().map_err(|err| anyhow!("vm error: {}", err))?;
            vm.last_popped_stack_elem()
        }
        Engine::Eval => Evaluator::with_max_frames(config.max_frames)
            .eval_program(&program)
            .map_err(|err| anyhow!("eval error: {}", err))?,
    };
    let duration = start.elapsed();

    println!(
        "engine={}, result={}, duration={:?}",
        engine, result, duration
    );
    Ok(())
}
