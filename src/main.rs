use std::fs::File;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use opal::ast::{ExprId, Stmt};
use opal::ast_printer::AstPrinter;
use opal::error::OpalError;
use opal::interpreter::Interpreter;
use opal::parser::Parser;
use opal::resolver::{Locals, Resolver};
use opal::scanner::Scanner;
use opal::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about = "Opal language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize { filename: PathBuf },

    /// Parses input from a file and prints its AST
    Parse {
        filename: PathBuf,

        /// Dump the AST as JSON instead of the prefix form
        #[arg(long)]
        json: bool,
    },

    /// Runs input from a file as an Opal program
    Run { filename: PathBuf },

    /// Starts an interactive prompt
    Repl,
}

/// Memory-maps the source file.  Empty files cannot be mapped, so they are
/// represented as `None` and read as the empty string.
fn map_file(filename: &PathBuf) -> Result<Option<Mmap>> {
    info!("Mapping file: {:?}", filename);

    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let metadata = file
        .metadata()
        .context(format!("Failed to stat file {:?}", filename))?;

    if metadata.len() == 0 {
        return Ok(None);
    }

    let mmap = unsafe { Mmap::map(&file) }
        .context(format!("Failed to map file {:?}", filename))?;

    info!("Mapped {} bytes from {:?}", mmap.len(), filename);

    Ok(Some(mmap))
}

fn source_str(mmap: &Option<Mmap>) -> Result<&str> {
    match mmap {
        Some(mmap) => std::str::from_utf8(mmap).context("Source is not valid UTF-8"),
        None => Ok(""),
    }
}

fn init_logger() -> Result<()> {
    // Create or open the log file
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    // Configure env_logger to write to file with module path and source line
    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("opal::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Scans the whole source, reporting every lex error.  `Err` means at least
/// one error was printed.
fn scan(source: &str) -> std::result::Result<Vec<Token>, ()> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut had_error = false;

    for result in Scanner::new(source) {
        match result {
            Ok(token) => tokens.push(token),
            Err(e) => {
                had_error = true;
                eprintln!("{}", e);
            }
        }
    }

    if had_error {
        Err(())
    } else {
        Ok(tokens)
    }
}

fn report_all(errors: &[OpalError]) {
    for e in errors {
        eprintln!("{}", e);
    }
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename } => {
            info!("Running Tokenize subcommand");

            let mmap = map_file(&filename)?;
            let source = source_str(&mmap)?;

            let mut tokenized = true;

            for result in Scanner::new(source) {
                match result {
                    Ok(token) => {
                        debug!("Scanned token: {}", token);

                        println!("{}", token);
                    }

                    Err(e) => {
                        tokenized = false;

                        eprintln!("{}", e);
                    }
                }
            }

            if !tokenized {
                debug!("Tokenization failed, exiting with code 65");

                std::process::exit(65);
            }

            info!("Tokenization completed successfully");
        }

        Commands::Parse { filename, json } => {
            info!("Running Parse subcommand");

            let mmap = map_file(&filename)?;
            let source = source_str(&mmap)?;

            let Ok(tokens) = scan(source) else {
                std::process::exit(65);
            };

            let statements: Vec<Stmt> = match Parser::new(tokens).parse() {
                Ok(statements) => statements,
                Err(errors) => {
                    report_all(&errors);
                    std::process::exit(65);
                }
            };

            if json {
                let dump =
                    serde_json::to_string_pretty(&statements).context("Failed to encode AST")?;
                println!("{}", dump);
            } else {
                for stmt in &statements {
                    println!("{}", AstPrinter::print_stmt(stmt));
                }
            }

            info!("Parse subcommand completed");
        }

        Commands::Run { filename } => {
            info!("Running Run subcommand");

            let mmap = map_file(&filename)?;
            let source = source_str(&mmap)?;

            let Ok(tokens) = scan(source) else {
                std::process::exit(65);
            };

            let statements: Vec<Stmt> = match Parser::new(tokens).parse() {
                Ok(statements) => statements,
                Err(errors) => {
                    report_all(&errors);
                    std::process::exit(65);
                }
            };

            info!("Parsed {} statements", statements.len());

            // Static errors skip evaluation entirely.
            let locals: Locals = match Resolver::new().resolve(&statements) {
                Ok(locals) => locals,
                Err(errors) => {
                    report_all(&errors);
                    std::process::exit(65);
                }
            };

            let mut interpreter = Interpreter::new();

            if let Err(e) = interpreter.interpret(&statements, locals) {
                eprintln!("{}", e);
                std::process::exit(70);
            }

            info!("Program executed successfully");
        }

        Commands::Repl => {
            info!("Starting REPL");

            repl()?;
        }
    }

    Ok(())
}

/// Interactive prompt.  One interpreter (and its global environment) lives
/// for the whole session; a mistake on one line never kills the session.
/// The parser id watermark is threaded between lines so resolved distances
/// from earlier lines stay valid.
fn repl() -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    let mut interpreter = Interpreter::new();
    let mut next_id: ExprId = 0;

    loop {
        write!(stdout, "> ").context("Failed to write prompt")?;
        stdout.flush().context("Failed to flush prompt")?;

        let mut line = String::new();
        let bytes = stdin
            .lock()
            .read_line(&mut line)
            .context("Failed to read line")?;

        // Ctrl+D ends the session.
        if bytes == 0 {
            writeln!(stdout).ok();
            break;
        }

        let Ok(tokens) = scan(&line) else {
            continue;
        };

        let mut parser = Parser::with_first_id(tokens, next_id);

        let statements: Vec<Stmt> = match parser.parse() {
            Ok(statements) => statements,
            Err(errors) => {
                report_all(&errors);
                continue;
            }
        };

        next_id = parser.id_watermark();

        let locals: Locals = match Resolver::new().resolve(&statements) {
            Ok(locals) => locals,
            Err(errors) => {
                report_all(&errors);
                continue;
            }
        };

        // Closure values created on this line keep their declarations alive
        // through `Rc`, so the statement list itself can be dropped.
        if let Err(e) = interpreter.interpret(&statements, locals) {
            eprintln!("{}", e);
        }
    }

    Ok(())
}
