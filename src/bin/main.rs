use std::{error::Error, fs, path::PathBuf, process::ExitCode};

use clap::Parser;
use sclc::{
    backend::{text::TextBackend, Backend},
    options::{Options, DEFAULT_STACK_MAX},
    util::logging,
    CompileError,
};

#[derive(Debug, Parser)]
#[command(name = "sclc", about = "Compiles a smart-contract source file.", version)]
struct Args {
    /// Path to the source file.
    file: PathBuf,

    /// Print the token stream.
    #[arg(long)]
    dump_tokens: bool,

    /// Print the checked tree.
    #[arg(long)]
    dump_ast: bool,

    /// Print the lowered modules.
    #[arg(long)]
    dump_ir: bool,

    /// Log filter directive, such as `debug` or `sclc::trans=trace`.
    #[arg(long = "log", value_name = "FILTER")]
    log_level: Option<String>,

    /// Stack limit of the generated code, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_STACK_MAX)]
    stack_max: u32,
}

impl Args {
    fn options(&self) -> Options {
        Options {
            dump_tokens: self.dump_tokens,
            dump_ast: self.dump_ast,
            dump_ir: self.dump_ir,
            log_level: self.log_level.clone(),
            stack_max: self.stack_max,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("sclc: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let options = args.options();
    logging::init_with_level(options.log_level.as_deref());

    let path = args.file.display();
    let src = fs::read_to_string(&args.file).map_err(|error| format!("{path}: {error}"))?;
    let compiled = match sclc::compile(&src, &options) {
        Ok(compiled) => compiled,
        Err(CompileError::Rejected { errors, messages }) => {
            for message in messages {
                eprintln!("{path}:{message}");
            }
            return Err(format!("{path}: {errors} error(s)").into());
        }
        Err(error) => return Err(error.into()),
    };
    for message in &compiled.messages {
        eprintln!("{path}:{message}");
    }

    if let Some(tokens) = &compiled.tokens_dump {
        print!("{tokens}");
    }
    if let Some(ast) = &compiled.ast_dump {
        print!("{ast}");
    }
    // Listing also validates every module.
    let mut backend = TextBackend::with_stack_max(options.stack_max);
    for module in &compiled.modules {
        let listing = backend.generate(module, &compiled.idents)?;
        if options.dump_ir {
            print!("{listing}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::Args;

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn flags_fill_the_options() {
        let args = Args::parse_from([
            "sclc",
            "--dump-ir",
            "--log",
            "sclc=debug",
            "--stack-max",
            "4096",
            "a.sc",
        ]);
        let options = args.options();
        assert!(options.dump_ir && !options.dump_ast && !options.dump_tokens);
        assert_eq!(options.log_level.as_deref(), Some("sclc=debug"));
        assert_eq!(options.stack_max, 4096);
        assert_eq!(args.file.to_str(), Some("a.sc"));
    }

    #[test]
    fn defaults_match_the_library() {
        let args = Args::parse_from(["sclc", "a.sc"]);
        assert_eq!(args.options(), sclc::options::Options::default());
        assert!(Args::try_parse_from(["sclc"]).is_err());
    }
}
