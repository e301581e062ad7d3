use clap::Parser;
use std::path::PathBuf;

use lirc::diag::Diagnostic;
use lirc::pipeline::{CompilationState, EmitTarget, PipelineOptions};
use lirc::shape::Shape;

#[derive(Parser, Debug)]
#[command(
    name = "lirc",
    version,
    about = "Lowered IR core — lowers tensor programs to a linear expression IR and checks it"
)]
struct Cli {
    /// Input source file
    source: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitTarget::Lir)]
    emit: EmitTarget,

    /// Override a graph input shape, e.g. `2,3` or `?,16` (repeatable, in Parameter order)
    #[arg(long = "input-shape", value_name = "DIMS")]
    input_shapes: Vec<Shape>,

    /// Skip structural and shape validation of the lowered body
    #[arg(long)]
    skip_validate: bool,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn report(path: &str, source: &str, diags: &[Diagnostic]) {
    for diag in diags {
        eprintln!("{}", diag.render(path, source));
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let path = cli.source.display().to_string();

    if cli.verbose {
        eprintln!("lirc: source = {path}");
        eprintln!("lirc: emit   = {:?}", cli.emit);
    }

    // ── Read and parse source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("lirc: error: {path}: {e}");
            std::process::exit(2);
        }
    };

    let parse_result = lirc::parser::parse(&source);
    if !parse_result.errors.is_empty() {
        let diags: Vec<Diagnostic> = parse_result
            .errors
            .iter()
            .map(Diagnostic::from_parse_error)
            .collect();
        report(&path, &source, &diags);
        std::process::exit(1);
    }
    let program = match parse_result.program {
        Some(p) => p,
        None => {
            eprintln!("lirc: parse failed with no output");
            std::process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("lirc: parsed {} statements", program.statements.len());
    }

    // ── Pipeline ──
    let options = PipelineOptions {
        emit: cli.emit,
        input_shapes: cli.input_shapes,
        validate: !cli.skip_validate,
        verbose: cli.verbose,
    };
    let mut state = CompilationState::new(program);
    let result = lirc::pipeline::run_pipeline(&mut state, options.terminal(), &options, |_, _| {});
    report(&path, &source, &state.diagnostics);
    if let Err(e) = result {
        eprintln!("lirc: {e}");
        std::process::exit(1);
    }

    // ── Emit ──
    let text = match lirc::pipeline::render(&state, options.emit) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("lirc: error: {e}");
            std::process::exit(1);
        }
    };
    match &cli.output {
        Some(out) => {
            if let Err(e) = std::fs::write(out, text) {
                eprintln!("lirc: error: {}: {e}", out.display());
                std::process::exit(2);
            }
            if cli.verbose {
                eprintln!("lirc: wrote {}", out.display());
            }
        }
        None => print!("{text}"),
    }
}
