//! `cflow`: a thin binary that wires the lowering pipeline stages together
//! for a single translation unit and reports diagnostics. The full CLI
//! surface of a production driver — multi-file builds, driver-level
//! caching, linkage — is out of scope; this exists only as the minimal
//! external-collaborator interface the pipeline is invoked through.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use cflow_core::{DiagnosticBag, TypeRegistry};
use cflow_front::options::{Define, PipelineOptions};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DumpStage {
    Cabs,
    Clight,
    Cminor,
    Cminorsel,
    Rtl,
}

/// Lowers a C translation unit down to an RTL control-flow graph.
#[derive(Debug, Parser)]
#[command(name = "cflow", about = "C-to-RTL lowering pipeline driver")]
struct Cli {
    /// The `.c` source file to compile.
    input: PathBuf,

    /// `-I` user include paths, searched after the source file's own
    /// directory for `"..."` includes.
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<String>,

    /// `-isystem` system include paths.
    #[arg(long = "isystem", value_name = "DIR")]
    isystem: Vec<String>,

    /// `-D NAME` or `-D NAME=value`.
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    define: Vec<String>,

    /// `-U NAME`.
    #[arg(short = 'U', value_name = "NAME")]
    undefine: Vec<String>,

    /// Emit `# line "file"` markers in preprocessed output.
    #[arg(long)]
    emit_line_markers: bool,

    /// Shell out to the host C compiler's `-E` instead of the built-in
    /// preprocessor.
    #[arg(long)]
    use_external_preprocessor: bool,

    /// Print the IR at the named stage and exit without lowering further.
    #[arg(long = "dump-ir", value_enum)]
    dump_ir: Option<DumpStage>,
}

fn parse_define(raw: &str) -> Define {
    match raw.split_once('=') {
        Some((name, value)) => Define { name: name.to_string(), value: Some(value.to_string()) },
        None => Define { name: raw.to_string(), value: None },
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let opts = PipelineOptions {
        user_include_paths: cli.include.clone(),
        system_include_paths: cli.isystem.clone(),
        defines: cli.define.iter().map(|d| parse_define(d)).collect(),
        undefines: cli.undefine.clone(),
        preserve_comments: false,
        emit_line_markers: cli.emit_line_markers,
        use_external_preprocessor: cli.use_external_preprocessor,
        max_include_depth: 200,
    };

    run(&cli, &opts)
}

fn run(cli: &Cli, opts: &PipelineOptions) -> ExitCode {
    let mut diags = DiagnosticBag::new();

    let tu = {
        let _span = tracing::info_span!("preprocess_and_parse").entered();
        match cflow_front::compile_front(&cli.input, opts, &mut diags) {
            Ok(tu) => tu,
            Err(e) => {
                eprintln!("{}: {e}", cli.input.display());
                return ExitCode::FAILURE;
            }
        }
    };

    for d in diags.iter() {
        eprintln!("{d}");
    }
    if diags.has_errors() {
        return ExitCode::FAILURE;
    }

    if matches!(cli.dump_ir, Some(DumpStage::Cabs)) {
        println!("{}", serde_json::to_string_pretty(&tu).unwrap_or_default());
        return ExitCode::SUCCESS;
    }

    let mut registry = TypeRegistry::new();

    let (clight_program, lowering_errors) = {
        let _span = tracing::info_span!("simpl_expr").entered();
        cflow_ir::simpl_expr::lower_program(&tu, &mut registry)
    };
    for e in &lowering_errors {
        eprintln!("{e}");
    }
    if !lowering_errors.is_empty() {
        return ExitCode::FAILURE;
    }

    let mut clight_program = clight_program;
    {
        let _span = tracing::info_span!("simpl_locals").entered();
        cflow_ir::simpl_locals::run(&mut clight_program);
    }
    if matches!(cli.dump_ir, Some(DumpStage::Clight)) {
        println!("{}", serde_json::to_string_pretty(&clight_program).unwrap_or_default());
        return ExitCode::SUCCESS;
    }

    let cminor_program = {
        let _span = tracing::info_span!("cminor_gen").entered();
        cflow_ir::cminor_gen::lower_program(&clight_program, &registry)
    };
    if matches!(cli.dump_ir, Some(DumpStage::Cminor)) {
        println!("{}", cflow_rtl::printer::print_cminor_program(&cminor_program));
        return ExitCode::SUCCESS;
    }

    let (sel_program, select_errors) = {
        let _span = tracing::info_span!("select").entered();
        cflow_select::select_program(&cminor_program)
    };
    for e in &select_errors {
        eprintln!("{e}");
    }
    if !select_errors.is_empty() {
        return ExitCode::FAILURE;
    }
    if matches!(cli.dump_ir, Some(DumpStage::Cminorsel)) {
        println!("{}", serde_json::to_string_pretty(&sel_program).unwrap_or_default());
        return ExitCode::SUCCESS;
    }

    let (rtl_program, rtlgen_errors) = {
        let _span = tracing::info_span!("rtlgen").entered();
        cflow_rtl::gen_program(&sel_program)
    };
    for e in &rtlgen_errors {
        eprintln!("{e}");
    }
    if !rtlgen_errors.is_empty() {
        return ExitCode::FAILURE;
    }

    println!("{}", cflow_rtl::printer::print_rtl_program(&rtl_program));
    ExitCode::SUCCESS
}
