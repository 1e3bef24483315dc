//! Workflow schema CLI
//!
//! Command-line interface for linting workflow files and inspecting flow
//! documentation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use flow_schema::{
    documentation_for, lint_tree, load_file, FlowDocParameter, FlowIndex, LintResult,
    MetaTypeProvider, Severity,
};

#[derive(Parser)]
#[command(name = "flow-schema")]
#[command(about = "Lint workflow files and inspect flow documentation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint workflow files (unknown keys, bad values, missing call inputs)
    Lint {
        /// Files to lint
        files: Vec<PathBuf>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress output for clean files
        #[arg(long, short)]
        quiet: bool,
    },

    /// Print a flow's parsed documentation block
    Doc {
        /// Workflow file
        file: PathBuf,

        /// Flow name
        flow: String,
    },

    /// List flow definitions and their documentation status
    Flows {
        /// Workflow file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Lint {
            files,
            json,
            strict,
            quiet,
        } => run_lint(&files, json, strict, quiet),
        Commands::Doc { file, flow } => run_doc(&file, &flow),
        Commands::Flows { file } => run_flows(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_lint(files: &[PathBuf], json: bool, strict: bool, quiet: bool) -> Result<(), u8> {
    if files.is_empty() {
        eprintln!("Error: no files given");
        return Err(2);
    }

    let mut results: Vec<(&Path, LintResult)> = Vec::new();
    for file in files {
        let tree = load_file(file).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;
        let provider = MetaTypeProvider::new();
        results.push((file, lint_tree(&tree, &provider)));
    }

    let errors: usize = results.iter().map(|(_, r)| r.errors).sum();
    let warnings: usize = results.iter().map(|(_, r)| r.warnings).sum();
    let failed = errors > 0 || (strict && warnings > 0);

    if json {
        let files_json: Vec<_> = results
            .iter()
            .map(|(file, result)| {
                serde_json::json!({
                    "file": file.display().to_string(),
                    "errors": result.errors,
                    "warnings": result.warnings,
                    "diagnostics": result.diagnostics,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": !failed,
            "errors": errors,
            "warnings": warnings,
            "files": files_json,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                return Err(2);
            }
        }
    } else {
        for (file, result) in &results {
            let clean = result.diagnostics.is_empty();
            if !quiet || !clean {
                let icon = if result.errors > 0 {
                    "\x1b[31m✗\x1b[0m"
                } else if result.warnings > 0 {
                    "\x1b[33m⚠\x1b[0m"
                } else {
                    "\x1b[32m✓\x1b[0m"
                };
                println!("  {} {}", icon, file.display());
            }
            for diag in &result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {}:{} - {}",
                        color, label, diag.code, diag.line, diag.column, diag.message
                    );
                }
            }
        }

        println!();
        if failed {
            println!(
                "\x1b[31m✗ {} files checked ({} errors, {} warnings)\x1b[0m",
                results.len(),
                errors,
                warnings
            );
        } else {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                results.len()
            );
        }
    }

    if failed {
        Err(1)
    } else {
        Ok(())
    }
}

fn run_doc(file: &Path, flow: &str) -> Result<(), u8> {
    let tree = load_file(file).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let index = FlowIndex::build(&tree);
    let Some(definition) = index.get(flow) else {
        eprintln!("Error: flow not found: {}", flow);
        return Err(2);
    };

    let Some(doc) = documentation_for(&tree, definition) else {
        println!("{}: no documentation", flow);
        return Ok(());
    };

    println!("{}", flow);
    if let Some(description) = &doc.description {
        for line in description.lines() {
            println!("  {}", line);
        }
    }
    print_params("in", &doc.input_parameters);
    print_params("out", &doc.output_parameters);
    for error in &doc.errors {
        let (line, column) = tree.line_col(error.span.start);
        eprintln!("  error at {}:{}: {}", line, column, error.message);
    }

    if doc.errors.is_empty() {
        Ok(())
    } else {
        Err(1)
    }
}

fn print_params(section: &str, params: &[FlowDocParameter]) {
    if params.is_empty() {
        return;
    }
    println!("  {}:", section);
    for param in params {
        let mut line = format!("    {}: {}", param.name, param.raw_type);
        if param.mandatory {
            line.push_str(", mandatory");
        }
        if let Some(description) = &param.description {
            line.push_str(&format!(" - {}", description));
        }
        println!("{}", line);
    }
}

fn run_flows(file: &Path) -> Result<(), u8> {
    let tree = load_file(file).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let index = FlowIndex::build(&tree);
    let mut names: Vec<&str> = index.names().collect();
    names.sort_unstable();

    if names.is_empty() {
        println!("no flows defined");
        return Ok(());
    }

    for name in names {
        let documented = index
            .get(name)
            .and_then(|def| documentation_for(&tree, def))
            .is_some();
        let marker = if documented { "documented" } else { "-" };
        println!("{:<30} {}", name, marker);
    }
    Ok(())
}
