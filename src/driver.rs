//! Pipeline driver
//!
//! Registers every input once, then compiles one file per task on a rayon
//! pool. Tasks share nothing but the read-only file cache and the logger;
//! a failing file never cancels the others.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use rayon::prelude::*;

use crate::backend::{host_triple, CCodeGen, CodeGen};
use crate::feedback::{CompileReport, FileReport};
use crate::frontend::{dump, FrontEnd};
use crate::middle::codegen;
use crate::middle::optimize::{OptLevel, Optimizer, SizeLevel};
use crate::utils::{Diagnostics, Error, FileCache, Result, SourceFile};

/// What a task writes for its file
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Emit {
    /// Textual IR (`.eir`)
    Ir,
    /// AST dump, to stdout unless `-o` is given
    Ast,
    /// Object file through the C backend (`.o`)
    Obj,
}

impl Emit {
    fn extension(self) -> &'static str {
        match self {
            Emit::Ir => "eir",
            Emit::Ast => "ast",
            Emit::Obj => "o",
        }
    }
}

/// Immutable configuration shared by every task
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub inputs: Vec<PathBuf>,
    pub jobs: usize,
    pub emit: Emit,
    pub opt: OptLevel,
    pub size: SizeLevel,
    pub debug_info: bool,
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            jobs: 1,
            emit: Emit::Ir,
            opt: OptLevel(0),
            size: SizeLevel(0),
            debug_info: false,
            output: None,
            report: None,
        }
    }
}

impl CompileOptions {
    /// Usage problems the argument parser cannot see
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.inputs.is_empty() {
            return Err("no input files".to_string());
        }
        if self.output.is_some() && self.inputs.len() > 1 {
            return Err("-o cannot be used with more than one input file".to_string());
        }
        Ok(())
    }

    fn artifact_path(&self, input: &Path) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| input.with_extension(self.emit.extension()))
    }
}

/// Compile every input; the report says which files succeeded
pub fn compile(options: &Arc<CompileOptions>) -> anyhow::Result<CompileReport> {
    let mut cache = FileCache::new();
    let registered: Vec<std::result::Result<Arc<SourceFile>, (PathBuf, Error)>> = options
        .inputs
        .iter()
        .map(|path| cache.register(path).map_err(|e| (path.clone(), e)))
        .collect();
    log::debug!("registered {} of {} inputs", cache.len(), options.inputs.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.max(1))
        .thread_name(|i| format!("emberc-worker-{}", i))
        .build()
        .context("failed to start the worker pool")?;

    let files = pool.install(|| {
        registered
            .par_iter()
            .map(|entry| match entry {
                Ok(file) => compile_file(file, options),
                Err((path, error)) => {
                    let path = path.display().to_string();
                    report_error(&path, error, None);
                    let mut diagnostics = Diagnostics::new();
                    diagnostics.error(error);
                    FileReport::new(&path, &diagnostics.into_vec())
                }
            })
            .collect()
    });

    let report = CompileReport::new(files);
    if let Some(path) = &options.report {
        report.write(path)?;
        log::info!("wrote report to {}", path.display());
    }
    Ok(report)
}

/// Run one file through the pipeline and report the outcome
fn compile_file(file: &Arc<SourceFile>, options: &CompileOptions) -> FileReport {
    let path = file.path.display().to_string();
    let start = Instant::now();
    let mut diagnostics = Diagnostics::new();

    let outcome = run_pipeline(file, options, &mut diagnostics);
    if let Err(error) = &outcome {
        report_error(&path, error, Some(file.as_ref()));
        diagnostics.error(error);
    }
    let warnings = diagnostics.warnings().count();

    let mut report = FileReport::new(&path, &diagnostics.into_vec());
    if let Ok((functions, artifact)) = outcome {
        report.functions = functions;
        report.artifact = artifact.map(|a| a.display().to_string());
    }
    log::info!(
        "{}: {} with {} warning(s) in {:?}",
        path,
        if report.success { "ok" } else { "failed" },
        warnings,
        start.elapsed()
    );
    report
}

/// Front-end, then either the AST dump or codegen, optimizer and artifact
fn run_pipeline(
    file: &Arc<SourceFile>,
    options: &CompileOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(usize, Option<PathBuf>)> {
    let ast = FrontEnd::run(file)?;

    if options.emit == Emit::Ast {
        let text = dump(&ast);
        return match &options.output {
            Some(path) => {
                write_artifact(path, text.as_bytes())?;
                Ok((0, Some(path.clone())))
            }
            None => {
                write_dump(&mut std::io::stdout().lock(), &text)?;
                Ok((0, None))
            }
        };
    }

    let mut module = codegen::generate(&ast, options.debug_info, diagnostics)?;
    log::debug!("{}: lowered {} functions", module.name, module.functions.len());
    Optimizer::new(options.opt, options.size).optimize(&mut module)?;

    let artifact = options.artifact_path(&file.path);
    match options.emit {
        Emit::Ir => module.write(&artifact)?,
        Emit::Obj => {
            let mut backend = CCodeGen::new(&host_triple()).with_debug_info(options.debug_info);
            log::debug!("{}: {} backend for {}", module.name, backend.name(), backend.target_triple());
            let bytes = backend.generate(&module)?;
            write_artifact(&artifact, &bytes)?;
        }
        Emit::Ast => {}
    }
    Ok((module.functions.len(), Some(artifact)))
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|e| Error::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn write_dump(out: &mut impl Write, text: &str) -> Result<()> {
    out.write_all(text.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| Error::Io {
            path: "<stdout>".to_string(),
            message: e.to_string(),
        })
}

/// `file:line:col: error[Tag]: message`, then the offending line
fn report_error(path: &str, error: &Error, file: Option<&SourceFile>) {
    let Some(loc) = error.loc() else {
        log::error!("{}: error[{}]: {}", path, error.tag(), error);
        return;
    };
    log::error!("{}:{}: error[{}]: {}", path, loc, error.tag(), error);
    if let Some(text) = file.and_then(|f| f.line_text(loc.line)) {
        log::error!("{:>5} | {}", loc.line, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("emberc-driver-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_failures_are_isolated_per_file() {
        let dir = scratch("isolated");
        let good = dir.join("good.em");
        let bad = dir.join("bad.em");
        fs::write(&good, "def f(): i32 { return 1 + 2; }").unwrap();
        fs::write(&bad, "def g(): void { var x: i32; var x: i32; }").unwrap();

        let options = Arc::new(CompileOptions {
            inputs: vec![good.clone(), bad, dir.join("missing.em")],
            jobs: 2,
            opt: OptLevel(2),
            ..CompileOptions::default()
        });
        let report = compile(&options).unwrap();
        assert!(!report.success);

        let tags: Vec<Vec<&str>> = report
            .files
            .iter()
            .map(|f| f.errors().map(|d| d.tag.as_str()).collect())
            .collect();
        assert_eq!(tags, vec![vec![], vec!["RedefinedSymbol"], vec!["IoError"]]);

        let artifact = good.with_extension("eir");
        assert_eq!(report.files[0].artifact, Some(artifact.display().to_string()));
        let ir = fs::read_to_string(artifact).unwrap();
        assert!(ir.contains("ret i32 3"), "{}", ir);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_report_and_explicit_output() {
        let dir = scratch("report");
        let input = dir.join("main.em");
        fs::write(&input, "def main(): i32 { return 0; }").unwrap();
        let output = dir.join("out.eir");
        let report_path = dir.join("report.json");

        let options = Arc::new(CompileOptions {
            inputs: vec![input],
            output: Some(output.clone()),
            report: Some(report_path.clone()),
            ..CompileOptions::default()
        });
        let report = compile(&options).unwrap();
        assert!(report.success);
        assert_eq!(report.files[0].functions, 1);
        assert!(output.exists());

        let written: CompileReport = serde_json::from_str(&fs::read_to_string(report_path).unwrap()).unwrap();
        assert_eq!(written, report);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_ast_dump_to_file() {
        let dir = scratch("ast");
        let input = dir.join("a.em");
        fs::write(&input, "def main(): void { }").unwrap();
        let output = dir.join("a.ast");
        let options = Arc::new(CompileOptions {
            inputs: vec![input],
            emit: Emit::Ast,
            output: Some(output.clone()),
            ..CompileOptions::default()
        });
        assert!(compile(&options).unwrap().success);
        assert!(fs::read_to_string(output).unwrap().contains("FunctionDefinition"));
        let _ = fs::remove_dir_all(dir);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_dump_write_failure_is_an_io_error() {
        let err = write_dump(&mut ClosedPipe, "Block @1:1\n").unwrap_err();
        assert_eq!(err.tag(), "IoError");

        let mut buffer = Vec::new();
        write_dump(&mut buffer, "Block @1:1\n").unwrap();
        assert_eq!(buffer, b"Block @1:1\n");
    }

    #[test]
    fn test_output_needs_single_input() {
        let options = CompileOptions {
            inputs: vec!["a.em".into(), "b.em".into()],
            output: Some("out".into()),
            ..CompileOptions::default()
        };
        assert!(options.validate().is_err());
        assert!(CompileOptions::default().validate().is_err());
    }
}
