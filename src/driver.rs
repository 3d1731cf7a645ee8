//! Command-line driver: flag parsing, file I/O and external tools.
//!
//! The compiler core maps a source string to an IR module string and knows
//! nothing about files or processes; everything around that lives here. The
//! flag parser is a flat match loop – the handful of options does not
//! warrant a parser dependency. Native artifacts are produced by shelling
//! out to `llc` and a system C compiler.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use snafu::{ResultExt, Snafu};

use crate::error::CompileError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Snafu)]
pub enum DriverError {
  #[snafu(display("{message}"))]
  Usage { message: String },

  #[snafu(display("cannot open {}: {source}", path.display()))]
  ReadInput {
    path: PathBuf,
    source: std::io::Error,
  },

  #[snafu(display("cannot write {}: {source}", path.display()))]
  WriteOutput {
    path: PathBuf,
    source: std::io::Error,
  },

  #[snafu(display("{tool} failed: {detail}"))]
  Tool { tool: &'static str, detail: String },

  #[snafu(transparent)]
  Compile { source: CompileError },
}

/// How far to take the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Executable,
  Ir,
  Assembly,
  Object,
}

/// A fully parsed command line.
#[derive(Debug, PartialEq, Eq)]
pub struct Options {
  pub input: PathBuf,
  pub output: Option<String>,
  pub stage: Stage,
  pub verbose: bool,
}

/// What one invocation asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
  Help,
  Version,
  Build(Options),
}

pub fn print_usage(program: &str) {
  println!("Usage: {program} <input.tsp> [options]\n");
  println!("Options:");
  println!("  -o <output>   Specify output executable name");
  println!("  --emit-ir     Emit LLVM IR only (.ll)");
  println!("  --emit-asm    Emit assembly only (.s)");
  println!("  --emit-obj    Emit object file only (.o)");
  println!("  --verbose     Preserve all intermediates");
  println!("  --help        Show this help message");
  println!("  --version     Show version information");
}

/// Parse everything after the program name.
pub fn parse_args(args: &[String]) -> DriverResult<Invocation> {
  let mut input: Option<PathBuf> = None;
  let mut output = None;
  let mut stage = Stage::Executable;
  let mut verbose = false;

  let mut iter = args.iter();
  while let Some(arg) = iter.next() {
    match arg.as_str() {
      "--help" | "-h" => return Ok(Invocation::Help),
      "--version" | "-v" => return Ok(Invocation::Version),
      "-o" => {
        let Some(name) = iter.next() else {
          return UsageSnafu {
            message: "-o requires an output name",
          }
          .fail();
        };
        output = Some(name.clone());
      }
      "--emit-ir" => stage = Stage::Ir,
      "--emit-asm" => stage = Stage::Assembly,
      "--emit-obj" => stage = Stage::Object,
      "--verbose" => verbose = true,
      other if other.starts_with('-') => {
        return UsageSnafu {
          message: format!("unknown option: {other}"),
        }
        .fail();
      }
      path => input = Some(PathBuf::from(path)),
    }
  }

  let Some(input) = input else {
    return UsageSnafu {
      message: "no input file",
    }
    .fail();
  };
  Ok(Invocation::Build(Options {
    input,
    output,
    stage,
    verbose,
  }))
}

/// Entry point used by the binary: parse flags and run the build.
pub fn run(args: &[String]) -> DriverResult<()> {
  let program = args.first().map(String::as_str).unwrap_or("tisp");
  match parse_args(args.get(1..).unwrap_or(&[]))? {
    Invocation::Help => print_usage(program),
    Invocation::Version => println!("tisp {VERSION} - Tiny Lisp"),
    Invocation::Build(options) => build(&options)?,
  }
  Ok(())
}

fn build(options: &Options) -> DriverResult<()> {
  let source = fs::read_to_string(&options.input).context(ReadInputSnafu {
    path: options.input.clone(),
  })?;
  let module = crate::compile_to_ir(&source)?;

  let stem = options
    .input
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "out".to_string());
  let ll_path = format!("{stem}.ll");
  let asm_path = format!("{stem}.s");
  let obj_path = format!("{stem}.o");

  fs::write(&ll_path, &module).context(WriteOutputSnafu {
    path: PathBuf::from(&ll_path),
  })?;
  if options.stage == Stage::Ir {
    return Ok(());
  }

  let mut llc = Command::new("llc");
  llc.arg("-O2").arg(&ll_path);
  if options.stage == Stage::Object {
    llc.args(["--filetype=obj", "-o", &obj_path]);
  } else {
    llc.args(["-o", &asm_path]);
  }
  run_tool("llc", &mut llc)?;

  if matches!(options.stage, Stage::Assembly | Stage::Object) {
    if !options.verbose {
      let _ = fs::remove_file(&ll_path);
    }
    return Ok(());
  }

  let exe = executable_name(options.output.as_deref().unwrap_or(&stem));
  link(&asm_path, &exe)?;

  if !options.verbose {
    let _ = fs::remove_file(&ll_path);
    let _ = fs::remove_file(&asm_path);
  }
  Ok(())
}

fn executable_name(name: &str) -> String {
  if cfg!(windows) {
    format!("{name}.exe")
  } else {
    name.to_string()
  }
}

/// Link with the platform's preferred C compiler, falling back to the other
/// one when it is missing or fails.
fn link(asm_path: &str, exe: &str) -> DriverResult<()> {
  let (first, second) = if cfg!(windows) {
    ("gcc", "clang")
  } else {
    ("clang", "gcc")
  };
  let mut primary = Command::new(first);
  primary.args([asm_path, "-o", exe]);
  if run_tool(first, &mut primary).is_ok() {
    return Ok(());
  }
  let mut fallback = Command::new(second);
  fallback.args([asm_path, "-o", exe]);
  run_tool(second, &mut fallback)
}

fn run_tool(tool: &'static str, command: &mut Command) -> DriverResult<()> {
  let output = command.output().map_err(|err| {
    ToolSnafu {
      tool,
      detail: err.to_string(),
    }
    .build()
  })?;
  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return ToolSnafu {
      tool,
      detail: stderr.trim().to_string(),
    }
    .fail();
  }
  Ok(())
}
