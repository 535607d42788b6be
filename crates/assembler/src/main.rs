//! CLI entry point for the Ferrite-8 assembler binary.
//!
//! The binary owns everything the core is not allowed to do: it reads the
//! entry file and every transitively included file from disk into a
//! [`SourceSet`], hands the set to the pure core, prints diagnostics to
//! stderr, and writes the assembled segments as a flat binary image.

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use assembler::assembler::{assemble_multi, Artifact};
use assembler::encoder::Segment;
use assembler::include::SourceSet;
use assembler::parser::{parse_line, Directive, LineBody};
use isa_core as _;
#[cfg(test)]
use tempfile as _;

const USAGE_TEXT: &str = "\
Usage: ferrite-asm <command> [options]

Commands:
  build <input> [-o <output>] [--verbose]  Assemble source to a binary image
  check <input>                            Assemble and report diagnostics only

Options:
  -o, --output <file>  Output file path (default: input stem + .bin)
  -v, --verbose        Print symbols and source map to stderr (build only)
  -h, --help           Show this help message

Examples:
  ferrite-asm build game.f8
  ferrite-asm build game.f8 -o game.bin
  ferrite-asm check game.f8
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Build(BuildArgs),
    Check(CheckArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct BuildArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct CheckArgs {
    input: PathBuf,
}

#[derive(Debug)]
enum ParsedArgs {
    Command(Command),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParsedArgs, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParsedArgs::Help);
    }

    let command = first.to_string_lossy().to_string();
    match command.as_str() {
        "build" => parse_build_args(args)
            .map(Command::Build)
            .map(ParsedArgs::Command),
        "check" => parse_check_args(args)
            .map(Command::Check)
            .map(ParsedArgs::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

#[allow(clippy::while_let_on_iterator)]
fn parse_build_args(mut args: impl Iterator<Item = OsString>) -> Result<BuildArgs, String> {
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut verbose = false;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--verbose" || arg == "-v" {
            verbose = true;
            continue;
        }

        if arg == "-o" || arg == "--output" {
            let value = args
                .next()
                .ok_or_else(|| "missing value for -o".to_string())?;
            output = Some(PathBuf::from(value));
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if input.is_some() {
            return Err("multiple input paths provided".to_string());
        }
        input = Some(PathBuf::from(arg));
    }

    let input = input.ok_or_else(|| "missing input path".to_string())?;
    Ok(BuildArgs {
        input,
        output,
        verbose,
    })
}

fn parse_check_args(args: impl Iterator<Item = OsString>) -> Result<CheckArgs, String> {
    let mut input: Option<PathBuf> = None;

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if input.is_some() {
            return Err("multiple input paths provided".to_string());
        }
        input = Some(PathBuf::from(arg));
    }

    let input = input.ok_or_else(|| "missing input path".to_string())?;
    Ok(CheckArgs { input })
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}.bin"))
}

fn parent_key(key: &str) -> &str {
    key.rfind('/').map_or("", |pos| &key[..pos])
}

fn join_key(dir: &str, path: &str) -> String {
    if path.starts_with('/') || dir.is_empty() {
        path.trim_start_matches('/').to_string()
    } else {
        format!("{dir}/{path}")
    }
}

/// Paths an `.include` on this line of text refers to, if any.
fn include_target(line: &str) -> Option<String> {
    match parse_line(line) {
        Ok(parsed) => match parsed.body {
            LineBody::Directive(Directive::Include(path)) => path,
            _ => None,
        },
        Err(_) => None,
    }
}

/// Reads the entry file and every transitively included file into a
/// source set keyed by path relative to the entry file's directory.
///
/// Files that cannot be read are simply left out of the set: the core
/// attributes the missing include to the right source line.
fn materialize(input: &Path) -> Result<SourceSet, String> {
    let entry_key = input
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("invalid input path: {}", input.display()))?
        .to_string();
    let root = input.parent().unwrap_or_else(|| Path::new("")).to_path_buf();

    let mut sources = HashMap::new();
    let mut queue = vec![entry_key.clone()];

    while let Some(key) = queue.pop() {
        if sources.contains_key(&key) {
            continue;
        }
        let text = match fs::read_to_string(root.join(&key)) {
            Ok(text) => text,
            Err(error) => {
                if key == entry_key {
                    return Err(format!("cannot read {}: {error}", input.display()));
                }
                continue;
            }
        };

        for line in text.lines() {
            if let Some(target) = include_target(line) {
                queue.push(join_key(parent_key(&key), &target));
            }
        }
        sources.insert(key, text);
    }

    Ok(SourceSet::new(sources, entry_key))
}

fn report_diagnostics(artifact: &Artifact) {
    for diagnostic in &artifact.diagnostics {
        eprintln!("{}", diagnostic.format_for_stderr());
    }
}

/// Flattens segments into one image covering `[base, end)`, zero-filled
/// between segments.
fn build_image(segments: &[Segment]) -> (u16, Vec<u8>) {
    let Some(base) = segments.iter().map(|s| s.start).min() else {
        return (0, Vec::new());
    };
    let end = segments
        .iter()
        .map(|s| u32::from(s.start) + s.data.len() as u32)
        .max()
        .unwrap_or(u32::from(base));

    let mut image = vec![0u8; (end - u32::from(base)) as usize];
    for segment in segments {
        let offset = usize::from(segment.start - base);
        image[offset..offset + segment.data.len()].copy_from_slice(&segment.data);
    }
    (base, image)
}

fn print_verbose(artifact: &Artifact) {
    let mut symbols: Vec<(&String, &u16)> = artifact.symbols.iter().collect();
    symbols.sort_by(|a, b| a.0.cmp(b.0));
    eprintln!("Symbols:");
    for (name, value) in symbols {
        eprintln!("  {name} = ${value:04X}");
    }

    eprintln!("Source map:");
    for entry in &artifact.source_map {
        eprintln!("  {:04X}: {}:{}", entry.address, entry.file, entry.line);
    }
}

fn run_build(args: &BuildArgs) -> Result<(), u8> {
    let set = materialize(&args.input).map_err(|message| {
        eprintln!("error: {message}");
        1u8
    })?;

    let artifact = assemble_multi(&set);
    report_diagnostics(&artifact);

    if artifact.has_errors() {
        return Err(1);
    }

    if args.verbose {
        print_verbose(&artifact);
    }

    let (base, image) = build_image(&artifact.segments);
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    fs::write(&output_path, &image).map_err(|error| {
        eprintln!("error: failed to write output: {error}");
        1u8
    })?;

    println!(
        "Assembled {} ({} bytes at ${base:04X}) -> {}",
        args.input.display(),
        image.len(),
        output_path.display()
    );

    Ok(())
}

fn run_check(args: &CheckArgs) -> Result<(), u8> {
    let set = materialize(&args.input).map_err(|message| {
        eprintln!("error: {message}");
        1u8
    })?;

    let artifact = assemble_multi(&set);
    report_diagnostics(&artifact);

    if artifact.has_errors() {
        return Err(1);
    }

    println!(
        "{}: {} segment(s), {} symbol(s), no errors",
        args.input.display(),
        artifact.segments.len(),
        artifact.symbols.len()
    );

    Ok(())
}

fn main() -> ExitCode {
    match parse_args(env::args_os().skip(1)) {
        Ok(ParsedArgs::Help) => {
            print!("{USAGE_TEXT}");
            ExitCode::SUCCESS
        }
        Ok(ParsedArgs::Command(command)) => {
            let result = match command {
                Command::Build(args) => run_build(&args),
                Command::Check(args) => run_check(&args),
            };
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(code) => ExitCode::from(code),
            }
        }
        Err(message) => {
            eprintln!("error: {message}");
            eprint!("{USAGE_TEXT}");
            ExitCode::from(2)
        }
    }
}
