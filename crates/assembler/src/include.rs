//! Include resolution (pass 0) over a pre-materialized source set.
//!
//! The core never touches the filesystem: callers hand over a
//! `path → text` map and an entry path, and this module flattens the
//! include tree into one ordered line sequence. Traversal is depth first.
//! A case-folded set of admitted paths makes resolution idempotent: a file
//! whose normalized path was already admitted is silently skipped, which
//! covers both duplicate includes and include cycles with one rule.

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostic, DiagnosticList, SourceLoc};
use crate::parser::{parse_line, Directive, LineBody, ParsedLine};

/// Path used for single-file assembly and source-map annotations.
pub const DEFAULT_SOURCE_PATH: &str = "main.f8";

/// A pre-materialized set of source files plus the entry path.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    /// Mapping from path to file text.
    pub sources: HashMap<String, String>,
    /// Path of the file where assembly starts.
    pub entry: String,
}

impl SourceSet {
    /// Creates a source set from a path map and an entry path.
    #[must_use]
    pub fn new(sources: HashMap<String, String>, entry: impl Into<String>) -> Self {
        Self {
            sources,
            entry: entry.into(),
        }
    }

    /// Wraps a single source text under [`DEFAULT_SOURCE_PATH`].
    #[must_use]
    pub fn single(text: impl Into<String>) -> Self {
        let mut sources = HashMap::new();
        sources.insert(DEFAULT_SOURCE_PATH.to_string(), text.into());
        Self {
            sources,
            entry: DEFAULT_SOURCE_PATH.to_string(),
        }
    }
}

/// One line of the flattened program with its originating location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLine {
    /// Path of the file this line came from (as keyed in the source set).
    pub file: String,
    /// 1-indexed line number within that file.
    pub line: usize,
    /// Raw line text, for listings.
    pub text: String,
    /// Parsed line.
    pub parsed: ParsedLine,
}

/// Normalizes a path: forward slashes, `.` segments dropped, `..` segments
/// resolved against their parent where one exists.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let normalized = path.replace('\\', "/");
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn fold_path(path: &str) -> String {
    normalize_path(path).to_ascii_lowercase()
}

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |pos| &path[..pos])
}

fn join_relative(dir: &str, path: &str) -> String {
    if path.starts_with('/') || dir.is_empty() {
        path.trim_start_matches('/').to_string()
    } else {
        format!("{dir}/{path}")
    }
}

struct Resolver<'a> {
    set: &'a SourceSet,
    /// Case-folded normalized path -> source-set key.
    index: HashMap<String, &'a str>,
    admitted: HashSet<String>,
    lines: Vec<ResolvedLine>,
}

impl Resolver<'_> {
    fn expand(&mut self, key: &str, diagnostics: &mut DiagnosticList) {
        let Some(text) = self.set.sources.get(key) else {
            return;
        };
        let key = key.to_string();

        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let loc = SourceLoc::new(key.clone(), line_number);

            let parsed = match parse_line(raw) {
                Ok(parsed) => parsed,
                Err(error) => {
                    diagnostics.push(Diagnostic::error(loc, error.to_string()));
                    self.push_line(&key, line_number, raw, ParsedLine::empty());
                    continue;
                }
            };

            if let LineBody::Directive(Directive::Include(path)) = &parsed.body {
                // A label on the include line still defines a symbol at
                // the inclusion point.
                if parsed.label.is_some() {
                    self.push_line(
                        &key,
                        line_number,
                        raw,
                        ParsedLine {
                            label: parsed.label.clone(),
                            body: LineBody::Empty,
                        },
                    );
                }
                self.expand_include(&key, line_number, path.as_deref(), diagnostics);
                continue;
            }

            self.push_line(&key, line_number, raw, parsed);
        }
    }

    fn expand_include(
        &mut self,
        from: &str,
        line: usize,
        path: Option<&str>,
        diagnostics: &mut DiagnosticList,
    ) {
        let loc = SourceLoc::new(from.to_string(), line);

        let Some(path) = path else {
            diagnostics.push(Diagnostic::error(loc, ".include requires a file path"));
            return;
        };

        let joined = join_relative(parent_dir(from), path);
        let folded = fold_path(&joined);

        if self.admitted.contains(&folded) {
            return;
        }

        let Some(key) = self.index.get(&folded).copied() else {
            diagnostics.push(Diagnostic::error(
                loc,
                format!("Cannot find included file: {path}"),
            ));
            return;
        };

        self.admitted.insert(folded);
        self.expand(key, diagnostics);
    }

    fn push_line(&mut self, file: &str, line: usize, text: &str, parsed: ParsedLine) {
        self.lines.push(ResolvedLine {
            file: file.to_string(),
            line,
            text: text.to_string(),
            parsed,
        });
    }
}

/// Flattens the source set into one ordered line sequence, following
/// `.include` directives depth first.
///
/// Resolution problems (missing entry, missing included file, `.include`
/// without a path) and line parse errors become diagnostics; resolution
/// continues past all of them.
#[must_use]
pub fn resolve(set: &SourceSet, diagnostics: &mut DiagnosticList) -> Vec<ResolvedLine> {
    // Sorted so that colliding case-folded keys resolve deterministically.
    let mut keys: Vec<&str> = set.sources.keys().map(String::as_str).collect();
    keys.sort_unstable();

    let mut index = HashMap::new();
    for key in keys {
        index.entry(fold_path(key)).or_insert(key);
    }

    let mut resolver = Resolver {
        set,
        index,
        admitted: HashSet::new(),
        lines: Vec::new(),
    };

    let entry_folded = fold_path(&set.entry);
    let Some(entry_key) = resolver.index.get(&entry_folded).copied() else {
        diagnostics.push(Diagnostic::error(
            SourceLoc::new(set.entry.clone(), 1),
            "Entry point file not found",
        ));
        return Vec::new();
    };

    resolver.admitted.insert(entry_folded);
    resolver.expand(entry_key, diagnostics);
    resolver.lines
}
