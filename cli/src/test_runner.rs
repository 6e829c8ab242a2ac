use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use codespan_reporting::term::termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use serde::Deserialize;

use css_blocks::{BlockCompiler, BlockFactory, FileIdentifier, FilesystemImporter, Options};

const TEST_SUFFIX: &str = ".test.css";

#[derive(Debug, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Expected compiled CSS (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// The error's Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Compile with the `:export` rule.
    #[serde(default)]
    pub export_icss: bool,
}

/// Split a `.test.css` file into its TOML config and block source.
///
/// The frontmatter is replaced by blank lines so that error locations keep
/// the line numbers of the fixture file.
fn parse_test_file(content: &str) -> Result<(TestConfig, String), String> {
    let content = content.trim_start_matches('\u{feff}');

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest = &after_open[close_pos + 4..];
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig = toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    let frontmatter_lines = content[..content.len() - rest.len()].matches('\n').count();
    let source = format!("{}{}", "\n".repeat(frontmatter_lines), rest);
    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

/// `resolve.test.css` is the block `resolve`.
fn default_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.strip_suffix(TEST_SUFFIX) {
        Some(stem) => stem.to_string(),
        None => file_name,
    }
}

/// Compile a fixture's block source in a fresh factory.
async fn compile_fixture(path: &Path, source: String, options: &Options, export_icss: bool) -> Result<String, String> {
    let options = Options {
        export_icss,
        ..options.clone()
    };
    let factory = BlockFactory::new(options, Rc::new(FilesystemImporter));
    let absolute = std::path::absolute(path).map_err(|e| format!("cannot resolve path: {}", e))?;
    let identifier = FileIdentifier::new(absolute.to_string_lossy());
    let block = factory
        .parse_source(source, identifier, &default_name(path))
        .await
        .map_err(|e| e.to_string())?;
    let graph = factory.graph();
    BlockCompiler::new(&graph, factory.options())
        .compile_with_output(block, &mut io::sink(), &mut io::sink())
        .map(|stylesheet| stylesheet.to_string())
        .map_err(|e| e.to_string())
}

async fn run_single_test(path: &Path, options: &Options) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };

    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return fail(None, format!("frontmatter error: {}", e)),
    };
    let description = config.description.clone();

    let result = compile_fixture(path, source, options, config.export_icss).await;

    let failure = match (&config.expect_error, &config.expect_output, result) {
        (Some(expected_err), _, Err(actual)) => {
            if actual.contains(expected_err.as_str()) {
                None
            } else {
                Some(format!("expected error containing \"{}\", got: {}", expected_err, actual))
            }
        }
        (Some(expected_err), _, Ok(_)) => Some(format!(
            "expected error containing \"{}\", but compilation succeeded",
            expected_err
        )),
        (None, _, Err(actual)) => Some(format!("unexpected error: {}", actual)),
        (None, Some(expected_output), Ok(actual)) => {
            let actual_trimmed = actual.trim();
            let expected_trimmed = expected_output.trim();
            if actual_trimmed == expected_trimmed {
                None
            } else {
                Some(format!(
                    "output mismatch\n  expected:\n{}\n  actual:\n{}",
                    indent(expected_trimmed),
                    indent(actual_trimmed)
                ))
            }
        }
        (None, None, Ok(_)) => None,
    };

    match failure {
        Some(reason) => fail(description, reason),
        None => TestResult {
            path: path.to_path_buf(),
            description,
            outcome: TestOutcome::Pass,
        },
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fixture files under `root`, grouped by the directory they sit in
/// relative to `root` (`""` for `root` itself).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for path in entries.flatten().map(|entry| entry.path()) {
            if path.is_dir() {
                pending.push(path);
            } else if is_fixture(&path) {
                categories.entry(category_of(&dir, root)).or_default().push(path);
            }
        }
    }
    categories.values_mut().for_each(|files| files.sort());
    categories
}

fn is_fixture(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TEST_SUFFIX))
}

fn category_of(dir: &Path, root: &Path) -> String {
    let Ok(relative) = dir.strip_prefix(root) else {
        return String::new();
    };
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn category_name(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("{} is a single fixture without categories", path.display());
        return;
    }
    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }
    for (category, files) in &categories {
        eprintln!("{:<24} {} fixture(s)", category_name(category), files.len());
    }
}

fn label(result: &TestResult) -> &str {
    result.description.as_deref().unwrap_or_else(|| {
        result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_suffix(TEST_SUFFIX))
            .unwrap_or("?")
    })
}

/// Categories named by `requested`, including their subcategories.
fn select<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a Vec<PathBuf>> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v)).collect();
    }
    let mut filtered = BTreeMap::new();
    for requested in requested {
        let wanted = requested.trim_matches('/');
        let nested = format!("{}/", wanted);
        let before = filtered.len();
        filtered.extend(
            all.iter()
                .filter(|(category, _)| category.as_str() == wanted || category.starts_with(&nested))
                .map(|(category, files)| (category.as_str(), files)),
        );
        if filtered.len() == before {
            let known: Vec<&str> = all.keys().map(|category| category_name(category)).collect();
            eprintln!("warning: no category '{}' (known: {})", wanted, known.join(", "));
        }
    }
    filtered
}

/// Progress and summary lines on stderr, colored unless disabled.
struct Report {
    out: StandardStream,
}

impl Report {
    fn new(no_color: bool) -> Self {
        let choice = if no_color { ColorChoice::Never } else { ColorChoice::Auto };
        Report {
            out: StandardStream::stderr(choice),
        }
    }

    fn styled(&mut self, text: &str, spec: &ColorSpec) -> io::Result<()> {
        self.out.set_color(spec)?;
        write!(self.out, "{}", text)?;
        self.out.reset()
    }

    fn category(&mut self, category: &str) -> io::Result<()> {
        writeln!(self.out)?;
        self.styled(category_name(category), ColorSpec::new().set_bold(true))?;
        writeln!(self.out)
    }

    fn outcome(&mut self, result: &TestResult) -> io::Result<()> {
        let (verdict, color) = match result.outcome {
            TestOutcome::Pass => ("PASS", Color::Green),
            TestOutcome::Fail(_) => ("FAIL", Color::Red),
        };
        write!(self.out, "  ")?;
        self.styled(verdict, ColorSpec::new().set_fg(Some(color)))?;
        writeln!(self.out, "  {}", label(result))
    }

    fn failures(&mut self, failures: &[TestResult]) -> io::Result<()> {
        if failures.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "\nfailures:")?;
        for failure in failures {
            writeln!(self.out, "\n  --- {} ---", failure.path.display())?;
            if let TestOutcome::Fail(reason) = &failure.outcome {
                for line in reason.lines() {
                    writeln!(self.out, "  {}", line)?;
                }
            }
        }
        Ok(())
    }

    fn summary(&mut self, passed: usize, failed: usize) -> io::Result<()> {
        write!(self.out, "\n{} fixture(s): ", passed + failed)?;
        if failed == 0 {
            self.styled("all passed", ColorSpec::new().set_fg(Some(Color::Green)))?;
            writeln!(self.out)
        } else {
            self.styled(&format!("{} failed", failed), ColorSpec::new().set_fg(Some(Color::Red)))?;
            writeln!(self.out, ", {} passed", passed)
        }
    }
}

/// Run every fixture under `path`, or `path` itself when it is a file,
/// limited to `categories` when any are given. Returns the exit code: 0
/// when everything passed, 1 otherwise.
pub async fn run_tests(path: &Path, options: &Options, no_color: bool, categories: &[String]) -> i32 {
    let single;
    let all_categories;
    let selected = if path.is_file() {
        single = vec![path.to_path_buf()];
        BTreeMap::from([("", &single)])
    } else {
        all_categories = discover_categorized(path);
        if all_categories.is_empty() {
            eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
            return 1;
        }
        select(&all_categories, categories)
    };
    if selected.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut report = Report::new(no_color);
    match run_selected(&selected, options, path.is_dir(), &mut report).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("error: cannot write test report: {}", err);
            1
        }
    }
}

async fn run_selected(
    selected: &BTreeMap<&str, &Vec<PathBuf>>,
    options: &Options,
    show_categories: bool,
    report: &mut Report,
) -> io::Result<bool> {
    let mut passed = 0;
    let mut failures = Vec::new();
    for (category, files) in selected {
        if show_categories {
            report.category(category)?;
        }
        for file in files.iter() {
            let result = run_single_test(file, options).await;
            report.outcome(&result)?;
            match result.outcome {
                TestOutcome::Pass => passed += 1,
                TestOutcome::Fail(_) => failures.push(result),
            }
        }
    }
    report.failures(&failures)?;
    report.summary(passed, failures.len())?;
    Ok(failures.is_empty())
}
