use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use curly::CompileErrorKind;
use renderer::{Manifest, RenderError, Renderer};

const TEST_SUFFIX: &str = ".test.curly";

#[derive(Debug, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Presenter the template is compiled and rendered against.
    pub presenter: String,

    /// Expected exact output (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected render error: the error's Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Expected compile error kind, e.g. "InvalidAttributeError".
    #[serde(default)]
    pub expect_compile_error: Option<String>,

    /// Presenters, bindings and content slots, in manifest format.
    #[serde(flatten)]
    pub manifest: Manifest,
}

/// Parse a `.test.curly` file into its TOML config and template source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    let after_open = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest = &after_open[close_pos + 4..];
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

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

impl TestResult {
    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| {
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .map(|name| name.trim_end_matches(TEST_SUFFIX))
                .unwrap_or("?")
        })
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };

    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return fail(None, format!("frontmatter error: {}", e)),
    };

    let renderer = Renderer::new(config.manifest.registry());
    let result = renderer.render_named(&config.presenter, source, &config.manifest.bindings());

    match check_outcome(&config, result) {
        Some(reason) => fail(config.description, reason),
        None => TestResult {
            path: path.to_path_buf(),
            description: config.description,
            outcome: TestOutcome::Pass,
        },
    }
}

/// Compare a render result against the test's expectations. Returns
/// `Some(reason)` on mismatch.
fn check_outcome(config: &TestConfig, result: Result<String, RenderError>) -> Option<String> {
    if let Some(expected) = &config.expect_compile_error {
        let Some(kind) = CompileErrorKind::from_name(expected) else {
            return Some(format!("unknown compile error kind \"{}\"", expected));
        };
        return match result {
            Err(RenderError::Compile(error)) if error.kind() == kind => None,
            Err(RenderError::Compile(error)) => Some(format!(
                "expected {}, got {}: {}",
                kind,
                error.kind(),
                error
            )),
            Err(error) => Some(format!("expected {}, got render error: {}", kind, error)),
            Ok(_) => Some(format!("expected {}, but compilation succeeded", kind)),
        };
    }

    match (&config.expect_error, &config.expect_output, result) {
        (Some(expected_err), _, Err(error)) => {
            let err_str = error.to_string();
            if err_str.contains(expected_err.as_str()) {
                None
            } else {
                Some(format!(
                    "expected error containing \"{}\", got: {}",
                    expected_err, err_str
                ))
            }
        }
        (Some(expected_err), _, Ok(_)) => Some(format!(
            "expected error containing \"{}\", but rendering succeeded",
            expected_err
        )),
        (None, _, Err(RenderError::Compile(error))) => {
            Some(format!("unexpected compile error: {}", error))
        }
        (None, _, Err(error)) => Some(format!("unexpected render error: {}", error)),
        (None, Some(expected_output), Ok(actual)) => {
            let actual_trimmed = actual.trim();
            let expected_trimmed = expected_output.trim();
            if actual_trimmed == expected_trimmed {
                None
            } else {
                Some(format!(
                    "output mismatch\n  expected: {}\n  actual:   {}",
                    expected_trimmed, actual_trimmed
                ))
            }
        }
        (None, None, Ok(_)) => None,
    }
}

/// Discover `.test.curly` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(TEST_SUFFIX))
        {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(cat), files.len());
    }
}

/// Keep the categories named in `requested`, including their subcategories.
/// An empty request selects everything.
fn select_categories<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a Vec<PathBuf>> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v)).collect();
    }

    let mut filtered = BTreeMap::new();
    for requested in requested {
        let req = requested.trim_matches('/');
        let prefix = format!("{}/", req);
        let before = filtered.len();
        for (cat, files) in all {
            if cat == req || cat.starts_with(&prefix) {
                filtered.insert(cat.as_str(), files);
            }
        }
        if filtered.len() == before {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                all.keys()
                    .map(|k| category_label(k))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    filtered
}

fn paint(text: &str, code: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }
}

fn print_result(result: &TestResult, no_color: bool) {
    let status = match result.outcome {
        TestOutcome::Pass => paint("PASS", "32", no_color),
        TestOutcome::Fail(_) => paint("FAIL", "31", no_color),
    };
    eprintln!("  {}  {}", status, result.label());
}

/// Print failure details and the summary line. Returns the exit code.
fn summarize(passed: usize, failures: &[TestResult], no_color: bool) -> i32 {
    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    if failures.is_empty() {
        eprintln!("test result: {}. {} passed, 0 failed", paint("ok", "32", no_color), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            paint("FAILED", "31", no_color),
            passed,
            failures.len(),
            passed + failures.len()
        );
        1
    }
}

/// Run all `.test.curly` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    if path.is_file() {
        let result = run_single_test(path);
        print_result(&result, no_color);
        return match result.outcome {
            TestOutcome::Pass => summarize(1, &[], no_color),
            TestOutcome::Fail(_) => summarize(0, &[result], no_color),
        };
    }

    let all_categories = discover_categorized(path);
    if all_categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return 1;
    }

    let run_categories = select_categories(&all_categories, categories);
    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run_categories {
        eprintln!();
        eprintln!("{}", paint(category_label(cat), "1", no_color));

        for file in *files {
            let result = run_single_test(file);
            print_result(&result, no_color);
            match result.outcome {
                TestOutcome::Pass => passed += 1,
                TestOutcome::Fail(_) => failures.push(result),
            }
        }
    }

    summarize(passed, &failures, no_color)
}
