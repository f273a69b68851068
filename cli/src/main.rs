mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use log::{LevelFilter, debug};

use curly::CompileError;
use renderer::{Manifest, RenderError, Renderer, Value};

const SUBCOMMANDS: &[&str] = &["check", "render", "test", "components", "help"];

#[derive(Parser)]
#[command(name = "curly", version, about = "Curly template compiler")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log compiler and renderer activity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a template against a presenter without rendering it
    Check(CheckArgs),

    /// Compile and render a template
    Render(RenderArgs),

    /// Run .test.curly test files
    Test(TestArgs),

    /// List the components each presenter exposes
    Components(ComponentsArgs),
}

#[derive(clap::Args)]
struct PresenterArgs {
    /// TOML manifest describing the available presenters
    #[arg(short = 'p', long, value_name = "MANIFEST")]
    presenters: PathBuf,

    /// Presenter the template is written for (e.g. posts/show)
    #[arg(long, value_name = "NAME")]
    presenter: String,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Template source file
    file: String,

    #[command(flatten)]
    target: PresenterArgs,

    /// Dump the compiled block tree
    #[arg(long)]
    tree: bool,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Template source file
    file: String,

    #[command(flatten)]
    target: PresenterArgs,

    /// Extra binding passed to the presenter. Repeatable.
    #[arg(long = "bind", value_name = "NAME=VALUE", value_parser = parse_pair)]
    bind: Vec<(String, String)>,

    /// Fill a content slot. Repeatable.
    #[arg(long = "content", value_name = "SLOT=TEXT", value_parser = parse_pair)]
    content: Vec<(String, String)>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.curly file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

#[derive(clap::Args)]
struct ComponentsArgs {
    /// TOML manifest describing the available presenters
    #[arg(short = 'p', long, value_name = "MANIFEST")]
    presenters: PathBuf,

    /// Only list this presenter
    #[arg(long, value_name = "NAME")]
    presenter: Option<String>,
}

fn main() {
    let cli = Cli::parse_from(with_default_subcommand(std::env::args().collect()));
    init_logging(cli.verbose);

    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let exit_code = match cli.command {
        Command::Check(args) => do_check(args, color_choice),
        Command::Render(args) => do_render(args, color_choice),
        Command::Components(args) => do_components(args),
        Command::Test(args) => {
            let path = Path::new(&args.path);
            if args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            test_runner::run_tests(path, cli.no_color, &args.category)
        }
    };
    process::exit(exit_code);
}

/// `curly page.curly ...` is shorthand for `curly render page.curly ...`.
fn with_default_subcommand(mut args: Vec<String>) -> Vec<String> {
    let first_pos = args.iter().skip(1).find(|a| !a.starts_with('-'));
    if first_pos.is_some_and(|first| !SUBCOMMANDS.contains(&first.as_str())) {
        args.insert(1, "render".to_string());
    }
    args
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn do_check(args: CheckArgs, color_choice: ColorChoice) -> i32 {
    let Some(source) = read_source(&args.file) else {
        return 1;
    };
    let Some(manifest) = load_manifest(&args.target.presenters) else {
        return 1;
    };

    let registry = manifest.registry();
    let Some(contract) = registry.contract(&args.target.presenter) else {
        eprintln!(
            "error: presenter '{}' is not defined in {}",
            args.target.presenter,
            args.target.presenters.display()
        );
        return 1;
    };

    match curly::compile_tree(&source, &contract, &registry) {
        Ok(tree) if args.tree => {
            println!("{:#?}", tree);
            0
        }
        Ok(_) => {
            eprintln!("ok: {} compiles against {}", args.file, args.target.presenter);
            0
        }
        Err(error) => {
            emit_compile_error(&args.file, &source, &error, color_choice);
            1
        }
    }
}

fn do_render(args: RenderArgs, color_choice: ColorChoice) -> i32 {
    let Some(source) = read_source(&args.file) else {
        return 1;
    };
    let Some(manifest) = load_manifest(&args.target.presenters) else {
        return 1;
    };

    let mut bindings = manifest.bindings();
    for (name, raw) in &args.bind {
        bindings.insert(name.clone(), parse_binding(raw));
    }
    for (slot, text) in &args.content {
        bindings.set_content(slot.clone(), text.clone());
    }

    let renderer = Renderer::new(manifest.registry());
    match renderer.render_named(&args.target.presenter, &source, &bindings) {
        Ok(output) => {
            print!("{}", output);
            0
        }
        Err(RenderError::Compile(error)) => {
            emit_compile_error(&args.file, &source, &error, color_choice);
            1
        }
        Err(error) => {
            eprintln!("render error: {}", error);
            1
        }
    }
}

fn do_components(args: ComponentsArgs) -> i32 {
    let Some(manifest) = load_manifest(&args.presenters) else {
        return 1;
    };
    let registry = manifest.registry();
    let names = match &args.presenter {
        Some(name) => vec![name.as_str()],
        None => registry.names(),
    };

    for name in names {
        let Some(contract) = registry.contract(name) else {
            eprintln!("error: presenter '{}' is not defined in {}", name, args.presenters.display());
            return 1;
        };
        println!("{}", contract.name());
        for operation in contract.operations() {
            println!("  {}", operation);
        }
    }
    0
}

fn read_source(path: &str) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(source) => Some(source),
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path, e);
            None
        }
    }
}

fn load_manifest(path: &Path) -> Option<Manifest> {
    match Manifest::from_path(path) {
        Ok(manifest) => {
            debug!("loaded {} presenters from {}", manifest.presenters.len(), path.display());
            Some(manifest)
        }
        Err(e) => {
            eprintln!("error: {}: {}", path.display(), e);
            None
        }
    }
}

fn emit_compile_error(name: &str, source: &str, error: &CompileError, color_choice: ColorChoice) {
    let mut files = SimpleFiles::new();
    let file_id = files.add(name.to_string(), source.to_string());
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    let diagnostic = error.to_diagnostic(file_id);
    let _ = term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic);
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))
}

/// Numbers become Number, "true"/"false" become Bool, everything else is Text.
fn parse_binding(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<f64>() {
        return Value::Number(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_files_render() {
        assert_eq!(
            with_default_subcommand(args(&["curly", "page.curly", "-p", "m.toml"])),
            args(&["curly", "render", "page.curly", "-p", "m.toml"])
        );
        assert_eq!(
            with_default_subcommand(args(&["curly", "test", "cases"])),
            args(&["curly", "test", "cases"])
        );
        assert_eq!(with_default_subcommand(args(&["curly", "--help"])), args(&["curly", "--help"]));
    }

    #[test]
    fn pairs_and_bindings() {
        assert_eq!(parse_pair("user=Ann=B"), Ok(("user".to_string(), "Ann=B".to_string())));
        assert!(parse_pair("user").is_err());
        assert_eq!(parse_binding("3"), Value::Number(3.0));
        assert_eq!(parse_binding("false"), Value::Bool(false));
        assert_eq!(parse_binding("Ann"), Value::from("Ann"));
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
