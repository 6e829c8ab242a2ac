mod test_runner;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use css_blocks::{BlockCompiler, BlockFactory, BlockId, CssBlocksError, FilesystemImporter, Options};

const CONFIG_FILE: &str = "css-blocks.toml";

#[derive(Parser)]
#[command(name = "css-blocks", version, about = "CSS Blocks compiler")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file (defaults to ./css-blocks.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a block file to CSS
    Compile(CompileArgs),

    /// Parse and compile a block file, reporting errors only
    Check(FileArgs),

    /// Print the object tree of a block and its output class names
    Debug(FileArgs),

    /// Run .test.css fixture files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Block file to compile
    file: PathBuf,

    /// Append an interoperable-CSS :export rule
    #[arg(long)]
    export: bool,

    /// Write the CSS here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct FileArgs {
    /// Block file
    file: PathBuf,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.css file or directory containing them
    path: PathBuf,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let options = match load_options(cli.config.as_deref()) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("error: {}", message);
            process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: cannot start runtime: {}", err);
            process::exit(2);
        }
    };

    let exit_code = match cli.command {
        Command::Compile(args) => runtime.block_on(do_compile(args, options, color_choice)),
        Command::Check(args) => runtime.block_on(do_check(args, options, color_choice)),
        Command::Debug(args) => runtime.block_on(do_debug(args, options, color_choice)),
        Command::Test(args) => {
            if args.list_categories {
                test_runner::list_categories(&args.path);
                0
            } else {
                runtime.block_on(test_runner::run_tests(&args.path, &options, cli.no_color, &args.category))
            }
        }
    };
    process::exit(exit_code);
}

/// Read the configuration file. An explicit `--config` must exist; the
/// default one is optional.
fn load_options(explicit: Option<&Path>) -> Result<Options, String> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = PathBuf::from(CONFIG_FILE);
            if !path.is_file() {
                return Ok(Options::default());
            }
            path
        }
    };
    let text = fs::read_to_string(&path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    let mut options: Options =
        toml::from_str(&text).map_err(|e| format!("invalid config '{}': {}", path.display(), e))?;
    if options.root_dir.is_relative() {
        if let Some(dir) = path.parent() {
            options.root_dir = dir.join(&options.root_dir);
        }
    }
    if options.max_concurrent_compiles == 0 {
        return Err(format!("invalid config '{}': max-concurrent-compiles must be at least 1", path.display()));
    }
    debug!(config = %path.display(), ?options, "loaded configuration");
    Ok(options)
}

/// Load `file` and every block it references.
async fn load(factory: &BlockFactory, file: &Path) -> Result<BlockId, CssBlocksError> {
    let absolute = std::path::absolute(file).unwrap_or_else(|_| file.to_path_buf());
    factory.get_block_from_path(&absolute.to_string_lossy()).await
}

async fn do_compile(args: CompileArgs, mut options: Options, color_choice: ColorChoice) -> i32 {
    options.export_icss |= args.export;
    let factory = BlockFactory::new(options, Rc::new(FilesystemImporter));
    let compiled = match load(&factory, &args.file).await {
        Ok(block) => {
            let graph = factory.graph();
            BlockCompiler::new(&graph, factory.options())
                .compile(block)
                .map(|stylesheet| stylesheet.to_string())
        }
        Err(err) => Err(err),
    };
    let css = match compiled {
        Ok(css) => css,
        Err(err) => {
            emit_error(&err, factory.options(), color_choice);
            return 1;
        }
    };

    match &args.output {
        Some(path) => {
            if let Err(e) = fs::write(path, css) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                return 1;
            }
        }
        None => print!("{}", css),
    }
    0
}

async fn do_check(args: FileArgs, options: Options, color_choice: ColorChoice) -> i32 {
    let factory = BlockFactory::new(options, Rc::new(FilesystemImporter));
    let result = match load(&factory, &args.file).await {
        Ok(block) => {
            let graph = factory.graph();
            BlockCompiler::new(&graph, factory.options())
                .compile_with_output(block, &mut io::sink(), &mut io::sink())
                .map(|_| ())
        }
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => {
            eprintln!("ok: {} is a valid block", args.file.display());
            0
        }
        Err(err) => {
            emit_error(&err, factory.options(), color_choice);
            1
        }
    }
}

async fn do_debug(args: FileArgs, options: Options, color_choice: ColorChoice) -> i32 {
    let factory = BlockFactory::new(options, Rc::new(FilesystemImporter));
    match load(&factory, &args.file).await {
        Ok(block) => {
            let graph = factory.graph();
            for line in graph.debug_lines(block, factory.options()) {
                println!("{}", line);
            }
            0
        }
        Err(err) => {
            emit_error(&err, factory.options(), color_choice);
            1
        }
    }
}

/// Render `error` with a source snippet when its file can be read back.
fn emit_error(error: &CssBlocksError, options: &Options, color_choice: ColorChoice) {
    let source = error.location().and_then(|location| {
        let path = options.root_dir.join(&location.filename);
        fs::read_to_string(path).ok().map(|text| (location.filename.clone(), text))
    });
    let Some((name, text)) = source else {
        eprintln!("error: {}", error);
        return;
    };

    let mut files = SimpleFiles::new();
    let file_id = files.add(name, text);
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    let diagnostic = error.to_diagnostic(file_id);
    if term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic).is_err() {
        eprintln!("error: {}", error);
    }
}
