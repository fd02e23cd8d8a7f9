use clap::{Parser, Subcommand};
use responsive_images::cache::CacheStats;
use responsive_images::config::{self, CacheDirectory, ResponsiveOptions};
use responsive_images::emit::DirectoryEmitter;
use responsive_images::imaging::AdapterRegistry;
use responsive_images::process::{self, Pipeline};
use responsive_images::output;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Flags that override values from the config file.
#[derive(clap::Args, Clone)]
struct OverrideArgs {
    /// Requested widths, comma-separated (e.g. 300,600,1200)
    #[arg(long, value_delimiter = ',')]
    sizes: Option<Vec<u32>>,

    /// Lossy encoder quality (1-100)
    #[arg(long)]
    quality: Option<u32>,

    /// Output format (jpg, png, webp, avif); defaults to the source format
    #[arg(long)]
    format: Option<String>,

    /// Inline a placeholder as a data URI
    #[arg(long)]
    placeholder: bool,

    /// Cache directory (overrides `cache_directory`)
    #[arg(long, conflicts_with = "no_cache")]
    cache_dir: Option<PathBuf>,

    /// Disable the result cache, forcing every resize to run
    #[arg(long)]
    no_cache: bool,

    /// Pass the source through untouched
    #[arg(long)]
    disable: bool,

    /// Max parallel workers (capped at the number of cores)
    #[arg(long)]
    jobs: Option<usize>,
}

impl OverrideArgs {
    fn apply(self, options: &mut ResponsiveOptions) {
        if let Some(sizes) = self.sizes {
            options.sizes = Some(sizes);
        }
        if let Some(quality) = self.quality {
            options.quality = quality;
        }
        if let Some(format) = self.format {
            options.format = Some(format);
        }
        if self.placeholder {
            options.placeholder = true;
        }
        if let Some(dir) = self.cache_dir {
            options.cache_directory = CacheDirectory::Path(dir);
        }
        if self.no_cache {
            options.cache_directory = CacheDirectory::Toggle(false);
        }
        if self.disable {
            options.disable = true;
        }
        if let Some(jobs) = self.jobs {
            options.processing.max_processes = Some(jobs);
        }
    }
}

#[derive(Parser)]
#[command(name = "responsive-images")]
#[command(about = "Generate responsive image variants and a srcset description")]
#[command(long_about = "\
Generate responsive image variants and a srcset description

One source image becomes a set of resized files plus a JSON artifact:

  {
    \"srcSet\": [{\"src\": \"…-300.jpg 300w\", \"path\": \"…-300.jpg\", …}, …],
    \"images\": [{\"path\": \"…-300.jpg\", \"width\": 300, \"height\": 225}, …],
    \"src\": \"…-300.jpg\",
    \"placeholder\": \"data:image/jpeg;base64,…\",
    \"width\": 300,
    \"height\": 225
  }

Widths larger than the source are clamped and computed once. Options come
from responsive.toml (see 'responsive-images gen-config'); flags override.")]
#[command(version)]
struct Cli {
    /// Log cache and upload details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process source images, one artifact per source
    Build {
        /// Source images
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Config file
        #[arg(long, default_value = config::CONFIG_FILE_NAME)]
        config: PathBuf,

        /// Output root for emitted files and the JSON artifact
        #[arg(long, default_value = "dist")]
        output: PathBuf,

        /// Print the artifact JSON to stdout instead of writing it
        #[arg(long)]
        print: bool,

        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Print a stock responsive.toml with all options documented
    GenConfig,
    /// List registered image adapters
    Adapters,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Build {
            sources,
            config: config_path,
            output: output_dir,
            print,
            overrides,
        } => {
            let mut options = config::load_config(&config_path)?;
            overrides.apply(&mut options);
            init_thread_pool(&options.processing);
            build(&sources, &options, &output_dir, print)?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Adapters => {
            for name in AdapterRegistry::with_defaults().names() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

fn build(
    sources: &[PathBuf],
    options: &ResponsiveOptions,
    output_dir: &Path,
    print: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let adapter = AdapterRegistry::with_defaults().create(&options.adapter)?;
    let emitter = DirectoryEmitter::from_options(output_dir, options);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_process_event(&event) {
                eprintln!("{}", line);
            }
        }
    });
    let pipeline = Pipeline::new(adapter.as_ref(), &emitter).with_events(tx);
    let results: Vec<_> = sources
        .iter()
        .map(|source| process::process_file(source, options, &pipeline))
        .collect();
    drop(pipeline);
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;

    let mut stats = CacheStats::default();
    for (source, result) in sources.iter().zip(results) {
        let result = result?;
        if let Some(status) = result.cache {
            stats.record(status);
        }
        let json = serde_json::to_string_pretty(&result.artifact)?;
        if print {
            println!("{}", json);
            continue;
        }
        std::fs::create_dir_all(output_dir)?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let artifact_path = output_dir.join(format!("{}.json", stem));
        std::fs::write(&artifact_path, json)?;
        for line in output::format_artifact(&result.artifact) {
            println!("{}", line);
        }
        println!("==> Wrote {}", artifact_path.display());
    }
    if !print && stats.total() > 0 {
        println!("Cache: {}", stats);
    }
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
