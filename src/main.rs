use clap::{Parser, Subcommand};
use picstory::config::{self, SiteConfig};
use picstory::error::chain;
use picstory::imaging::RustBackend;
use picstory::output;
use picstory::site::Site;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    if env!("ON_RELEASE_TAG") == "true" {
        return env!("CARGO_PKG_VERSION");
    }
    match env!("GIT_HASH") {
        "" => "dev@unknown",
        // Leaked once at startup
        hash => Box::leak(format!("dev@{hash}").into_boxed_str()),
    }
}

#[derive(Parser)]
#[command(name = "picstory")]
#[command(about = "Picture-story renderer with a cached story, index and rendition pipeline")]
#[command(long_about = "\
Picture-story renderer with a cached story, index and rendition pipeline

Every folder under the story root is one story: an index.xml definition
plus the JPEG pictures it references. Compiled stories, the index page and
resized pictures are cached under the cache root and rebuilt only when the
story folder changes.

Story layout:

  stories/
  ├── 2024-iceland/
  │   ├── index.xml
  │   ├── glacier.jpg
  │   └── beach.jpg
  └── lisbon/
      ├── index.xml
      └── tram.jpg

index.xml:

  <story date=\"2024-06-01\">                 # date is optional
    <title>Iceland</title>
    <description><p>Any markup</p></description>
    <pic src=\"glacier\">Optional caption</pic>  # glacier.jpg
    <note>Text between pictures</note>
    <pic src=\"beach\" indexpic=\"y\"/>          # cover; default is the first
  </story>

Renditions are served as <stem>.<hash>.<size>.jpg where size is one of
w800, w600, w400, w300, w200 or w100.

Run 'picstory gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Site configuration file (missing file means stock defaults)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Recompile stories and the index, ignoring their caches (renditions
    /// are named by content hash and are never redone)
    #[arg(long, global = true)]
    reload: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Site(SiteCommand),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

/// Commands that open the site described by the config file.
#[derive(Subcommand)]
enum SiteCommand {
    /// Build the index page, showing progress per story
    Index,
    /// Compile one story and print its pictures
    Story {
        /// Story folder name
        name: String,
    },
    /// Resolve a rendition filename (<stem>.<hash>.<size>.jpg) to a file
    Picture {
        /// Story folder name
        story: String,
        /// Rendition filename
        file: String,
    },
    /// Pre-render every rendition of one story, or of all stories
    Warm {
        /// Story folder name; all stories when omitted
        story: Option<String>,
    },
    /// Compile every story and report the broken ones
    Check,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", chain(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
        Command::Site(command) => {
            let site_config = config::load_config(&cli.config)?;
            init_thread_pool(&site_config);
            let site = Site::open(&site_config, Arc::new(RustBackend::new()))?;
            run_site(&site, command, cli.reload)
        }
    }
}

fn run_site(
    site: &Site,
    command: SiteCommand,
    reload: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        SiteCommand::Index => {
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    println!("{}", output::format_index_event(&event));
                }
            });
            let result = site.index(reload, Some(&tx));
            drop(tx);
            if printer.join().is_err() {
                warn!("progress printer panicked");
            }
            let page = result?;
            output::print_index_summary(&page);
        }
        SiteCommand::Story { name } => {
            let story = site.story(&name, reload)?;
            output::print_story(&story);
        }
        SiteCommand::Picture { story, file } => {
            let response = site.picture_file(&story, &file, reload)?;
            println!("{}", output::format_picture(&response));
        }
        SiteCommand::Warm { story } => {
            let names = match story {
                Some(name) => vec![name],
                None => site.story_names()?,
            };
            let results: Vec<_> = names
                .into_iter()
                .map(|name| {
                    let result = site.warm(&name, reload).map_err(|e| e.to_string());
                    (name, result)
                })
                .collect();
            output::print_warm(&results, site.renderer().stats());
            if results.iter().any(|(_, r)| r.is_err()) {
                return Ok(ExitCode::FAILURE);
            }
        }
        SiteCommand::Check => {
            let results: Vec<_> = site
                .story_names()?
                .into_iter()
                .map(|name| {
                    let result = site
                        .story(&name, reload)
                        .map(|story| story.pictures.len())
                        .map_err(|e| e.to_string());
                    (name, result)
                })
                .collect();
            output::print_check(&results);
            if results.iter().any(|(_, r)| r.is_err()) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Log to stderr, filtered by `RUST_LOG` (default `picstory=info`).
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("picstory=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(config: &SiteConfig) {
    let threads = config::effective_threads(&config.processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
