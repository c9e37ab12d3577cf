use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use wikigraph::{
    DirUploadStore, GraphTag, Orchestrator, RenderRequest, Settings, SystemRunner, TagAttrs,
    WikigraphError, html,
};

#[derive(Parser, Debug)]
#[command(name = "wikigraph", version)]
struct Cli {
    /// Settings JSON (defaults are used when omitted).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a graph source file and print the image-map input text.
    Render(RenderArgs),
    /// Delete every cached file belonging to a page.
    Gc(GcArgs),
    /// Provision placeholder pages for all allowed image types.
    Provision(ProvisionArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Graph source file (DOT or mscgen markup).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Title of the page embedding the graph.
    #[arg(long)]
    title: String,

    /// Acting user name.
    #[arg(long, default_value = "cli")]
    user: String,

    /// Which tag the source was embedded in.
    #[arg(long, value_enum, default_value_t = TagChoice::Graphviz)]
    tag: TagChoice,

    /// Layout engine (dot family only; ignored for mscgen).
    #[arg(long)]
    renderer: Option<String>,

    /// Output image type.
    #[arg(long)]
    format: Option<String>,

    /// Disambiguates identical graphs on one page.
    #[arg(long)]
    uniquifier: Option<String>,

    /// Render as an uncommitted preview.
    #[arg(long)]
    preview: bool,

    /// Run the full save flow (active-file tracking and cleanup) around
    /// the render.
    #[arg(long, conflicts_with = "preview")]
    save: bool,
}

#[derive(Parser, Debug)]
struct GcArgs {
    /// Title of the deleted page.
    #[arg(long)]
    title: String,
}

#[derive(Parser, Debug)]
struct ProvisionArgs {
    /// Acting user name.
    #[arg(long, default_value = "cli")]
    user: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TagChoice {
    Graphviz,
    Mscgen,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let orchestrator = make_orchestrator(cli.config.as_deref())?;
    match cli.cmd {
        Command::Render(args) => cmd_render(&orchestrator, args),
        Command::Gc(args) => cmd_gc(&orchestrator, args),
        Command::Provision(args) => cmd_provision(&orchestrator, args),
    }
}

fn make_orchestrator(config: Option<&std::path::Path>) -> anyhow::Result<Orchestrator> {
    let settings = match config {
        Some(path) => Settings::from_json_file(path)?,
        None => Settings::default(),
    };
    let uploads = DirUploadStore::new(settings.upload_dir.join("uploads"))?;
    Ok(Orchestrator::new(
        settings,
        Box::new(SystemRunner),
        Box::new(uploads),
    ))
}

fn cmd_render(orchestrator: &Orchestrator, args: RenderArgs) -> anyhow::Result<()> {
    let input = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read graph source '{}'", args.in_path.display()))?;

    let tag = match args.tag {
        TagChoice::Graphviz => GraphTag::Graphviz,
        TagChoice::Mscgen => GraphTag::Mscgen,
    };
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    if let Some(renderer) = args.renderer.as_deref() {
        pairs.push(("renderer", renderer));
    }
    if let Some(format) = args.format.as_deref() {
        pairs.push(("format", format));
    }
    if let Some(uniquifier) = args.uniquifier.as_deref() {
        pairs.push(("uniquifier", uniquifier));
    }
    let attrs = TagAttrs::from_pairs(pairs);

    if args.save {
        orchestrator.on_before_save(&args.title, &args.user)?;
    } else {
        orchestrator.ensure_placeholders(&args.user)?;
    }

    let request = RenderRequest {
        tag,
        input: &input,
        attrs,
        title: &args.title,
        user: &args.user,
        is_preview: args.preview,
    };

    match orchestrator.render(&request) {
        Ok(output) => {
            println!("{}", output.image_map_input);
            if args.save {
                let uploaded = orchestrator.on_save_complete(&args.title, &args.user);
                eprintln!("saved {} ({uploaded} deferred uploads)", args.title);
            } else {
                orchestrator.on_page_rendered(&args.title, &args.user);
            }
            Ok(())
        }
        Err(e) => {
            // graph errors render as inline HTML, like any other page output
            match &e {
                WikigraphError::RendererInvocationFailed(diag) => {
                    println!("{}", html::multiline_error_html(diag));
                }
                other => println!("{}", html::error_html(&other.to_string())),
            }
            Err(e.into())
        }
    }
}

fn cmd_gc(orchestrator: &Orchestrator, args: GcArgs) -> anyhow::Result<()> {
    let deleted = orchestrator.on_article_deleted(&args.title);
    eprintln!("deleted {deleted} cached files for {}", args.title);
    Ok(())
}

fn cmd_provision(orchestrator: &Orchestrator, args: ProvisionArgs) -> anyhow::Result<()> {
    let provisioned = orchestrator.ensure_placeholders(&args.user)?;
    eprintln!("provisioned {provisioned} placeholder pages");
    Ok(())
}
