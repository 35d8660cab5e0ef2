use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contextualizer_core::{
    ContextualizerService, ExportRequest, LoadSource, Session, SessionConfig,
};
use indexmap::IndexMap;
use report_model::{ExportArtifact, Page, Preferences};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use storage::Storage;

/// Overrides where preferences are stored.
pub const CONFIG_DIR_ENV: &str = "CONTEXTUALIZER_CONFIG_DIR";

#[derive(Debug, Parser)]
#[command(name = "contextualizer")]
#[command(about = "Attach plain-language context to the visuals of a .pbix report")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the pages and visuals of a report as JSON.
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the contexts embedded in a previously exported report.
    Contexts {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Save contexts for visuals and write the annotated report.
    Annotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Context for one visual, e.g. `page0_visual1=Revenue by month`.
        #[arg(long = "set", value_name = "ID=TEXT", value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
        /// JSON object mapping visual ids to context text.
        #[arg(long = "from", value_name = "JSON_FILE")]
        from: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show or update stored preferences.
    Config {
        #[arg(long)]
        user: Option<String>,
        #[arg(long = "output-name", value_name = "FILE_NAME")]
        output_name: Option<String>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InspectOutput<'a> {
    file_name: &'a str,
    page_count: usize,
    visual_count: usize,
    annotated_count: usize,
    pages: &'a [Page],
}

#[derive(Debug, Serialize)]
struct ConfigOutput<'a> {
    path: String,
    preferences: &'a Preferences,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Inspect { file } => run_inspect(&file),
        Commands::Contexts { file } => run_contexts(&file),
        Commands::Annotate { file, assignments, from, name, user, output } => {
            let request = ExportRequest { name, user };
            run_annotate(&file, assignments, from.as_deref(), request, output)
        }
        Commands::Config { user, output_name } => run_config(user, output_name),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_inspect(file: &Path) -> Result<()> {
    ensure_package_exists(file)?;

    let mut prepared =
        Session::prepare(LoadSource::from(file)).context("failed to open report package")?;
    let annotated_count = prepared
        .embedded_contexts()
        .context("failed to read embedded contexts")?
        .map(|metadata| metadata.contexts.annotated_count(prepared.document()))
        .unwrap_or(0);

    let document = prepared.document();
    let payload = InspectOutput {
        file_name: &document.file_name,
        page_count: document.pages.len(),
        visual_count: document.visual_count(),
        annotated_count,
        pages: &document.pages,
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_contexts(file: &Path) -> Result<()> {
    ensure_package_exists(file)?;

    let mut prepared =
        Session::prepare(LoadSource::from(file)).context("failed to open report package")?;
    let Some(metadata) =
        prepared.embedded_contexts().context("failed to read embedded contexts")?
    else {
        anyhow::bail!("no contexts embedded in {}", file.display());
    };

    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

fn run_annotate(
    file: &Path,
    assignments: Vec<(String, String)>,
    from: Option<&Path>,
    request: ExportRequest,
    output: Option<PathBuf>,
) -> Result<()> {
    ensure_package_exists(file)?;

    let preferences = open_storage()?.load_preferences().context("failed to load preferences")?;
    let config = SessionConfig::from(&preferences);

    let mut contexts = match from {
        Some(path) => read_context_file(path)?,
        None => Vec::new(),
    };
    contexts.extend(assignments);

    let output = match output {
        Some(output) => output,
        None => default_output(file, &config.output_file_name)?,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("failed to start async runtime")?;
    let artifact = runtime.block_on(annotate_and_export(file, config, contexts, request))?;

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    fs::write(&output, &artifact.bytes)
        .with_context(|| format!("failed to write report to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

async fn annotate_and_export(
    file: &Path,
    config: SessionConfig,
    contexts: Vec<(String, String)>,
    request: ExportRequest,
) -> Result<ExportArtifact> {
    let service = ContextualizerService::new(config);
    service.load_document(LoadSource::from(file)).await.context("failed to open report package")?;

    for (visual_id, text) in contexts {
        service.set_annotation(visual_id, text);
    }

    if let Some(document) = service.document() {
        tracing::info!(
            annotated = service.annotations().annotated_count(&document),
            visuals = document.visual_count(),
            "contexts saved"
        );
    }

    service.export_document(request).await.context("failed to export report package")
}

fn run_config(user: Option<String>, output_name: Option<String>) -> Result<()> {
    let storage = open_storage()?;
    let mut preferences = storage.load_preferences().context("failed to load preferences")?;

    if user.is_some() || output_name.is_some() {
        if let Some(user) = user {
            preferences.user_name = user;
        }
        if let Some(output_name) = output_name {
            if output_name.trim().is_empty() {
                anyhow::bail!("--output-name must not be empty");
            }
            preferences.output_file_name = output_name;
        }

        storage.save_preferences(&preferences).context("failed to save preferences")?;
    }

    let payload = ConfigOutput {
        path: storage.preferences_path().display().to_string(),
        preferences: &preferences,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn open_storage() -> Result<Storage> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) => Ok(Storage::with_root(dir)),
        None => Storage::from_default_project().context("failed to locate preferences"),
    }
}

fn read_context_file(path: &Path) -> Result<Vec<(String, String)>> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read contexts from {}", path.display()))?;
    let contexts: IndexMap<String, String> = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a JSON object of strings", path.display()))?;

    Ok(contexts.into_iter().collect())
}

/// The configured output name next to the input, unless that is the input itself.
fn default_output(file: &Path, output_file_name: &str) -> Result<PathBuf> {
    let output = file.with_file_name(output_file_name);

    let same_file = match (fs::canonicalize(file), fs::canonicalize(&output)) {
        (Ok(input), Ok(existing)) => input == existing,
        _ => false,
    };
    if same_file {
        anyhow::bail!(
            "refusing to overwrite the input report {}; pass --output to choose another path",
            file.display()
        );
    }

    Ok(output)
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, text)) if !id.trim().is_empty() => Ok((id.trim().to_owned(), text.to_owned())),
        _ => Err(format!("expected ID=TEXT, got `{raw}`")),
    }
}

fn ensure_package_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
