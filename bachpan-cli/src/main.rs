use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use bachpan_core::catalog;
use bachpan_core::config::Config;
use bachpan_core::embedding::local::LocalImageEmbedder;
use bachpan_core::embedding::ImageEmbedder;
use bachpan_core::MatchService;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bachpan-cli")]
struct Cli {
    /// Path to the config file
    #[arg(long, default_value = "bachpan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect the reference catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Match one image against the reference catalog and print the result
    Match {
        /// Query image file
        image: PathBuf,
        /// Number of matches to return
        #[arg(short, long)]
        k: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the config file
    Validate,
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List the identifiers the catalog resolves to
    List,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config {
            action: ConfigAction::Validate,
        } => validate_config(&cli.config),
        Command::Catalog {
            action: CatalogAction::List,
        } => list_catalog(&cli.config),
        Command::Match { image, k } => run_match(&cli.config, &image, k).await,
    };

    match result {
        Ok(output) => print!("{output}"),
        Err(msg) => {
            eprintln!("{msg}");
            process::exit(1);
        }
    }
}

fn load_config(config_path: &Path) -> Result<Config, String> {
    if !config_path.exists() {
        return Err(format!(
            "Config file not found: {}. Use --config to specify the path.",
            config_path.display()
        ));
    }
    Config::from_file(config_path).map_err(|e| format!("Config error: {e}"))
}

fn validate_config(config_path: &Path) -> Result<String, String> {
    load_config(config_path)?;
    Ok("Config is valid.\n".to_string())
}

fn list_catalog(config_path: &Path) -> Result<String, String> {
    let config = load_config(config_path)?;
    let items = catalog::resolve(&config.catalog).map_err(|e| format!("Catalog error: {e}"))?;
    let mut output = String::new();
    for item in &items {
        output.push_str(&item.identifier);
        output.push('\n');
    }
    output.push_str(&format!("{} images\n", items.len()));
    Ok(output)
}

async fn run_match(config_path: &Path, image: &Path, k: Option<usize>) -> Result<String, String> {
    let config = load_config(config_path)?;
    let embedder = local_embedder().await?;
    match_image(&config, embedder, image, k).await
}

async fn local_embedder() -> Result<Arc<dyn ImageEmbedder>, String> {
    let embedder = tokio::task::spawn_blocking(LocalImageEmbedder::new)
        .await
        .map_err(|e| format!("Embedding model loader crashed: {e}"))?
        .map_err(|e| format!("Embedding error: {e}"))?;
    Ok(Arc::new(embedder))
}

/// Build the reference set, match `image` against it, and render the same
/// JSON body the HTTP endpoint returns.
async fn match_image(
    config: &Config,
    embedder: Arc<dyn ImageEmbedder>,
    image: &Path,
    k: Option<usize>,
) -> Result<String, String> {
    let bytes = std::fs::read(image)
        .map_err(|e| format!("Failed to read image '{}': {e}", image.display()))?;
    let items = catalog::resolve(&config.catalog).map_err(|e| format!("Catalog error: {e}"))?;

    let service = MatchService::new(embedder, config.matching.options());
    let report = service
        .initialize(items)
        .await
        .map_err(|e| format!("Error: {e}"))?;
    for failure in &report.failures {
        log::warn!("skipped {}: {}", failure.identifier, failure.reason);
    }

    let matches = service
        .match_image(&bytes, k)
        .await
        .map_err(|e| format!("Error: {e}"))?;
    let body = serde_json::json!({ "matches": matches });
    serde_json::to_string_pretty(&body)
        .map(|s| s + "\n")
        .map_err(|e| format!("Error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bachpan_core::testutil::MockEmbedder;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("bachpan.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn catalog_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("dataset");
        std::fs::create_dir(&images).unwrap();
        std::fs::write(images.join("cat.jpg"), b"cat").unwrap();
        std::fs::write(images.join("owl.jpg"), b"owl").unwrap();
        std::fs::write(images.join("readme.txt"), b"not an image").unwrap();
        std::fs::write(dir.path().join("query.jpg"), b"query").unwrap();
        dir
    }

    fn fixture_config(dir: &Path) -> PathBuf {
        write_config(
            dir,
            &format!(
                "[catalog]\ndirectory = \"{}\"\nextensions = [\"jpg\"]\n",
                dir.join("dataset").display()
            ),
        )
    }

    #[test]
    fn validate_reports_valid_config() {
        let dir = catalog_fixture();
        let path = fixture_config(dir.path());
        assert_eq!(validate_config(&path).unwrap(), "Config is valid.\n");
    }

    #[test]
    fn validate_missing_file_suggests_flag() {
        let err = validate_config(Path::new("/nonexistent/bachpan.toml")).unwrap_err();
        assert!(err.contains("--config"), "{err}");
    }

    #[test]
    fn validate_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[catalog]\nimages = []\n");
        let err = validate_config(&path).unwrap_err();
        assert!(err.starts_with("Config error:"), "{err}");
    }

    #[test]
    fn catalog_list_prints_identifiers_and_count() {
        let dir = catalog_fixture();
        let path = fixture_config(dir.path());
        let output = list_catalog(&path).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("cat.jpg"));
        assert!(lines[1].ends_with("owl.jpg"));
        assert_eq!(lines[2], "2 images");
    }

    #[tokio::test]
    async fn match_prints_http_shaped_json() {
        let dir = catalog_fixture();
        let config = load_config(&fixture_config(dir.path())).unwrap();
        let embedder = MockEmbedder::new(2)
            .with_image(b"cat", vec![1.0, 0.0])
            .with_image(b"owl", vec![0.0, 1.0])
            .with_image(b"query", vec![0.9, 0.1]);

        let output = match_image(
            &config,
            Arc::new(embedder),
            &dir.path().join("query.jpg"),
            Some(1),
        )
        .await
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        let matches = json["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0]["image"].as_str().unwrap().ends_with("cat.jpg"));
    }

    #[tokio::test]
    async fn match_missing_image_is_reported() {
        let dir = catalog_fixture();
        let config = load_config(&fixture_config(dir.path())).unwrap();
        let err = match_image(
            &config,
            Arc::new(MockEmbedder::new(2)),
            Path::new("/nonexistent/query.jpg"),
            None,
        )
        .await
        .unwrap_err();
        assert!(err.contains("/nonexistent/query.jpg"), "{err}");
    }
}
