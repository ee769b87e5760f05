use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tileset_indexer::{
    Config, Error, IndexKind, Indexer, JsonWriter, LocalSource, WalkerOptions,
};

/// Extract per-feature attribute indexes from a 3D Tiles dataset
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Root tileset descriptor; tile content resolves relative to its directory
    #[arg(long)]
    tileset: PathBuf,

    /// Batch-table property identifying each feature
    #[arg(long, default_value = "id")]
    id_property: String,

    /// Index to build, as `property:kind` (kinds: enum); repeatable
    #[arg(long = "index", value_parser = parse_index)]
    indexes: Vec<(String, IndexKind)>,

    /// Output JSON file
    #[arg(long, default_value = "index.json")]
    output: PathBuf,

    /// Maximum number of tiles fetched and decoded concurrently
    #[arg(long, default_value_t = 2)]
    concurrency: usize,
}

fn parse_index(raw: &str) -> Result<(String, IndexKind), String> {
    let (property, kind) = raw.split_once(':').unwrap_or((raw, "enum"));
    if property.is_empty() {
        return Err("index property must not be empty".to_string());
    }
    let kind = match kind {
        "enum" => IndexKind::Enum,
        other => return Err(format!("unknown index kind '{other}' (expected: enum)")),
    };
    Ok((property.to_string(), kind))
}

async fn run(args: Args) -> tileset_indexer::Result<()> {
    let base_dir = args
        .tileset
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let root = args
        .tileset
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::NotFound(args.tileset.display().to_string()))?;

    let config = Config {
        id_property: args.id_property,
        indexes: args.indexes,
        walker: WalkerOptions {
            concurrency: args.concurrency,
            ..WalkerOptions::default()
        },
    };

    let indexer = Indexer::new(config);
    let writer = JsonWriter::new(&args.output);
    indexer
        .build_and_write(Arc::new(LocalSource::new(base_dir)), &root, &writer)
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "indexing failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index() {
        assert_eq!(
            parse_index("name:enum").unwrap(),
            ("name".to_string(), IndexKind::Enum)
        );
        // Kind defaults to enum
        assert_eq!(
            parse_index("name").unwrap(),
            ("name".to_string(), IndexKind::Enum)
        );
        assert!(parse_index("name:btree").is_err());
        assert!(parse_index(":enum").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "tileset-indexer",
            "--tileset",
            "data/tileset.json",
            "--index",
            "name:enum",
            "--index",
            "zoning",
            "--output",
            "out.json",
        ]);
        assert_eq!(args.tileset, PathBuf::from("data/tileset.json"));
        assert_eq!(args.id_property, "id");
        assert_eq!(args.indexes.len(), 2);
        assert_eq!(args.concurrency, 2);
    }
}
