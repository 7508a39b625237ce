use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use webpshift_core::capability::CapabilityDetector;
use webpshift_core::config::ResolverConfig;
use webpshift_core::document::{load_document_manifest, Document, ImageElement};
use webpshift_core::probe::{DecodeProbe, FsByteSource, HttpByteSource, SharedImageProbe};
use webpshift_core::resolver::FormatResolver;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    if matches!(cli_args.first().map(String::as_str), Some("resolve")) {
        run_resolve_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>()).await?;
        return Ok(());
    }

    print_usage();
    Err(std::io::Error::other("Missing subcommand").into())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolveCliArgs {
    site_root: Option<PathBuf>,
    base_url: Option<String>,
    manifest_path: Option<PathBuf>,
    config_path: Option<String>,
    image_paths: Vec<String>,
}

fn parse_resolve_cli_args(args: &[String]) -> Result<ResolveCliArgs, Box<dyn std::error::Error>> {
    let mut site_root = None::<PathBuf>;
    let mut base_url = None::<String>;
    let mut manifest_path = None::<PathBuf>;
    let mut config_path = None::<String>;
    let mut image_paths = Vec::new();

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--site-root" => {
                site_root = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--base-url" => {
                base_url = Some(needs_value(i)?);
                i += 2;
            }
            "--manifest" => {
                manifest_path = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--config" => {
                config_path = Some(needs_value(i)?);
                i += 2;
            }
            unknown if unknown.starts_with("--") => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
            path => {
                image_paths.push(path.to_string());
                i += 1;
            }
        }
    }

    if site_root.is_some() == base_url.is_some() {
        return Err(std::io::Error::other(
            "Pass exactly one of --site-root or --base-url",
        )
        .into());
    }
    if manifest_path.is_some() && !image_paths.is_empty() {
        return Err(std::io::Error::other(
            "Pass either --manifest or positional image paths, not both",
        )
        .into());
    }
    if manifest_path.is_none() && image_paths.is_empty() {
        return Err(std::io::Error::other("Missing input: pass --manifest or image paths").into());
    }

    Ok(ResolveCliArgs {
        site_root,
        base_url,
        manifest_path,
        config_path,
        image_paths,
    })
}

async fn run_resolve_cli(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_resolve_usage();
        return Ok(());
    }
    let parsed = parse_resolve_cli_args(args.as_slice())?;

    // The resolver config overlay lives under the site root when probing a
    // local tree, and under the working directory when probing over HTTP.
    let config_root = parsed
        .site_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let config = ResolverConfig::load(config_root.as_path(), parsed.config_path.as_deref())?;
    let document = match parsed.manifest_path.as_deref() {
        Some(manifest) => load_document_manifest(manifest)?,
        None => Document::from_elements(
            parsed
                .image_paths
                .iter()
                .map(|path| ImageElement::with_staged_src(path.clone())),
        ),
    };

    let detector = Arc::new(CapabilityDetector::new());
    let probe: SharedImageProbe = if let Some(site_root) = parsed.site_root.as_ref() {
        Arc::new(DecodeProbe::new(FsByteSource::new(site_root.clone())))
    } else {
        let base_url = parsed
            .base_url
            .as_deref()
            .ok_or_else(|| std::io::Error::other("Missing probe root"))?;
        let base = url::Url::parse(base_url)
            .map_err(|e| std::io::Error::other(format!("Invalid --base-url: {e}")))?;
        Arc::new(DecodeProbe::new(HttpByteSource::new(base)))
    };
    let resolver = FormatResolver::new(config, Arc::clone(&detector), probe);

    let processed = resolver.process_all(&document).await;

    let elements = document
        .snapshot()
        .into_iter()
        .map(|element| {
            json!({
                "path": element.src(),
                "outcome": element.outcome().map(|outcome| outcome.as_str()),
            })
        })
        .collect::<Vec<_>>();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": true,
            "supported": detector.status().is_supported(),
            "processed": processed,
            "elements": elements
        }))?
    );
    Ok(())
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  webpshift-core resolve (--site-root PATH | --base-url URL) ",
        "[--manifest PATH | IMAGE_PATH...] [--config PATH]\n"
    ));
}

fn print_resolve_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  webpshift-core resolve (--site-root PATH | --base-url URL) ",
        "[--manifest PATH | IMAGE_PATH...] [--config PATH]\n\n",
        "Defaults:\n",
        "  resolver config: <site-root>/config/resolver.toml (absent file means defaults;\n",
        "  with --base-url the lookup root is the working directory)\n",
        "  positional image paths become staged sources of an in-memory document\n",
        "  existence probes fetch candidates under the probe root and attempt a decode\n"
    ));
}
