mod cli;

use anyhow::{Context, Result};
use itc_artifact::{CompilationRequest, CompiledArtifact};
use itc_core::observability::{init_logging, LogFormat};
use itc_core::{CompilerConfig, ImageTargetCompiler};
use itc_webdriver::{WebDriverConfig, WebDriverSurfaceFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::CompileArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    init_logging(if matches.get_flag("json-logs") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    match matches.subcommand() {
        Some(("compile", args)) => compile(CompileArgs::from_matches(args)?).await,
        Some(("config", _)) => {
            print!("{}", CompilerConfig::default().to_toml_string()?);
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn compile(args: CompileArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CompilerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CompilerConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    config.validate().context("invalid configuration")?;

    let request = CompilationRequest::from_path(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;

    let webdriver = WebDriverConfig::new(args.webdriver.as_str())
        .with_browser(args.browser)
        .with_headless(!args.headed);
    let factory = Arc::new(WebDriverSurfaceFactory::new(webdriver));
    let compiler = ImageTargetCompiler::new(config, factory);
    compiler.on_progress(|text| tracing::info!(target: "itc::progress", "{text}"));

    let artifact = compiler
        .compile(request)
        .await
        .with_context(|| format!("failed to compile {}", args.image.display()))?;

    let path = write_artifact(&artifact, args.out.as_deref())?;
    tracing::info!(
        path = %path.display(),
        bytes = artifact.len(),
        hash = artifact.hash().short().as_str(),
        captured_at = %artifact.produced_at().to_rfc3339(),
        "target saved"
    );
    println!("{}", path.display());
    Ok(())
}

/// Save into `out` if it is a directory (or absent), otherwise write to `out`
fn write_artifact(artifact: &CompiledArtifact, out: Option<&Path>) -> Result<PathBuf> {
    match out {
        Some(path) if !path.is_dir() => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, artifact.bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok(path.to_path_buf())
        }
        Some(dir) => Ok(artifact.save_to(dir)?),
        None => Ok(artifact.save_to(".")?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn artifact() -> CompiledArtifact {
        CompiledArtifact::new(b"MIND".to_vec(), None, None)
    }

    #[test]
    fn writes_into_directory_with_artifact_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(&artifact(), Some(dir.path())).unwrap();
        assert_eq!(path, dir.path().join("compiled.mind"));
        assert_eq!(std::fs::read(path).unwrap(), b"MIND");
    }

    #[test]
    fn writes_to_explicit_file_creating_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("targets").join("poster.mind");
        let path = write_artifact(&artifact(), Some(&target)).unwrap();
        assert_eq!(path, target);
        assert_eq!(std::fs::read(target).unwrap(), b"MIND");
    }
}
