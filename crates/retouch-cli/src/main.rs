//! `retouch`: edit images from the command line.
//!
//! Every subcommand maps onto one editor operation. Paths given to
//! `apply`, `preview`, `reset`, `chain` and `ai-edit` are logical
//! storage paths such as `/uploads/abc.jpg`, not filesystem paths.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use retouch_filters::AppliedFilter;
use retouch_io::{Editor, EditorConfig};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Upload, filter, preview, reset and AI-edit images.
#[derive(Parser)]
#[command(name = "retouch", version)]
struct Cli {
    /// Storage root that logical paths resolve against.
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// JSON config file. Missing keys keep their defaults.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Derivation snapshot file.
    #[arg(long, global = true, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an image file and print its logical path.
    Upload {
        /// Image file to upload.
        file: PathBuf,
    },

    /// Apply a filter and print the path of the result.
    Apply {
        /// Logical path of the image.
        path: String,
        /// Filter name (see `filters`).
        filter: String,
        /// Filter parameter as NAME=VALUE. Repeatable.
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Render a filter without recording it.
    Preview {
        /// Logical path of the image.
        path: String,
        /// Filter name (see `filters`).
        filter: String,
        /// Filter parameter as NAME=VALUE. Repeatable.
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Where to write the rendered image.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Forget how an image was derived and print its original.
    Reset {
        /// Logical path of the image.
        path: String,
    },

    /// List the filters recorded for an image.
    Chain {
        /// Logical path of the image.
        path: String,
    },

    /// List the available filters.
    Filters,

    /// Generate an image from a prompt with the AI provider.
    Generate {
        /// Text prompt.
        prompt: String,
    },

    /// Edit an image with the AI provider.
    AiEdit {
        /// Logical path of the image.
        path: String,
        /// Edit instruction.
        command: String,
    },
}

/// Parse `NAME=VALUE`.
fn parse_param(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("parameter must be NAME=VALUE, got: '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in '{s}'"));
    }
    Ok((name.to_owned(), value.to_owned()))
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "retouch=debug" } else { "retouch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<EditorConfig, Box<dyn std::error::Error>> {
    let mut config = EditorConfig::load(cli.config.as_deref())?;
    if let Some(root) = &cli.root {
        config.storage_root.clone_from(root);
    }
    if let Some(snapshot) = &cli.snapshot {
        config.snapshot_file.clone_from(snapshot);
    }
    debug!(
        root = %config.storage_root.display(),
        snapshot = %config.snapshot_file.display(),
        "configuration loaded"
    );
    Ok(config)
}

fn chain_text(chain: &[AppliedFilter]) -> String {
    if chain.is_empty() {
        return "(no filters)".to_owned();
    }
    chain
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let params: Vec<String> = entry
                .parameters
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            format!("{}. {} {}", i + 1, entry.filter_name, params.join(" "))
                .trim_end()
                .to_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run one command and return what to print on stdout.
fn run(cli: &Cli) -> Result<String, Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let editor = Editor::from_config(&config)?;
    let params = |pairs: &[(String, String)]| pairs.iter().cloned().collect::<BTreeMap<_, _>>();

    let output = match &cli.command {
        Command::Upload { file } => {
            let bytes = std::fs::read(file)?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let upload = editor.upload(&bytes, &name)?;
            if cli.json {
                json!({"path": upload.path, "width": upload.width, "height": upload.height})
                    .to_string()
            } else {
                format!("{} ({}x{})", upload.path, upload.width, upload.height)
            }
        }
        Command::Apply {
            path,
            filter,
            params: pairs,
        } => {
            let new_path = editor.apply_filter(path, filter, &params(pairs))?;
            if cli.json {
                json!({"path": new_path, "filters": editor.applied_filters(&new_path)})
                    .to_string()
            } else {
                new_path
            }
        }
        Command::Preview {
            path,
            filter,
            params: pairs,
            output,
        } => {
            let preview = editor.preview_filter(path, filter, &params(pairs))?;
            std::fs::write(output, &preview.bytes)?;
            if cli.json {
                json!({
                    "output": output.display().to_string(),
                    "width": preview.width,
                    "height": preview.height,
                    "bytes": preview.bytes.len(),
                })
                .to_string()
            } else {
                format!(
                    "{} ({}x{}, {} bytes)",
                    output.display(),
                    preview.width,
                    preview.height,
                    preview.bytes.len()
                )
            }
        }
        Command::Reset { path } => {
            let original = editor.reset(path);
            if cli.json {
                json!({"path": original}).to_string()
            } else {
                original
            }
        }
        Command::Chain { path } => {
            let chain = editor.applied_filters(path);
            if cli.json {
                serde_json::to_string(&chain)?
            } else {
                chain_text(&chain)
            }
        }
        Command::Filters => {
            let filters = editor.available_filters();
            if cli.json {
                serde_json::to_string(&filters)?
            } else {
                let width = filters.iter().map(|f| f.name.len()).max().unwrap_or(0);
                filters
                    .iter()
                    .map(|f| format!("{:width$}  {}", f.name, f.description))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Generate { prompt } => {
            let new_path = editor.ai_generate(prompt)?;
            if cli.json {
                json!({"path": new_path}).to_string()
            } else {
                new_path
            }
        }
        Command::AiEdit { path, command } => {
            let new_path = editor.ai_edit(path, command)?;
            if cli.json {
                json!({"path": new_path, "root": editor.resolve_root(&new_path)}).to_string()
            } else {
                new_path
            }
        }
    };
    Ok(output)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;
    use retouch_filters::{ParamValue, Parameters};

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn params_split_on_first_equals() {
        assert_eq!(
            parse_param("expr=a=b").unwrap(),
            ("expr".to_owned(), "a=b".to_owned())
        );
        assert!(parse_param("level").is_err());
        assert!(parse_param(" =1").is_err());
    }

    #[test]
    fn repeated_params_and_globals() {
        let cli = Cli::try_parse_from([
            "retouch", "apply", "/uploads/a.jpg", "brightness", "-p", "level=1.2", "--param",
            "gamma=2", "--json", "--root", "/srv/img",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.root, Some(PathBuf::from("/srv/img")));
        let Command::Apply { params, .. } = cli.command else {
            unreachable!("parsed as apply");
        };
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn chain_listing() {
        assert_eq!(chain_text(&[]), "(no filters)");
        let chain = [
            AppliedFilter::new("grayscale", Parameters::new()),
            AppliedFilter::new(
                "brightness",
                Parameters::from([("level".to_owned(), ParamValue::Float(1.0))]),
            ),
        ];
        assert_eq!(chain_text(&chain), "1. grayscale\n2. brightness level=1.0");
    }
}
