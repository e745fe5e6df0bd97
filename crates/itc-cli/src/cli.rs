//! Command line definition

use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use itc_core::DetectorKind;
use itc_webdriver::Browser;
use std::path::PathBuf;

pub(crate) fn build_cli() -> Command {
    Command::new("itc")
        .version(itc_core::VERSION)
        .about("Compile images into AR image targets by driving the hosted compiler tool")
        .arg_required_else_help(true)
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("compile")
                .about("Compile one image and save the resulting target file")
                .arg(
                    Arg::new("image")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Source image (jpg, png, gif, webp, bmp)"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Output file, or directory to save into [default: .]"),
                )
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .value_parser(["dom", "message"])
                        .help("Completion detection strategy [default: from config, else dom]"),
                )
                .arg(
                    Arg::new("webdriver")
                        .long("webdriver")
                        .default_value("http://localhost:4444")
                        .help("WebDriver server URL"),
                )
                .arg(
                    Arg::new("browser")
                        .long("browser")
                        .default_value("chrome")
                        .value_parser(["chrome", "firefox"])
                        .help("Browser behind the WebDriver server"),
                )
                .arg(
                    Arg::new("headed")
                        .long("headed")
                        .action(ArgAction::SetTrue)
                        .help("Show the browser window"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .value_parser(value_parser!(PathBuf))
                        .help("Controller configuration (TOML)"),
                ),
        )
        .subcommand(Command::new("config").about("Print the default controller configuration"))
}

/// Parsed `compile` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompileArgs {
    pub(crate) image: PathBuf,
    pub(crate) out: Option<PathBuf>,
    pub(crate) strategy: Option<DetectorKind>,
    pub(crate) webdriver: String,
    pub(crate) browser: Browser,
    pub(crate) headed: bool,
    pub(crate) config: Option<PathBuf>,
}

impl CompileArgs {
    pub(crate) fn from_matches(args: &ArgMatches) -> Result<Self> {
        let image = args
            .get_one::<PathBuf>("image")
            .cloned()
            .ok_or_else(|| anyhow!("missing image argument"))?;
        let strategy = args
            .get_one::<String>("strategy")
            .map(|s| match s.as_str() {
                "message" => DetectorKind::MessageChannel,
                _ => DetectorKind::DomPolling,
            });
        let browser = args
            .get_one::<String>("browser")
            .map_or(Ok(Browser::default()), |b| b.parse::<Browser>())
            .map_err(|e| anyhow!(e))?;

        Ok(Self {
            image,
            out: args.get_one::<PathBuf>("out").cloned(),
            strategy,
            webdriver: args
                .get_one::<String>("webdriver")
                .cloned()
                .unwrap_or_default(),
            browser,
            headed: args.get_flag("headed"),
            config: args.get_one::<PathBuf>("config").cloned(),
        })
    }
}
