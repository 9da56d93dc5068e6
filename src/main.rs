use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gadget_tool::config::ConfigStore;
use gadget_tool::gadget::attrs::parse_number;
use gadget_tool::gadget::{
    AttrMask, ConfigfsBackend, CreateRequest, DisableRequest, EnableRequest, GadgetAttr,
    GadgetManager, GadgetResolver, GadgetStr, GetRequest, RemoveRequest,
};
use gadget_tool::GadgetError;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Verbose,
    Debug,
    Trace,
}

/// USB gadget configuration tool
#[derive(Parser, Debug)]
#[command(name = "gt")]
#[command(version, about = "Manage USB gadgets through configfs", long_about = None)]
struct CliArgs {
    /// Settings file (default: $GT_SETTINGS or /etc/gt/gt.toml)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a gadget, optionally setting attributes and strings (e.g. idVendor=0x1d6b product=Foo)
    Create {
        name: String,
        #[arg(value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// Remove a gadget
    Rm {
        /// Disable the gadget first if it is enabled
        #[arg(short, long)]
        force: bool,
        /// Also remove configurations and functions of the gadget
        #[arg(short, long)]
        recursive: bool,
        name: String,
    },
    /// Bind a gadget to a UDC
    Enable {
        /// Gadget name (default: the only gadget, or the configured default)
        gadget: Option<String>,
        /// UDC name (default: first available)
        #[arg(short, long)]
        udc: Option<String>,
    },
    /// Unbind a gadget from its UDC
    Disable {
        /// Gadget name (default: the gadget bound to --udc, or the implicit gadget)
        gadget: Option<String>,
        #[arg(short, long)]
        udc: Option<String>,
    },
    /// Show gadget attributes
    Get {
        name: String,
        /// Attributes to show (default: all)
        #[arg(value_name = "ATTR")]
        attrs: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show gadget strings
    Strings {
        name: String,
        /// Language id
        #[arg(long, default_value = "0x409")]
        lang: String,
        #[arg(long)]
        json: bool,
    },
    /// List gadgets
    List {
        #[arg(long)]
        json: bool,
    },
    /// List UDCs
    Udc {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("gt: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    let store = ConfigStore::load(args.config.as_deref())?;
    let settings = store.get();
    tracing::debug!("Settings: {:?}", settings);

    let backend = ConfigfsBackend::new(&settings.configfs_path, &settings.udc_path);
    let manager = GadgetManager::new(
        backend,
        GadgetResolver::new(settings.default_gadget.clone()),
    );

    match args.command {
        Command::Create { name, fields } => {
            let req = parse_create(name, &fields)?;
            manager.create(&req)?;
        }
        Command::Rm {
            force,
            recursive,
            name,
        } => manager.remove(&RemoveRequest {
            name,
            force,
            recursive,
        })?,
        Command::Enable { gadget, udc } => manager.enable(&EnableRequest { gadget, udc })?,
        Command::Disable { gadget, udc } => manager.disable(&DisableRequest { gadget, udc })?,
        Command::Get { name, attrs, json } => {
            let mask = AttrMask::from_attrs(
                attrs
                    .iter()
                    .map(|a| {
                        GadgetAttr::from_name(a).ok_or_else(|| {
                            GadgetError::InvalidArgument(format!("unknown attribute '{}'", a))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            );
            let entries = manager.get_attributes(&GetRequest { name, mask })?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> = entries
                    .iter()
                    .map(|(attr, value)| (attr.name().to_string(), (*value).into()))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (attr, value) in entries {
                    println!("  {:<18}{}", attr.name(), attr.format(value));
                }
            }
        }
        Command::Strings { name, lang, json } => {
            let lang = parse_number(&lang)
                .filter(|l| *l <= u16::MAX as u64)
                .with_context(|| format!("invalid language id '{}'", lang))?
                as u16;
            let strings = manager.get_strings(&name, lang)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&strings)?);
            } else {
                println!("  Language 0x{:04x}:", lang);
                for field in GadgetStr::ALL {
                    println!("    {:<16}{}", field.name(), strings.get(field).unwrap_or(""));
                }
            }
        }
        Command::List { json } => {
            let gadgets = manager.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&gadgets)?);
            } else {
                for g in gadgets {
                    match g.udc {
                        Some(udc) => println!("{}\t{}", g.name, udc),
                        None => println!("{}", g.name),
                    }
                }
            }
        }
        Command::Udc { json } => {
            let udcs = manager.controllers()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&udcs)?);
            } else {
                for u in udcs {
                    println!("{}\t{}", u.name, u.gadget.as_deref().unwrap_or("-"));
                }
            }
        }
    }

    Ok(())
}

/// Build a create request from KEY=VALUE arguments
fn parse_create(name: String, fields: &[String]) -> gadget_tool::Result<CreateRequest> {
    let mut req = CreateRequest::new(name);

    for field in fields {
        let (key, value) = field.split_once('=').ok_or_else(|| {
            GadgetError::InvalidArgument(format!("expected KEY=VALUE, got '{}'", field))
        })?;

        req = if let Some(attr) = GadgetAttr::from_name(key) {
            req.with_attr(attr, attr.parse_value(value)?)
        } else if let Some(s) = GadgetStr::from_name(key) {
            req.with_string(s, value)
        } else {
            return Err(GadgetError::InvalidArgument(format!(
                "unknown attribute or string '{}'",
                key
            )));
        };
    }

    Ok(req)
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "gadget_tool=error",
        LogLevel::Warn => "gadget_tool=warn",
        LogLevel::Info => "gadget_tool=info",
        LogLevel::Verbose => "gadget_tool=info,gt=info",
        LogLevel::Debug => "gadget_tool=debug,gt=debug",
        LogLevel::Trace => "gadget_tool=trace,gt=trace",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
