//! vhostctl - Apache virtual host and TLS certificate management
//!
//! This is the main entry point for the vhostctl CLI.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vhostctl_apache::{ApacheCtl, ApacheSite, CertificateRequest, Configurator};
use vhostctl_core::config::{Options, OptionsLoader};
use vhostctl_tree::FileTreeStore;

type ApacheConfigurator = Configurator<FileTreeStore, ApacheCtl, ApacheSite>;

#[derive(Parser)]
#[command(name = "vhostctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Options file (TOML or JSON); defaults to ~/.config/vhostctl/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Apache server root, e.g. /etc/apache2
    #[arg(long, global = true)]
    server_root: Option<PathBuf>,

    /// Directory holding virtual host files
    #[arg(long, global = true)]
    vhost_root: Option<PathBuf>,

    /// Control binary, e.g. apachectl
    #[arg(long, global = true)]
    ctl: Option<String>,

    /// Raw option override, KEY=VALUE (SERVER_ROOT, VHOST_ROOT, CTL, ...)
    #[arg(short = 'o', long = "option", global = true, value_parser = parse_override)]
    overrides: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the virtual hosts of the configuration
    Vhosts {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Make Apache listen on a port
    Listen {
        #[arg(long)]
        port: String,

        /// Bind the port for https inside <IfModule mod_ssl.c>
        #[arg(long)]
        https: bool,
    },

    /// Enable the virtual host serving a domain
    Enable {
        #[arg(long)]
        domain: String,
    },

    /// Install a certificate into the SSL host of a domain
    Deploy {
        #[arg(long)]
        domain: String,

        /// Private key
        #[arg(long)]
        key: String,

        /// Certificate (with --chain)
        #[arg(long)]
        cert: Option<String>,

        /// Intermediate chain, for servers older than 2.4.8
        #[arg(long)]
        chain: Option<String>,

        /// Certificate followed by its chain
        #[arg(long)]
        fullchain: Option<String>,

        /// Restart Apache once the configuration is committed
        #[arg(long)]
        restart: bool,
    },

    /// Run the configuration syntax test
    Check,

    /// Show version information
    Version,
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if cli.verbose {
        tracing::debug!("Verbose mode enabled");
    }

    let options = load_options(&cli)?;

    match cli.command {
        Commands::Vhosts { json } => {
            let mut configurator = open(options)?;
            let vhosts = configurator.get_vhosts()?;

            if json {
                println!("{}", serde_json::to_string_pretty(vhosts)?);
            } else {
                for vhost in vhosts {
                    println!(
                        "{:<8} {:<4} {:<30} {:<24} {}",
                        if vhost.enabled { "enabled" } else { "-" },
                        if vhost.ssl { "ssl" } else { "-" },
                        vhost.names().join(","),
                        vhost.addresses_string(false),
                        vhost.file_path.display()
                    );
                }
            }
        }

        Commands::Listen { port, https } => {
            let mut configurator = open(options)?;
            run_session(&mut configurator, |c| Ok(c.ensure_port_is_listening(&port, https)?))?;
            println!("✅ Apache listens on port {}", port);
        }

        Commands::Enable { domain } => {
            let mut configurator = open(options)?;
            run_session(&mut configurator, |c| {
                let id = c.get_suitable_vhost(&domain, false)?;
                Ok(c.enable_site(id)?)
            })?;
            println!("✅ {} is enabled", domain);
        }

        Commands::Deploy {
            domain,
            key,
            cert,
            chain,
            fullchain,
            restart,
        } => {
            let mut configurator = open(options)?;
            let request = CertificateRequest {
                server_name: &domain,
                cert: cert.as_deref(),
                key: &key,
                chain: chain.as_deref(),
                fullchain: fullchain.as_deref(),
            };
            run_session(&mut configurator, |c| Ok(c.deploy_certificate(&request)?))?;
            println!("✅ Certificate deployed for {}", domain);

            if restart {
                configurator.restart()?;
            }
        }

        Commands::Check => {
            let configurator = open(options)?;
            if configurator.check_configuration() {
                println!("✅ Configuration is valid");
            } else {
                eprintln!("❌ Configuration test failed");
                std::process::exit(1);
            }
        }

        Commands::Version => {
            println!("vhostctl v{}", vhostctl_core::VERSION);
        }
    }

    Ok(())
}

/// Options file, then flags, then raw overrides
fn load_options(cli: &Cli) -> anyhow::Result<Options> {
    let default_file = dirs::config_dir().map(|d| d.join("vhostctl").join("config.toml"));

    let mut options = match (&cli.config, default_file) {
        (Some(path), _) => OptionsLoader::load(path)?,
        (None, Some(path)) if path.is_file() => {
            tracing::debug!("📁 Loading options from {}", path.display());
            OptionsLoader::load(&path)?
        }
        _ => Options::default(),
    };

    if let Some(root) = &cli.server_root {
        options.server_root = Some(root.clone());
    }
    if let Some(root) = &cli.vhost_root {
        options.vhost_root = Some(root.clone());
    }
    if let Some(ctl) = &cli.ctl {
        options.ctl = ctl.clone();
    }

    let overrides: HashMap<String, String> = cli.overrides.iter().cloned().collect();
    options.apply_overrides(&overrides);

    Ok(options)
}

fn open(options: Options) -> anyhow::Result<ApacheConfigurator> {
    let ctl = ApacheCtl::new(&options.ctl);
    let site = ApacheSite::new(&options.ensite, &options.dissite);
    Configurator::new(FileTreeStore::new(), ctl, site, options)
        .context("could not load the Apache configuration")
}

/// Run `change`, then save, test and commit; roll everything back on failure
fn run_session<F>(configurator: &mut ApacheConfigurator, change: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut ApacheConfigurator) -> anyhow::Result<()>,
{
    let result = change(configurator).and_then(|()| Ok(configurator.save()?));

    let result = result.and_then(|()| {
        if configurator.check_configuration() {
            Ok(())
        } else {
            bail!("Apache rejected the new configuration")
        }
    });

    match result {
        Ok(()) => Ok(configurator.commit()?),
        Err(e) => {
            tracing::error!("❌ {:#}, rolling back", e);
            if let Err(rollback) = configurator.rollback() {
                tracing::error!("❌ Rollback failed, the configuration may be inconsistent: {}", rollback);
                return Err(anyhow::Error::new(rollback).context(e.to_string()));
            }
            Err(e)
        }
    }
}
