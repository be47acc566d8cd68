use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::{pin_mut, StreamExt};
use mergex_config::{Config, ConfigLoader};
use mergex_core::{MergeEngine, MergeEngineBuilder, TokenFilter};
use mergex_resolver::{parse_hex_address, Resolution, UnresolvedReason};
use mergex_types::{network_name, ResolvedDestination};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod render;

#[derive(Parser)]
#[command(name = "merge-x")]
#[command(about = "Batch-send ERC-20 balances to a single destination", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Path to configuration file
	#[arg(
		short,
		long,
		value_name = "FILE",
		env = "MERGEX_CONFIG",
		default_value = "config/merge-x.toml"
	)]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(long, env = "MERGEX_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// List the wallet's token balances
	Tokens {
		/// Case-insensitive symbol or address fragment
		#[arg(short, long)]
		search: Option<String>,
		/// Hide tokens without a balance
		#[arg(long)]
		hide_zero: bool,
		/// Only show stablecoins
		#[arg(long)]
		stables: bool,
		/// Print the tokens as JSON
		#[arg(long)]
		json: bool,
	},
	/// Resolve a destination address or name
	Resolve {
		/// Hex address or name (e.g. vitalik.eth)
		input: String,
	},
	/// Estimate the gas cost of sending the selected tokens
	Estimate {
		/// Destination address or name
		#[arg(long)]
		to: String,
		#[command(flatten)]
		selection: SelectionArgs,
	},
	/// Send the selected tokens to the destination, one by one
	Send {
		/// Destination address or name
		#[arg(long)]
		to: String,
		#[command(flatten)]
		selection: SelectionArgs,
		/// Skip the confirmation prompt
		#[arg(short, long)]
		yes: bool,
	},
	/// Validate the configuration file
	Validate,
}

#[derive(Args)]
struct SelectionArgs {
	/// Token to include, by contract address or symbol (repeatable)
	#[arg(long = "token", value_name = "TOKEN")]
	tokens: Vec<String>,
	/// Include every token with a balance
	#[arg(long)]
	all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	// Initialize tracing
	setup_tracing(&cli.log_level)?;

	let config = load_config(&cli.config).await?;
	match cli.command {
		Commands::Tokens {
			search,
			hide_zero,
			stables,
			json,
		} => {
			let filter = TokenFilter {
				search,
				hide_zero_balance: hide_zero,
				stables_only: stables,
			};
			list_tokens(config, filter, json).await
		}
		Commands::Resolve { input } => resolve(config, &input).await,
		Commands::Estimate { to, selection } => estimate(config, &to, &selection).await,
		Commands::Send { to, selection, yes } => send(config, &to, &selection, yes).await,
		Commands::Validate => validate_config(config),
	}
}

async fn load_config(path: &Path) -> Result<Config> {
	info!("Loading configuration from: {:?}", path);
	ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.context("Failed to load configuration")
}

fn build_engine(config: Config) -> Result<MergeEngine> {
	MergeEngineBuilder::new(config)
		.with_account_factory("local", mergex_account::implementations::local::create_account)
		.with_delivery_factory(mergex_delivery::implementations::evm::alloy::create_http_delivery)
		.with_name_service_factory(mergex_resolver::implementations::ens::create_name_service)
		.with_token_source_factory(
			"http_indexer",
			mergex_tokens::implementations::http_indexer::create_http_indexer,
		)
		.build()
		.context("Failed to build merge engine")
}

async fn list_tokens(config: Config, filter: TokenFilter, json: bool) -> Result<()> {
	let engine = build_engine(config)?;
	engine
		.load_tokens()
		.await
		.context("Failed to load token balances")?;

	let selection = engine.selection().read().await;
	let tokens = selection.filtered(&filter);
	if json {
		println!("{}", serde_json::to_string_pretty(&tokens)?);
		return Ok(());
	}

	render::print_portfolio(&selection.portfolio(), engine.network_id());
	render::print_tokens(&tokens);
	Ok(())
}

async fn resolve(config: Config, input: &str) -> Result<()> {
	let engine = build_engine(config)?;
	let destination = resolve_destination(&engine, input).await?;
	println!("{}", destination);
	Ok(())
}

async fn estimate(config: Config, to: &str, selection: &SelectionArgs) -> Result<()> {
	let engine = build_engine(config)?;
	let destination = prepare(&engine, to, selection).await?;
	let intents = engine.selection().read().await.snapshot();

	match engine.estimate_gas(Some(&destination), &intents).await {
		Some(estimate) => render::print_estimate(&engine, &estimate, &intents),
		None => println!("Nothing to estimate"),
	}
	Ok(())
}

async fn send(config: Config, to: &str, selection: &SelectionArgs, yes: bool) -> Result<()> {
	let engine = build_engine(config)?;
	let destination = prepare(&engine, to, selection).await?;
	let intents = engine.selection().read().await.snapshot();

	render::print_preview(&destination, &intents);
	if let Some(estimate) = engine.estimate_gas(Some(&destination), &intents).await {
		render::print_estimate(&engine, &estimate, &intents);
	}

	if !yes && !confirm("Send these transfers?")? {
		println!("Cancelled");
		return Ok(());
	}

	let mut run = engine
		.prepare_batch(destination)
		.await
		.context("Failed to prepare batch")?;
	let total = run.intents().len();

	let progress = engine.execute(&mut run).context("Failed to start batch")?;
	pin_mut!(progress);
	while let Some(event) = progress.next().await {
		render::print_progress(&engine, &event, total);
	}
	Ok(())
}

/// Loads balances, resolves the destination and applies the token selection.
async fn prepare(
	engine: &MergeEngine,
	to: &str,
	args: &SelectionArgs,
) -> Result<ResolvedDestination> {
	engine
		.load_tokens()
		.await
		.context("Failed to load token balances")?;
	let destination = resolve_destination(engine, to).await?;

	let mut selection = engine.selection().write().await;
	if args.all {
		selection.select_all(&TokenFilter {
			hide_zero_balance: true,
			..Default::default()
		});
	}
	for wanted in &args.tokens {
		let token = match parse_hex_address(wanted) {
			Some(address) => selection.token(&address),
			None => selection
				.tokens()
				.iter()
				.find(|t| t.symbol.eq_ignore_ascii_case(wanted)),
		}
		.map(|t| t.address);

		let Some(address) = token else {
			bail!("Token '{}' is not held by this wallet", wanted);
		};
		if !selection.is_selected(&address) {
			selection.toggle(address)?;
		}
	}

	if selection.selected_tokens().is_empty() {
		bail!("No tokens selected; pass --token or --all");
	}
	Ok(destination)
}

async fn resolve_destination(engine: &MergeEngine, input: &str) -> Result<ResolvedDestination> {
	match engine.resolve_destination(input).await {
		Some(Resolution::Resolved(destination)) => Ok(destination),
		Some(Resolution::Unresolved(UnresolvedReason::NameServiceUnavailable)) => {
			bail!(
				"Name resolution is not available on {}",
				network_name(engine.network_id())
			)
		}
		Some(Resolution::Unresolved(reason)) => {
			bail!("Destination not valid yet: {}", reason)
		}
		None => bail!("Destination was superseded by a newer lookup"),
	}
}

fn confirm(prompt: &str) -> Result<bool> {
	print!("{} [y/N] ", prompt);
	io::stdout().flush()?;

	let mut answer = String::new();
	io::stdin().lock().read_line(&mut answer)?;
	Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn validate_config(config: Config) -> Result<()> {
	info!("Configuration is valid");
	info!(
		"Active network: {} ({})",
		network_name(config.network.active),
		config.network.active
	);

	let mut networks: Vec<_> = config.networks.iter().collect();
	networks.sort_by_key(|(id, _)| **id);
	for (id, network) in networks {
		info!("  Network {}: {} via {}", id, network.name, network.rpc_url);
	}

	if config.name_service.enabled {
		info!(
			"Name service: enabled on {}",
			network_name(config.name_service.network_id)
		);
	} else {
		info!("Name service: disabled");
	}
	info!("Token source: {}", config.tokens.implementation);

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
		.init();

	Ok(())
}
