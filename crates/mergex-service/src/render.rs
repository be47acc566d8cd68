//! Terminal output for the `merge-x` commands.

use mergex_core::{MergeEngine, PortfolioStats};
use mergex_types::{
	format_address, network_name, truncate_hash, EstimateState, GasEstimate, NetworkId,
	ProgressEvent, ResolvedDestination, TokenBalance, TransferIntent, TransferOutcome,
};

pub fn print_portfolio(stats: &PortfolioStats, network_id: NetworkId) {
	println!(
		"{}: {} tokens worth ${:.2}",
		network_name(network_id),
		stats.token_count,
		stats.total_value_usd
	);
}

pub fn print_tokens(tokens: &[&TokenBalance]) {
	if tokens.is_empty() {
		println!("No tokens match");
		return;
	}

	for token in tokens {
		let marker = if token.is_stablecoin() { " (stable)" } else { "" };
		println!(
			"  {:<10} {:>24} {:>14}  {}{}",
			token.symbol,
			token.display_balance(),
			format!("${:.2}", token.quote),
			format_address(&token.address, 4),
			marker
		);
	}
}

pub fn print_preview(destination: &ResolvedDestination, intents: &[TransferIntent]) {
	let total: f64 = intents.iter().map(|i| i.quote_usd).sum();
	println!(
		"Sending {} tokens (${:.2}) to {}",
		intents.len(),
		total,
		destination
	);
	for intent in intents {
		println!("  {:<10} ${:.2}", intent.symbol, intent.quote_usd);
	}
}

pub fn print_estimate(engine: &MergeEngine, estimate: &GasEstimate, intents: &[TransferIntent]) {
	match &estimate.state {
		EstimateState::Ready => {}
		EstimateState::Loading => {
			println!("Estimating gas...");
			return;
		}
		EstimateState::Failed(reason) => {
			println!("Warning: could not estimate gas ({})", reason);
			return;
		}
	}

	let symbol = engine
		.config()
		.active_network()
		.map(|n| n.native_symbol.as_str())
		.unwrap_or("ETH");
	println!(
		"Estimated gas: {} units, {} {} (~${:.2})",
		estimate.total_gas, estimate.total_cost_native, symbol, estimate.total_cost_usd
	);

	let total: f64 = intents.iter().map(|i| i.quote_usd).sum();
	if engine.is_expensive(estimate, total) {
		let share = estimate.cost_share_percent(total).unwrap_or_default();
		println!(
			"Warning: gas costs {:.1}% of the value being sent",
			share
		);
	}
}

pub fn print_progress(engine: &MergeEngine, event: &ProgressEvent, total: usize) {
	match event {
		ProgressEvent::Transfer {
			index,
			symbol,
			outcome,
			..
		} => {
			let step = format!("[{}/{}] {}", index + 1, total, symbol);
			match outcome {
				TransferOutcome::Pending { tx_hash: None } => println!("{} sending...", step),
				TransferOutcome::Pending {
					tx_hash: Some(hash),
				} => println!(
					"{} submitted {}, waiting for confirmation",
					step,
					truncate_hash(&hash.to_string())
				),
				TransferOutcome::Confirmed(hash) => {
					let hash = hash.to_string();
					let link = engine
						.config()
						.active_network()
						.and_then(|n| n.tx_url(&hash))
						.unwrap_or_else(|| hash.clone());
					println!("{} confirmed {}", step, link);
				}
				TransferOutcome::Failed(reason) => println!("{} failed: {}", step, reason),
			}
		}
		ProgressEvent::Completed(summary) => println!("Done: {}", summary),
	}
}
