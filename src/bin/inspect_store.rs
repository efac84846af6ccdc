//! Store inspection tool
//!
//! Prints the persisted round, totals, jackpot, recent results and any
//! rounds awaiting settlement. Run it against a stopped server's data
//! directory when the round loop reports a missing draw or a stuck round.

use clap::Parser;
use keno::errors::KenoResult;
use keno::game::JackpotRound;
use keno::store::{KenoStore, RocksStore};
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "inspect_store")]
#[command(about = "Inspect a keno round database", long_about = None)]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./DB/keno_data")]
    data_dir: String,

    /// Also list the tickets of this round
    #[arg(long)]
    tickets: Option<u64>,

    /// Number of archived rounds to show
    #[arg(long, default_value = "10")]
    history: usize,

    /// Dump raw keys starting with this prefix
    #[arg(long)]
    keys: Option<String>,
}

/// Jackpot records of the rounds still awaiting settlement.
async fn unsettled_jackpots(store: &RocksStore) -> KenoResult<Vec<JackpotRound>> {
    let mut records = Vec::new();
    for entry in store.unsettled_rounds().await? {
        records.push(store.jackpot_round(entry.round_id)?);
    }
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if !Path::new(&args.data_dir).exists() {
        println!("❌ No keno data found at {}", args.data_dir);
        return Ok(());
    }
    let store = RocksStore::open(&args.data_dir, false)?;

    println!("🔍 Keno Store Inspector");
    println!("=======================");
    println!("Path: {}\n", args.data_dir);

    match store.load_round().await? {
        Some(round) => {
            println!("🎱 Current Round #{}", round.id);
            println!("   Status: {}", round.status);
            println!("   Created: {}", round.created_at);
            println!("   Betting closes: {}", round.cutoff_time);
            println!("   Last activity: {}", round.last_activity_time);
            println!("   Bets closed: {}", round.bets_closed);
            match &round.winning_numbers {
                Some(numbers) => {
                    println!("   Winning numbers: {:?}", numbers.as_slice());
                    println!("   Revealed: {}/{} {:?}", round.revealed_count, numbers.len(), round.revealed());
                }
                None => println!("   Winning numbers: not decided"),
            }
        }
        None => println!("🎱 No round has been created"),
    }
    println!();

    let stats = store.load_stats().await?;
    println!("📊 Totals");
    println!("   Staked: {}", stats.total_staked);
    println!("   Paid out: {}", stats.total_paid_out);
    println!("   Tickets settled: {}", stats.tickets_settled);
    println!("   Rounds settled: {}", stats.rounds_settled);
    println!("   Implied RTP: {:.4}", stats.implied_rtp());
    println!();

    let jackpot = store.jackpot().await?;
    println!("💰 Jackpot");
    println!("   Pool: {}", jackpot.pool);
    for record in &unsettled_jackpots(&store).await? {
        println!(
            "   Round #{}: contributed {:?}, share {:?}",
            record.round_id, record.contributed, record.share
        );
    }
    println!();

    let history = store.recent_history(args.history).await?;
    println!("📜 Recent Rounds ({})", history.len());
    for entry in &history {
        println!("   #{} at {}: {:?}", entry.round_id, entry.finished_at, entry.winning_numbers);
    }
    println!();

    let unsettled = store.unsettled_rounds().await?;
    if unsettled.is_empty() {
        println!("✅ No unsettled rounds");
    } else {
        println!("⚠️  Unsettled Rounds ({})", unsettled.len());
        for record in &unsettled {
            println!(
                "   #{} after {} attempts: {}",
                record.round_id, record.attempts, record.last_error
            );
        }
    }

    if let Some(round_id) = args.tickets {
        let tickets = store.tickets_for_round(round_id).await?;
        println!("\n🎫 Tickets for round #{} ({})", round_id, tickets.len());
        for ticket in &tickets {
            println!(
                "   {} user={} stake={} picks={:?} status={:?} hits={} win={} jackpot={}",
                ticket.id,
                ticket.user_id,
                ticket.stake,
                ticket.numbers,
                ticket.status,
                ticket.hits,
                ticket.win_amount,
                ticket.jackpot_amount
            );
        }
    }

    if let Some(prefix) = args.keys {
        println!("\n📋 Keys with prefix {:?}", prefix);
        for (key, value) in store.scan_prefix(prefix.as_bytes(), 50)? {
            println!("   {} ({} bytes)", String::from_utf8_lossy(&key), value.len());
        }
    }

    Ok(())
}
