use std::sync::Arc;
use std::time::{Duration, Instant};

use omniagent_agent::Orchestrator;
use omniagent_core::types::SessionId;

/// Smoke-test questions covering every member and the fallback.
pub const QUESTIONS: &[&str] = &[
    "Hello?",
    "What is the price of ETH?",
    "What did vitalik.eth do recently?",
    "Send 0.01 eth to vitalik.eth",
    "Swap 1 eth to usdt",
    "What is MODE chain?",
    "Give me the bitcoin price chart",
    "List some popular NFTs?",
    "Can you recommend me some articles about web3",
    "What's the largest dex with highest trading volume on Solana?",
    "When ETH ETF 19b-4 forms approved?",
    "Who are the main investors of EigenLayer?",
];

/// Ask each question in its own session, one every `pace`.
pub async fn run_cases(orchestrator: &Arc<Orchestrator>, pace: Duration) {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(pace.max(Duration::from_millis(1)));

    for question in QUESTIONS {
        ticker.tick().await;
        println!("Question: {}", question);
        if let Err(e) = crate::run_once(orchestrator, SessionId::new(), question).await {
            println!("Error: {}", e);
        }
        println!("--------------");
    }

    println!("Time elapsed: {:.1}s", start.elapsed().as_secs_f64());
}
