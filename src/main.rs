mod blockchain;

use std::io::{self, BufRead, Lines, StdinLock};
use std::time::Instant;

use blockchain::{Block, Chain, DEFAULT_DIFFICULTY, GENESIS_PAYLOAD};

type Input = Lines<StdinLock<'static>>;

fn main() -> io::Result<()> {
    env_logger::init();

    let mut chain = Chain::new();
    chain.compute_hash_rate();
    log::info!("measured ~{} hashes/second on this machine", chain.hash_rate());

    chain.add_block(Block::new(0, GENESIS_PAYLOAD.to_string(), DEFAULT_DIFFICULTY));

    let mut input = io::stdin().lock().lines();
    loop {
        println!(
            "0. View basic blockchain status.\n\
             1. Add a transaction to the blockchain.\n\
             2. Verify the blockchain.\n\
             3. View the blockchain.\n\
             4. Corrupt the chain.\n\
             5. Hide the corruption by repairing the chain.\n\
             6. Exit"
        );
        let Some(choice) = next_line(&mut input)? else {
            break; // EOF on stdin
        };
        match choice.trim() {
            "0" => view_status(&chain),
            "1" => add_transaction(&mut chain, &mut input)?,
            "2" => verify(&chain),
            "3" => view_chain(&chain),
            "4" => corrupt(&mut chain, &mut input)?,
            "5" => repair(&mut chain),
            "6" => break,
            other => println!("Unrecognized option: {other}\n"),
        }
    }
    Ok(())
}

fn view_status(chain: &Chain) {
    println!("Current size of chain: {}", chain.len());
    if let Some(latest) = chain.latest_block() {
        println!("Difficulty of most recent block: {}", latest.difficulty);
    }
    println!("Total difficulty for all blocks: {}", chain.total_difficulty());
    println!(
        "Approximate hashes per second on this machine: {}",
        chain.hash_rate()
    );
    println!(
        "Expected total hashes required for the whole chain: {}",
        chain.total_expected_hashes()
    );
    if let Some(latest) = chain.latest_block() {
        println!("Nonce for the most recent block: {}", latest.nonce);
    }
    println!("Chain hash: {}\n", chain.chain_hash());
}

fn add_transaction(chain: &mut Chain, input: &mut Input) -> io::Result<()> {
    println!("Enter difficulty > 0");
    let Some(line) = next_line(input)? else {
        return Ok(());
    };
    let Ok(difficulty) = line.trim().parse::<u32>() else {
        println!("Not a valid difficulty: {}\n", line.trim());
        return Ok(());
    };
    println!("Enter transaction:");
    let Some(payload) = next_line(input)? else {
        return Ok(());
    };

    let start = Instant::now();
    chain.add_block(Block::new(chain.len() as u64, payload, difficulty));
    println!(
        "Total execution time to add this block was {} milliseconds\n",
        start.elapsed().as_millis()
    );
    Ok(())
}

fn verify(chain: &Chain) {
    let start = Instant::now();
    match chain.validate() {
        Ok(()) => println!("Chain verification: TRUE"),
        Err(fault) => println!("Chain verification: FALSE\n{fault}"),
    }
    println!(
        "Total execution time to verify the chain was {} milliseconds\n",
        start.elapsed().as_millis()
    );
}

fn view_chain(chain: &Chain) {
    println!("View the Blockchain");
    match serde_json::to_string_pretty(chain) {
        Ok(json) => println!("{json}\n"),
        Err(err) => log::error!("failed to render chain: {err}"),
    }
}

fn corrupt(chain: &mut Chain, input: &mut Input) -> io::Result<()> {
    println!("Corrupt the Blockchain");
    println!("Enter block ID of block to corrupt");
    let Some(line) = next_line(input)? else {
        return Ok(());
    };
    let Ok(index) = line.trim().parse::<usize>() else {
        println!("Not a valid block ID: {}\n", line.trim());
        return Ok(());
    };
    let size = chain.len();
    let Some(block) = chain.block_mut(index) else {
        println!("No block at index {index} (chain size is {size})\n");
        return Ok(());
    };
    println!("Enter new data for block {index}");
    let Some(payload) = next_line(input)? else {
        return Ok(());
    };
    block.payload = payload;
    println!("Block {index} now holds {}\n", block.payload);
    Ok(())
}

fn repair(chain: &mut Chain) {
    let start = Instant::now();
    chain.repair();
    println!(
        "Total execution time required to repair the chain was {} milliseconds\n",
        start.elapsed().as_millis()
    );
}

/// Read the next stdin line; `None` means EOF.
fn next_line(input: &mut Input) -> io::Result<Option<String>> {
    input.next().transpose()
}
