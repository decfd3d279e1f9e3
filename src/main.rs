use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shared::types::NodeConfig;
use shared::{ChainError, KeyPair, PublicKey, Result};
use teia_core::{
    devnet_genesis, script, Block, BlockTemplate, ChainConfig, ChainState, EdgeGenerator,
    GraphParams, Mempool, MempoolConfig, Miner, MinerConfig, Proof, SubmitResult, Verifier,
    find_cycle, trim_parallel,
};

mod network;
mod service;

use network::P2pService;
use service::{ChainHandle, MempoolHandle};

/// Parâmetros reduzidos usados por `--insecure`/`--dev-params`
fn dev_params() -> GraphParams {
    GraphParams::new(64 * 1024, 1 << 12, 8, 20).expect("dev params are well-formed")
}

#[derive(Parser)]
#[command(name = "teia")]
#[command(about = "Teia - nó e minerador da blockchain de ciclo-de-cuco")]
#[command(version)]
struct Cli {
    /// Nível de log (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Minera blocos sobre o chainstate local
    Mine(MineArgs),
    /// Mede as etapas do pipeline de mineração
    Bench(BenchArgs),
    /// Verifica uma prova serializada (120 bytes, hex ou binário)
    Verify(VerifyArgs),
    /// Executa o nó completo com o serviço P2P
    Node(NodeArgs),
}

#[derive(Args)]
struct MineArgs {
    /// Diretório de dados do chainstate
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Threads de mineração (0 = automático)
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Encerra após minerar N blocos
    #[arg(long)]
    blocks: Option<u64>,

    /// Política relaxada com grafo reduzido (desenvolvimento)
    #[arg(long)]
    insecure: bool,

    /// Chave pública (hex, 32 bytes) que recebe as recompensas
    #[arg(long)]
    reward_pubkey: Option<String>,
}

#[derive(Args)]
struct BenchArgs {
    /// log2 do número de arestas
    #[arg(long, default_value = "12")]
    edge_bits: u32,

    /// Tamanho do scratchpad em KiB
    #[arg(long, default_value = "64")]
    scratchpad_kib: usize,

    /// Dimensão das matrizes densas
    #[arg(long, default_value = "8")]
    matrix_dim: usize,

    /// Rodadas de poda
    #[arg(long, default_value = "20")]
    trim_rounds: u32,

    /// Número de nonces a medir
    #[arg(long, default_value = "4")]
    nonces: u64,
}

#[derive(Args)]
struct VerifyArgs {
    /// Arquivo com a prova (hex ou 120 bytes crus)
    proof_file: PathBuf,

    /// Altura do bloco, para derivar os parâmetros da época
    #[arg(long, default_value = "0")]
    height: u64,

    /// Usa os parâmetros reduzidos de desenvolvimento
    #[arg(long)]
    dev_params: bool,

    /// Modo somente-ciclo (replay parcial; ignora alvo e poda)
    #[arg(long)]
    cycle_only: bool,
}

#[derive(Args)]
struct NodeArgs {
    /// Porta P2P
    #[arg(short, long, default_value = "9333")]
    port: u16,

    /// Endereço de bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Peers para conexão inicial (host:porta)
    #[arg(short, long)]
    connect: Vec<String>,

    /// Diretório de dados do chainstate
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Identificador da rede para o handshake
    #[arg(long, default_value = "teia-devnet")]
    network_id: String,

    /// Política relaxada (sem verificação de prova; desenvolvimento)
    #[arg(long)]
    insecure: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let outcome = match cli.command {
        Commands::Mine(args) => run_mine(args).await,
        Commands::Bench(args) => run_bench(&args),
        Commands::Verify(args) => run_verify(&args),
        Commands::Node(args) => run_node(args).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    }
}

fn resolve_reward_script(reward_pubkey: Option<&str>) -> Result<Vec<u8>> {
    match reward_pubkey {
        Some(pubkey_hex) => {
            let bytes = hex::decode(pubkey_hex)
                .map_err(|e| ChainError::Codec(format!("invalid reward pubkey hex: {e}")))?;
            let public_key = PublicKey::from_bytes(&bytes)?;
            Ok(script::locking_script(&public_key))
        }
        None => {
            let keypair = KeyPair::generate();
            info!(
                "🔑 reward pubkey: {}",
                hex::encode(keypair.public_key.as_bytes())
            );
            info!(
                "   seed (guarde para gastar): {}",
                hex::encode(keypair.private_key.as_bytes())
            );
            Ok(script::locking_script(&keypair.public_key))
        }
    }
}

#[allow(clippy::cast_possible_truncation)] // Timestamps u32 valem até 2106
async fn run_mine(args: MineArgs) -> Result<()> {
    let config = if args.insecure {
        ChainConfig::relaxed()
    } else {
        ChainConfig::default()
    };
    let mut chain = ChainState::new(devnet_genesis(), config, Some(args.data_dir.as_path()))?;
    let reward_script = resolve_reward_script(args.reward_pubkey.as_deref())?;

    let threads = if args.threads == 0 {
        MinerConfig::default().threads
    } else {
        args.threads
    };
    let miner = Arc::new(Miner::new(MinerConfig {
        threads,
        reward_script: reward_script.clone(),
    }));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let miner = Arc::clone(&miner);
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("🛑 shutdown requested; finishing current nonce");
            shutdown.store(true, Ordering::SeqCst);
            miner.stop_mining();
        });
    }

    let mut mined = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        let tip = chain.tip();
        let height = tip.height + 1;
        let bits = chain.next_bits_for(&tip.hash);
        let parent_timestamp = chain
            .get_block(&tip.hash)
            .map(|b| b.header.timestamp)
            .unwrap_or(0);
        let timestamp = (chrono::Utc::now().timestamp() as u32).max(parent_timestamp + 1);

        let template = BlockTemplate::build(
            tip.hash,
            height,
            bits,
            timestamp,
            reward_script.clone(),
            vec![],
            0,
        );
        let params = if args.insecure {
            dev_params()
        } else {
            GraphParams::for_height(height)
        };

        info!("⛏️  mining block at height {height} (bits 0x{bits:08x})");
        let header = template.header;
        let worker = Arc::clone(&miner);
        let found = tokio::task::spawn_blocking(move || worker.mine_header(&header, params))
            .await
            .map_err(|e| ChainError::Network(format!("mining worker panicked: {e}")))?;

        let Some(result) = found else {
            break; // cancelado
        };

        let block = Block::new(template.header, result.proof, template.transactions);
        let hash = block.hash();
        match chain.submit_block(block) {
            SubmitResult::Accepted {
                height,
                best_changed,
                ..
            } => {
                mined += 1;
                info!(
                    "✅ mined block {hash} at height {height} (nonce {}, attempts {}, best={best_changed})",
                    result.nonce, result.attempts
                );
            }
            other => {
                warn!("mined block {hash} not accepted: {other:?}");
            }
        }

        if args.blocks.is_some_and(|limit| mined >= limit) {
            break;
        }
    }

    info!("⚒️  mined {mined} blocks");
    Ok(())
}

fn run_bench(args: &BenchArgs) -> Result<()> {
    let params = GraphParams::new(
        args.scratchpad_kib * 1024,
        1u32 << args.edge_bits,
        args.matrix_dim,
        args.trim_rounds,
    )?;
    let mut generator = EdgeGenerator::new(params);
    let header = [0u8; 80];

    println!(
        "bench: edges=2^{} scratchpad={}KiB matrix={} rounds={}",
        args.edge_bits, args.scratchpad_kib, args.matrix_dim, args.trim_rounds
    );

    for nonce in 0..args.nonces {
        let start = Instant::now();
        let edges = generator.generate(&header, nonce);
        let generated = start.elapsed();

        let start = Instant::now();
        let survivors = trim_parallel(&edges, &params);
        let trimmed = start.elapsed();

        let start = Instant::now();
        let surviving: Vec<_> = survivors.iter().map(|&i| edges[i as usize]).collect();
        let cycle = find_cycle(&surviving);
        let searched = start.elapsed();

        println!(
            "nonce {nonce}: generate {:?} | trim {:?} ({} survivors) | cycle {:?} ({})",
            generated,
            trimmed,
            survivors.len(),
            searched,
            if cycle.is_some() { "found" } else { "none" }
        );
    }
    Ok(())
}

fn run_verify(args: &VerifyArgs) -> Result<()> {
    let raw = std::fs::read(&args.proof_file)?;
    let bytes = if raw.len() == teia_core::PROOF_LEN {
        raw
    } else {
        let text: String = String::from_utf8_lossy(&raw)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        hex::decode(&text).map_err(|e| ChainError::Codec(format!("invalid proof hex: {e}")))?
    };
    let proof = Proof::deserialize(&bytes)?;

    let params = if args.dev_params {
        dev_params()
    } else {
        GraphParams::for_height(args.height)
    };
    let verifier = Verifier::new(params);

    let outcome = if args.cycle_only {
        verifier.verify_cycle_only(&proof)
    } else {
        verifier.verify(&proof)
    };

    match outcome {
        Ok(()) => {
            println!("proof valid (nonce {})", proof.nonce);
            Ok(())
        }
        Err(e) => {
            println!("proof invalid: {e}");
            Err(e)
        }
    }
}

async fn run_node(args: NodeArgs) -> Result<()> {
    let config = if args.insecure {
        ChainConfig::relaxed()
    } else {
        ChainConfig::default()
    };
    let state = ChainState::new(devnet_genesis(), config, Some(args.data_dir.as_path()))?;
    info!(
        "⛓️  chainstate loaded: height {} best {}",
        state.tip().height,
        state.tip().hash
    );

    let chain = ChainHandle::spawn(state);
    let mempool = MempoolHandle::spawn(Mempool::new(MempoolConfig::default()), chain.clone());

    let node_config = NodeConfig {
        network_id: args.network_id,
        p2p_port: args.port,
        bind_address: args.bind,
        bootstrap_peers: args.connect,
        data_dir: args.data_dir.display().to_string(),
        ..NodeConfig::default()
    };
    let bind_addr = format!("{}:{}", node_config.bind_address, node_config.p2p_port);
    let bootstrap = node_config.bootstrap_peers.clone();
    let p2p = P2pService::new(node_config, chain.clone(), mempool);

    p2p.listen(&bind_addr).await?;
    for peer in &bootstrap {
        if let Err(e) = p2p.connect(peer).await {
            warn!("could not reach bootstrap peer {peer}: {e}");
        }
    }

    // Relatório periódico de status
    {
        let chain = chain.clone();
        let p2p = Arc::clone(&p2p);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Ok(stats) = chain.stats().await {
                    info!(
                        "📊 height {} | blocks {} | utxos {} | peers {}",
                        stats.height,
                        stats.block_count,
                        stats.utxo_count,
                        p2p.peer_count().await
                    );
                }
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ChainError::Network(e.to_string()))?;
    info!("🛑 node shutting down");
    Ok(())
}
