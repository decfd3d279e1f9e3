//! Minerador CPU: busca de provas em threads de trabalho
//!
//! Cada worker possui seu próprio scratchpad e percorre uma fatia
//! entrelaçada do espaço de nonces. A flag de cancelamento é consultada
//! entre nonces; o worker pode terminar o nonce corrente.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::block::{merkle_root, BlockHeader};
use crate::chainstate::subsidy;
use crate::cycle::find_cycle;
use crate::difficulty::compact_to_target;
use crate::difficulty::hash_meets_target;
use crate::edges::{Edge, EdgeGenerator};
use crate::params::{GraphParams, CYCLE_LEN};
use crate::proof::Proof;
use crate::transaction::Transaction;
use crate::trimmer::trim_reference;
use shared::Hash256;

/// Configuração do minerador
#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Número de threads de trabalho
    pub threads: usize,
    /// Script de bloqueio que recebe a recompensa
    pub reward_script: Vec<u8>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map_or(1, std::num::NonZero::get),
            reward_script: Vec::new(),
        }
    }
}

/// Resultado da mineração de um cabeçalho
#[derive(Debug, Clone)]
pub struct MiningResult {
    pub proof: Proof,
    pub nonce: u64,
    pub attempts: u64,
}

/// Template de bloco pronto para mineração
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl BlockTemplate {
    /// Monta um template: coinbase com subsídio + taxas, transações do
    /// mempool e raiz de Merkle calculada
    #[must_use]
    pub fn build(
        prev_hash: Hash256,
        height: u64,
        bits: u32,
        timestamp: u32,
        reward_script: Vec<u8>,
        mempool_txs: Vec<Transaction>,
        total_fees: u64,
    ) -> Self {
        let reward = subsidy(height).saturating_add(total_fees);
        let mut transactions = vec![Transaction::coinbase(height, reward, reward_script)];
        transactions.extend(mempool_txs);

        let header = BlockHeader::new(1, prev_hash, merkle_root(&transactions), timestamp, bits);
        Self {
            header,
            transactions,
        }
    }
}

/// Minerador de provas de trabalho
pub struct Miner {
    config: MinerConfig,
    is_mining: Arc<AtomicBool>,
}

impl Miner {
    /// Cria um novo minerador
    #[must_use]
    pub fn new(config: MinerConfig) -> Self {
        Self {
            config,
            is_mining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sinaliza o cancelamento; os workers terminam o nonce corrente
    pub fn stop_mining(&self) {
        self.is_mining.store(false, Ordering::SeqCst);
    }

    /// Verifica se há mineração em andamento
    #[must_use]
    pub fn is_mining(&self) -> bool {
        self.is_mining.load(Ordering::SeqCst)
    }

    /// Procura uma prova para o cabeçalho dado
    ///
    /// Bloqueia até encontrar uma prova que atenda ao alvo de `bits` do
    /// cabeçalho ou até `stop_mining` ser chamado. Retorna `None` se
    /// cancelado.
    #[must_use]
    pub fn mine_header(&self, header: &BlockHeader, params: GraphParams) -> Option<MiningResult> {
        let header_bytes = header.serialize();
        let target = compact_to_target(header.bits);

        self.is_mining.store(true, Ordering::SeqCst);
        let result: Arc<Mutex<Option<MiningResult>>> = Arc::new(Mutex::new(None));
        let attempts = Arc::new(AtomicU64::new(0));
        let threads = self.config.threads.max(1);

        let mut handles = Vec::with_capacity(threads);
        for thread_id in 0..threads {
            let is_mining = Arc::clone(&self.is_mining);
            let result = Arc::clone(&result);
            let attempts = Arc::clone(&attempts);

            let handle = thread::spawn(move || {
                let mut generator = EdgeGenerator::new(params);
                let mut nonce = thread_id as u64;

                while is_mining.load(Ordering::SeqCst) {
                    attempts.fetch_add(1, Ordering::Relaxed);

                    if let Some(proof) =
                        try_nonce(&mut generator, &header_bytes, nonce, &params, &target)
                    {
                        let mining_result = MiningResult {
                            nonce: proof.nonce,
                            attempts: attempts.load(Ordering::Relaxed),
                            proof,
                        };
                        *result.lock().unwrap() = Some(mining_result);
                        is_mining.store(false, Ordering::SeqCst);
                        break;
                    }

                    nonce = nonce.wrapping_add(threads as u64);
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.join();
        }

        self.is_mining.store(false, Ordering::SeqCst);
        let found = result.lock().unwrap().take();
        found
    }
}

/// Tenta um único nonce: gera, poda, procura o ciclo e testa o alvo
fn try_nonce(
    generator: &mut EdgeGenerator,
    header_bytes: &[u8; 80],
    nonce: u64,
    params: &GraphParams,
    target: &[u8; 32],
) -> Option<Proof> {
    let edges = generator.generate(header_bytes, nonce);
    let survivors = trim_reference(&edges, params);
    if survivors.len() < CYCLE_LEN {
        return None;
    }

    let surviving_edges: Vec<Edge> = survivors.iter().map(|&i| edges[i as usize]).collect();
    let local = find_cycle(&surviving_edges)?;

    // Tabela de posições: índices locais de volta ao grafo completo
    let mut cycle_edges = [0u32; CYCLE_LEN];
    for (slot, &local_idx) in cycle_edges.iter_mut().zip(local.iter()) {
        *slot = survivors[local_idx as usize];
    }

    let proof = Proof {
        header: *header_bytes,
        nonce,
        cycle_edges,
    };
    hash_meets_target(&proof.hash(), target).then_some(proof)
}
