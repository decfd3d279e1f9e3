//! Estado da cadeia: validação de blocos, transição UTXO, escolha de fork
//! por trabalho acumulado e persistência em disco
//!
//! Cada nó aceito guarda seu próprio snapshot de UTXO derivado do pai;
//! ramos perdedores permanecem no mapa e o ponteiro de melhor bloco apenas
//! se move para a ponta mais pesada.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared::{ChainError, Hash256, Result};
use tracing::warn;

use crate::block::{merkle_root, Block, BlockHeader};
use crate::difficulty::{retarget_bits, work_for_bits, BLOCKS_PER_ADJUSTMENT, TARGET_BLOCK_SECONDS};
use crate::params::GraphParams;
use crate::proof::Proof;
use crate::script;
use crate::transaction::{OutPoint, Transaction, TxOutput};
use crate::verify::Verifier;

/// Recompensa base por bloco em fios (50 TEIA)
pub const BASE_SUBSIDY: u64 = 50 * 100_000_000;

/// Intervalo de halving em blocos
pub const HALVING_INTERVAL: u64 = 210_000;

/// Tamanho máximo de um bloco serializado
pub const MAX_BLOCK_BYTES: usize = 1_000_000;

/// Número máximo de transações por bloco
pub const MAX_BLOCK_TXS: usize = 4096;

/// Tolerância de relógio para timestamps futuros, em segundos
pub const MAX_FUTURE_SECS: u32 = 2 * 60 * 60;

/// Timestamp fixo do bloco gênese da rede de desenvolvimento
pub const GENESIS_TIMESTAMP: u32 = 1_721_000_000;

/// Bloco gênese da rede de desenvolvimento
///
/// A recompensa do gênese é bloqueada numa chave toda-zero; ninguém a
/// gasta.
#[must_use]
pub fn devnet_genesis() -> Block {
    let mut locking_script = Vec::with_capacity(33);
    locking_script.push(script::LOCK_TAG_PAY_TO_PUBKEY);
    locking_script.extend_from_slice(&[0u8; 32]);
    ChainState::build_genesis(
        GENESIS_TIMESTAMP,
        crate::difficulty::MIN_DIFFICULTY_BITS,
        locking_script,
    )
}

/// Recompensa de emissão para a altura dada; zera após 63 halvings
#[must_use]
pub fn subsidy(height: u64) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings > 63 {
        0
    } else {
        BASE_SUBSIDY >> halvings
    }
}

/// Política de aceitação de blocos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPolicy {
    /// Verificação completa da prova de trabalho com `bits` esperado
    Secure,
    /// Apenas checagens estruturais e de estado (testes e ferramentas
    /// locais)
    Relaxed,
}

/// Configuração de consenso do estado da cadeia
#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    pub policy: BlockPolicy,
    /// Exigir assinaturas válidas nas transações não-coinbase
    pub verify_signatures: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            policy: BlockPolicy::Secure,
            verify_signatures: true,
        }
    }
}

impl ChainConfig {
    /// Configuração relaxada usada por testes e ferramentas locais
    #[must_use]
    pub const fn relaxed() -> Self {
        Self {
            policy: BlockPolicy::Relaxed,
            verify_signatures: true,
        }
    }
}

/// Resultado discriminado de uma submissão de bloco
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    /// Bloco aceito; `best_changed` indica se virou a melhor ponta
    Accepted {
        hash: Hash256,
        height: u64,
        best_changed: bool,
    },
    /// Bloco já conhecido; no-op idempotente
    Duplicate,
    /// Pai desconhecido; candidato a backfill
    Orphan { parent: Hash256 },
    /// Recusado por política ou consenso; nunca re-tentado
    Rejected { reason: String },
}

/// Nó aceito da cadeia; imutável após a criação
#[derive(Debug, Clone)]
pub struct ChainNode {
    pub block: Block,
    pub hash: Hash256,
    pub parent: Option<Hash256>,
    pub height: u64,
    pub total_work: u64,
    pub utxo: HashMap<OutPoint, TxOutput>,
}

/// Ponta vencedora da cadeia
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: Hash256,
    pub height: u64,
    pub total_work: u64,
    pub bits: u32,
}

/// Estatísticas agregadas da cadeia
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStats {
    pub height: u64,
    pub best_hash: Hash256,
    pub total_work: u64,
    pub utxo_count: u64,
    pub block_count: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BestMeta {
    best_hash_hex: String,
}

/// Estado da cadeia com posse exclusiva do mapa de nós e do ponteiro de
/// melhor bloco
pub struct ChainState {
    nodes: HashMap<Hash256, ChainNode>,
    best: Hash256,
    genesis_hash: Hash256,
    config: ChainConfig,
    storage: Option<PathBuf>,
}

impl ChainState {
    /// Constrói um bloco gênese com prova vazia (não verificada)
    #[must_use]
    pub fn build_genesis(timestamp: u32, bits: u32, locking_script: Vec<u8>) -> Block {
        let coinbase = Transaction::coinbase(0, subsidy(0), locking_script);
        let header = BlockHeader::new(
            1,
            Hash256::zero(),
            merkle_root(std::slice::from_ref(&coinbase)),
            timestamp,
            bits,
        );
        let proof = Proof {
            header: header.serialize(),
            nonce: 0,
            cycle_edges: [0, 1, 2, 3, 4, 5, 6, 7],
        };
        Block::new(header, proof, vec![coinbase])
    }

    /// Inicializa o estado da cadeia, reproduzindo o disco se houver
    ///
    /// Com um diretório de armazenamento, todos os blocos persistidos são
    /// re-validados contra seus pais em ordem topológica; qualquer falha
    /// aborta a inicialização. Um marcador de melhor bloco obsoleto é
    /// reparado.
    ///
    /// # Errors
    ///
    /// Retorna erro fatal se o gênese for inválido, se o replay falhar ou
    /// se o disco estiver inacessível na inicialização
    pub fn new(genesis: Block, config: ChainConfig, storage_dir: Option<&Path>) -> Result<Self> {
        let genesis_hash = genesis.hash();
        Self::validate_genesis(&genesis)?;

        let mut utxo = HashMap::new();
        let coinbase = &genesis.transactions[0];
        let txid = coinbase.txid();
        for (vout, output) in coinbase.outputs.iter().enumerate() {
            utxo.insert(OutPoint::new(txid, vout as u32), output.clone());
        }

        let genesis_node = ChainNode {
            total_work: work_for_bits(genesis.header.bits),
            hash: genesis_hash,
            parent: None,
            height: 0,
            utxo,
            block: genesis,
        };

        let mut state = Self {
            nodes: HashMap::from([(genesis_hash, genesis_node)]),
            best: genesis_hash,
            genesis_hash,
            config,
            storage: storage_dir.map(Path::to_path_buf),
        };

        if let Some(dir) = storage_dir {
            let blocks_dir = dir.join("blocks");
            if blocks_dir.is_dir() {
                state.replay_from_disk(&blocks_dir)?;
                state.repair_best_meta()?;
            } else {
                fs::create_dir_all(&blocks_dir)?;
                state.persist_block_file(&state.nodes[&genesis_hash].block)?;
                state.persist_best_meta()?;
            }
        }

        Ok(state)
    }

    fn validate_genesis(genesis: &Block) -> Result<()> {
        if genesis.header.prev_hash != Hash256::zero() {
            return Err(ChainError::InvalidBlock(
                "genesis prev_hash must be zero".to_string(),
            ));
        }
        if genesis.proof.header != genesis.header.serialize() {
            return Err(ChainError::InvalidBlock(
                "genesis proof header mismatch".to_string(),
            ));
        }
        if genesis.transactions.len() != 1 || !genesis.transactions[0].is_coinbase() {
            return Err(ChainError::InvalidBlock(
                "genesis must contain exactly one coinbase".to_string(),
            ));
        }
        if genesis.header.merkle_root != merkle_root(&genesis.transactions) {
            return Err(ChainError::InvalidBlock(
                "genesis merkle root mismatch".to_string(),
            ));
        }
        Ok(())
    }

    /// Reproduz os blocos persistidos em ordem topológica
    fn replay_from_disk(&mut self, blocks_dir: &Path) -> Result<()> {
        let mut by_parent: HashMap<Hash256, Vec<Block>> = HashMap::new();
        let mut total = 0usize;

        for entry in fs::read_dir(blocks_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("blk") {
                continue;
            }
            let bytes = fs::read(&path)?;
            let block = Block::deserialize(&bytes).map_err(|e| {
                ChainError::Storage(format!("corrupt block file {}: {e}", path.display()))
            })?;
            if block.hash() == self.genesis_hash {
                continue; // gênese já montado em memória
            }
            by_parent
                .entry(block.header.prev_hash)
                .or_default()
                .push(block);
            total += 1;
        }

        // Pais antes dos filhos, a partir do gênese
        let mut frontier = vec![self.genesis_hash];
        let mut replayed = 0usize;
        while let Some(parent_hash) = frontier.pop() {
            let Some(children) = by_parent.remove(&parent_hash) else {
                continue;
            };
            for block in children {
                let hash = block.hash();
                match self.accept_block(block, false) {
                    SubmitResult::Accepted { .. } | SubmitResult::Duplicate => {}
                    SubmitResult::Orphan { parent } => {
                        return Err(ChainError::Storage(format!(
                            "replayed block {hash} lost its parent {parent}"
                        )));
                    }
                    SubmitResult::Rejected { reason } => {
                        return Err(ChainError::Storage(format!(
                            "persisted block {hash} failed validation: {reason}"
                        )));
                    }
                }
                replayed += 1;
                frontier.push(hash);
            }
        }

        if replayed != total {
            return Err(ChainError::Storage(format!(
                "{} persisted blocks are not connected to genesis",
                total - replayed
            )));
        }
        Ok(())
    }

    /// Relê o marcador de melhor bloco e o regrava se estiver obsoleto
    fn repair_best_meta(&mut self) -> Result<()> {
        let Some(dir) = &self.storage else {
            return Ok(());
        };
        let meta_path = dir.join("meta.json");
        let stored: Option<Hash256> = fs::read_to_string(&meta_path)
            .ok()
            .and_then(|data| serde_json::from_str::<BestMeta>(&data).ok())
            .and_then(|meta| Hash256::from_hex(&meta.best_hash_hex).ok());

        if stored != Some(self.best) {
            self.persist_best_meta()?;
        }
        Ok(())
    }

    /// Submete um bloco ao pipeline de aceitação
    pub fn submit_block(&mut self, block: Block) -> SubmitResult {
        self.accept_block(block, true)
    }

    fn accept_block(&mut self, block: Block, persist: bool) -> SubmitResult {
        let hash = block.hash();

        // 1. duplicata
        if self.nodes.contains_key(&hash) {
            return SubmitResult::Duplicate;
        }

        // 2. limites estruturais
        if block.serialize().len() > MAX_BLOCK_BYTES {
            return reject("block exceeds maximum size");
        }
        if block.transactions.is_empty() {
            return reject("block has no transactions");
        }
        if block.transactions.len() > MAX_BLOCK_TXS {
            return reject("block has too many transactions");
        }
        for tx in &block.transactions {
            if let Err(e) = tx.validate_structure() {
                return reject(&format!("structurally invalid transaction: {e}"));
            }
        }

        // 3. amarração prova↔cabeçalho e raiz de Merkle
        if block.proof.header != block.header.serialize() {
            return reject("proof header does not match block header");
        }
        if block.header.merkle_root != merkle_root(&block.transactions) {
            return reject("merkle root mismatch");
        }

        // 4. pai
        let parent_hash = block.header.prev_hash;
        let Some(parent) = self.nodes.get(&parent_hash) else {
            return SubmitResult::Orphan {
                parent: parent_hash,
            };
        };

        // 5. janela de timestamp
        if block.header.timestamp <= parent.block.header.timestamp {
            return reject("timestamp not greater than parent");
        }
        let now = chrono::Utc::now().timestamp();
        if i64::from(block.header.timestamp) > now + i64::from(MAX_FUTURE_SECS) {
            return reject("timestamp too far in the future");
        }

        let height = parent.height + 1;

        // 6. transição de estado UTXO
        let (utxo, _fees) = match self.apply_transactions(&parent.utxo, &block, height) {
            Ok(result) => result,
            Err(e) => return reject(&e.to_string()),
        };

        // 7. prova de trabalho sob política segura
        if self.config.policy == BlockPolicy::Secure {
            let expected_bits = self.next_bits_for(&parent_hash);
            let params = GraphParams::for_height(height);
            let verifier = Verifier::with_expected_bits(params, expected_bits);
            if let Err(e) = verifier.verify(&block.proof) {
                return reject(&e.to_string());
            }
        }

        // 8. inserir, persistir e mover o ponteiro de melhor bloco
        let total_work = parent
            .total_work
            .wrapping_add(work_for_bits(block.header.bits));

        let node = ChainNode {
            block,
            hash,
            parent: Some(parent_hash),
            height,
            total_work,
            utxo,
        };

        if persist {
            if let Err(e) = self.persist_block_file(&node.block) {
                // O estado em memória continua autoritativo
                warn!("failed to persist block {hash}: {e}");
            }
        }

        let current_best = &self.nodes[&self.best];
        let best_changed = total_work > current_best.total_work
            || (total_work == current_best.total_work && hash < current_best.hash);

        self.nodes.insert(hash, node);
        if best_changed {
            self.best = hash;
            if persist {
                if let Err(e) = self.persist_best_meta() {
                    warn!("failed to persist best marker: {e}");
                }
            }
        }

        SubmitResult::Accepted {
            hash,
            height,
            best_changed,
        }
    }

    /// Aplica as transações do bloco sobre o snapshot do pai
    ///
    /// Retorna o novo snapshot e o total de taxas acumulado.
    fn apply_transactions(
        &self,
        parent_utxo: &HashMap<OutPoint, TxOutput>,
        block: &Block,
        height: u64,
    ) -> Result<(HashMap<OutPoint, TxOutput>, u64)> {
        let coinbase = &block.transactions[0];
        if !coinbase.is_coinbase() {
            return Err(ChainError::InvalidBlock(
                "first transaction must be a coinbase".to_string(),
            ));
        }

        let mut seen_txids = std::collections::HashSet::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if !seen_txids.insert(tx.txid()) {
                return Err(ChainError::InvalidBlock(
                    "duplicate txid within block".to_string(),
                ));
            }
        }

        let mut working = parent_utxo.clone();
        let mut total_fees = 0u64;

        for tx in &block.transactions[1..] {
            if tx.is_coinbase() {
                return Err(ChainError::InvalidBlock(
                    "misplaced coinbase transaction".to_string(),
                ));
            }

            let mut sum_in = 0u64;
            for (index, input) in tx.inputs.iter().enumerate() {
                // Remoção imediata também barra gasto duplo dentro do bloco
                let Some(spent) = working.remove(&input.previous_output) else {
                    return Err(ChainError::InvalidBlock(format!(
                        "input spends unknown or already spent utxo {}:{}",
                        input.previous_output.txid, input.previous_output.vout
                    )));
                };
                if self.config.verify_signatures {
                    script::verify_input(tx, index as u32, &spent)?;
                }
                sum_in = sum_in.checked_add(spent.value).ok_or_else(|| {
                    ChainError::InvalidBlock("input value overflow".to_string())
                })?;
            }

            let sum_out = tx.total_output_value()?;
            if sum_in < sum_out {
                return Err(ChainError::InvalidBlock(
                    "transaction outputs exceed inputs".to_string(),
                ));
            }
            total_fees = total_fees
                .checked_add(sum_in - sum_out)
                .ok_or_else(|| ChainError::InvalidBlock("fee overflow".to_string()))?;

            let txid = tx.txid();
            for (vout, output) in tx.outputs.iter().enumerate() {
                working.insert(OutPoint::new(txid, vout as u32), output.clone());
            }
        }

        let max_coinbase = subsidy(height)
            .checked_add(total_fees)
            .ok_or_else(|| ChainError::InvalidBlock("reward overflow".to_string()))?;
        if coinbase.total_output_value()? > max_coinbase {
            return Err(ChainError::InvalidBlock(
                "coinbase output exceeds subsidy plus fees".to_string(),
            ));
        }

        let coinbase_txid = coinbase.txid();
        for (vout, output) in coinbase.outputs.iter().enumerate() {
            working.insert(OutPoint::new(coinbase_txid, vout as u32), output.clone());
        }

        Ok((working, total_fees))
    }

    /// `bits` que o consenso espera para um filho do pai dado
    ///
    /// Em alturas múltiplas do intervalo, a janela de reajuste usa o
    /// ancestral `BLOCKS_PER_ADJUSTMENT − 1` blocos atrás; fora delas o
    /// filho herda os `bits` do pai.
    #[must_use]
    pub fn next_bits_for(&self, parent_hash: &Hash256) -> u32 {
        let Some(parent) = self.nodes.get(parent_hash) else {
            return crate::difficulty::MIN_DIFFICULTY_BITS;
        };
        let height = parent.height + 1;
        if height == 0 || height % BLOCKS_PER_ADJUSTMENT != 0 {
            return parent.block.header.bits;
        }

        let mut anchor = parent;
        for _ in 0..(BLOCKS_PER_ADJUSTMENT - 2) {
            let Some(parent_of_anchor) = anchor
                .parent
                .as_ref()
                .and_then(|hash| self.nodes.get(hash))
            else {
                return parent.block.header.bits;
            };
            anchor = parent_of_anchor;
        }

        let actual = u64::from(
            parent
                .block
                .header
                .timestamp
                .saturating_sub(anchor.block.header.timestamp),
        )
        .max(1);
        let expected = TARGET_BLOCK_SECONDS * (BLOCKS_PER_ADJUSTMENT - 1);
        retarget_bits(parent.block.header.bits, actual, expected)
    }

    /// Ponta vencedora atual
    #[must_use]
    pub fn tip(&self) -> ChainTip {
        let best = &self.nodes[&self.best];
        ChainTip {
            hash: best.hash,
            height: best.height,
            total_work: best.total_work,
            bits: best.block.header.bits,
        }
    }

    /// Bloco pelo hash, se conhecido
    #[must_use]
    pub fn get_block(&self, hash: &Hash256) -> Option<&Block> {
        self.nodes.get(hash).map(|node| &node.block)
    }

    /// Verifica se o bloco é conhecido
    #[must_use]
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Snapshot de UTXO da melhor ponta
    #[must_use]
    pub fn best_utxo(&self) -> &HashMap<OutPoint, TxOutput> {
        &self.nodes[&self.best].utxo
    }

    /// Resolve um subconjunto de outpoints contra o UTXO da melhor ponta
    #[must_use]
    pub fn resolve_utxos(&self, outpoints: &[OutPoint]) -> HashMap<OutPoint, TxOutput> {
        let best = self.best_utxo();
        outpoints
            .iter()
            .filter_map(|op| best.get(op).map(|out| (*op, out.clone())))
            .collect()
    }

    /// Estatísticas agregadas
    #[must_use]
    pub fn stats(&self) -> ChainStats {
        let best = &self.nodes[&self.best];
        ChainStats {
            height: best.height,
            best_hash: best.hash,
            total_work: best.total_work,
            utxo_count: best.utxo.len() as u64,
            block_count: self.nodes.len() as u64,
        }
    }

    /// Hash do bloco gênese
    #[must_use]
    pub const fn genesis_hash(&self) -> Hash256 {
        self.genesis_hash
    }

    // --- persistência -----------------------------------------------------

    fn persist_block_file(&self, block: &Block) -> Result<()> {
        let Some(dir) = &self.storage else {
            return Ok(());
        };
        let path = dir.join("blocks").join(format!("{}.blk", block.hash()));
        atomic_write(&path, &block.serialize())
    }

    fn persist_best_meta(&self) -> Result<()> {
        let Some(dir) = &self.storage else {
            return Ok(());
        };
        let meta = BestMeta {
            best_hash_hex: self.best.to_hex(),
        };
        let data = serde_json::to_vec_pretty(&meta)
            .map_err(|e| ChainError::Serialization(e.to_string()))?;
        atomic_write(&dir.join("meta.json"), &data)
    }
}

/// Escrita atômica: grava num arquivo temporário e renomeia por cima
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn reject(reason: &str) -> SubmitResult {
    SubmitResult::Rejected {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::MIN_DIFFICULTY_BITS;
    use shared::KeyPair;

    const GENESIS_TIME: u32 = 1_700_000_000;

    fn genesis_with_key() -> (Block, KeyPair) {
        let keypair = KeyPair::generate();
        let genesis = ChainState::build_genesis(
            GENESIS_TIME,
            MIN_DIFFICULTY_BITS,
            script::locking_script(&keypair.public_key),
        );
        (genesis, keypair)
    }

    fn make_child(parent: &Block, height: u64, timestamp: u32, extra_txs: Vec<Transaction>, fees: u64) -> Block {
        let mut txs = vec![Transaction::coinbase(
            height,
            subsidy(height) + fees,
            vec![0x01; 33],
        )];
        txs.extend(extra_txs);

        let header = BlockHeader::new(
            1,
            parent.hash(),
            merkle_root(&txs),
            timestamp,
            parent.header.bits,
        );
        let proof = Proof {
            header: header.serialize(),
            nonce: 0,
            cycle_edges: [0, 1, 2, 3, 4, 5, 6, 7],
        };
        Block::new(header, proof, txs)
    }

    fn open_relaxed(genesis: Block, dir: Option<&Path>) -> ChainState {
        ChainState::new(genesis, ChainConfig::relaxed(), dir).unwrap()
    }

    #[test]
    fn test_genesis_initialization() {
        let (genesis, _) = genesis_with_key();
        let genesis_hash = genesis.hash();
        let chain = open_relaxed(genesis, None);

        let tip = chain.tip();
        assert_eq!(tip.height, 0);
        assert_eq!(tip.hash, genesis_hash);
        assert_eq!(chain.best_utxo().len(), 1);
    }

    #[test]
    fn test_linear_growth_and_duplicate() {
        let (genesis, _) = genesis_with_key();
        let mut chain = open_relaxed(genesis.clone(), None);

        let c1 = make_child(&genesis, 1, GENESIS_TIME + 600, vec![], 0);
        let c2 = make_child(&c1, 2, GENESIS_TIME + 1200, vec![], 0);

        assert!(matches!(
            chain.submit_block(c1.clone()),
            SubmitResult::Accepted { best_changed: true, height: 1, .. }
        ));
        assert!(matches!(
            chain.submit_block(c2.clone()),
            SubmitResult::Accepted { best_changed: true, height: 2, .. }
        ));
        assert_eq!(chain.tip().height, 2);
        assert_eq!(chain.tip().hash, c2.hash());

        assert_eq!(chain.submit_block(c1), SubmitResult::Duplicate);
    }

    #[test]
    fn test_orphan_then_connect() {
        let (genesis, _) = genesis_with_key();
        let mut chain = open_relaxed(genesis.clone(), None);

        let c1 = make_child(&genesis, 1, GENESIS_TIME + 600, vec![], 0);
        let c2 = make_child(&c1, 2, GENESIS_TIME + 1200, vec![], 0);

        // Filho antes do pai: órfão com o hash do pai reportado
        match chain.submit_block(c2.clone()) {
            SubmitResult::Orphan { parent } => assert_eq!(parent, c1.hash()),
            other => panic!("esperava órfão, veio {other:?}"),
        }

        chain.submit_block(c1);
        assert!(matches!(
            chain.submit_block(c2),
            SubmitResult::Accepted { .. }
        ));
        assert_eq!(chain.tip().height, 2);
    }

    #[test]
    fn test_rejects_bad_timestamps() {
        let (genesis, _) = genesis_with_key();
        let mut chain = open_relaxed(genesis.clone(), None);

        // Não estritamente maior que o pai
        let stale = make_child(&genesis, 1, GENESIS_TIME, vec![], 0);
        assert!(matches!(
            chain.submit_block(stale),
            SubmitResult::Rejected { .. }
        ));

        // Longe demais no futuro
        let now = chrono::Utc::now().timestamp() as u32;
        let future = make_child(&genesis, 1, now + MAX_FUTURE_SECS + 600, vec![], 0);
        assert!(matches!(
            chain.submit_block(future),
            SubmitResult::Rejected { .. }
        ));
    }

    #[test]
    fn test_rejects_merkle_and_proof_mismatch() {
        let (genesis, _) = genesis_with_key();
        let mut chain = open_relaxed(genesis.clone(), None);

        let mut bad_merkle = make_child(&genesis, 1, GENESIS_TIME + 600, vec![], 0);
        bad_merkle.header.merkle_root = Hash256::sha256(b"wrong");
        bad_merkle.proof.header = bad_merkle.header.serialize();
        assert!(matches!(
            chain.submit_block(bad_merkle),
            SubmitResult::Rejected { .. }
        ));

        let mut bad_proof = make_child(&genesis, 1, GENESIS_TIME + 600, vec![], 0);
        bad_proof.proof.header[0] ^= 1;
        assert!(matches!(
            chain.submit_block(bad_proof),
            SubmitResult::Rejected { .. }
        ));
    }

    #[test]
    fn test_spend_with_signature_and_utxo_conservation() {
        let (genesis, keypair) = genesis_with_key();
        let genesis_coinbase = genesis.transactions[0].clone();
        let mut chain = open_relaxed(genesis.clone(), None);

        // Gasta a coinbase do gênese: 1 entrada, 2 saídas, taxa de 100
        let recipient = KeyPair::generate();
        let mut spend = Transaction::new(
            1,
            vec![crate::transaction::TxInput::new(
                OutPoint::new(genesis_coinbase.txid(), 0),
                vec![],
            )],
            vec![
                TxOutput::new(1_000, script::locking_script(&recipient.public_key)),
                TxOutput::new(
                    subsidy(0) - 1_000 - 100,
                    script::locking_script(&keypair.public_key),
                ),
            ],
            0,
        );
        spend.inputs[0].unlocking_script = script::sign_input(&spend, 0, &keypair);

        let utxo_before = chain.best_utxo().len();
        let block = make_child(&genesis, 1, GENESIS_TIME + 600, vec![spend], 100);
        assert!(matches!(
            chain.submit_block(block),
            SubmitResult::Accepted { .. }
        ));

        // |utxo| = antes − entradas gastas + saídas criadas (1 coinbase + 2)
        assert_eq!(chain.best_utxo().len(), utxo_before - 1 + 3);
    }

    #[test]
    fn test_rejects_unsigned_spend() {
        let (genesis, keypair) = genesis_with_key();
        let genesis_coinbase = genesis.transactions[0].clone();
        let mut chain = open_relaxed(genesis.clone(), None);

        let spend = Transaction::new(
            1,
            vec![crate::transaction::TxInput::new(
                OutPoint::new(genesis_coinbase.txid(), 0),
                vec![0u8; 64],
            )],
            vec![TxOutput::new(1_000, script::locking_script(&keypair.public_key))],
            0,
        );

        let block = make_child(&genesis, 1, GENESIS_TIME + 600, vec![spend], 0);
        assert!(matches!(
            chain.submit_block(block),
            SubmitResult::Rejected { .. }
        ));
    }

    #[test]
    fn test_rejects_double_spend_within_block() {
        let (genesis, keypair) = genesis_with_key();
        let genesis_coinbase = genesis.transactions[0].clone();
        let mut chain = open_relaxed(genesis.clone(), None);

        let make_spend = |value: u64| {
            let mut tx = Transaction::new(
                1,
                vec![crate::transaction::TxInput::new(
                    OutPoint::new(genesis_coinbase.txid(), 0),
                    vec![],
                )],
                vec![TxOutput::new(value, script::locking_script(&keypair.public_key))],
                0,
            );
            tx.inputs[0].unlocking_script = script::sign_input(&tx, 0, &keypair);
            tx
        };

        let block = make_child(
            &genesis,
            1,
            GENESIS_TIME + 600,
            vec![make_spend(100), make_spend(200)],
            subsidy(0) * 2,
        );
        assert!(matches!(
            chain.submit_block(block),
            SubmitResult::Rejected { .. }
        ));
    }

    #[test]
    fn test_rejects_greedy_coinbase() {
        let (genesis, _) = genesis_with_key();
        let mut chain = open_relaxed(genesis.clone(), None);

        // Coinbase reivindica mais que subsídio + taxas
        let block = make_child(&genesis, 1, GENESIS_TIME + 600, vec![], 1);
        assert!(matches!(
            chain.submit_block(block),
            SubmitResult::Rejected { .. }
        ));
    }

    #[test]
    fn test_fork_choice_heaviest_wins() {
        let (genesis, _) = genesis_with_key();
        let mut chain = open_relaxed(genesis.clone(), None);

        // Cadeia A: 2 blocos; cadeia B: 3 blocos
        let a1 = make_child(&genesis, 1, GENESIS_TIME + 100, vec![], 0);
        let a2 = make_child(&a1, 2, GENESIS_TIME + 200, vec![], 0);
        let b1 = make_child(&genesis, 1, GENESIS_TIME + 101, vec![], 0);
        let b2 = make_child(&b1, 2, GENESIS_TIME + 201, vec![], 0);
        let b3 = make_child(&b2, 3, GENESIS_TIME + 301, vec![], 0);

        for block in [a1, a2, b1, b2, b3.clone()] {
            assert!(matches!(
                chain.submit_block(block),
                SubmitResult::Accepted { .. }
            ));
        }

        assert_eq!(chain.tip().hash, b3.hash());
        assert_eq!(chain.tip().height, 3);
    }

    #[test]
    fn test_fork_tie_break_prefers_smaller_hash() {
        let (genesis, _) = genesis_with_key();
        let mut chain = open_relaxed(genesis.clone(), None);

        // Mesmo trabalho: dois filhos diretos do gênese
        let x = make_child(&genesis, 1, GENESIS_TIME + 100, vec![], 0);
        let y = make_child(&genesis, 1, GENESIS_TIME + 101, vec![], 0);
        let (smaller, larger) = if x.hash() < y.hash() { (x, y) } else { (y, x) };

        chain.submit_block(larger.clone());
        assert_eq!(chain.tip().hash, larger.hash());

        // O empate move a ponta para o hash lexicograficamente menor
        chain.submit_block(smaller.clone());
        assert_eq!(chain.tip().hash, smaller.hash());

        // E o ramo perdedor permanece no mapa
        assert!(chain.contains(&larger.hash()));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (genesis, _) = genesis_with_key();

        let c1 = make_child(&genesis, 1, GENESIS_TIME + 600, vec![], 0);
        let c2 = make_child(&c1, 2, GENESIS_TIME + 1200, vec![], 0);

        let tip_before = {
            let mut chain = open_relaxed(genesis.clone(), Some(dir.path()));
            chain.submit_block(c1);
            chain.submit_block(c2);
            assert_eq!(chain.tip().height, 2);
            chain.tip()
        };

        // Reabrir no mesmo diretório reproduz a mesma ponta
        let reopened = open_relaxed(genesis, Some(dir.path()));
        assert_eq!(reopened.tip().hash, tip_before.hash);
        assert_eq!(reopened.tip().height, 2);
    }

    #[test]
    fn test_replay_aborts_on_corrupt_block() {
        let dir = tempfile::tempdir().unwrap();
        let (genesis, _) = genesis_with_key();

        {
            let mut chain = open_relaxed(genesis.clone(), Some(dir.path()));
            let c1 = make_child(&genesis, 1, GENESIS_TIME + 600, vec![], 0);
            chain.submit_block(c1);
        }

        // Corrompe um arquivo de bloco persistido
        let blocks_dir = dir.path().join("blocks");
        let victim = fs::read_dir(&blocks_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| !p.to_string_lossy().contains(&genesis.hash().to_hex()))
            .unwrap();
        fs::write(&victim, b"garbage").unwrap();

        assert!(ChainState::new(genesis, ChainConfig::relaxed(), Some(dir.path())).is_err());
    }

    #[test]
    fn test_stale_best_marker_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let (genesis, _) = genesis_with_key();

        {
            let mut chain = open_relaxed(genesis.clone(), Some(dir.path()));
            let c1 = make_child(&genesis, 1, GENESIS_TIME + 600, vec![], 0);
            chain.submit_block(c1);
        }

        // Marcador apontando para o gênese: obsoleto
        let meta = dir.path().join("meta.json");
        fs::write(
            &meta,
            serde_json::to_vec(&BestMeta {
                best_hash_hex: genesis.hash().to_hex(),
            })
            .unwrap(),
        )
        .unwrap();

        let chain = open_relaxed(genesis, Some(dir.path()));
        assert_eq!(chain.tip().height, 1);

        let repaired: BestMeta =
            serde_json::from_str(&fs::read_to_string(&meta).unwrap()).unwrap();
        assert_eq!(repaired.best_hash_hex, chain.tip().hash.to_hex());
    }

    #[test]
    fn test_subsidy_halves_and_expires() {
        assert_eq!(subsidy(0), BASE_SUBSIDY);
        assert_eq!(subsidy(HALVING_INTERVAL), BASE_SUBSIDY / 2);
        assert_eq!(subsidy(HALVING_INTERVAL * 2), BASE_SUBSIDY / 4);
        assert_eq!(subsidy(HALVING_INTERVAL * 64), 0);
        assert_eq!(subsidy(u64::MAX), 0);
    }

    #[test]
    fn test_next_bits_inherits_outside_adjustment() {
        let (genesis, _) = genesis_with_key();
        let mut chain = open_relaxed(genesis.clone(), None);
        let c1 = make_child(&genesis, 1, GENESIS_TIME + 600, vec![], 0);
        let c1_hash = c1.hash();
        chain.submit_block(c1);

        assert_eq!(chain.next_bits_for(&c1_hash), MIN_DIFFICULTY_BITS);
    }
}
