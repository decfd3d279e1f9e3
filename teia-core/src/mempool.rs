//! Mempool: admissão de transações com checagens estruturais, de
//! assinatura e de conflito
//!
//! Nenhuma entrada admitida compartilha outpoint com outra; coinbases
//! nunca são admitidas. O mempool consulta o UTXO da melhor ponta por meio
//! de um resolvedor fornecido pelo chamador, mantendo o grafo de chamadas
//! acíclico.

use std::collections::{HashMap, HashSet};

use shared::Hash256;

use crate::script;
use crate::transaction::{OutPoint, Transaction, TxOutput};

/// Configuração de admissão do mempool
#[derive(Debug, Clone, Copy)]
pub struct MempoolConfig {
    /// Capacidade máxima em transações
    pub max_txs: usize,
    /// Tamanho máximo de uma transação serializada
    pub max_tx_bytes: usize,
    /// Exigir que as entradas existam no UTXO da melhor ponta
    pub require_tip_utxo: bool,
    /// Tolerar entradas ausentes (pais não confirmados); a transação
    /// continua não sendo admitida pela política atual
    pub allow_unconfirmed_parents: bool,
    /// Verificar assinaturas das entradas resolvidas
    pub verify_signatures: bool,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_txs: 5_000,
            max_tx_bytes: 100_000,
            require_tip_utxo: true,
            allow_unconfirmed_parents: false,
            verify_signatures: true,
        }
    }
}

/// Resultado discriminado de uma admissão
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolResult {
    Admitted { txid: Hash256 },
    Duplicate,
    Rejected { reason: String },
}

/// Transação admitida mais o conjunto de outpoints que ela gasta
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub txid: Hash256,
    pub fee: u64,
    pub spends: Vec<OutPoint>,
}

/// Mempool com posse exclusiva de suas entradas
pub struct Mempool {
    config: MempoolConfig,
    entries: HashMap<Hash256, MempoolEntry>,
    /// Índice outpoint → txid da entrada que o gasta
    spent: HashMap<OutPoint, Hash256>,
}

impl Mempool {
    /// Cria um mempool vazio
    #[must_use]
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            spent: HashMap::new(),
        }
    }

    /// Submete uma transação ao pipeline de admissão
    ///
    /// `resolve` consulta o UTXO da melhor ponta; as regras são aplicadas
    /// na ordem fixa do protocolo e a primeira falha decide o resultado.
    pub fn admit<F>(&mut self, tx: Transaction, resolve: F) -> MempoolResult
    where
        F: Fn(&OutPoint) -> Option<TxOutput>,
    {
        if let Err(e) = tx.validate_structure() {
            return reject(&format!("structurally invalid: {e}"));
        }

        if tx.is_coinbase() {
            return reject("coinbase transactions are never admitted");
        }

        if tx.inputs.is_empty() {
            return reject("transaction has no inputs");
        }

        if tx.serialize().len() > self.config.max_tx_bytes {
            return reject("transaction too large");
        }

        let txid = tx.txid();
        if self.entries.contains_key(&txid) {
            return MempoolResult::Duplicate;
        }

        if self.entries.len() >= self.config.max_txs {
            return reject("mempool full");
        }

        let mut within_tx: HashSet<OutPoint> = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if !within_tx.insert(input.previous_output) {
                return reject("duplicate input within transaction");
            }
            if let Some(holder) = self.spent.get(&input.previous_output) {
                return reject(&format!(
                    "input {}:{} already spent by mempool transaction {holder}",
                    input.previous_output.txid, input.previous_output.vout
                ));
            }
        }

        let mut fee = 0u64;
        if self.config.require_tip_utxo {
            let mut sum_in = 0u64;
            for (index, input) in tx.inputs.iter().enumerate() {
                let Some(spent_output) = resolve(&input.previous_output) else {
                    if self.config.allow_unconfirmed_parents {
                        return reject(
                            "unconfirmed parent inputs are tolerated but not admitted by current policy",
                        );
                    }
                    return reject(&format!(
                        "input references unknown utxo {}:{}",
                        input.previous_output.txid, input.previous_output.vout
                    ));
                };
                if self.config.verify_signatures {
                    if let Err(e) = script::verify_input(&tx, index as u32, &spent_output) {
                        return reject(&format!("signature check failed: {e}"));
                    }
                }
                sum_in = match sum_in.checked_add(spent_output.value) {
                    Some(total) => total,
                    None => return reject("input value overflow"),
                };
            }

            let sum_out = match tx.total_output_value() {
                Ok(total) => total,
                Err(e) => return reject(&e.to_string()),
            };
            let Some(computed_fee) = sum_in.checked_sub(sum_out) else {
                return reject("negative fee: outputs exceed inputs");
            };
            fee = computed_fee;
        }

        let spends: Vec<OutPoint> = tx.inputs.iter().map(|i| i.previous_output).collect();
        for outpoint in &spends {
            self.spent.insert(*outpoint, txid);
        }
        self.entries.insert(
            txid,
            MempoolEntry {
                tx,
                txid,
                fee,
                spends,
            },
        );

        MempoolResult::Admitted { txid }
    }

    /// Remove as transações confirmadas num bloco aceito
    pub fn remove_txids(&mut self, txids: &[Hash256]) {
        for txid in txids {
            if let Some(entry) = self.entries.remove(txid) {
                for outpoint in &entry.spends {
                    self.spent.remove(outpoint);
                }
            }
        }
    }

    /// Seleciona até `max` transações para um template de bloco, junto com
    /// o total de taxas
    #[must_use]
    pub fn collect_for_block(&self, max: usize) -> (Vec<Transaction>, u64) {
        let mut txs = Vec::new();
        let mut total_fees = 0u64;
        for entry in self.entries.values().take(max) {
            txs.push(entry.tx.clone());
            total_fees = total_fees.saturating_add(entry.fee);
        }
        (txs, total_fees)
    }

    #[must_use]
    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn reject(reason: &str) -> MempoolResult {
    MempoolResult::Rejected {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxInput;
    use shared::KeyPair;

    /// UTXO de ponta simulado com uma única saída assinável
    struct Fixture {
        keypair: KeyPair,
        outpoint: OutPoint,
        output: TxOutput,
    }

    impl Fixture {
        fn new(value: u64) -> Self {
            let keypair = KeyPair::generate();
            let outpoint = OutPoint::new(Hash256::sha256(b"funding"), 0);
            let output = TxOutput::new(value, script::locking_script(&keypair.public_key));
            Self {
                keypair,
                outpoint,
                output,
            }
        }

        fn resolver(&self) -> impl Fn(&OutPoint) -> Option<TxOutput> + '_ {
            move |op| (op == &self.outpoint).then(|| self.output.clone())
        }

        fn signed_spend(&self, out_value: u64) -> Transaction {
            let mut tx = Transaction::new(
                1,
                vec![TxInput::new(self.outpoint, vec![])],
                vec![TxOutput::new(
                    out_value,
                    script::locking_script(&self.keypair.public_key),
                )],
                0,
            );
            tx.inputs[0].unlocking_script = script::sign_input(&tx, 0, &self.keypair);
            tx
        }
    }

    #[test]
    fn test_admits_valid_transaction() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());

        let tx = fixture.signed_spend(900);
        let txid = tx.txid();
        assert_eq!(
            mempool.admit(tx, fixture.resolver()),
            MempoolResult::Admitted { txid }
        );
        assert!(mempool.contains(&txid));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_rejects_coinbase() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());

        let coinbase = Transaction::coinbase(5, 1_000, vec![0x01; 33]);
        match mempool.admit(coinbase, fixture.resolver()) {
            MempoolResult::Rejected { reason } => assert!(reason.contains("coinbase")),
            other => panic!("esperava rejeição, veio {other:?}"),
        }
    }

    #[test]
    fn test_rejects_double_spend() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());

        let first = fixture.signed_spend(900);
        let second = fixture.signed_spend(800); // mesmo outpoint, tx diferente
        assert!(matches!(
            mempool.admit(first, fixture.resolver()),
            MempoolResult::Admitted { .. }
        ));

        match mempool.admit(second, fixture.resolver()) {
            MempoolResult::Rejected { reason } => assert!(reason.contains("already spent")),
            other => panic!("esperava rejeição, veio {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_is_idempotent() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());

        let tx = fixture.signed_spend(900);
        mempool.admit(tx.clone(), fixture.resolver());
        assert_eq!(mempool.admit(tx, fixture.resolver()), MempoolResult::Duplicate);
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_rejects_unknown_utxo() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());

        let mut tx = fixture.signed_spend(900);
        tx.inputs[0].previous_output = OutPoint::new(Hash256::sha256(b"missing"), 0);
        tx.inputs[0].unlocking_script = script::sign_input(&tx, 0, &fixture.keypair);

        match mempool.admit(tx, fixture.resolver()) {
            MempoolResult::Rejected { reason } => assert!(reason.contains("unknown utxo")),
            other => panic!("esperava rejeição, veio {other:?}"),
        }
    }

    #[test]
    fn test_unconfirmed_parents_mode_still_rejects() {
        let fixture = Fixture::new(1_000);
        let config = MempoolConfig {
            allow_unconfirmed_parents: true,
            ..MempoolConfig::default()
        };
        let mut mempool = Mempool::new(config);

        let mut tx = fixture.signed_spend(900);
        tx.inputs[0].previous_output = OutPoint::new(Hash256::sha256(b"parent-in-mempool"), 0);
        tx.inputs[0].unlocking_script = script::sign_input(&tx, 0, &fixture.keypair);

        // Entradas ausentes são toleradas, mas a política atual não admite
        match mempool.admit(tx, fixture.resolver()) {
            MempoolResult::Rejected { reason } => {
                assert!(reason.contains("not admitted by current policy"));
            }
            other => panic!("esperava rejeição, veio {other:?}"),
        }
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_rejects_negative_fee() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());

        let tx = fixture.signed_spend(1_001); // gasta mais do que tem
        match mempool.admit(tx, fixture.resolver()) {
            MempoolResult::Rejected { reason } => assert!(reason.contains("negative fee")),
            other => panic!("esperava rejeição, veio {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_signature() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());

        let mut tx = fixture.signed_spend(900);
        // Assinatura de outra chave
        let other = KeyPair::generate();
        tx.inputs[0].unlocking_script = script::sign_input(&tx, 0, &other);

        match mempool.admit(tx, fixture.resolver()) {
            MempoolResult::Rejected { reason } => assert!(reason.contains("signature")),
            other => panic!("esperava rejeição, veio {other:?}"),
        }
    }

    #[test]
    fn test_rejects_duplicate_inputs_within_tx() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());

        let mut tx = Transaction::new(
            1,
            vec![
                TxInput::new(fixture.outpoint, vec![]),
                TxInput::new(fixture.outpoint, vec![]),
            ],
            vec![TxOutput::new(
                900,
                script::locking_script(&fixture.keypair.public_key),
            )],
            0,
        );
        tx.inputs[0].unlocking_script = script::sign_input(&tx, 0, &fixture.keypair);
        tx.inputs[1].unlocking_script = script::sign_input(&tx, 1, &fixture.keypair);

        match mempool.admit(tx, fixture.resolver()) {
            MempoolResult::Rejected { reason } => assert!(reason.contains("duplicate input")),
            other => panic!("esperava rejeição, veio {other:?}"),
        }
    }

    #[test]
    fn test_capacity_limit() {
        let fixture = Fixture::new(1_000);
        let config = MempoolConfig {
            max_txs: 0,
            ..MempoolConfig::default()
        };
        let mut mempool = Mempool::new(config);

        match mempool.admit(fixture.signed_spend(900), fixture.resolver()) {
            MempoolResult::Rejected { reason } => assert!(reason.contains("full")),
            other => panic!("esperava rejeição, veio {other:?}"),
        }
    }

    #[test]
    fn test_removal_frees_outpoints() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());

        let tx = fixture.signed_spend(900);
        let txid = tx.txid();
        mempool.admit(tx, fixture.resolver());

        mempool.remove_txids(&[txid]);
        assert!(mempool.is_empty());

        // O outpoint liberado pode ser gasto por outra transação
        let replacement = fixture.signed_spend(850);
        assert!(matches!(
            mempool.admit(replacement, fixture.resolver()),
            MempoolResult::Admitted { .. }
        ));
    }

    #[test]
    fn test_collect_for_block_reports_fees() {
        let fixture = Fixture::new(1_000);
        let mut mempool = Mempool::new(MempoolConfig::default());
        mempool.admit(fixture.signed_spend(900), fixture.resolver());

        let (txs, fees) = mempool.collect_for_block(10);
        assert_eq!(txs.len(), 1);
        assert_eq!(fees, 100);
    }
}
