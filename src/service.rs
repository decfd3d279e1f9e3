//! Atores serializados para o chainstate e o mempool
//!
//! Cada serviço é uma fila de pedidos tipados drenada por um único worker:
//! no máximo uma operação mutante executa por vez, sem mutex atravessando
//! pontos de suspensão. O mempool consulta o chainstate somente-leitura;
//! o chainstate nunca chama o mempool, então o grafo é acíclico.

use std::collections::HashMap;
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use shared::{ChainError, Hash256, Result};
use teia_core::{
    Block, ChainState, ChainStats, ChainTip, Mempool, MempoolResult, OutPoint, SubmitResult,
    Transaction, TxOutput,
};

enum ChainRequest {
    Submit {
        block: Block,
        reply: oneshot::Sender<SubmitResult>,
    },
    Tip {
        reply: oneshot::Sender<ChainTip>,
    },
    NextBits {
        parent: Hash256,
        reply: oneshot::Sender<u32>,
    },
    GetBlock {
        hash: Hash256,
        reply: oneshot::Sender<Option<Block>>,
    },
    Contains {
        hash: Hash256,
        reply: oneshot::Sender<bool>,
    },
    ResolveUtxos {
        outpoints: Vec<OutPoint>,
        reply: oneshot::Sender<HashMap<OutPoint, TxOutput>>,
    },
    Stats {
        reply: oneshot::Sender<ChainStats>,
    },
}

/// Handle clonável para o ator do chainstate
#[derive(Clone)]
pub struct ChainHandle {
    tx: mpsc::Sender<ChainRequest>,
}

impl ChainHandle {
    /// Inicia o ator numa thread dedicada
    ///
    /// A verificação de provas é síncrona e pesada de CPU; rodar o worker
    /// fora do runtime assíncrono mantém o executor livre enquanto a fila
    /// serializa as submissões.
    #[must_use]
    pub fn spawn(mut state: ChainState) -> Self {
        let (tx, mut rx) = mpsc::channel::<ChainRequest>(256);

        thread::spawn(move || {
            while let Some(request) = rx.blocking_recv() {
                match request {
                    ChainRequest::Submit { block, reply } => {
                        let _ = reply.send(state.submit_block(block));
                    }
                    ChainRequest::Tip { reply } => {
                        let _ = reply.send(state.tip());
                    }
                    ChainRequest::NextBits { parent, reply } => {
                        let _ = reply.send(state.next_bits_for(&parent));
                    }
                    ChainRequest::GetBlock { hash, reply } => {
                        let _ = reply.send(state.get_block(&hash).cloned());
                    }
                    ChainRequest::Contains { hash, reply } => {
                        let _ = reply.send(state.contains(&hash));
                    }
                    ChainRequest::ResolveUtxos { outpoints, reply } => {
                        let _ = reply.send(state.resolve_utxos(&outpoints));
                    }
                    ChainRequest::Stats { reply } => {
                        let _ = reply.send(state.stats());
                    }
                }
            }
            info!("chainstate actor stopped");
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ChainRequest,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| ChainError::Network("chainstate actor unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ChainError::Network("chainstate actor dropped request".to_string()))
    }

    /// Submete um bloco; a aceitação é totalmente ordenada pela fila
    pub async fn submit_block(&self, block: Block) -> Result<SubmitResult> {
        self.request(|reply| ChainRequest::Submit { block, reply }).await
    }

    pub async fn tip(&self) -> Result<ChainTip> {
        self.request(|reply| ChainRequest::Tip { reply }).await
    }

    pub async fn next_bits(&self, parent: Hash256) -> Result<u32> {
        self.request(|reply| ChainRequest::NextBits { parent, reply })
            .await
    }

    pub async fn get_block(&self, hash: Hash256) -> Result<Option<Block>> {
        self.request(|reply| ChainRequest::GetBlock { hash, reply })
            .await
    }

    pub async fn contains(&self, hash: Hash256) -> Result<bool> {
        self.request(|reply| ChainRequest::Contains { hash, reply })
            .await
    }

    pub async fn resolve_utxos(
        &self,
        outpoints: Vec<OutPoint>,
    ) -> Result<HashMap<OutPoint, TxOutput>> {
        self.request(|reply| ChainRequest::ResolveUtxos { outpoints, reply })
            .await
    }

    pub async fn stats(&self) -> Result<ChainStats> {
        self.request(|reply| ChainRequest::Stats { reply }).await
    }
}

enum MempoolRequest {
    Admit {
        tx: Transaction,
        reply: oneshot::Sender<MempoolResult>,
    },
    RemoveTxids {
        txids: Vec<Hash256>,
    },
    Collect {
        max: usize,
        reply: oneshot::Sender<(Vec<Transaction>, u64)>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle clonável para o ator do mempool
#[derive(Clone)]
pub struct MempoolHandle {
    tx: mpsc::Sender<MempoolRequest>,
}

impl MempoolHandle {
    /// Inicia o ator como tarefa assíncrona
    ///
    /// O ator resolve as entradas da transação contra o UTXO da melhor
    /// ponta consultando o handle do chainstate antes de admitir.
    #[must_use]
    pub fn spawn(mut mempool: Mempool, chain: ChainHandle) -> Self {
        let (tx, mut rx) = mpsc::channel::<MempoolRequest>(256);

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match request {
                    MempoolRequest::Admit { tx, reply } => {
                        let outpoints: Vec<OutPoint> =
                            tx.inputs.iter().map(|i| i.previous_output).collect();
                        let resolved = chain
                            .resolve_utxos(outpoints)
                            .await
                            .unwrap_or_default();
                        let result = mempool.admit(tx, |op| resolved.get(op).cloned());
                        let _ = reply.send(result);
                    }
                    MempoolRequest::RemoveTxids { txids } => {
                        mempool.remove_txids(&txids);
                    }
                    MempoolRequest::Collect { max, reply } => {
                        let _ = reply.send(mempool.collect_for_block(max));
                    }
                    MempoolRequest::Len { reply } => {
                        let _ = reply.send(mempool.len());
                    }
                }
            }
            info!("mempool actor stopped");
        });

        Self { tx }
    }

    /// Submete uma transação ao pipeline de admissão
    pub async fn admit(&self, tx: Transaction) -> Result<MempoolResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MempoolRequest::Admit { tx, reply: reply_tx })
            .await
            .map_err(|_| ChainError::Network("mempool actor unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ChainError::Network("mempool actor dropped request".to_string()))
    }

    /// Remove transações confirmadas num bloco aceito
    pub async fn remove_txids(&self, txids: Vec<Hash256>) {
        let _ = self.tx.send(MempoolRequest::RemoveTxids { txids }).await;
    }

    /// Seleciona transações para um template de bloco
    pub async fn collect_for_block(&self, max: usize) -> Result<(Vec<Transaction>, u64)> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MempoolRequest::Collect {
                max,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChainError::Network("mempool actor unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ChainError::Network("mempool actor dropped request".to_string()))
    }

    pub async fn len(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MempoolRequest::Len { reply: reply_tx })
            .await
            .map_err(|_| ChainError::Network("mempool actor unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ChainError::Network("mempool actor dropped request".to_string()))
    }
}
