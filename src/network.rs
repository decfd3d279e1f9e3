//! Serviço P2P: mensagens JSON delimitadas por nova-linha sobre TCP
//!
//! Cada frame é um objeto JSON terminado por um único byte de nova-linha;
//! frames acima do limite derrubam o peer, linhas com JSON inválido são
//! descartadas em silêncio. Payloads binários viajam em base64.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

use shared::types::NodeConfig;
use shared::{ChainError, Hash256, Result};
use teia_core::{Block, MempoolResult, SubmitResult, Transaction};

use crate::service::{ChainHandle, MempoolHandle};

/// Tamanho máximo de um frame em bytes; acima disso o peer é derrubado
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Limite de handlers assíncronos em voo; saturado, novos são descartados
pub const MAX_INFLIGHT_HANDLERS: usize = 64;

/// Capacidade da tabela de pedidos de bloco pendentes
const PENDING_CAPACITY: usize = 512;

/// Validade de um pedido pendente antes de envelhecer
const PENDING_TTL: Duration = Duration::from_secs(30);

/// Blocos órfãos retidos à espera do pai
const ORPHAN_CAPACITY: usize = 64;

/// Intervalo entre pings de keepalive por sessão
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Mensagens do protocolo de fio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    Version {
        network_id: String,
        node_id: u64,
        height: u64,
        hash_hex: String,
    },
    Verack,
    Ping {
        nonce: u64,
    },
    Pong {
        nonce: u64,
    },
    GetTip,
    Tip {
        height: u64,
        hash_hex: String,
    },
    GetBlock {
        hash_hex: String,
    },
    Block {
        payload_b64: String,
    },
    Tx {
        payload_b64: String,
    },
}

struct PeerEntry {
    sender: mpsc::Sender<WireMessage>,
    node_id: Option<u64>,
    complete: bool,
}

/// Serviço P2P: possui a tabela de peers por id de sessão
pub struct P2pService {
    config: NodeConfig,
    local_node_id: u64,
    chain: ChainHandle,
    mempool: MempoolHandle,
    peers: Mutex<HashMap<u64, PeerEntry>>,
    next_session: AtomicU64,
    pending: Mutex<HashMap<Hash256, Instant>>,
    orphans: Mutex<HashMap<Hash256, Block>>,
    handler_slots: Arc<Semaphore>,
}

impl P2pService {
    /// Cria o serviço com um id de nó aleatório
    #[must_use]
    pub fn new(config: NodeConfig, chain: ChainHandle, mempool: MempoolHandle) -> Arc<Self> {
        Arc::new(Self {
            config,
            local_node_id: rand::random(),
            chain,
            mempool,
            peers: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            orphans: Mutex::new(HashMap::new()),
            handler_slots: Arc::new(Semaphore::new(MAX_INFLIGHT_HANDLERS)),
        })
    }

    #[must_use]
    pub const fn local_node_id(&self) -> u64 {
        self.local_node_id
    }

    /// Número de peers com handshake completo
    pub async fn peer_count(&self) -> usize {
        self.peers
            .lock()
            .await
            .values()
            .filter(|entry| entry.complete)
            .count()
    }

    /// Abre o listener e passa a aceitar conexões de entrada
    ///
    /// # Errors
    ///
    /// Retorna erro se o bind falhar
    pub async fn listen(self: &Arc<Self>, bind_addr: &str) -> Result<std::net::SocketAddr> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| ChainError::Network(format!("bind {bind_addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ChainError::Network(e.to_string()))?;
        info!("🌐 P2P listening on {local_addr}");

        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if service.peers.lock().await.len() >= service.config.max_peers {
                            debug!("peer table full; refusing {addr}");
                            continue;
                        }
                        debug!("inbound connection from {addr}");
                        let service = Arc::clone(&service);
                        tokio::spawn(async move { service.run_session(stream).await });
                    }
                    Err(e) => {
                        warn!("accept error: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Disca para um peer e conduz a sessão
    ///
    /// # Errors
    ///
    /// Retorna erro se a conexão falhar
    pub async fn connect(self: &Arc<Self>, addr: &str) -> Result<()> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ChainError::Network(format!("connect {addr}: {e}")))?;
        info!("🔗 dialed peer {addr}");
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_session(stream).await });
        Ok(())
    }

    /// Conduz uma sessão de peer do handshake ao encerramento
    async fn run_session(self: Arc<Self>, stream: TcpStream) {
        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
        let (mut sink, mut lines) = framed.split();

        // Escritor dedicado: a ordem de envio por sessão é preservada
        let (out_tx, mut out_rx) = mpsc::channel::<WireMessage>(64);
        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let Ok(line) = serde_json::to_string(&message) else {
                    continue;
                };
                if sink.send(line).await.is_err() {
                    break;
                }
            }
        });

        self.peers.lock().await.insert(
            session_id,
            PeerEntry {
                sender: out_tx.clone(),
                node_id: None,
                complete: false,
            },
        );

        // Ambos os lados anunciam a versão ao abrir a sessão
        if let Ok(tip) = self.chain.tip().await {
            let _ = out_tx
                .send(WireMessage::Version {
                    network_id: self.config.network_id.clone(),
                    node_id: self.local_node_id,
                    height: tip.height,
                    hash_hex: tip.hash.to_hex(),
                })
                .await;
        }

        // Keepalive: pings periódicos enquanto a sessão viver
        let keepalive = {
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(PING_INTERVAL);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if out_tx
                        .send(WireMessage::Ping {
                            nonce: rand::random(),
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            })
        };

        let mut saw_version = false;
        let mut saw_verack = false;

        while let Some(item) = lines.next().await {
            let line = match item {
                Ok(line) => line,
                Err(e) => {
                    // Frame grande demais ou erro de transporte: derruba
                    warn!("peer session {session_id} transport error: {e}");
                    break;
                }
            };

            let Ok(message) = serde_json::from_str::<WireMessage>(&line) else {
                // JSON inválido é descartado em silêncio
                continue;
            };

            match message {
                WireMessage::Version {
                    network_id,
                    node_id,
                    ..
                } => {
                    if saw_version {
                        warn!("peer session {session_id} sent duplicate version");
                        break;
                    }
                    if network_id != self.config.network_id {
                        warn!(
                            "peer session {session_id} on wrong network {network_id:?}"
                        );
                        break;
                    }
                    if node_id == self.local_node_id {
                        debug!("refusing self-connection");
                        break;
                    }
                    saw_version = true;
                    if let Some(entry) = self.peers.lock().await.get_mut(&session_id) {
                        entry.node_id = Some(node_id);
                    }

                    let _ = out_tx.send(WireMessage::Verack).await;
                    if let Ok(tip) = self.chain.tip().await {
                        let _ = out_tx
                            .send(WireMessage::Tip {
                                height: tip.height,
                                hash_hex: tip.hash.to_hex(),
                            })
                            .await;
                    }
                }
                WireMessage::Verack => {
                    if !saw_version || saw_verack {
                        warn!("peer session {session_id} verack out of order");
                        break;
                    }
                    saw_verack = true;
                    if let Some(entry) = self.peers.lock().await.get_mut(&session_id) {
                        entry.complete = true;
                    }
                    let _ = out_tx.send(WireMessage::GetTip).await;
                }
                WireMessage::Ping { nonce } => {
                    let _ = out_tx.send(WireMessage::Pong { nonce }).await;
                }
                WireMessage::Pong { .. } => {}
                other => {
                    // Qualquer outro tipo exige handshake completo
                    if !(saw_version && saw_verack) {
                        warn!("peer session {session_id} spoke before handshake");
                        break;
                    }
                    if !self.dispatch(session_id, &out_tx, other).await {
                        break;
                    }
                }
            }
        }

        // Encerramento: libera o buffer e remove a entrada da tabela
        self.peers.lock().await.remove(&session_id);
        keepalive.abort();
        writer.abort();
        debug!("peer session {session_id} closed");
    }

    /// Trata uma mensagem pós-handshake; retorna `false` para derrubar
    async fn dispatch(
        self: &Arc<Self>,
        session_id: u64,
        out_tx: &mpsc::Sender<WireMessage>,
        message: WireMessage,
    ) -> bool {
        match message {
            WireMessage::GetTip => {
                if let Ok(tip) = self.chain.tip().await {
                    let _ = out_tx
                        .send(WireMessage::Tip {
                            height: tip.height,
                            hash_hex: tip.hash.to_hex(),
                        })
                        .await;
                }
            }
            WireMessage::Tip { height, hash_hex } => {
                let Ok(hash) = Hash256::from_hex(&hash_hex) else {
                    return false;
                };
                let our_tip = match self.chain.tip().await {
                    Ok(tip) => tip,
                    Err(_) => return false,
                };
                let known = self.chain.contains(hash).await.unwrap_or(true);
                if height > our_tip.height && !known {
                    self.request_block(session_id, hash).await;
                }
            }
            WireMessage::GetBlock { hash_hex } => {
                let Ok(hash) = Hash256::from_hex(&hash_hex) else {
                    return false;
                };
                if let Ok(Some(block)) = self.chain.get_block(hash).await {
                    let _ = out_tx
                        .send(WireMessage::Block {
                            payload_b64: BASE64.encode(block.serialize()),
                        })
                        .await;
                }
            }
            WireMessage::Block { payload_b64 } => {
                self.spawn_handler(session_id, HandlerWork::Block { payload_b64 });
            }
            WireMessage::Tx { payload_b64 } => {
                self.spawn_handler(session_id, HandlerWork::Tx { payload_b64 });
            }
            // Tratadas pelo laço da sessão
            WireMessage::Version { .. }
            | WireMessage::Verack
            | WireMessage::Ping { .. }
            | WireMessage::Pong { .. } => {}
        }
        true
    }

    /// Agenda um handler pesado sob o contador de vagas em voo
    fn spawn_handler(self: &Arc<Self>, session_id: u64, work: HandlerWork) {
        let Ok(permit) = Arc::clone(&self.handler_slots).try_acquire_owned() else {
            warn!("in-flight handler limit reached; dropping peer message");
            return;
        };

        let service = Arc::clone(self);
        tokio::spawn(async move {
            match work {
                HandlerWork::Block { payload_b64 } => {
                    service.handle_block_payload(session_id, &payload_b64).await;
                }
                HandlerWork::Tx { payload_b64 } => {
                    service.handle_tx_payload(session_id, &payload_b64).await;
                }
            }
            drop(permit);
        });
    }

    /// Processa um bloco recebido de um peer
    async fn handle_block_payload(self: &Arc<Self>, session_id: u64, payload_b64: &str) {
        let Ok(bytes) = BASE64.decode(payload_b64) else {
            debug!("dropping block with invalid base64");
            return;
        };
        let Ok(block) = Block::deserialize(&bytes) else {
            debug!("dropping structurally invalid block");
            return;
        };

        // Submete o bloco e, em seguida, qualquer órfão que esperava por ele
        let mut next = Some(block);
        while let Some(current) = next {
            let hash = current.hash();
            self.pending.lock().await.remove(&hash);
            self.submit_and_follow_up(session_id, current).await;
            next = self.orphans.lock().await.remove(&hash);
        }
    }

    /// Submete um bloco ao chainstate e executa as consequências
    async fn submit_and_follow_up(self: &Arc<Self>, session_id: u64, block: Block) {
        let hash = block.hash();
        match self.chain.submit_block(block.clone()).await {
            Ok(SubmitResult::Accepted {
                height,
                best_changed,
                ..
            }) => {
                info!("📦 accepted block {hash} at height {height} from peer");
                if best_changed {
                    self.on_best_changed(&block).await;
                }
            }
            Ok(SubmitResult::Orphan { parent }) => {
                debug!("block {hash} is an orphan; backfilling parent {parent}");
                let mut orphans = self.orphans.lock().await;
                if orphans.len() < ORPHAN_CAPACITY {
                    orphans.insert(parent, block);
                }
                drop(orphans);
                self.request_block(session_id, parent).await;
            }
            Ok(SubmitResult::Duplicate) => {}
            Ok(SubmitResult::Rejected { reason }) => {
                warn!("rejected block {hash} from peer: {reason}");
            }
            Err(e) => warn!("chainstate unavailable for block {hash}: {e}"),
        }
    }

    /// Consequências de uma nova melhor ponta: poda o mempool e anuncia
    async fn on_best_changed(&self, block: &Block) {
        let txids: Vec<Hash256> = block.transactions.iter().map(Transaction::txid).collect();
        self.mempool.remove_txids(txids).await;

        if let Ok(tip) = self.chain.tip().await {
            self.broadcast(
                WireMessage::Tip {
                    height: tip.height,
                    hash_hex: tip.hash.to_hex(),
                },
                None,
            )
            .await;
        }
    }

    /// Processa uma transação recebida de um peer
    async fn handle_tx_payload(self: &Arc<Self>, session_id: u64, payload_b64: &str) {
        let Ok(bytes) = BASE64.decode(payload_b64) else {
            debug!("dropping tx with invalid base64");
            return;
        };
        let Ok(tx) = Transaction::deserialize(&bytes) else {
            debug!("dropping structurally invalid tx");
            return;
        };

        match self.mempool.admit(tx).await {
            Ok(MempoolResult::Admitted { txid }) => {
                debug!("💸 admitted tx {txid} from peer; relaying");
                self.broadcast(
                    WireMessage::Tx {
                        payload_b64: payload_b64.to_string(),
                    },
                    Some(session_id),
                )
                .await;
            }
            Ok(MempoolResult::Duplicate) => {}
            Ok(MempoolResult::Rejected { reason }) => {
                debug!("rejected tx from peer: {reason}");
            }
            Err(e) => warn!("mempool unavailable: {e}"),
        }
    }

    /// Enfileira um `getBlock` para o peer, limitado e com validade
    async fn request_block(&self, session_id: u64, hash: Hash256) {
        {
            let mut pending = self.pending.lock().await;
            let now = Instant::now();
            pending.retain(|_, requested| now.duration_since(*requested) < PENDING_TTL);
            if pending.contains_key(&hash) {
                return;
            }
            if pending.len() >= PENDING_CAPACITY {
                debug!("pending request table full; not requesting {hash}");
                return;
            }
            pending.insert(hash, now);
        }

        let sender = {
            let peers = self.peers.lock().await;
            peers.get(&session_id).map(|entry| entry.sender.clone())
        };
        if let Some(sender) = sender {
            let _ = sender
                .send(WireMessage::GetBlock {
                    hash_hex: hash.to_hex(),
                })
                .await;
        }
    }

    /// Difunde uma mensagem a todos os peers completos, exceto a origem
    pub async fn broadcast(&self, message: WireMessage, except: Option<u64>) {
        let senders: Vec<mpsc::Sender<WireMessage>> = {
            let peers = self.peers.lock().await;
            peers
                .iter()
                .filter(|(id, entry)| entry.complete && Some(**id) != except)
                .map(|(_, entry)| entry.sender.clone())
                .collect()
        };
        for sender in senders {
            let _ = sender.send(message.clone()).await;
        }
    }

    /// Submissão local de bloco (minerador/CLI): difunde o objeto completo
    pub async fn submit_local_block(self: &Arc<Self>, block: Block) -> Result<SubmitResult> {
        let result = self.chain.submit_block(block.clone()).await?;
        if let SubmitResult::Accepted { best_changed, .. } = &result {
            self.broadcast(
                WireMessage::Block {
                    payload_b64: BASE64.encode(block.serialize()),
                },
                None,
            )
            .await;
            if *best_changed {
                self.on_best_changed(&block).await;
            }
        }
        Ok(result)
    }

    /// Submissão local de transação: difunde o objeto completo
    pub async fn submit_local_tx(self: &Arc<Self>, tx: Transaction) -> Result<MempoolResult> {
        let result = self.mempool.admit(tx.clone()).await?;
        if matches!(result, MempoolResult::Admitted { .. }) {
            self.broadcast(
                WireMessage::Tx {
                    payload_b64: BASE64.encode(tx.serialize()),
                },
                None,
            )
            .await;
        }
        Ok(result)
    }
}

enum HandlerWork {
    Block { payload_b64: String },
    Tx { payload_b64: String },
}
