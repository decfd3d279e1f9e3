//! Tipos compartilhados entre módulos da Teia

use serde::{Deserialize, Serialize};

/// Alias para identificador único de transação
pub type TxId = crate::Hash256;

/// Alias para identificador único de bloco
pub type BlockId = crate::Hash256;

/// Alias para valor monetário (fios; 1 TEIA = 10^8 fios)
pub type Amount = u64;

/// Alias para timestamp Unix em segundos (cabeçalhos usam u32)
pub type Timestamp = u32;

/// Alias para altura do bloco na blockchain
pub type BlockHeight = u64;

/// Alias para índice de saída de transação
pub type OutputIndex = u32;

/// Configurações globais do nó
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identificador da rede (deve coincidir no handshake P2P)
    pub network_id: String,
    /// Porta P2P para comunicação
    pub p2p_port: u16,
    /// Endereço de bind
    pub bind_address: String,
    /// Peers para conexão inicial
    pub bootstrap_peers: Vec<String>,
    /// Diretório de dados do nó
    pub data_dir: String,
    /// Número máximo de peers simultâneos
    pub max_peers: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network_id: "teia-devnet".to_string(),
            p2p_port: 9333,
            bind_address: "127.0.0.1".to_string(),
            bootstrap_peers: vec![],
            data_dir: "./data".to_string(),
            max_peers: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_config_defaults() {
        let config = NodeConfig::default();

        assert_eq!(config.network_id, "teia-devnet");
        assert_eq!(config.p2p_port, 9333);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert!(config.bootstrap_peers.is_empty());
    }
}
