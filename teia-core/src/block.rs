//! Cabeçalho e bloco: codec de layout fixo e raiz de Merkle

use shared::{ChainError, Hash256, Result};

use crate::proof::{Proof, HEADER_LEN, PROOF_LEN};
use crate::transaction::{ByteReader, Transaction};

/// Cabeçalho de bloco de 80 bytes little-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    /// Hash SHA-256 do cabeçalho do bloco anterior
    pub prev_hash: Hash256,
    /// Raiz de Merkle das transações
    pub merkle_root: Hash256,
    /// Timestamp Unix em segundos
    pub timestamp: u32,
    /// Alvo de dificuldade em forma compacta
    pub bits: u32,
}

impl BlockHeader {
    /// Cria um novo cabeçalho
    #[must_use]
    pub const fn new(
        version: u32,
        prev_hash: Hash256,
        merkle_root: Hash256,
        timestamp: u32,
        bits: u32,
    ) -> Self {
        Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            bits,
        }
    }

    /// Serializa o cabeçalho nos 80 bytes canônicos
    #[must_use]
    pub fn serialize(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_hash.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out
    }

    /// Reconstrói um cabeçalho a partir de exatamente 80 bytes
    ///
    /// # Errors
    ///
    /// Retorna erro para qualquer outro comprimento
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_LEN {
            return Err(ChainError::Codec(format!(
                "header must be {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            version: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            prev_hash: Hash256::from_bytes(bytes[4..36].try_into().unwrap()),
            merkle_root: Hash256::from_bytes(bytes[36..68].try_into().unwrap()),
            timestamp: u32::from_le_bytes(bytes[68..72].try_into().unwrap()),
            bits: u32::from_le_bytes(bytes[72..76].try_into().unwrap()),
        })
    }

    /// Hash identificador do bloco: SHA-256 do cabeçalho serializado
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        Hash256::sha256(&self.serialize())
    }
}

/// Bloco completo: cabeçalho, prova de trabalho e transações
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub proof: Proof,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Cria um novo bloco
    #[must_use]
    pub const fn new(header: BlockHeader, proof: Proof, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            proof,
            transactions,
        }
    }

    /// Hash identificador do bloco
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Serializa o bloco no formato de fio
    ///
    /// `header(80) | proof_len:u32 | proof | tx_count:u32 | (tx_len:u32 | tx)×`
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.header.serialize());

        let proof_bytes = self.proof.serialize();
        out.extend_from_slice(&(proof_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&proof_bytes);

        out.extend_from_slice(&(self.transactions.len() as u32).to_le_bytes());
        for tx in &self.transactions {
            let tx_bytes = tx.serialize();
            out.extend_from_slice(&(tx_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&tx_bytes);
        }
        out
    }

    /// Reconstrói um bloco, exigindo consumo exato dos bytes
    ///
    /// # Errors
    ///
    /// Retorna erro para bytes truncados ou malformados
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        let header = BlockHeader::deserialize(reader.read_bytes(HEADER_LEN)?)?;

        let proof_len = reader.read_u32()? as usize;
        if proof_len != PROOF_LEN {
            return Err(ChainError::Codec(format!(
                "proof length must be {PROOF_LEN}, got {proof_len}"
            )));
        }
        let proof = Proof::deserialize(reader.read_bytes(proof_len)?)?;

        let tx_count = reader.read_u32()? as usize;
        // Cada transação consome ao menos o prefixo de tamanho de 4 bytes
        if tx_count > reader.remaining() / 4 {
            return Err(ChainError::Codec(format!(
                "transaction count overflow: {tx_count}"
            )));
        }
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            let tx_len = reader.read_u32()? as usize;
            let tx_bytes = reader.read_bytes(tx_len)?;
            transactions.push(Transaction::deserialize(tx_bytes)?);
        }

        reader.finish()?;
        Ok(Self::new(header, proof, transactions))
    }
}

/// Calcula a raiz de Merkle de uma lista de transações
///
/// Árvore binária de txids com SHA-256 de `left || right`; nível ímpar
/// duplica o último hash. Lista vazia produz a raiz toda-zero.
#[must_use]
pub fn merkle_root(transactions: &[Transaction]) -> Hash256 {
    if transactions.is_empty() {
        return Hash256::zero();
    }

    let mut hashes: Vec<Hash256> = transactions.iter().map(Transaction::txid).collect();

    while hashes.len() > 1 {
        let mut next_level = Vec::with_capacity(hashes.len().div_ceil(2));
        for chunk in hashes.chunks(2) {
            let left = chunk[0];
            let right = if chunk.len() == 2 { chunk[1] } else { chunk[0] };
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(left.as_bytes());
            data.extend_from_slice(right.as_bytes());
            next_level.push(Hash256::sha256(&data));
        }
        hashes = next_level;
    }

    hashes[0]
}
