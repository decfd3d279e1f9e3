//! Transações no modelo UTXO com codec little-endian de layout fixo

use shared::{ChainError, Hash256, Result};

/// Número máximo de entradas por transação
pub const MAX_INPUTS: usize = 1024;
/// Número máximo de saídas por transação
pub const MAX_OUTPUTS: usize = 1024;
/// Tamanho máximo de qualquer script em bytes
pub const MAX_SCRIPT_BYTES: usize = 1024;

/// `vout` usado pela entrada de coinbase
pub const COINBASE_VOUT: u32 = 0xFFFF_FFFF;

/// Referência a uma saída de transação anterior; chave do conjunto UTXO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    /// Cria um novo `OutPoint`
    #[must_use]
    pub const fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// O outpoint nulo gasto pela entrada de coinbase
    #[must_use]
    pub const fn null() -> Self {
        Self {
            txid: Hash256::zero(),
            vout: COINBASE_VOUT,
        }
    }
}

/// Entrada de transação
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Referência ao UTXO sendo gasto
    pub previous_output: OutPoint,
    /// Script que prova o direito de gastar (assinatura Ed25519)
    pub unlocking_script: Vec<u8>,
}

impl TxInput {
    /// Cria uma nova entrada de transação
    #[must_use]
    pub const fn new(previous_output: OutPoint, unlocking_script: Vec<u8>) -> Self {
        Self {
            previous_output,
            unlocking_script,
        }
    }

    /// Verifica se esta entrada é a entrada de uma coinbase
    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.previous_output == OutPoint::null()
    }
}

/// Saída de transação
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Valor em fios
    pub value: u64,
    /// Script que define as condições de gasto
    pub locking_script: Vec<u8>,
}

impl TxOutput {
    /// Cria uma nova saída de transação
    #[must_use]
    pub const fn new(value: u64, locking_script: Vec<u8>) -> Self {
        Self {
            value,
            locking_script,
        }
    }
}

/// Transação da Teia
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
}

impl Transaction {
    /// Cria uma nova transação
    #[must_use]
    pub const fn new(
        version: u32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        locktime: u32,
    ) -> Self {
        Self {
            version,
            inputs,
            outputs,
            locktime,
        }
    }

    /// Cria uma transação de coinbase para a altura dada
    ///
    /// O script de desbloqueio codifica a altura do bloco (u64 LE) para
    /// que coinbases de alturas diferentes nunca tenham o mesmo txid.
    #[must_use]
    pub fn coinbase(block_height: u64, reward: u64, locking_script: Vec<u8>) -> Self {
        let unlocking_script = block_height.to_le_bytes().to_vec();
        let inputs = vec![TxInput::new(OutPoint::null(), unlocking_script)];
        let outputs = vec![TxOutput::new(reward, locking_script)];
        Self::new(1, inputs, outputs, 0)
    }

    /// Verifica se é uma transação de coinbase
    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Altura codificada no script de desbloqueio da coinbase
    ///
    /// # Errors
    ///
    /// Retorna erro se a transação não for coinbase ou se a codificação da
    /// altura for curta demais
    pub fn coinbase_height(&self) -> Result<u64> {
        if !self.is_coinbase() {
            return Err(ChainError::InvalidTransaction(
                "not a coinbase".to_string(),
            ));
        }
        let script = &self.inputs[0].unlocking_script;
        if script.len() < 8 {
            return Err(ChainError::InvalidTransaction(
                "coinbase height encoding too short".to_string(),
            ));
        }
        let height_bytes: [u8; 8] = script[0..8].try_into().unwrap();
        Ok(u64::from_le_bytes(height_bytes))
    }

    /// Serializa a transação no layout fixo little-endian
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            out.extend_from_slice(input.previous_output.txid.as_bytes());
            out.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            out.extend_from_slice(&(input.unlocking_script.len() as u32).to_le_bytes());
            out.extend_from_slice(&input.unlocking_script);
        }
        out.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            out.extend_from_slice(&(output.locking_script.len() as u32).to_le_bytes());
            out.extend_from_slice(&output.locking_script);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }

    /// Reconstrói uma transação, exigindo consumo exato dos bytes
    ///
    /// # Errors
    ///
    /// Retorna erro para bytes truncados, contagens absurdas ou sobras
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let tx = Self::read_from(&mut reader)?;
        reader.finish()?;
        Ok(tx)
    }

    pub(crate) fn read_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        let version = reader.read_u32()?;

        let n_in = reader.read_u32()? as usize;
        if n_in > MAX_INPUTS {
            return Err(ChainError::Codec(format!("input count overflow: {n_in}")));
        }
        let mut inputs = Vec::with_capacity(n_in);
        for _ in 0..n_in {
            let txid = Hash256::from_bytes(reader.read_array::<32>()?);
            let vout = reader.read_u32()?;
            let script_len = reader.read_u32()? as usize;
            let unlocking_script = reader.read_bytes(script_len)?.to_vec();
            inputs.push(TxInput::new(OutPoint::new(txid, vout), unlocking_script));
        }

        let n_out = reader.read_u32()? as usize;
        if n_out > MAX_OUTPUTS {
            return Err(ChainError::Codec(format!("output count overflow: {n_out}")));
        }
        let mut outputs = Vec::with_capacity(n_out);
        for _ in 0..n_out {
            let value = reader.read_u64()?;
            let script_len = reader.read_u32()? as usize;
            let locking_script = reader.read_bytes(script_len)?.to_vec();
            outputs.push(TxOutput::new(value, locking_script));
        }

        let locktime = reader.read_u32()?;
        Ok(Self::new(version, inputs, outputs, locktime))
    }

    /// Identificador da transação: SHA-256 da serialização
    #[must_use]
    pub fn txid(&self) -> Hash256 {
        Hash256::sha256(&self.serialize())
    }

    /// Soma dos valores de saída com verificação de overflow
    ///
    /// # Errors
    ///
    /// Retorna erro se a soma transbordar u64
    pub fn total_output_value(&self) -> Result<u64> {
        let mut total = 0u64;
        for output in &self.outputs {
            total = total.checked_add(output.value).ok_or_else(|| {
                ChainError::InvalidTransaction("output value overflow".to_string())
            })?;
        }
        Ok(total)
    }

    /// Validação estrutural da transação
    ///
    /// # Errors
    ///
    /// Retorna erro se a transação violar qualquer limite estrutural
    pub fn validate_structure(&self) -> Result<()> {
        if self.outputs.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "transaction has no outputs".to_string(),
            ));
        }
        if self.inputs.len() > MAX_INPUTS {
            return Err(ChainError::InvalidTransaction(format!(
                "too many inputs: {}",
                self.inputs.len()
            )));
        }
        if self.outputs.len() > MAX_OUTPUTS {
            return Err(ChainError::InvalidTransaction(format!(
                "too many outputs: {}",
                self.outputs.len()
            )));
        }
        for input in &self.inputs {
            if input.unlocking_script.len() > MAX_SCRIPT_BYTES {
                return Err(ChainError::InvalidTransaction(
                    "unlocking script too large".to_string(),
                ));
            }
        }
        for output in &self.outputs {
            if output.locking_script.len() > MAX_SCRIPT_BYTES {
                return Err(ChainError::InvalidTransaction(
                    "locking script too large".to_string(),
                ));
            }
        }
        // Verifica overflow na soma das saídas
        self.total_output_value()?;
        Ok(())
    }

    /// Pré-imagem de assinatura para a entrada `index`
    ///
    /// A transação é serializada com o script de desbloqueio de *todas* as
    /// entradas zerado, seguida do índice em u32 LE.
    #[must_use]
    pub fn sighash_preimage(&self, index: u32) -> Vec<u8> {
        let mut blanked = self.clone();
        for input in &mut blanked.inputs {
            input.unlocking_script.clear();
        }
        let mut preimage = blanked.serialize();
        preimage.extend_from_slice(&index.to_le_bytes());
        preimage
    }
}

/// Leitor sequencial com verificação de limites
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            ChainError::Codec("length overflow".to_string())
        })?;
        if end > self.bytes.len() {
            return Err(ChainError::Codec(format!(
                "truncated input: need {len} bytes at offset {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        Ok(self.read_bytes(N)?.try_into().unwrap())
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array::<8>()?))
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(ChainError::Codec(format!(
                "{} trailing bytes after value",
                self.remaining()
            )));
        }
        Ok(())
    }
}
