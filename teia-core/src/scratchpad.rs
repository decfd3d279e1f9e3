//! Scratchpad: buffer de células de 16 bytes preenchido por keystream AES
//!
//! O buffer é alocado uma vez por gerador e reciclado entre nonces; o
//! preenchimento sobrescreve todo o conteúdo anterior.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::params::CELL_BYTES;

/// Região de memória mutável usada como espaço de trabalho opaco
pub struct Scratchpad {
    data: Vec<u8>,
}

impl Scratchpad {
    /// Aloca um scratchpad de `bytes` bytes (já validados pelo chamador
    /// como múltiplo de 16)
    #[must_use]
    pub fn new(bytes: usize) -> Self {
        debug_assert!(bytes % CELL_BYTES == 0 && bytes > 0);
        Self {
            data: vec![0u8; bytes],
        }
    }

    /// Número de células de 16 bytes
    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.data.len() / CELL_BYTES
    }

    /// Tamanho total em bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Verifica se o buffer está vazio (nunca acontece após a construção)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Preenche o buffer com a cadeia `S_i = AES128(S_{i-1}, K)`,
    /// gravando `S_i` na célula `i-1`. Retorna o estado final (igual ao
    /// conteúdo da última célula).
    pub fn fill(&mut self, key: &[u8; 16], state0: &[u8; 16]) -> [u8; 16] {
        let cipher = Aes128::new(GenericArray::from_slice(key));
        let mut state = GenericArray::clone_from_slice(state0);

        for cell in self.data.chunks_exact_mut(CELL_BYTES) {
            cipher.encrypt_block(&mut state);
            cell.copy_from_slice(&state);
        }

        let mut out = [0u8; 16];
        out.copy_from_slice(&state);
        out
    }

    /// Lê 16 bytes a partir de `offset`
    #[must_use]
    pub fn read16(&self, offset: usize) -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.data[offset..offset + 16]);
        out
    }

    /// Sobrescreve 16 bytes a partir de `offset`
    pub fn write16(&mut self, offset: usize, value: &[u8; 16]) {
        self.data[offset..offset + 16].copy_from_slice(value);
    }

    /// Fatia imutável do conteúdo
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_is_deterministic_and_chained() {
        let mut pad = Scratchpad::new(64 * CELL_BYTES);
        let key = [7u8; 16];
        let state0 = [3u8; 16];

        let final_a = pad.fill(&key, &state0);
        let snapshot: Vec<u8> = pad.bytes().to_vec();
        let final_b = pad.fill(&key, &state0);

        assert_eq!(final_a, final_b);
        assert_eq!(pad.bytes(), &snapshot[..]);

        // O estado final é o conteúdo da última célula
        assert_eq!(final_a, pad.read16(pad.len() - CELL_BYTES));

        // Células consecutivas diferem (cadeia dependente, não repetição)
        assert_ne!(pad.read16(0), pad.read16(CELL_BYTES));
    }

    #[test]
    fn test_fill_depends_on_key_and_state() {
        let mut pad = Scratchpad::new(16 * CELL_BYTES);
        let a = pad.fill(&[1u8; 16], &[0u8; 16]);
        let b = pad.fill(&[2u8; 16], &[0u8; 16]);
        let c = pad.fill(&[1u8; 16], &[9u8; 16]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_read_write_round_trip() {
        let mut pad = Scratchpad::new(8 * CELL_BYTES);
        let value = [0xABu8; 16];
        pad.write16(4, &value);
        assert_eq!(pad.read16(4), value);
    }
}
