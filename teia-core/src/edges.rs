//! Geração de arestas: cadeia dependente AES + matrizes sobre o scratchpad
//!
//! Cada aresta é função de todo o histórico da cadeia: o estado corrente
//! escolhe o deslocamento das matrizes, o produto das matrizes é dobrado no
//! próximo estado e o estado é gravado de volta no scratchpad. Não existe
//! atalho para calcular a aresta `i` sem percorrer `0..i`; essa é a
//! propriedade de dureza de memória.

use sha2::{Digest, Sha256};

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::params::GraphParams;
use crate::scratchpad::Scratchpad;

/// Aresta não-ordenada entre um nó da partição U e um da partição V
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub u: u32,
    pub v: u32,
}

/// Gerador de arestas para um vetor de parâmetros fixo
///
/// Possui o scratchpad com exclusividade durante sua vida; mineradores
/// concorrentes alocam o seu próprio.
pub struct EdgeGenerator {
    params: GraphParams,
    scratchpad: Scratchpad,
    // Buffers de matrizes reutilizados entre arestas e nonces
    mat_a: Vec<f32>,
    mat_b: Vec<f32>,
    mat_c: Vec<f32>,
}

impl EdgeGenerator {
    /// Cria o gerador, alocando o scratchpad
    #[must_use]
    pub fn new(params: GraphParams) -> Self {
        let dim = params.matrix_dim;
        Self {
            params,
            scratchpad: Scratchpad::new(params.scratchpad_bytes),
            mat_a: vec![0.0; dim * dim],
            mat_b: vec![0.0; dim * dim],
            mat_c: vec![0.0; dim * dim],
        }
    }

    #[must_use]
    pub const fn params(&self) -> &GraphParams {
        &self.params
    }

    /// Gera todas as `num_edges` arestas para `(header, nonce)`
    #[must_use]
    pub fn generate(&mut self, header: &[u8], nonce: u64) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(self.params.num_edges as usize);
        self.run_chain(header, nonce, self.params.num_edges, |_, edge| {
            edges.push(edge);
        });
        edges
    }

    /// Replay parcial: gera apenas as arestas nos índices pedidos
    ///
    /// O custo é linear no maior índice pedido; a cadeia inteira até ele é
    /// percorrida de qualquer forma. Índices fora de `0..num_edges` são
    /// ignorados. O resultado segue a ordem de `indices`.
    #[must_use]
    pub fn generate_at(&mut self, header: &[u8], nonce: u64, indices: &[u32]) -> Vec<Edge> {
        let max = match indices.iter().filter(|&&i| i < self.params.num_edges).max() {
            Some(&m) => m,
            None => return Vec::new(),
        };

        let mut by_index = vec![None; max as usize + 1];
        self.run_chain(header, nonce, max + 1, |i, edge| {
            by_index[i as usize] = Some(edge);
        });

        indices
            .iter()
            .filter_map(|&i| by_index.get(i as usize).copied().flatten())
            .collect()
    }

    /// Percorre a cadeia até `count` arestas, chamando `emit` para cada uma
    fn run_chain(&mut self, header: &[u8], nonce: u64, count: u32, mut emit: impl FnMut(u32, Edge)) {
        let dim = self.params.matrix_dim;
        let matrix_bytes = self.params.matrix_bytes();
        let max_off = self.params.max_matrix_offset();

        // H = SHA256(header || nonce_le8); K = H[0..16]; S0 = H[16..32]
        let mut hasher = Sha256::new();
        hasher.update(header);
        hasher.update(nonce.to_le_bytes());
        let seed = hasher.finalize();

        let mut key = [0u8; 16];
        key.copy_from_slice(&seed[0..16]);
        let mut state0 = [0u8; 16];
        state0.copy_from_slice(&seed[16..32]);

        let mut state = self.scratchpad.fill(&key, &state0);

        for index in 0..count {
            let s32 = u32::from_le_bytes([state[0], state[1], state[2], state[3]]);
            let off = (s32 as usize % max_off) & !3;

            read_matrix(self.scratchpad.bytes(), off, &mut self.mat_a);
            read_matrix(self.scratchpad.bytes(), off + matrix_bytes, &mut self.mat_b);
            matmul(dim, &self.mat_a, &self.mat_b, &mut self.mat_c);

            // Dobra XOR dos bytes de C num acumulador de 16 bytes
            let mut folded = [0u8; 16];
            for (i, value) in self.mat_c.iter().enumerate() {
                for (j, byte) in value.to_le_bytes().iter().enumerate() {
                    folded[(i * 4 + j) % 16] ^= byte;
                }
            }

            // A chave é o estado *anterior*: cada aresta fica amarrada ao
            // histórico completo da cadeia
            let cipher = Aes128::new(GenericArray::from_slice(&state));
            let mut block = GenericArray::clone_from_slice(&folded);
            cipher.encrypt_block(&mut block);
            state.copy_from_slice(&block);

            self.scratchpad.write16(off, &state);

            let u = u32::from_le_bytes([state[0], state[1], state[2], state[3]])
                & self.params.node_mask;
            let v = u32::from_le_bytes([state[4], state[5], state[6], state[7]])
                & self.params.node_mask;
            emit(index, Edge { u, v });
        }
    }
}

/// Reinterpreta `dim²` floats em ordem row-major a partir de `offset`
///
/// Os bytes são tratados como IEEE-754 little-endian; NaNs são permitidos e
/// se propagam pelo produto.
fn read_matrix(bytes: &[u8], offset: usize, out: &mut [f32]) {
    for (i, value) in out.iter_mut().enumerate() {
        let base = offset + i * 4;
        *value = f32::from_le_bytes([
            bytes[base],
            bytes[base + 1],
            bytes[base + 2],
            bytes[base + 3],
        ]);
    }
}

/// Produto escalar de referência em f32, laço triplo row-major
///
/// Nenhuma rotina BLAS/SIMD é consultada: a ordem das operações é fixa e o
/// resultado é estável bit a bit entre alvos que implementam IEEE-754.
fn matmul(dim: usize, a: &[f32], b: &[f32], c: &mut [f32]) {
    for i in 0..dim {
        for j in 0..dim {
            let mut acc = 0.0f32;
            for k in 0..dim {
                acc += a[i * dim + k] * b[k * dim + j];
            }
            c[i * dim + j] = acc;
        }
    }
}
