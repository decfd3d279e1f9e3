//! Verificação de provas: re-derivação, estrutura do ciclo, poda e alvo
//!
//! As checagens são ordenadas da mais barata para a mais cara; qualquer
//! falha é fatal para a prova.

use std::collections::HashSet;

use shared::{ChainError, Result};

use crate::cycle::forms_valid_cycle;
use crate::difficulty::{compact_to_target, hash_meets_target, min_difficulty_target};
use crate::edges::{Edge, EdgeGenerator};
use crate::params::{GraphParams, CYCLE_LEN};
use crate::proof::Proof;
use crate::trimmer::trim_parallel;

/// Verificador de provas para um vetor de parâmetros fixo
pub struct Verifier {
    params: GraphParams,
    expected_bits: Option<u32>,
}

impl Verifier {
    /// Cria um verificador sem exigência de `bits` específico
    #[must_use]
    pub const fn new(params: GraphParams) -> Self {
        Self {
            params,
            expected_bits: None,
        }
    }

    /// Cria um verificador que exige `bits` igual ao esperado pelo consenso
    #[must_use]
    pub const fn with_expected_bits(params: GraphParams, expected_bits: u32) -> Self {
        Self {
            params,
            expected_bits: Some(expected_bits),
        }
    }

    /// Verificação completa de consenso
    ///
    /// # Errors
    ///
    /// Retorna erro na primeira checagem que falhar, na ordem: estrutura
    /// dos índices, `bits` esperado, piso de dificuldade, alvo do hash,
    /// estrutura do ciclo re-derivado e sobrevivência à poda
    pub fn verify(&self, proof: &Proof) -> Result<()> {
        self.check_indices(proof)?;

        let bits = proof.header_bits();
        if let Some(expected) = self.expected_bits {
            if bits != expected {
                return Err(ChainError::InvalidProof(format!(
                    "header bits 0x{bits:08x} do not match expected 0x{expected:08x}"
                )));
            }
        }

        let target = compact_to_target(bits);
        if target.as_slice() > min_difficulty_target().as_slice() {
            return Err(ChainError::InvalidProof(
                "target easier than network minimum".to_string(),
            ));
        }

        if !hash_meets_target(&proof.hash(), &target) {
            return Err(ChainError::InvalidProof(
                "proof hash does not meet target".to_string(),
            ));
        }

        let mut generator = EdgeGenerator::new(self.params);
        let edges = generator.generate(&proof.header, proof.nonce);

        let cycle: Vec<Edge> = proof
            .cycle_edges
            .iter()
            .map(|&i| edges[i as usize])
            .collect();
        if !forms_valid_cycle(&cycle) {
            return Err(ChainError::InvalidProof(
                "edges do not form a single 8-cycle".to_string(),
            ));
        }

        let survivors = trim_parallel(&edges, &self.params);
        let mut alive = vec![false; self.params.num_edges as usize];
        for index in survivors {
            alive[index as usize] = true;
        }
        if proof.cycle_edges.iter().any(|&i| !alive[i as usize]) {
            return Err(ChainError::InvalidProof(
                "cycle edge does not survive trimming".to_string(),
            ));
        }

        Ok(())
    }

    /// Modo somente-ciclo: re-deriva apenas os 8 índices via replay
    /// parcial e checa a estrutura do ciclo
    ///
    /// Interface de teste e depuração; não participa do consenso (ignora
    /// `bits`, alvo e poda).
    ///
    /// # Errors
    ///
    /// Retorna erro se os índices forem inválidos ou o ciclo malformado
    pub fn verify_cycle_only(&self, proof: &Proof) -> Result<()> {
        self.check_indices(proof)?;

        let mut generator = EdgeGenerator::new(self.params);
        let cycle = generator.generate_at(&proof.header, proof.nonce, &proof.cycle_edges);
        if cycle.len() != CYCLE_LEN || !forms_valid_cycle(&cycle) {
            return Err(ChainError::InvalidProof(
                "edges do not form a single 8-cycle".to_string(),
            ));
        }
        Ok(())
    }

    /// Checagens estruturais: índices distintos e dentro do grafo
    fn check_indices(&self, proof: &Proof) -> Result<()> {
        let distinct: HashSet<u32> = proof.cycle_edges.iter().copied().collect();
        if distinct.len() != CYCLE_LEN {
            return Err(ChainError::InvalidProof(
                "cycle edge indices are not distinct".to_string(),
            ));
        }
        if proof.cycle_edges.iter().any(|&i| i >= self.params.num_edges) {
            return Err(ChainError::InvalidProof(
                "cycle edge index out of range".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn params(&self) -> &GraphParams {
        &self.params
    }
}
