//! Camada de script: modelo único pay-to-pubkey com Ed25519
//!
//! Script de bloqueio: byte de tag `0x01` seguido da chave pública de 32
//! bytes. Script de desbloqueio: assinatura de 64 bytes sobre a pré-imagem
//! de sighash da entrada.

use shared::{ChainError, KeyPair, PublicKey, Result, Signature};

use crate::transaction::{Transaction, TxOutput};

/// Tag do único modelo de script suportado
pub const LOCK_TAG_PAY_TO_PUBKEY: u8 = 0x01;

/// Comprimento do script de bloqueio (tag + chave)
pub const LOCKING_SCRIPT_LEN: usize = 1 + 32;

/// Comprimento do script de desbloqueio (assinatura)
pub const UNLOCKING_SCRIPT_LEN: usize = 64;

/// Monta um script de bloqueio pay-to-pubkey
#[must_use]
pub fn locking_script(public_key: &PublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(LOCKING_SCRIPT_LEN);
    script.push(LOCK_TAG_PAY_TO_PUBKEY);
    script.extend_from_slice(public_key.as_bytes());
    script
}

/// Extrai a chave pública de um script de bloqueio
///
/// # Errors
///
/// Retorna erro se o tamanho, a tag ou a chave forem inválidos
pub fn parse_locking_script(script: &[u8]) -> Result<PublicKey> {
    if script.len() != LOCKING_SCRIPT_LEN {
        return Err(ChainError::InvalidTransaction(format!(
            "locking script must be {LOCKING_SCRIPT_LEN} bytes, got {}",
            script.len()
        )));
    }
    if script[0] != LOCK_TAG_PAY_TO_PUBKEY {
        return Err(ChainError::InvalidTransaction(format!(
            "unknown locking script tag 0x{:02x}",
            script[0]
        )));
    }
    PublicKey::from_bytes(&script[1..])
}

/// Monta um script de desbloqueio a partir de uma assinatura
#[must_use]
pub fn unlocking_script(signature: &Signature) -> Vec<u8> {
    signature.as_bytes().to_vec()
}

/// Extrai a assinatura de um script de desbloqueio
///
/// # Errors
///
/// Retorna erro se o script não tiver exatamente 64 bytes
pub fn parse_unlocking_script(script: &[u8]) -> Result<Signature> {
    if script.len() != UNLOCKING_SCRIPT_LEN {
        return Err(ChainError::InvalidTransaction(format!(
            "unlocking script must be {UNLOCKING_SCRIPT_LEN} bytes, got {}",
            script.len()
        )));
    }
    Signature::from_bytes(script)
}

/// Assina a entrada `index`, devolvendo o script de desbloqueio
#[must_use]
pub fn sign_input(tx: &Transaction, index: u32, keypair: &KeyPair) -> Vec<u8> {
    let preimage = tx.sighash_preimage(index);
    unlocking_script(&keypair.sign(&preimage))
}

/// Verifica a assinatura da entrada `index` contra a saída gasta
///
/// # Errors
///
/// Retorna erro se os scripts forem malformados ou a assinatura inválida
pub fn verify_input(tx: &Transaction, index: u32, previous_output: &TxOutput) -> Result<()> {
    let public_key = parse_locking_script(&previous_output.locking_script)?;
    let input = tx.inputs.get(index as usize).ok_or_else(|| {
        ChainError::InvalidTransaction(format!("no input at index {index}"))
    })?;
    let signature = parse_unlocking_script(&input.unlocking_script)?;
    let preimage = tx.sighash_preimage(index);
    shared::verify_signature(&public_key, &preimage, &signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{OutPoint, TxInput};
    use shared::Hash256;

    fn spend_fixture() -> (Transaction, TxOutput, KeyPair) {
        let keypair = KeyPair::generate();
        let prev_output = TxOutput::new(1000, locking_script(&keypair.public_key));
        let tx = Transaction::new(
            1,
            vec![TxInput::new(OutPoint::new(Hash256::sha256(b"prev"), 0), vec![])],
            vec![TxOutput::new(900, locking_script(&keypair.public_key))],
            0,
        );
        (tx, prev_output, keypair)
    }

    #[test]
    fn test_locking_script_round_trip() {
        let keypair = KeyPair::generate();
        let script = locking_script(&keypair.public_key);
        assert_eq!(script.len(), LOCKING_SCRIPT_LEN);

        let parsed = parse_locking_script(&script).unwrap();
        assert_eq!(parsed, keypair.public_key);
    }

    #[test]
    fn test_locking_script_rejects_bad_tag() {
        let keypair = KeyPair::generate();
        let mut script = locking_script(&keypair.public_key);
        script[0] = 0x02;
        assert!(parse_locking_script(&script).is_err());
        assert!(parse_locking_script(&script[1..]).is_err());
    }

    #[test]
    fn test_sign_and_verify_input() {
        let (mut tx, prev_output, keypair) = spend_fixture();
        tx.inputs[0].unlocking_script = sign_input(&tx, 0, &keypair);

        verify_input(&tx, 0, &prev_output).unwrap();
    }

    #[test]
    fn test_verify_rejects_tampered_outputs() {
        let (mut tx, prev_output, keypair) = spend_fixture();
        tx.inputs[0].unlocking_script = sign_input(&tx, 0, &keypair);

        // Alterar a saída invalida a assinatura
        tx.outputs[0].value = 899;
        assert!(verify_input(&tx, 0, &prev_output).is_err());
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let (mut tx, _, keypair) = spend_fixture();
        tx.inputs[0].unlocking_script = sign_input(&tx, 0, &keypair);

        let other = KeyPair::generate();
        let wrong_output = TxOutput::new(1000, locking_script(&other.public_key));
        assert!(verify_input(&tx, 0, &wrong_output).is_err());
    }

    #[test]
    fn test_signing_other_inputs_does_not_invalidate() {
        // A pré-imagem zera todos os scripts de desbloqueio: assinar a
        // entrada 1 depois não invalida a assinatura da entrada 0
        let keypair = KeyPair::generate();
        let prev_a = TxOutput::new(10, locking_script(&keypair.public_key));
        let prev_b = TxOutput::new(20, locking_script(&keypair.public_key));
        let mut tx = Transaction::new(
            1,
            vec![
                TxInput::new(OutPoint::new(Hash256::sha256(b"a"), 0), vec![]),
                TxInput::new(OutPoint::new(Hash256::sha256(b"b"), 0), vec![]),
            ],
            vec![TxOutput::new(25, locking_script(&keypair.public_key))],
            0,
        );

        tx.inputs[0].unlocking_script = sign_input(&tx, 0, &keypair);
        tx.inputs[1].unlocking_script = sign_input(&tx, 1, &keypair);

        verify_input(&tx, 0, &prev_a).unwrap();
        verify_input(&tx, 1, &prev_b).unwrap();
    }
}
