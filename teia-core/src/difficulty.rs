//! Alvo de dificuldade: codificação compacta, retarget e trabalho
//!
//! O alvo é um inteiro de 256 bits big-endian; `bits` é a forma compacta
//! com expoente no byte alto e coeficiente de 23 bits.

use shared::Hash256;

/// Segundos-alvo entre blocos
pub const TARGET_BLOCK_SECONDS: u64 = 600;

/// Intervalo de reajuste de dificuldade em blocos
pub const BLOCKS_PER_ADJUSTMENT: u64 = 2016;

/// Piso de dificuldade da rede em forma compacta (alvo mais fácil admitido)
pub const MIN_DIFFICULTY_BITS: u32 = 0x207F_FFFF;

/// Alvo de 256 bits em bytes big-endian
pub type Target = [u8; 32];

/// Expande a forma compacta `bits` para o alvo de 32 bytes
///
/// `exp = bits >> 24`, `coef = bits & 0x007FFFFF`. Com `exp ≤ 3` o
/// coeficiente é deslocado para a direita e alinhado ao fim do buffer;
/// caso contrário os três bytes do coeficiente ocupam o deslocamento
/// `32 − exp`. Bytes que cairiam fora do buffer são descartados.
#[must_use]
pub fn compact_to_target(bits: u32) -> Target {
    let exp = (bits >> 24) as usize;
    let coef = bits & 0x007F_FFFF;
    let mut target = [0u8; 32];

    if exp <= 3 {
        let value = coef >> (8 * (3 - exp));
        target[29] = (value >> 16) as u8;
        target[30] = (value >> 8) as u8;
        target[31] = value as u8;
    } else {
        let coef_bytes = [(coef >> 16) as u8, (coef >> 8) as u8, coef as u8];
        for (k, &byte) in coef_bytes.iter().enumerate() {
            let pos = 32isize - exp as isize + k as isize;
            if (0..32).contains(&pos) {
                target[pos as usize] = byte;
            }
        }
    }

    target
}

/// Reduz um alvo de 32 bytes à forma compacta
///
/// Extrai os três bytes significativos mais altos; se o bit alto do
/// coeficiente ficar ligado, desloca um byte à direita e incrementa o
/// expoente.
#[must_use]
pub fn target_to_compact(target: &Target) -> u32 {
    let first = match target.iter().position(|&b| b != 0) {
        Some(i) => i,
        None => return 0,
    };
    let size = 32 - first;

    let mut coef: u32 = if size <= 3 {
        let mut value: u32 = 0;
        for &byte in &target[first..32] {
            value = (value << 8) | u32::from(byte);
        }
        value << (8 * (3 - size))
    } else {
        (u32::from(target[first]) << 16)
            | (u32::from(target[first + 1]) << 8)
            | u32::from(target[first + 2])
    };

    let mut exp = size as u32;
    if coef & 0x0080_0000 != 0 {
        coef >>= 8;
        exp += 1;
    }
    (exp << 24) | (coef & 0x007F_FFFF)
}

/// Verifica `SHA256(prova) ≤ alvo`, comparados como inteiros big-endian
#[must_use]
pub fn hash_meets_target(hash: &Hash256, target: &Target) -> bool {
    hash.as_bytes().as_slice() <= target.as_slice()
}

/// Alvo mais fácil admitido pela rede
#[must_use]
pub fn min_difficulty_target() -> Target {
    compact_to_target(MIN_DIFFICULTY_BITS)
}

/// Pontuação de trabalho de um bloco: alvos menores valem mais
#[must_use]
pub fn work_for_bits(bits: u32) -> u64 {
    let target = compact_to_target(bits);
    let mut top = [0u8; 8];
    top.copy_from_slice(&target[0..8]);
    let top = u64::from_be_bytes(top);
    u64::MAX / top.max(1)
}

/// Calcula os novos `bits` após uma janela de reajuste
///
/// `ratio = actual / expected` é fixado em `[0.25, 4.0]` (implementado em
/// aritmética inteira de 256 bits); o resultado nunca fica mais fácil que
/// o piso da rede.
#[must_use]
pub fn retarget_bits(current_bits: u32, actual_seconds: u64, expected_seconds: u64) -> u32 {
    let expected = expected_seconds.max(1);
    let actual = actual_seconds.clamp(expected / 4, expected.saturating_mul(4)).max(1);

    let target = compact_to_target(current_bits);
    let scaled = div_u288(mul_u256(&target, actual), expected);

    let min_target = min_difficulty_target();
    let new_target = match clamp_to_u256(scaled) {
        Some(t) if t.as_slice() <= min_target.as_slice() => t,
        // Estourou 256 bits ou ficou mais fácil que o piso
        _ => min_target,
    };

    target_to_compact(&new_target)
}

// --- aritmética de 256 bits sobre limbs little-endian -------------------

fn to_limbs(target: &Target) -> [u64; 4] {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&target[32 - 8 * (i + 1)..32 - 8 * i]);
        *limb = u64::from_be_bytes(bytes);
    }
    limbs
}

fn from_limbs(limbs: &[u64; 4]) -> Target {
    let mut target = [0u8; 32];
    for (i, limb) in limbs.iter().enumerate() {
        target[32 - 8 * (i + 1)..32 - 8 * i].copy_from_slice(&limb.to_be_bytes());
    }
    target
}

/// Multiplica um alvo por um u64, devolvendo 5 limbs (320 bits)
fn mul_u256(target: &Target, factor: u64) -> [u64; 5] {
    let limbs = to_limbs(target);
    let mut out = [0u64; 5];
    let mut carry: u128 = 0;
    for i in 0..4 {
        let product = u128::from(limbs[i]) * u128::from(factor) + carry;
        out[i] = product as u64;
        carry = product >> 64;
    }
    out[4] = carry as u64;
    out
}

/// Divide 5 limbs por um u64 (divisão longa do limb alto ao baixo)
fn div_u288(value: [u64; 5], divisor: u64) -> [u64; 5] {
    debug_assert!(divisor != 0);
    let mut out = [0u64; 5];
    let mut remainder: u128 = 0;
    for i in (0..5).rev() {
        let acc = (remainder << 64) | u128::from(value[i]);
        out[i] = (acc / u128::from(divisor)) as u64;
        remainder = acc % u128::from(divisor);
    }
    out
}

/// Reduz 5 limbs a um alvo de 256 bits, ou `None` se o limb alto transbordar
fn clamp_to_u256(value: [u64; 5]) -> Option<Target> {
    if value[4] != 0 {
        return None;
    }
    Some(from_limbs(&[value[0], value[1], value[2], value[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_round_trip() {
        for bits in [0x1D00_FFFFu32, 0x1B04_04CB, 0x207F_FFFF, 0x1803_62DD] {
            let target = compact_to_target(bits);
            assert_eq!(target_to_compact(&target), bits);
        }
    }

    #[test]
    fn test_compact_small_exponents() {
        // exp = 3: coeficiente alinhado ao fim sem deslocamento
        let target = compact_to_target(0x0301_0000);
        assert_eq!(target[29], 0x01);
        assert_eq!(&target[30..32], &[0, 0]);

        // exp = 1: coeficiente deslocado 16 bits à direita
        let target = compact_to_target(0x0101_0000);
        assert_eq!(target[31], 0x01);
        assert_eq!(&target[0..31], &[0u8; 31]);
    }

    #[test]
    fn test_high_bit_normalization() {
        // Alvo cujo primeiro byte significativo tem o bit alto ligado:
        // o compacto desloca o coeficiente e incrementa o expoente
        let mut target = [0u8; 32];
        target[2] = 0x80;
        let bits = target_to_compact(&target);
        assert_eq!(bits >> 24, 31);
        assert_eq!(bits & 0x007F_FFFF, 0x0000_8000);
        // E a reexpansão preserva o valor
        assert_eq!(compact_to_target(bits), target);
    }

    #[test]
    fn test_all_ones_accepts_all_zero_rejects() {
        let easiest = [0xFFu8; 32];
        let hardest = [0u8; 32];
        let any_hash = Hash256::sha256(b"qualquer prova");

        assert!(hash_meets_target(&any_hash, &easiest));
        assert!(!hash_meets_target(&any_hash, &hardest));
        // O hash zero é aceito até pelo alvo zero (comparação ≤)
        assert!(hash_meets_target(&Hash256::zero(), &hardest));
    }

    #[test]
    fn test_retarget_monotone() {
        let bits = 0x1E0F_FFFF;
        let expected = TARGET_BLOCK_SECONDS * (BLOCKS_PER_ADJUSTMENT - 1);

        // Blocos lentos: alvo fica maior ou igual (mais fácil)
        let easier = retarget_bits(bits, expected * 2, expected);
        assert!(compact_to_target(easier) >= compact_to_target(bits));

        // Blocos rápidos: alvo fica menor ou igual (mais difícil)
        let harder = retarget_bits(bits, expected / 2, expected);
        assert!(compact_to_target(harder) <= compact_to_target(bits));

        // Tempo exato: inalterado
        assert_eq!(retarget_bits(bits, expected, expected), bits);
    }

    #[test]
    fn test_retarget_clamps_ratio() {
        let bits = 0x1E0F_FFFF;
        let expected = TARGET_BLOCK_SECONDS * (BLOCKS_PER_ADJUSTMENT - 1);

        // 100x mais lento é tratado como 4x
        let at_clamp = retarget_bits(bits, expected * 4, expected);
        let beyond = retarget_bits(bits, expected * 100, expected);
        assert_eq!(at_clamp, beyond);

        // 100x mais rápido é tratado como 0.25x
        let fast_clamp = retarget_bits(bits, expected / 4, expected);
        let too_fast = retarget_bits(bits, 1, expected);
        assert_eq!(fast_clamp, too_fast);
    }

    #[test]
    fn test_retarget_respects_network_floor() {
        let expected = TARGET_BLOCK_SECONDS * (BLOCKS_PER_ADJUSTMENT - 1);
        // Já no piso, blocos lentos não podem afrouxar mais
        let bits = retarget_bits(MIN_DIFFICULTY_BITS, expected * 4, expected);
        assert_eq!(bits, MIN_DIFFICULTY_BITS);
    }

    #[test]
    fn test_work_ordering() {
        // Alvo menor (mais difícil) rende mais trabalho
        let easy = work_for_bits(MIN_DIFFICULTY_BITS);
        let hard = work_for_bits(0x1D00_FFFF);
        assert!(hard > easy);
        assert!(easy >= 1);
    }

    #[test]
    fn test_limb_round_trip() {
        let target = compact_to_target(0x1B04_04CB);
        assert_eq!(from_limbs(&to_limbs(&target)), target);
    }

    #[test]
    fn test_mul_div_inverse() {
        let target = compact_to_target(0x1E0F_FFFF);
        let scaled = div_u288(mul_u256(&target, 977), 977);
        assert_eq!(clamp_to_u256(scaled).unwrap(), target);
    }
}
