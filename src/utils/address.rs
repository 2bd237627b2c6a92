//! Address validation, normalization and shape inference per chain family

use crate::models::config::{Chain, ChainFamily};
use crate::models::errors::{AppError, AppResult};

/// Tron mainnet address prefix byte
const TRON_PREFIX: u8 = 0x41;

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

// ============================================
// VALIDATION
// ============================================

/// Reject addresses that cannot belong to `chain`
pub fn validate(chain: Chain, address: &str) -> AppResult<()> {
    let address = address.trim();
    let ok = match chain.family() {
        ChainFamily::Evm => is_evm_address(address),
        ChainFamily::Svm => is_solana_address(address),
        ChainFamily::Tron => is_tron_address(address),
        ChainFamily::Utxo => is_utxo_address(chain, address),
    };

    if ok {
        Ok(())
    } else {
        Err(AppError::invalid_address(format!(
            "'{}' is not a valid {} address",
            address, chain
        )))
    }
}

/// Lower-case where the chain is case-insensitive; base58 stays as-is
pub fn normalize(chain: Chain, address: &str) -> String {
    let address = address.trim();
    match chain.family() {
        ChainFamily::Evm => address.to_lowercase(),
        ChainFamily::Utxo if is_bech32_like(address) => address.to_lowercase(),
        _ => address.to_string(),
    }
}

/// Validate then normalize
pub fn canonical(chain: Chain, address: &str) -> AppResult<String> {
    validate(chain, address)?;
    Ok(normalize(chain, address))
}

/// 0x-prefixed, 40 hex characters
pub fn is_evm_address(address: &str) -> bool {
    address.len() == 42
        && (address.starts_with("0x") || address.starts_with("0X"))
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Base58, 32–44 characters, decoding to a 32-byte public key
pub fn is_solana_address(address: &str) -> bool {
    if address.len() < 32 || address.len() > 44 {
        return false;
    }
    matches!(bs58::decode(address).into_vec(), Ok(bytes) if bytes.len() == 32)
}

/// Base58check with the 0x41 prefix (visible form, `T…`)
pub fn is_tron_address(address: &str) -> bool {
    if address.len() != 34 || !address.starts_with('T') {
        return false;
    }
    matches!(
        bs58::decode(address).with_check(None).into_vec(),
        Ok(bytes) if bytes.len() == 21 && bytes[0] == TRON_PREFIX
    )
}

fn is_utxo_address(chain: Chain, address: &str) -> bool {
    let (hrp, versions): (&str, &[u8]) = match chain {
        Chain::Litecoin => ("ltc1", &[0x30, 0x32, 0x05]),
        _ => ("bc1", &[0x00, 0x05]),
    };

    if address.to_lowercase().starts_with(hrp) {
        return is_bech32_like(address);
    }

    matches!(
        bs58::decode(address).with_check(None).into_vec(),
        Ok(bytes) if bytes.len() == 21 && versions.contains(&bytes[0])
    )
}

/// Segwit shape check: hrp, separator, data part over the bech32 charset.
/// Checksum is not verified.
fn is_bech32_like(address: &str) -> bool {
    let lower = address.to_lowercase();
    if address != lower && address != address.to_uppercase() {
        return false;
    }
    let Some(sep) = lower.rfind('1') else {
        return false;
    };
    let data = &lower[sep + 1..];
    (14..=90).contains(&lower.len())
        && sep >= 2
        && data.len() >= 6
        && data.chars().all(|c| BECH32_CHARSET.contains(c))
}

// ============================================
// SHAPE INFERENCE
// ============================================

/// Guess the ledger family from the address text alone
pub fn infer_family(address: &str) -> Option<ChainFamily> {
    let address = address.trim();
    if is_evm_address(address) {
        Some(ChainFamily::Evm)
    } else if is_tron_address(address) {
        Some(ChainFamily::Tron)
    } else if is_solana_address(address) {
        Some(ChainFamily::Svm)
    } else {
        None
    }
}

// ============================================
// CONVERSIONS
// ============================================

/// `41…` hex (or 0x 20-byte hex) → base58check `T…`
pub fn tron_hex_to_base58(hex_addr: &str) -> Option<String> {
    let raw = hex_addr.trim().trim_start_matches("0x");
    let mut bytes = hex::decode(raw).ok()?;
    match bytes.len() {
        20 => bytes.insert(0, TRON_PREFIX),
        21 if bytes[0] == TRON_PREFIX => {}
        _ => return None,
    }
    Some(bs58::encode(bytes).with_check().into_string())
}

/// Render a 32-byte cross-chain recipient for the destination family
pub fn recipient_from_bytes32(bytes: &[u8; 32], family: ChainFamily) -> Option<String> {
    match family {
        ChainFamily::Svm => Some(bs58::encode(bytes).into_string()),
        ChainFamily::Evm => {
            if bytes[..12].iter().any(|b| *b != 0) {
                return None;
            }
            Some(format!("0x{}", hex::encode(&bytes[12..])))
        }
        ChainFamily::Tron => {
            let mut raw = Vec::with_capacity(21);
            raw.push(TRON_PREFIX);
            raw.extend_from_slice(&bytes[12..]);
            Some(bs58::encode(raw).with_check().into_string())
        }
        ChainFamily::Utxo => None,
    }
}

/// `0x000…<20 bytes>` topic → lowercase address
pub fn address_from_topic(topic: &str) -> Option<String> {
    let raw = topic.trim_start_matches("0x");
    if raw.len() != 64 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", raw[24..].to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVM: &str = "0x3ee18B2214AFF97000D974cf647E7C347E8fa585";
    const SOL: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const TRON_USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    #[test]
    fn test_evm_validation_and_normalization() {
        assert!(validate(Chain::Ethereum, EVM).is_ok());
        assert_eq!(normalize(Chain::Base, EVM), EVM.to_lowercase());
        assert!(validate(Chain::Ethereum, "0x1234").is_err());
        assert!(validate(Chain::Ethereum, SOL).is_err());
    }

    #[test]
    fn test_solana_validation() {
        assert!(validate(Chain::Solana, SOL).is_ok());
        assert!(validate(Chain::Solana, "So11111111111111111111111111111111111111112").is_ok());
        assert!(validate(Chain::Solana, EVM).is_err());
        // 0, O, I, l are outside the base58 alphabet
        assert!(validate(Chain::Solana, "0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl").is_err());
    }

    #[test]
    fn test_bitcoin_validation() {
        assert!(validate(Chain::Bitcoin, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa").is_ok());
        assert!(validate(Chain::Bitcoin, "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_ok());
        assert!(validate(Chain::Bitcoin, "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdb").is_err()); // 'b' not in charset
        assert!(validate(Chain::Bitcoin, EVM).is_err());
        assert_eq!(
            normalize(Chain::Bitcoin, "BC1QAR0SRRR7XFKVY5L643LYDNW9RE59GTZZWF5MDQ"),
            "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"
        );
    }

    #[test]
    fn test_tron_validation() {
        assert!(validate(Chain::Tron, TRON_USDT).is_ok());
        assert!(validate(Chain::Tron, SOL).is_err());
    }

    #[test]
    fn test_infer_family() {
        assert_eq!(infer_family(EVM), Some(ChainFamily::Evm));
        assert_eq!(infer_family(SOL), Some(ChainFamily::Svm));
        assert_eq!(infer_family(TRON_USDT), Some(ChainFamily::Tron));
        assert_eq!(infer_family("not-an-address"), None);
    }

    #[test]
    fn test_tron_hex_roundtrip() {
        let decoded = bs58::decode(TRON_USDT).with_check(None).into_vec().unwrap();
        let hex_form = hex::encode(&decoded);
        assert!(hex_form.starts_with("41"));
        assert_eq!(tron_hex_to_base58(&hex_form).as_deref(), Some(TRON_USDT));
    }

    #[test]
    fn test_recipient_from_bytes32() {
        let mut evm = [0u8; 32];
        evm[12..].copy_from_slice(&[0x11; 20]);
        assert_eq!(
            recipient_from_bytes32(&evm, ChainFamily::Evm).as_deref(),
            Some("0x1111111111111111111111111111111111111111")
        );

        let sol_bytes: [u8; 32] = bs58::decode(SOL).into_vec().unwrap().try_into().unwrap();
        assert_eq!(
            recipient_from_bytes32(&sol_bytes, ChainFamily::Svm).as_deref(),
            Some(SOL)
        );
        // Non-zero high bytes cannot be an EVM address
        assert!(recipient_from_bytes32(&sol_bytes, ChainFamily::Evm).is_none());
    }

    #[test]
    fn test_address_from_topic() {
        let topic = "0x000000000000000000000000AbCdEf0000000000000000000000000000000001";
        assert_eq!(
            address_from_topic(topic).as_deref(),
            Some("0xabcdef0000000000000000000000000000000001")
        );
        assert!(address_from_topic("0x1234").is_none());
    }
}
