//! EVM address utilities.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use rlp::RlpStream;
use std::sync::LazyLock;
use tiny_keccak::{Hasher, Keccak};

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex"));

/// `^0x[0-9a-fA-F]{40}$`
pub fn is_valid_address(addr: &str) -> bool {
    ADDRESS_RE.is_match(addr)
}

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(bytes);
    hasher.finalize(&mut out);
    out
}

/// Parse a 20-byte hex address (with or without `0x`).
pub fn parse_address(addr: &str) -> Result<[u8; 20]> {
    let s = addr.trim();
    let hex_str = s.strip_prefix("0x").unwrap_or(s);
    if hex_str.len() != 40 {
        return Err(anyhow!("address must be 20 bytes: {}", addr));
    }
    let bytes = hex::decode(hex_str).with_context(|| format!("invalid hex address: {}", addr))?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Address a `CREATE` from `deployer` at `nonce` will land on:
/// `keccak256(rlp([deployer, nonce]))[12..]`.
pub fn predict_contract_address(deployer: &str, nonce: u64) -> Result<String> {
    let sender = parse_address(deployer)?;
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender.to_vec());
    stream.append(&nonce);
    let hash = keccak256(&stream.out());
    Ok(format!("0x{}", hex::encode(&hash[12..])))
}

pub fn same_address(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
