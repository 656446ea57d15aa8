//! Minimal Solidity ABI coding for the Wave Portal contract.
//!
//! Only the shapes the contract uses are supported: a single `string`
//! argument, `uint256` returns, `(address,string,uint256)[]` history rows
//! and the `NewWave(address indexed,uint256,string)` log body.

use sha3::{Digest, Keccak256};
use wp_api_types::{NewWaveEvent, WalletAddress, WaveRecord};
use wp_ledger_client::ProviderError;

pub const GET_TOTAL_WAVES: &str = "getTotalWaves()";
pub const GET_ALL_WAVES: &str = "getAllWaves()";
pub const WAVE: &str = "wave(string)";
pub const NEW_WAVE_EVENT: &str = "NewWave(address,uint256,string)";

const WORD: usize = 32;

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// `topics[0]` of a log emitted for `signature`.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(Keccak256::digest(signature.as_bytes())))
}

pub fn encode_call(signature: &str) -> String {
    format!("0x{}", hex::encode(selector(signature)))
}

pub fn encode_string_call(signature: &str, value: &str) -> String {
    let bytes = value.as_bytes();
    let padded_len = bytes.len().div_ceil(WORD) * WORD;

    let mut out = Vec::with_capacity(4 + 2 * WORD + padded_len);
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&uint_word(WORD as u64));
    out.extend_from_slice(&uint_word(bytes.len() as u64));
    out.extend_from_slice(bytes);
    out.resize(4 + 2 * WORD + padded_len, 0);
    format!("0x{}", hex::encode(out))
}

pub fn decode_hex(raw: &str) -> Result<Vec<u8>, ProviderError> {
    let trimmed = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(trimmed).map_err(|err| ProviderError::Decode(format!("invalid hex: {err}")))
}

pub fn decode_uint(raw: &str) -> Result<u64, ProviderError> {
    let data = decode_hex(raw)?;
    Words(&data).u64_at(0)
}

pub fn decode_wave_records(raw: &str) -> Result<Vec<WaveRecord>, ProviderError> {
    let data = decode_hex(raw)?;
    let words = Words(&data);

    let array_start = words.usize_at(0)?;
    let len = words.usize_at(array_start)?;
    let heads = add(array_start, WORD)?;

    let mut records = Vec::with_capacity(len.min(1024));
    for index in 0..len {
        let head = index
            .checked_mul(WORD)
            .ok_or_else(|| ProviderError::Decode(format!("tuple head {index} out of range")))?;
        let tuple = add(heads, words.usize_at(add(heads, head)?)?)?;
        let waver = words.address_at(tuple)?;
        let message = words.string_at(add(tuple, words.usize_at(add(tuple, WORD)?)?)?)?;
        let timestamp = words.u64_at(add(tuple, 2 * WORD)?)?;
        records.push(WaveRecord {
            waver,
            timestamp,
            message,
        });
    }
    Ok(records)
}

/// Decodes a `NewWave` log from its indexed `from` topic and data body.
pub fn decode_new_wave(from_topic: &str, data: &str) -> Result<NewWaveEvent, ProviderError> {
    let topic = decode_hex(from_topic)?;
    let from = Words(&topic).address_at(0)?;

    let body = decode_hex(data)?;
    let words = Words(&body);
    let timestamp = words.u64_at(0)?;
    let message = words.string_at(words.usize_at(WORD)?)?;

    Ok(NewWaveEvent {
        from,
        timestamp,
        message,
    })
}

/// Offset arithmetic on untrusted ABI data.
fn add(base: usize, delta: usize) -> Result<usize, ProviderError> {
    base.checked_add(delta)
        .ok_or_else(|| ProviderError::Decode(format!("offset {base} + {delta} overflows")))
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0_u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

struct Words<'a>(&'a [u8]);

impl Words<'_> {
    fn word(&self, offset: usize) -> Result<&[u8], ProviderError> {
        offset
            .checked_add(WORD)
            .and_then(|end| self.0.get(offset..end))
            .ok_or_else(|| ProviderError::Decode(format!("word at {offset} out of bounds")))
    }

    fn u64_at(&self, offset: usize) -> Result<u64, ProviderError> {
        let word = self.word(offset)?;
        if word[..WORD - 8].iter().any(|byte| *byte != 0) {
            return Err(ProviderError::Decode(format!("uint at {offset} exceeds 64 bits")));
        }
        let mut tail = [0_u8; 8];
        tail.copy_from_slice(&word[WORD - 8..]);
        Ok(u64::from_be_bytes(tail))
    }

    fn usize_at(&self, offset: usize) -> Result<usize, ProviderError> {
        let value = self.u64_at(offset)?;
        usize::try_from(value)
            .map_err(|_| ProviderError::Decode(format!("offset {value} does not fit usize")))
    }

    fn address_at(&self, offset: usize) -> Result<WalletAddress, ProviderError> {
        let word = self.word(offset)?;
        Ok(WalletAddress(format!("0x{}", hex::encode(&word[WORD - 20..]))))
    }

    fn string_at(&self, offset: usize) -> Result<String, ProviderError> {
        let len = self.usize_at(offset)?;
        let start = add(offset, WORD)?;
        let bytes = start
            .checked_add(len)
            .and_then(|end| self.0.get(start..end))
            .ok_or_else(|| ProviderError::Decode(format!("string at {offset} out of bounds")))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| ProviderError::Decode(format!("string at {offset}: {err}")))
    }
}
