//! `devloop secret`: random alphanumeric strings from the OS CSPRNG.

use anyhow::{Result, anyhow};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits a byte; bytes at or
/// above it are rejected so every character is equally likely.
const ACCEPT_BELOW: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// Draw `length` characters uniformly from `[A-Za-z0-9]`.
pub fn generate(length: usize) -> Result<String> {
    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 64];

    while out.len() < length {
        getrandom::fill(&mut buf).map_err(|e| anyhow!("os random source failed: {e}"))?;
        for &byte in &buf {
            if out.len() == length {
                break;
            }
            if byte < ACCEPT_BELOW {
                out.push(ALPHABET[usize::from(byte) % ALPHABET.len()] as char);
            }
        }
    }

    Ok(out)
}

pub fn print_secret(length: usize) -> Result<()> {
    println!("{}", generate(length)?);
    Ok(())
}
