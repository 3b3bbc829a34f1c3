//! Cursor-based decoding helpers
//!
//! Every fixed binary encoding in the workspace is big-endian and reads from a
//! `std::io::Cursor<Vec<u8>>`, so decoders compose by sharing one cursor.

use crate::fr::Fr;
use anyhow::{anyhow, Result};
use std::io::{Cursor, Read};

pub fn consume_exact(cursor: &mut Cursor<Vec<u8>>, n: usize) -> Result<Vec<u8>> {
    let mut buffer: Vec<u8> = vec![0u8; n];
    cursor.read_exact(&mut buffer[0..n])?;
    Ok(buffer)
}

pub fn consume_u32(cursor: &mut Cursor<Vec<u8>>) -> Result<u32> {
    let mut buffer = [0u8; 4];
    cursor.read_exact(&mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
}

pub fn consume_u64(cursor: &mut Cursor<Vec<u8>>) -> Result<u64> {
    let mut buffer = [0u8; 8];
    cursor.read_exact(&mut buffer)?;
    Ok(u64::from_be_bytes(buffer))
}

pub fn consume_fr(cursor: &mut Cursor<Vec<u8>>) -> Result<Fr> {
    let mut buffer = [0u8; 32];
    cursor.read_exact(&mut buffer)?;
    Ok(Fr(buffer))
}

/// Read a u32 length prefix followed by that many length-prefixed byte strings.
pub fn consume_byte_list(cursor: &mut Cursor<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
    let count = consume_u32(cursor)? as usize;
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let len = consume_u32(cursor)? as usize;
        if len > remaining_slice(cursor).len() {
            return Err(anyhow!("length prefix {} exceeds remaining input", len));
        }
        items.push(consume_exact(cursor, len)?);
    }
    Ok(items)
}

pub fn consume_fr_list(cursor: &mut Cursor<Vec<u8>>) -> Result<Vec<Fr>> {
    let count = consume_u32(cursor)? as usize;
    if count.saturating_mul(Fr::SIZE) > remaining_slice(cursor).len() {
        return Err(anyhow!("list of {} elements exceeds remaining input", count));
    }
    (0..count).map(|_| consume_fr(cursor)).collect()
}

pub fn write_fr_list(out: &mut Vec<u8>, values: &[Fr]) {
    out.extend_from_slice(&(values.len() as u32).to_be_bytes());
    for value in values {
        out.extend_from_slice(value.as_bytes());
    }
}

pub fn write_byte_list(out: &mut Vec<u8>, items: &[Vec<u8>]) {
    out.extend_from_slice(&(items.len() as u32).to_be_bytes());
    for item in items {
        out.extend_from_slice(&(item.len() as u32).to_be_bytes());
        out.extend_from_slice(item);
    }
}

pub fn is_empty(cursor: &mut Cursor<Vec<u8>>) -> bool {
    cursor.position() >= cursor.get_ref().len() as u64
}

pub fn remaining_slice(cursor: &mut Cursor<Vec<u8>>) -> &[u8] {
    let start = (cursor.position() as usize).min(cursor.get_ref().len());
    &cursor.get_ref()[start..]
}
