// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client-generated temporary identifiers.
//!
//! An entity created while offline (or while its create call is in flight)
//! gets a placeholder id until the server issues a real one. Temp ids carry
//! a reserved prefix so they are trivially distinguishable from server ids:
//!
//! Format: `temp-{kind}-{millis}-{suffix}`
//!
//! The suffix mixes a random component with a process-wide counter so two
//! ids generated in the same millisecond never collide.

use rand::Rng;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::entity::EntityKind;
use crate::error::{Error, Result};

/// Reserved prefix marking client-generated ids.
pub const TEMP_PREFIX: &str = "temp-";

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Generates a fresh temp id for an entity of the given kind.
pub fn generate(kind: EntityKind) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let random: u32 = rand::thread_rng().gen();
    format!("temp-{}-{millis}-{random:08x}{seq:04x}", kind.as_str())
}

/// Returns true if the id carries the reserved temp prefix.
pub fn is_temp(id: &str) -> bool {
    id.starts_with(TEMP_PREFIX)
}

/// Extracts the entity kind encoded in a temp id.
pub fn parse(id: &str) -> Result<EntityKind> {
    let rest = id
        .strip_prefix(TEMP_PREFIX)
        .ok_or_else(|| Error::InvalidTempId(id.to_string()))?;

    // Kind names never contain '-', so the last two segments are always
    // millis and suffix.
    let mut parts = rest.rsplitn(3, '-');
    let _suffix = parts.next();
    let millis = parts.next();
    let kind = parts.next();

    match (kind, millis) {
        (Some(kind), Some(millis)) if millis.chars().all(|c| c.is_ascii_digit()) => {
            EntityKind::from_str(kind).map_err(|_| Error::InvalidTempId(id.to_string()))
        }
        _ => Err(Error::InvalidTempId(id.to_string())),
    }
}

#[cfg(test)]
#[path = "temp_id_tests.rs"]
mod tests;
