//! crates/dermassist_core/src/ids.rs
//!
//! Message id generation.

use crate::domain::MessageId;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

const SALT_BITS: u32 = 10;
const SALT_MASK: i64 = (1 << SALT_BITS) - 1;

/// Hands out ids of the form `millis << 10 | salt`.
///
/// The millisecond part never repeats within one generator, even when several
/// messages are created in the same millisecond. The salt is drawn at random
/// per generator, so two sessions of the same origin (each with its own
/// generator) only collide when their salts match.
#[derive(Debug)]
pub struct MessageIdGenerator {
    salt: i64,
    last_millis: AtomicI64,
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::with_salt((Uuid::new_v4().as_u128() as u16) & SALT_MASK as u16)
    }

    /// A generator with a fixed salt. Only the low 10 bits are used.
    pub fn with_salt(salt: u16) -> Self {
        Self {
            salt: i64::from(salt) & SALT_MASK,
            last_millis: AtomicI64::new(0),
        }
    }

    pub fn salt(&self) -> u16 {
        self.salt as u16
    }

    pub fn next_id(&self) -> MessageId {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_millis.load(Ordering::Relaxed);
        loop {
            let millis = now.max(last + 1);
            match self.last_millis.compare_exchange_weak(
                last,
                millis,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return (millis << SALT_BITS) | self.salt,
                Err(current) => last = current,
            }
        }
    }
}
